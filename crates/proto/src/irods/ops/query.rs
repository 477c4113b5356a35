//! General-query execution with paging.

use crate::irods::connection::Connection;
use crate::irods::messages::query::{GenQuery, QueryPage};
use rods_platform::{RodsError, RodsResult};

/// A fully drained query result, row-major.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryRows {
    /// Column ids in the order values appear within each row.
    pub columns: Vec<i32>,
    /// Rows across all pages.
    pub rows: Vec<Vec<String>>,
}

impl QueryRows {
    fn absorb(&mut self, page: &QueryPage) -> RodsResult<()> {
        if self.columns.is_empty() {
            self.columns = page.columns.iter().map(|(id, _)| *id).collect();
        }
        for row_index in 0..page.row_count as usize {
            let row = page
                .row(row_index)
                .ok_or_else(|| RodsError::Malformed("query page shorter than rowCnt".to_string()))?
                .into_iter()
                .map(|(_, value)| value.to_string())
                .collect();
            self.rows.push(row);
        }
        Ok(())
    }
}

/// Runs a query to completion, following continuation indexes.
///
/// Paging spans several request/response pairs, so the whole drain happens
/// under one connection lock. A catalog "no rows" reply is returned as an
/// empty result rather than an error.
pub async fn execute(conn: &Connection, query: &GenQuery) -> RodsResult<QueryRows> {
    let mut rows = QueryRows::default();
    let mut current = query.clone();
    let mut guard = conn.lock().await;

    loop {
        let page: QueryPage = match guard.request(&current).await {
            Ok(page) => page,
            Err(RodsError::FileNotFound(_)) => break,
            Err(e) => return Err(e),
        };
        rows.absorb(&page)?;
        if page.continue_index <= 0 {
            break;
        }
        current.continue_from(page.continue_index);
    }

    Ok(rows)
}
