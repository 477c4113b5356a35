//! Collection operations: create, list, move, remove.

use crate::irods::common::{Column, RENAME_COLL_OPR, RENAME_DATA_OBJ_OPR};
use crate::irods::connection::Connection;
use crate::irods::messages::collection::{CollectionRequest, RenameRequest};
use crate::irods::messages::query::GenQuery;
use crate::irods::messages::EmptyResponse;
use crate::irods::ops::query;
use rods_platform::{RodsError, RodsResult};

/// One sub-collection as listed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEntry {
    /// Catalog id.
    pub id: i64,
    /// Absolute path.
    pub path: String,
    /// Owner user name.
    pub owner: String,
}

/// One data object as listed from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataObjectEntry {
    /// Catalog id.
    pub id: i64,
    /// Object name within the collection.
    pub name: String,
    /// Size in bytes.
    pub size: i64,
}

/// Creates a collection.
pub async fn create(conn: &Connection, path: &str) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&CollectionRequest::create(path))
        .await?;
    Ok(())
}

/// Removes a collection, recursively when asked.
pub async fn remove(conn: &Connection, path: &str, recursive: bool) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&CollectionRequest::remove(path, recursive))
        .await?;
    Ok(())
}

/// Renames (moves) a collection.
pub async fn rename(conn: &Connection, source: &str, destination: &str) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&RenameRequest::new(source, destination, RENAME_COLL_OPR))
        .await?;
    Ok(())
}

/// Renames (moves) a data object.
pub async fn rename_data_object(
    conn: &Connection,
    source: &str,
    destination: &str,
) -> RodsResult<()> {
    conn.request::<EmptyResponse>(&RenameRequest::new(
        source,
        destination,
        RENAME_DATA_OBJ_OPR,
    ))
    .await?;
    Ok(())
}

/// Lists the sub-collections of `path`.
pub async fn list(conn: &Connection, path: &str) -> RodsResult<Vec<CollectionEntry>> {
    let listing = GenQuery::new()
        .select(Column::CollId)
        .select(Column::CollName)
        .select(Column::CollOwnerName)
        .condition(Column::CollParentName, &format!("= '{}'", path));
    let rows = query::execute(conn, &listing).await?;

    rows.rows
        .iter()
        .map(|row| {
            Ok(CollectionEntry {
                id: numeric(&rows.columns, row, Column::CollId)?,
                path: text(&rows.columns, row, Column::CollName)?,
                owner: text(&rows.columns, row, Column::CollOwnerName)?,
            })
        })
        .collect()
}

/// Lists the data objects directly inside `path`.
pub async fn list_data_objects(
    conn: &Connection,
    path: &str,
) -> RodsResult<Vec<DataObjectEntry>> {
    let listing = GenQuery::new()
        .select(Column::DataId)
        .select(Column::DataName)
        .select(Column::DataSize)
        .condition(Column::CollName, &format!("= '{}'", path));
    let rows = query::execute(conn, &listing).await?;

    rows.rows
        .iter()
        .map(|row| {
            Ok(DataObjectEntry {
                id: numeric(&rows.columns, row, Column::DataId)?,
                name: text(&rows.columns, row, Column::DataName)?,
                size: numeric(&rows.columns, row, Column::DataSize)?,
            })
        })
        .collect()
}

fn text(columns: &[i32], row: &[String], column: Column) -> RodsResult<String> {
    columns
        .iter()
        .position(|&c| c == column.id())
        .map(|i| row[i].clone())
        .ok_or_else(|| RodsError::Malformed(format!("listing lacks column {:?}", column)))
}

fn numeric(columns: &[i32], row: &[String], column: Column) -> RodsResult<i64> {
    text(columns, row, column)?
        .parse()
        .map_err(|_| RodsError::Malformed(format!("column {:?} is not numeric", column)))
}
