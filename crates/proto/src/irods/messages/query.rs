//! General (catalog) query messages: `GenQueryInp_PI` / `GenQueryOut_PI`.

use crate::irods::common::{Column, GEN_QUERY_AN, MAX_QUERY_ROWS};
use crate::irods::message::Message;
use crate::irods::messages::{KeyValPair, RequestMessage, ResponseMessage};
use crate::irods::xml::{PackedStructWriter, XmlEra, XmlNode};
use rods_platform::{RodsError, RodsResult};

/// A general query: selected columns plus SQL-ish string conditions.
///
/// # Example
///
/// ```rust
/// use rods_proto::irods::common::Column;
/// use rods_proto::irods::messages::query::GenQuery;
///
/// let query = GenQuery::new()
///     .select(Column::DataName)
///     .select(Column::DataSize)
///     .condition(Column::CollName, "= '/tempZone/home/rods'");
/// assert_eq!(query.selected().len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct GenQuery {
    selects: Vec<Column>,
    conditions: Vec<(Column, String)>,
    max_rows: Option<i32>,
    continue_index: i32,
}

impl GenQuery {
    /// Creates an empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column to the select list.
    pub fn select(mut self, column: Column) -> Self {
        self.selects.push(column);
        self
    }

    /// Adds a condition on a column, e.g. `= '/tempZone/home'`.
    pub fn condition(mut self, column: Column, condition: &str) -> Self {
        self.conditions.push((column, condition.to_string()));
        self
    }

    /// Overrides the per-page row cap.
    pub fn max_rows(mut self, rows: i32) -> Self {
        self.max_rows = Some(rows);
        self
    }

    /// Returns the selected columns.
    pub fn selected(&self) -> &[Column] {
        &self.selects
    }

    /// Sets the continuation index for the next page.
    pub fn continue_from(&mut self, index: i32) {
        self.continue_index = index;
    }
}

impl RequestMessage for GenQuery {
    fn int_info(&self) -> i32 {
        GEN_QUERY_AN
    }

    fn to_body_bytes(&self, era: XmlEra) -> RodsResult<Vec<u8>> {
        let mut w = PackedStructWriter::new("GenQueryInp_PI", era);
        w.tag_i32("maxRows", self.max_rows.unwrap_or(MAX_QUERY_ROWS));
        w.tag_i32("continueInx", self.continue_index);
        w.tag_i32("partialStartIndex", 0);
        w.tag_i32("options", 0);
        KeyValPair::new().write_into(&mut w);

        // Select list: column index + aggregation flag (1 = plain select).
        w.open("InxIvalPair_PI");
        w.tag_i32("iiLen", self.selects.len() as i32);
        for column in &self.selects {
            w.tag_i32("inx", column.id());
        }
        for _ in &self.selects {
            w.tag_i32("ivalue", 1);
        }
        w.close("InxIvalPair_PI");

        // Condition list: column index + condition string.
        w.open("InxValPair_PI");
        w.tag_i32("isLen", self.conditions.len() as i32);
        for (column, _) in &self.conditions {
            w.tag_i32("inx", column.id());
        }
        for (_, condition) in &self.conditions {
            w.tag("svalue", condition);
        }
        w.close("InxValPair_PI");
        Ok(w.finish())
    }
}

/// One page of query results, column-major as the server sends them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPage {
    /// Rows in this page.
    pub row_count: i32,
    /// Columns in this page.
    pub attribute_count: i32,
    /// Non-zero when more pages are available.
    pub continue_index: i32,
    /// `(column id, values)` pairs, one entry per selected column.
    pub columns: Vec<(i32, Vec<String>)>,
}

impl QueryPage {
    /// Returns the values of a column by catalog id.
    pub fn column(&self, column: Column) -> Option<&[String]> {
        self.columns
            .iter()
            .find(|(id, _)| *id == column.id())
            .map(|(_, values)| values.as_slice())
    }

    /// Returns row `index` as `(column id, value)` pairs.
    pub fn row(&self, index: usize) -> Option<Vec<(i32, &str)>> {
        if index >= self.row_count as usize {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|(id, values)| (*id, values[index].as_str()))
                .collect(),
        )
    }
}

impl ResponseMessage for QueryPage {
    fn from_message(message: &Message, era: XmlEra) -> RodsResult<Self> {
        let node = XmlNode::parse(&message.body.message, era)?;
        if node.name != "GenQueryOut_PI" {
            return Err(RodsError::Malformed(format!(
                "expected GenQueryOut_PI, found '{}'",
                node.name
            )));
        }
        let row_count = node.i32_of("rowCnt")?;
        let attribute_count = node.i32_of("attriCnt")?;
        let continue_index = node.i32_of("continueInx").unwrap_or(0);

        let mut columns = Vec::new();
        for result in node.children_named("SqlResult_PI") {
            let id = result.i32_of("attriInx")?;
            if id == 0 {
                // Padding entry past attriCnt.
                continue;
            }
            let values: Vec<String> = result
                .children_named("value")
                .take(row_count as usize)
                .map(|v| v.text.clone())
                .collect();
            if values.len() != row_count as usize {
                return Err(RodsError::Malformed(format!(
                    "column {} carries {} values for {} rows",
                    id,
                    values.len(),
                    row_count
                )));
            }
            columns.push((id, values));
        }

        Ok(Self {
            row_count,
            attribute_count,
            continue_index,
            columns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irods::message::MessageType;

    #[test]
    fn test_query_body() {
        let query = GenQuery::new()
            .select(Column::DataName)
            .select(Column::DataSize)
            .condition(Column::CollName, "= '/tempZone/home/rods'");
        let body = query.to_body_bytes(XmlEra::Standard).unwrap();
        let node = XmlNode::parse(&body, XmlEra::Standard).unwrap();

        let selects = node.child("InxIvalPair_PI").unwrap();
        assert_eq!(selects.i32_of("iiLen").unwrap(), 2);
        let indices: Vec<_> = selects.children_named("inx").collect();
        assert_eq!(indices[0].text, "403");
        assert_eq!(indices[1].text, "407");

        let conditions = node.child("InxValPair_PI").unwrap();
        assert_eq!(conditions.i32_of("isLen").unwrap(), 1);
        assert_eq!(
            conditions.child("svalue").unwrap().text,
            "= '/tempZone/home/rods'"
        );
    }

    #[test]
    fn test_condition_escaping_differs_by_era() {
        let query = GenQuery::new()
            .select(Column::DataName)
            .condition(Column::CollName, "= '/z/h'");
        let standard = query.to_body_bytes(XmlEra::Standard).unwrap();
        assert!(String::from_utf8(standard).unwrap().contains("&apos;"));
        let legacy = query.to_body_bytes(XmlEra::Legacy).unwrap();
        assert!(String::from_utf8(legacy).unwrap().contains("= '/z/h'"));
    }

    fn page_message() -> Message {
        let body = "<GenQueryOut_PI><rowCnt>2</rowCnt><attriCnt>2</attriCnt><continueInx>5</continueInx><totalRowCount>0</totalRowCount>\
<SqlResult_PI><attriInx>403</attriInx><reslen>8</reslen><value>a.txt</value><value>b.txt</value></SqlResult_PI>\
<SqlResult_PI><attriInx>407</attriInx><reslen>8</reslen><value>11</value><value>20</value></SqlResult_PI>\
<SqlResult_PI><attriInx>0</attriInx><reslen>0</reslen></SqlResult_PI>\
</GenQueryOut_PI>";
        Message::new(MessageType::ApiReply, body.as_bytes().to_vec(), 0)
    }

    #[test]
    fn test_query_page_decode() {
        let page = QueryPage::from_message(&page_message(), XmlEra::Standard).unwrap();
        assert_eq!(page.row_count, 2);
        assert_eq!(page.continue_index, 5);
        assert_eq!(
            page.column(Column::DataName).unwrap(),
            &["a.txt".to_string(), "b.txt".to_string()]
        );
        let row = page.row(1).unwrap();
        assert_eq!(row, vec![(403, "b.txt"), (407, "20")]);
        assert!(page.row(2).is_none());
    }

    #[test]
    fn test_query_page_value_count_mismatch() {
        let body = "<GenQueryOut_PI><rowCnt>2</rowCnt><attriCnt>1</attriCnt><continueInx>0</continueInx>\
<SqlResult_PI><attriInx>403</attriInx><reslen>8</reslen><value>only-one</value></SqlResult_PI>\
</GenQueryOut_PI>";
        let message = Message::new(MessageType::ApiReply, body.as_bytes().to_vec(), 0);
        assert!(matches!(
            QueryPage::from_message(&message, XmlEra::Standard),
            Err(RodsError::Malformed(_))
        ));
    }
}
