use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row as Glide reports it: plain JSON object keyed by column name,
/// with the row identifier under `$rowID`.
pub type TableRow = Map<String, Value>;

/// One page of rows from `queryTables`, plus the continuation token for
/// the next page when the table has more.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryPage {
    pub rows: Vec<TableRow>,
    pub next: Option<String>,
}

impl QueryPage {
    /// Parses the body of a `queryTables` response. The documented shape
    /// is an array of per-query objects carrying `rows` and `next`, but
    /// the API has also been seen returning a bare array of row arrays,
    /// so both are accepted.
    pub fn from_response(value: &Value) -> Option<Self> {
        let first = value.as_array()?.first()?;

        if let Some(obj) = first.as_object() {
            let rows = obj
                .get("rows")?
                .as_array()?
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect();
            let next = obj
                .get("next")
                .and_then(Value::as_str)
                .filter(|token| !token.is_empty())
                .map(ToOwned::to_owned);
            return Some(Self { rows, next });
        }

        if let Some(rows) = first.as_array() {
            let rows = rows
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect();
            return Some(Self { rows, next: None });
        }

        None
    }
}

/// A single change shipped to `mutateTables`. Field names follow the
/// wire format exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Mutation {
    #[serde(rename = "add-row-to-table")]
    AddRowToTable {
        #[serde(rename = "tableName")]
        table_name: String,
        #[serde(rename = "columnValues")]
        column_values: Map<String, Value>,
    },
    #[serde(rename = "set-columns-in-row")]
    SetColumnsInRow {
        #[serde(rename = "tableName")]
        table_name: String,
        #[serde(rename = "columnValues")]
        column_values: Map<String, Value>,
        #[serde(rename = "rowID")]
        row_id: String,
    },
}

impl Mutation {
    pub fn table_name(&self) -> &str {
        match self {
            Mutation::AddRowToTable { table_name, .. } => table_name,
            Mutation::SetColumnsInRow { table_name, .. } => table_name,
        }
    }
}

/// Per-mutation outcome. Adds report the row id Glide assigned;
/// set-columns results come back empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResult {
    pub row_id: Option<String>,
}

impl MutationResult {
    pub fn from_response(value: &Value) -> Self {
        Self {
            row_id: value
                .get("rowID")
                .and_then(Value::as_str)
                .map(ToOwned::to_owned),
        }
    }
}
