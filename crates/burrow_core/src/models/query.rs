use serde::{Deserialize, Serialize};

/// Uniform tabular form for every read operation: an ordered header plus
/// rows of string cells. NULL cells render as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabularResult {
    /// Ordered column names as reported by the server
    pub header: Vec<String>,
    /// Ordered string cells, one inner vec per row
    pub rows: Vec<Vec<String>>,
}

impl TabularResult {
    pub fn new(header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { header, rows }
    }

    /// True when the result carries no rows. An empty match is a normal
    /// terminal state for schema queries, not an error.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// A page of table records plus the total count when pagination is enabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedRecords {
    pub records: TabularResult,
    /// Total matching rows for the same filter; None when pagination is off
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_records: Option<u64>,
}
