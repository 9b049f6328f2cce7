use serde::{Deserialize, Serialize};

/// A staged, uncommitted edit captured by the UI layer.
///
/// Update and Delete address exactly one primary-key column/value pair;
/// composite keys are unsupported. Insert carries ordered columns and values
/// of equal length, checked when the batch is planned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PendingChange {
    /// Set one cell of one row
    Update {
        table: String,
        column: String,
        value: String,
        pk_column: String,
        pk_value: String,
    },
    /// Remove one row
    Delete {
        table: String,
        pk_column: String,
        pk_value: String,
    },
    /// Add one row
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<String>,
    },
}

impl PendingChange {
    pub fn table(&self) -> &str {
        match self {
            PendingChange::Update { table, .. }
            | PendingChange::Delete { table, .. }
            | PendingChange::Insert { table, .. } => table,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The UI layer stages edits as tagged JSON records
    #[test]
    fn staged_edits_round_trip_through_json() {
        let staged = r#"{
            "kind": "update",
            "table": "users",
            "column": "name",
            "value": "A",
            "pkColumn": "id",
            "pkValue": "1"
        }"#;

        let change: PendingChange = serde_json::from_str(staged).unwrap();
        match &change {
            PendingChange::Update { table, pk_value, .. } => {
                assert_eq!(table, "users");
                assert_eq!(pk_value, "1");
            }
            other => panic!("expected Update, got {:?}", other),
        }

        let encoded = serde_json::to_value(&change).unwrap();
        assert_eq!(encoded["kind"], "update");
        assert_eq!(encoded["pkColumn"], "id");
    }

    #[test]
    fn insert_carries_ordered_columns_and_values() {
        let change = PendingChange::Insert {
            table: "users".to_string(),
            columns: vec!["id".to_string(), "name".to_string()],
            values: vec!["1".to_string(), "A".to_string()],
        };

        let encoded = serde_json::to_value(&change).unwrap();
        assert_eq!(encoded["kind"], "insert");
        assert_eq!(encoded["columns"][1], "name");
        assert_eq!(encoded["values"][1], "A");
    }
}
