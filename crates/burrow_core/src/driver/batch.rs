//! Converts staged edits into an ordered, minimal statement plan.
//!
//! Updates touching the same logical row merge into one statement; deletes
//! and inserts pass through one statement per change. Values travel as bound
//! parameters. Table and column names are interpolated raw: callers are a
//! trusted boundary (see DESIGN.md).

use crate::error::{BurrowError, BurrowResult};
use crate::models::PendingChange;
use mysql_async::Value;

/// One executable unit of a batch plan.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Identifies one logical row: Updates sharing a key merge into one UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
struct GroupKey {
    table: String,
    pk_column: String,
    pk_value: String,
}

/// Plan the batch: merged updates first (first-seen key order), then deletes
/// and inserts in input order.
pub fn plan(changes: &[PendingChange]) -> BurrowResult<Vec<BatchStatement>> {
    // Vec keyed by first appearance keeps merged-update emission deterministic
    let mut update_groups: Vec<(GroupKey, Vec<(&str, &str)>)> = Vec::new();
    let mut deletes: Vec<&PendingChange> = Vec::new();
    let mut inserts: Vec<&PendingChange> = Vec::new();

    for change in changes {
        match change {
            PendingChange::Update {
                table,
                column,
                value,
                pk_column,
                pk_value,
            } => {
                let key = GroupKey {
                    table: table.clone(),
                    pk_column: pk_column.clone(),
                    pk_value: pk_value.clone(),
                };
                match update_groups.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, assignments)) => assignments.push((column, value)),
                    None => update_groups.push((key, vec![(column, value)])),
                }
            }
            PendingChange::Delete { .. } => deletes.push(change),
            PendingChange::Insert {
                table,
                columns,
                values,
            } => {
                if columns.len() != values.len() {
                    return Err(BurrowError::validation_with_hint(
                        format!(
                            "Insert into {} names {} columns but carries {} values",
                            table,
                            columns.len(),
                            values.len()
                        ),
                        "Stage the insert again with one value per column",
                    ));
                }
                inserts.push(change);
            }
        }
    }

    let mut statements =
        Vec::with_capacity(update_groups.len() + deletes.len() + inserts.len());

    for (key, assignments) in &update_groups {
        let set_clause = assignments
            .iter()
            .map(|(column, _)| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");

        let mut params: Vec<Value> = assignments
            .iter()
            .map(|(_, value)| Value::from(*value))
            .collect();
        params.push(Value::from(key.pk_value.as_str()));

        statements.push(BatchStatement {
            sql: format!(
                "UPDATE {} SET {} WHERE {} = ?",
                key.table, set_clause, key.pk_column
            ),
            params,
        });
    }

    for change in deletes {
        if let PendingChange::Delete {
            table,
            pk_column,
            pk_value,
        } = change
        {
            statements.push(BatchStatement {
                sql: format!("DELETE FROM {} WHERE {} = ?", table, pk_column),
                params: vec![Value::from(pk_value.as_str())],
            });
        }
    }

    for change in inserts {
        if let PendingChange::Insert {
            table,
            columns,
            values,
        } = change
        {
            let mut params = Vec::with_capacity(values.len());
            let placeholders = values
                .iter()
                .map(|raw| match coerce_insert_value(raw) {
                    Some(value) => {
                        params.push(value);
                        "?"
                    }
                    None => "DEFAULT",
                })
                .collect::<Vec<_>>()
                .join(", ");

            statements.push(BatchStatement {
                sql: format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    table,
                    columns.join(", "),
                    placeholders
                ),
                params,
            });
        }
    }

    Ok(statements)
}

/// Numeric-looking values bind as numbers, `default` (any case) becomes the
/// SQL keyword and binds nothing, everything else binds as a string.
fn coerce_insert_value(raw: &str) -> Option<Value> {
    if raw.eq_ignore_ascii_case("default") {
        return None;
    }
    if let Ok(int) = raw.parse::<i64>() {
        return Some(Value::Int(int));
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Some(Value::Double(float));
    }
    Some(Value::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(table: &str, pk: &str, column: &str, value: &str) -> PendingChange {
        PendingChange::Update {
            table: table.to_string(),
            column: column.to_string(),
            value: value.to_string(),
            pk_column: "id".to_string(),
            pk_value: pk.to_string(),
        }
    }

    fn delete(table: &str, pk: &str) -> PendingChange {
        PendingChange::Delete {
            table: table.to_string(),
            pk_column: "id".to_string(),
            pk_value: pk.to_string(),
        }
    }

    fn insert(table: &str, columns: &[&str], values: &[&str]) -> PendingChange {
        PendingChange::Insert {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn updates_on_the_same_row_merge_into_one_statement() {
        let changes = vec![
            update("users", "1", "name", "A"),
            update("users", "1", "age", "5"),
            update("users", "2", "name", "B"),
        ];

        let statements = plan(&changes).unwrap();
        assert_eq!(statements.len(), 2);

        assert_eq!(
            statements[0].sql,
            "UPDATE users SET name = ?, age = ? WHERE id = ?"
        );
        assert_eq!(
            statements[0].params,
            vec![Value::from("A"), Value::from("5"), Value::from("1")]
        );

        assert_eq!(statements[1].sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(
            statements[1].params,
            vec![Value::from("B"), Value::from("2")]
        );
    }

    #[test]
    fn merged_updates_keep_first_seen_key_order() {
        let changes = vec![
            update("users", "9", "name", "Z"),
            update("users", "1", "name", "A"),
            update("users", "9", "age", "40"),
            update("users", "5", "name", "M"),
        ];

        let statements = plan(&changes).unwrap();
        let pk_params: Vec<&Value> =
            statements.iter().map(|s| s.params.last().unwrap()).collect();
        assert_eq!(
            pk_params,
            vec![&Value::from("9"), &Value::from("1"), &Value::from("5")]
        );
    }

    #[test]
    fn rows_differing_only_by_table_do_not_merge() {
        let changes = vec![
            update("users", "1", "name", "A"),
            update("orders", "1", "name", "B"),
        ];
        assert_eq!(plan(&changes).unwrap().len(), 2);
    }

    #[test]
    fn deletes_stay_unmerged_and_in_input_order() {
        let changes = vec![delete("users", "3"), delete("users", "1"), delete("users", "3")];

        let statements = plan(&changes).unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[0].params, vec![Value::from("3")]);
        assert_eq!(statements[1].params, vec![Value::from("1")]);
        assert_eq!(statements[2].params, vec![Value::from("3")]);
    }

    #[test]
    fn insert_values_coerce_by_shape() {
        let changes = vec![insert(
            "users",
            &["id", "score", "created", "name"],
            &["42", "3.14", "DEFAULT", "hello"],
        )];

        let statements = plan(&changes).unwrap();
        assert_eq!(
            statements[0].sql,
            "INSERT INTO users (id, score, created, name) VALUES (?, ?, DEFAULT, ?)"
        );
        assert_eq!(
            statements[0].params,
            vec![Value::Int(42), Value::Double(3.14), Value::from("hello")]
        );
    }

    #[test]
    fn default_keyword_is_case_insensitive() {
        let changes = vec![insert("t", &["a", "b"], &["default", "DeFaUlT"])];
        let statements = plan(&changes).unwrap();
        assert_eq!(statements[0].sql, "INSERT INTO t (a, b) VALUES (DEFAULT, DEFAULT)");
        assert!(statements[0].params.is_empty());
    }

    #[test]
    fn emission_order_is_updates_then_deletes_then_inserts() {
        let changes = vec![
            insert("t", &["a"], &["1"]),
            delete("t", "7"),
            update("t", "1", "a", "x"),
            insert("t", &["a"], &["2"]),
            delete("t", "8"),
        ];

        let statements = plan(&changes).unwrap();
        let kinds: Vec<&str> = statements
            .iter()
            .map(|s| s.sql.split_whitespace().next().unwrap())
            .collect();
        assert_eq!(kinds, vec!["UPDATE", "DELETE", "DELETE", "INSERT", "INSERT"]);
        // Inserts preserve input order
        assert_eq!(statements[3].params, vec![Value::Int(1)]);
        assert_eq!(statements[4].params, vec![Value::Int(2)]);
    }

    #[test]
    fn insert_arity_mismatch_is_a_validation_error() {
        let changes = vec![insert("t", &["a", "b"], &["1"])];
        let err = plan(&changes).unwrap_err();
        assert!(matches!(err, BurrowError::Validation { .. }));
    }

    #[test]
    fn empty_batch_plans_to_nothing() {
        assert!(plan(&[]).unwrap().is_empty());
    }
}
