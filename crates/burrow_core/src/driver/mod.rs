//! Engine drivers behind the client.
//!
//! Every backend satisfies the same capability set through [`SqlDriver`], one
//! implementation per engine, selected by provider tag.

pub mod batch;
pub mod mysql;

pub use batch::BatchStatement;
pub use mysql::MysqlDriver;

use crate::error::{BurrowError, BurrowResult};
use crate::models::{PagedRecords, PendingChange, TabularResult};
use async_trait::async_trait;

/// Capability set every engine driver provides.
///
/// Methods take `&mut self`: a driver owns one connection handle and the
/// interactive session serializes access to it.
#[async_trait]
pub trait SqlDriver: Send {
    /// Open the (possibly tunneled) connection and verify liveness with a
    /// ping. No retry on failure.
    async fn connect(&mut self, url: &str) -> BurrowResult<()>;

    /// Run the identical connect sequence without retaining the result.
    async fn test_connection(&mut self, url: &str) -> BurrowResult<()>;

    /// Drop the connection handle and stop the tunnel, if any.
    async fn disconnect(&mut self) -> BurrowResult<()>;

    /// User databases, with system schemas filtered out.
    async fn list_databases(&mut self) -> BurrowResult<Vec<String>>;

    /// Table names within one database.
    async fn list_tables(&mut self, database: &str) -> BurrowResult<Vec<String>>;

    /// Column metadata for one table, header exactly as the server reports it.
    async fn describe_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> BurrowResult<TabularResult>;

    /// Indexes on one table. An empty result is a normal terminal state.
    async fn list_indexes(&mut self, table: &str) -> BurrowResult<TabularResult>;

    /// Key-column constraints for one `db.table`.
    async fn list_constraints(&mut self, table: &str) -> BurrowResult<TabularResult>;

    /// Foreign keys referencing one `db.table`.
    async fn list_foreign_keys(&mut self, table: &str) -> BurrowResult<TabularResult>;

    /// Paginated table read with optional filter and sort clauses.
    async fn fetch_records(
        &mut self,
        table: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> BurrowResult<PagedRecords>;

    /// Ad hoc query returning a uniform tabular result.
    async fn execute_query(&mut self, query: &str) -> BurrowResult<TabularResult>;

    /// Single mutating statement; returns a "<N> rows affected" message.
    async fn execute_statement(&mut self, statement: &str) -> BurrowResult<String>;

    /// Set one cell of one row, addressed by its primary key.
    async fn update_record(
        &mut self,
        table: &str,
        column: &str,
        value: &str,
        pk_column: &str,
        pk_value: &str,
    ) -> BurrowResult<()>;

    /// Remove one row, addressed by its primary key.
    async fn delete_record(
        &mut self,
        table: &str,
        pk_column: &str,
        pk_value: &str,
    ) -> BurrowResult<()>;

    /// Apply a batch of staged edits inside one transaction, all-or-nothing.
    async fn apply_changes(&mut self, changes: &[PendingChange]) -> BurrowResult<()>;

    /// Engine tag this driver serves.
    fn provider(&self) -> &str;
}

/// Select a driver implementation by provider tag.
pub fn for_provider(provider: &str) -> BurrowResult<Box<dyn SqlDriver>> {
    match provider {
        "mysql" => Ok(Box::new(MysqlDriver::new())),
        other => Err(BurrowError::validation_with_hint(
            format!("Unsupported provider: {}", other),
            "Supported providers: mysql",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_tag_selects_the_driver() {
        let driver = for_provider("mysql").unwrap();
        assert_eq!(driver.provider(), "mysql");
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = for_provider("oracle").err().unwrap();
        assert!(matches!(err, BurrowError::Validation { .. }));
    }
}
