//! MySQL driver: one owned connection, optionally reached through an SSH
//! tunnel whose local endpoint is injected into the connection options.
//!
//! Table names, filter clauses, and sort clauses are interpolated raw into
//! statements; callers are a trusted boundary. Values always travel as bound
//! parameters.

use crate::driver::batch;
use crate::driver::SqlDriver;
use crate::error::{BurrowError, BurrowResult};
use crate::models::{ConnectionTarget, PagedRecords, PendingChange, TabularResult};
use crate::services::ssh_tunnel::{SshTunnelHandle, SshTunnelService};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, QueryResult, Row, TxOpts, Value};

/// Schemas that never appear in database listings.
pub const SYSTEM_SCHEMAS: [&str; 4] =
    ["information_schema", "mysql", "performance_schema", "sys"];

/// Page size used when the caller paginates without naming a limit.
const DEFAULT_RECORD_LIMIT: i64 = 300;

/// MySQL implementation of the driver capability set.
pub struct MysqlDriver {
    conn: Option<Conn>,
    tunnel: Option<SshTunnelHandle>,
    connected_at: Option<DateTime<Utc>>,
    provider: &'static str,
}

impl MysqlDriver {
    pub fn new() -> Self {
        Self {
            conn: None,
            tunnel: None,
            connected_at: None,
            provider: "mysql",
        }
    }

    /// When the connection was opened, if one is held.
    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    fn conn_mut(&mut self) -> BurrowResult<&mut Conn> {
        self.conn.as_mut().ok_or_else(|| {
            BurrowError::connection_with_hint(
                "Not connected to a database",
                "Call connect() before issuing queries",
            )
        })
    }
}

impl Default for MysqlDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SqlDriver for MysqlDriver {
    async fn connect(&mut self, url: &str) -> BurrowResult<()> {
        // An explicit reconnect replaces the previous handle
        self.disconnect().await?;

        let target = ConnectionTarget::parse(url)?;

        let tunnel = match &target.tunnel {
            Some(config) => Some(
                SshTunnelService::establish(config, &target.db.host, target.db.port).await?,
            ),
            None => None,
        };

        // Dial the tunnel's local endpoint instead of the real host when
        // one was established
        let (host, port) = match &tunnel {
            Some(handle) => handle.local_endpoint(),
            None => (target.db.host.as_str(), target.db.port),
        };

        let opts = OptsBuilder::default()
            .ip_or_hostname(host)
            .tcp_port(port)
            .user(Some(target.db.username.clone()))
            .pass(target.db.password.clone())
            .db_name(target.db.database.clone())
            .prefer_socket(false);

        let mut conn = match Conn::new(opts).await {
            Ok(conn) => conn,
            Err(e) => {
                if let Some(handle) = &tunnel {
                    handle.stop();
                }
                return Err(BurrowError::connection_with_hint(
                    format!("Failed to open connection: {}", e),
                    "Verify the database server is running and credentials are correct",
                ));
            }
        };

        if let Err(e) = conn.ping().await {
            if let Some(handle) = &tunnel {
                handle.stop();
            }
            return Err(BurrowError::connection_with_hint(
                format!("Connection ping failed: {}", e),
                "The server accepted the connection but is not responding",
            ));
        }

        tracing::info!(
            "Connected to {}:{}{}",
            target.db.host,
            target.db.port,
            if tunnel.is_some() { " via SSH tunnel" } else { "" }
        );

        self.conn = Some(conn);
        self.tunnel = tunnel;
        self.connected_at = Some(Utc::now());
        Ok(())
    }

    async fn test_connection(&mut self, url: &str) -> BurrowResult<()> {
        let mut probe = MysqlDriver::new();
        probe.connect(url).await?;
        probe.disconnect().await
    }

    async fn disconnect(&mut self) -> BurrowResult<()> {
        let result = match self.conn.take() {
            Some(conn) => conn.disconnect().await.map_err(BurrowError::from),
            None => Ok(()),
        };

        if let Some(tunnel) = self.tunnel.take() {
            tunnel.stop();
        }
        self.connected_at = None;
        result
    }

    async fn list_databases(&mut self) -> BurrowResult<Vec<String>> {
        let conn = self.conn_mut()?;
        let names: Vec<String> = conn.query("SHOW DATABASES").await?;
        Ok(filter_system_schemas(names))
    }

    async fn list_tables(&mut self, database: &str) -> BurrowResult<Vec<String>> {
        let conn = self.conn_mut()?;
        let tables: Vec<String> = conn
            .query(format!("SHOW TABLES FROM {}", database))
            .await?;
        Ok(tables)
    }

    async fn describe_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> BurrowResult<TabularResult> {
        let conn = self.conn_mut()?;
        let result = conn
            .query_iter(format!("DESCRIBE {}.{}", database, table))
            .await?;
        collect_result(result).await
    }

    async fn list_indexes(&mut self, table: &str) -> BurrowResult<TabularResult> {
        let conn = self.conn_mut()?;
        let result = conn
            .query_iter(format!("SHOW INDEX FROM {}", table))
            .await?;
        collect_result(result).await
    }

    async fn list_constraints(&mut self, table: &str) -> BurrowResult<TabularResult> {
        let (database, table_name) = split_qualified(table)?;
        let conn = self.conn_mut()?;
        let result = conn
            .exec_iter(
                "SELECT CONSTRAINT_NAME, COLUMN_NAME, REFERENCED_TABLE_NAME, \
                 REFERENCED_COLUMN_NAME \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?",
                (database, table_name),
            )
            .await?;
        collect_result(result).await
    }

    async fn list_foreign_keys(&mut self, table: &str) -> BurrowResult<TabularResult> {
        let (database, table_name) = split_qualified(table)?;
        let conn = self.conn_mut()?;
        let result = conn
            .exec_iter(
                "SELECT TABLE_NAME, COLUMN_NAME, CONSTRAINT_NAME, \
                 REFERENCED_COLUMN_NAME, REFERENCED_TABLE_NAME \
                 FROM information_schema.KEY_COLUMN_USAGE \
                 WHERE REFERENCED_TABLE_SCHEMA = ? AND REFERENCED_TABLE_NAME = ?",
                (database, table_name),
            )
            .await?;
        collect_result(result).await
    }

    async fn fetch_records(
        &mut self,
        table: &str,
        filter: Option<&str>,
        sort: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> BurrowResult<PagedRecords> {
        let paginated = offset >= 0 && limit >= 0;
        let query = build_records_query(table, filter, sort, offset, limit);

        let conn = self.conn_mut()?;
        let result = conn.query_iter(query).await?;
        let records = collect_result(result).await?;

        // The companion count shares the filter but never the sort
        let total_records = if paginated {
            conn.query_first::<u64, _>(build_count_query(table, filter))
                .await?
        } else {
            None
        };

        Ok(PagedRecords {
            records,
            total_records,
        })
    }

    async fn execute_query(&mut self, query: &str) -> BurrowResult<TabularResult> {
        let conn = self.conn_mut()?;
        let result = conn.query_iter(query).await?;
        collect_result(result).await
    }

    async fn execute_statement(&mut self, statement: &str) -> BurrowResult<String> {
        let conn = self.conn_mut()?;
        conn.query_drop(statement).await?;
        Ok(format!("{} rows affected", conn.affected_rows()))
    }

    async fn update_record(
        &mut self,
        table: &str,
        column: &str,
        value: &str,
        pk_column: &str,
        pk_value: &str,
    ) -> BurrowResult<()> {
        let sql = format!("UPDATE {} SET {} = ? WHERE {} = ?", table, column, pk_column);
        self.conn_mut()?.exec_drop(sql, (value, pk_value)).await?;
        Ok(())
    }

    async fn delete_record(
        &mut self,
        table: &str,
        pk_column: &str,
        pk_value: &str,
    ) -> BurrowResult<()> {
        let sql = format!("DELETE FROM {} WHERE {} = ?", table, pk_column);
        self.conn_mut()?.exec_drop(sql, (pk_value,)).await?;
        Ok(())
    }

    async fn apply_changes(&mut self, changes: &[PendingChange]) -> BurrowResult<()> {
        let statements = batch::plan(changes)?;
        if statements.is_empty() {
            return Ok(());
        }

        let conn = self.conn_mut()?;
        let mut tx = conn.start_transaction(TxOpts::default()).await?;

        for statement in &statements {
            if let Err(err) = tx
                .exec_drop(statement.sql.as_str(), statement.params.clone())
                .await
            {
                // All-or-nothing: the first failure undoes the whole batch
                let _ = tx.rollback().await;
                return Err(BurrowError::transaction(err));
            }
        }

        tx.commit().await.map_err(BurrowError::transaction)?;
        tracing::info!("Applied batch of {} statements", statements.len());
        Ok(())
    }

    fn provider(&self) -> &str {
        self.provider
    }
}

/// Drain one result set into the uniform tabular form. The header comes from
/// the server's column metadata, unmodified.
async fn collect_result<P>(result: QueryResult<'_, '_, P>) -> BurrowResult<TabularResult>
where
    P: Protocol,
{
    let header: Vec<String> = result
        .columns()
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .map(|column| column.name_str().into_owned())
        .collect();

    let rows: Vec<Row> = result.collect_and_drop().await?;
    let rows = rows
        .into_iter()
        .map(|row| row.unwrap().iter().map(render_cell).collect())
        .collect();

    Ok(TabularResult::new(header, rows))
}

/// Render one cell as a string; NULL becomes the empty string.
fn render_cell(value: &Value) -> String {
    match value {
        Value::NULL => String::new(),
        Value::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        Value::Int(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            if *hour == 0 && *minute == 0 && *second == 0 && *micros == 0 {
                format!("{:04}-{:02}-{:02}", year, month, day)
            } else if *micros == 0 {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                )
            } else {
                format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
                    year, month, day, hour, minute, second, micros
                )
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            if *micros == 0 {
                format!("{}{:02}:{:02}:{:02}", sign, total_hours, minutes, seconds)
            } else {
                format!(
                    "{}{:02}:{:02}:{:02}.{:06}",
                    sign, total_hours, minutes, seconds, micros
                )
            }
        }
    }
}

fn filter_system_schemas(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
        .collect()
}

/// Split a `db.table` reference, rejecting unqualified names.
fn split_qualified(table: &str) -> BurrowResult<(&str, &str)> {
    table.split_once('.').ok_or_else(|| {
        BurrowError::validation_with_hint(
            format!("Table reference {} is not qualified", table),
            "Use the form database.table",
        )
    })
}

fn build_records_query(
    table: &str,
    filter: Option<&str>,
    sort: Option<&str>,
    offset: i64,
    limit: i64,
) -> String {
    let mut query = format!("SELECT * FROM {}", table);

    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        query.push(' ');
        query.push_str(filter);
    }
    if let Some(sort) = sort.filter(|s| !s.is_empty()) {
        query.push_str(" ORDER BY ");
        query.push_str(sort);
    }

    // Negative bounds disable pagination entirely; interpolating them would
    // produce invalid SQL
    if offset >= 0 && limit >= 0 {
        let effective = if limit != 0 { limit } else { DEFAULT_RECORD_LIMIT };
        query.push_str(&format!(" LIMIT {},{}", offset, effective));
    }

    query
}

fn build_count_query(table: &str, filter: Option<&str>) -> String {
    match filter.filter(|f| !f.is_empty()) {
        Some(filter) => format!("SELECT COUNT(*) FROM {} {}", table, filter),
        None => format!("SELECT COUNT(*) FROM {}", table),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginated_query_carries_limit_and_offset() {
        let query = build_records_query("app.users", None, None, 100, 50);
        assert_eq!(query, "SELECT * FROM app.users LIMIT 100,50");
    }

    #[test]
    fn zero_limit_falls_back_to_the_default_page_size() {
        let query = build_records_query("users", None, None, 0, 0);
        assert_eq!(query, "SELECT * FROM users LIMIT 0,300");
    }

    #[test]
    fn negative_bounds_disable_pagination() {
        let query = build_records_query("users", None, None, -1, -1);
        assert_eq!(query, "SELECT * FROM users");
    }

    #[test]
    fn filter_and_sort_clauses_are_spliced_in_order() {
        let query = build_records_query(
            "users",
            Some("WHERE age > 21"),
            Some("name DESC"),
            0,
            10,
        );
        assert_eq!(
            query,
            "SELECT * FROM users WHERE age > 21 ORDER BY name DESC LIMIT 0,10"
        );
    }

    #[test]
    fn count_query_shares_the_filter_but_not_the_sort() {
        assert_eq!(
            build_count_query("users", Some("WHERE age > 21")),
            "SELECT COUNT(*) FROM users WHERE age > 21"
        );
        assert_eq!(build_count_query("users", None), "SELECT COUNT(*) FROM users");
    }

    #[test]
    fn system_schemas_are_always_filtered() {
        let names = vec![
            "app".to_string(),
            "information_schema".to_string(),
            "mysql".to_string(),
            "performance_schema".to_string(),
            "sys".to_string(),
            "analytics".to_string(),
        ];
        assert_eq!(
            filter_system_schemas(names),
            vec!["app".to_string(), "analytics".to_string()]
        );
    }

    #[test]
    fn unqualified_table_reference_is_rejected() {
        assert!(split_qualified("users").is_err());
        assert_eq!(split_qualified("app.users").unwrap(), ("app", "users"));
    }

    #[test]
    fn null_cells_render_as_empty_strings() {
        assert_eq!(render_cell(&Value::NULL), "");
        assert_eq!(render_cell(&Value::Bytes(b"abc".to_vec())), "abc");
        assert_eq!(render_cell(&Value::Int(-7)), "-7");
        assert_eq!(render_cell(&Value::Double(2.5)), "2.5");
    }

    #[test]
    fn dates_render_without_a_zero_time_component() {
        assert_eq!(render_cell(&Value::Date(2024, 3, 9, 0, 0, 0, 0)), "2024-03-09");
        assert_eq!(
            render_cell(&Value::Date(2024, 3, 9, 13, 5, 7, 0)),
            "2024-03-09 13:05:07"
        );
    }

    #[tokio::test]
    async fn queries_before_connect_fail_with_a_connection_error() {
        let mut driver = MysqlDriver::new();
        let err = driver.list_databases().await.unwrap_err();
        assert!(matches!(err, BurrowError::Connection { .. }));
    }

    #[tokio::test]
    async fn apply_on_an_empty_batch_is_a_no_op() {
        // No statements to run means no connection is required
        let mut driver = MysqlDriver::new();
        driver.apply_changes(&[]).await.unwrap();
    }
}
