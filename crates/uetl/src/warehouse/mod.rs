//! Data warehouse manager.
//!
//! Every operation opens its own short-lived connection and closes it before
//! returning. A connection failure is reported through the return value
//! (`Ok(false)` or an empty table) and an `error!` event; a failing
//! statement is returned as `Err(EtlError::Warehouse)`.

pub mod connection;
mod reader;
pub mod tls;
mod writer;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;
use tracing::{debug, error, info, warn};

use crate::config::WarehouseConfig;
use crate::core::identifier::{quote_pg, surrogate_key_column};
use crate::core::{Port, Table};
use crate::error::{ConnectErrorKind, EtlError, Result};

pub use connection::{
    connect, ConnectFailure, ConnectOutcome, ConnectParams, PgConnection,
    DEFAULT_CONNECT_TIMEOUT_SECS,
};
pub use tls::SslMode;

use writer::{key_column, LoadLayout};

/// Administrative database used to issue `CREATE DATABASE`.
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";

const TABLE_EXISTS_SQL: &str =
    "SELECT exists(SELECT * FROM information_schema.tables WHERE table_name = $1)";

/// Warehouse engine kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dbms {
    #[default]
    Postgres,
}

impl fmt::Display for Dbms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dbms::Postgres => f.write_str("postgres"),
        }
    }
}

impl FromStr for Dbms {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dbms::Postgres),
            other => Err(EtlError::Config(format!(
                "Unsupported dbms '{}'. Supported: postgres",
                other
            ))),
        }
    }
}

/// Outcome of a table existence check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TablePresence {
    Present,
    Absent,
    /// The warehouse could not be reached, so presence is unknown.
    Unreachable,
}

/// The target warehouse and the operations used to load it.
#[derive(Clone)]
pub struct DataWarehouse {
    name: String,
    dbms: Dbms,
    host: String,
    port: Port,
    database: String,
    user: String,
    password: String,
    connect_timeout: u64,
    ssl_mode: SslMode,
    admin_database: String,
}

impl fmt::Debug for DataWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataWarehouse")
            .field("name", &self.name)
            .field("dbms", &self.dbms)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("connect_timeout", &self.connect_timeout)
            .field("ssl_mode", &self.ssl_mode)
            .field("admin_database", &self.admin_database)
            .finish()
    }
}

impl DataWarehouse {
    /// Store the warehouse identity. Nothing is validated or contacted here.
    pub fn new(
        name: impl Into<String>,
        dbms: Dbms,
        host: impl Into<String>,
        port: impl Into<Port>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            dbms,
            host: host.into(),
            port: port.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            ssl_mode: SslMode::default(),
            admin_database: DEFAULT_ADMIN_DATABASE.to_string(),
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.dbms,
            config.host.clone(),
            config.port.clone(),
            config.database.clone(),
            config.user.clone(),
            config.password.clone(),
        )
        .with_connect_timeout(config.connect_timeout)
        .with_ssl_mode(config.ssl_mode)
        .with_admin_database(config.admin_database.clone())
    }

    pub fn with_connect_timeout(mut self, secs: u64) -> Self {
        self.connect_timeout = secs;
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_admin_database(mut self, database: impl Into<String>) -> Self {
        self.admin_database = database.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dbms(&self) -> Dbms {
        self.dbms
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn connect_timeout(&self) -> u64 {
        self.connect_timeout
    }

    pub fn ssl_mode(&self) -> SslMode {
        self.ssl_mode
    }

    pub fn admin_database(&self) -> &str {
        &self.admin_database
    }

    fn params_for(&self, database: &str) -> ConnectParams {
        ConnectParams::new(
            self.host.clone(),
            self.port.clone(),
            database,
            self.user.clone(),
            self.password.clone(),
        )
        .with_timeout(self.connect_timeout)
        .with_ssl_mode(self.ssl_mode)
    }

    /// Open a connection to the warehouse database.
    pub async fn get_conn(&self) -> ConnectOutcome {
        connect(&self.params_for(&self.database)).await
    }

    async fn connect_or_report(&self, operation: &str) -> Option<PgConnection> {
        match self.get_conn().await {
            ConnectOutcome::Connected(conn) => Some(conn),
            ConnectOutcome::Failed(failure) => {
                error!(
                    "{}(): unable to connect to warehouse '{}' ({}:{}/{}): {}",
                    operation, self.name, self.host, self.port, self.database, failure
                );
                None
            }
        }
    }

    /// Check the warehouse database is reachable, creating it if needed.
    ///
    /// Returns `true` only once a connection to the database itself
    /// succeeds, so a database that exists but refuses connections is
    /// reported as unreachable.
    pub async fn test_connection(&self) -> Result<bool> {
        let failure = match self.get_conn().await {
            ConnectOutcome::Connected(conn) => {
                conn.close().await;
                info!("Data warehouse '{}' is reachable", self.name);
                return Ok(true);
            }
            ConnectOutcome::Failed(failure) => failure,
        };

        if failure.kind == ConnectErrorKind::DatabaseMissing {
            warn!(
                "Warehouse database '{}' does not exist, trying to create it",
                self.database
            );
        } else {
            warn!(
                "Cannot open warehouse database '{}' ({}), trying to create it",
                self.database, failure
            );
        }
        if !self.create_database().await? {
            return Ok(false);
        }

        match self.get_conn().await {
            ConnectOutcome::Connected(conn) => {
                conn.close().await;
                info!("Data warehouse database '{}' is ready", self.database);
                Ok(true)
            }
            ConnectOutcome::Failed(failure) => {
                error!(
                    "test_connection(): warehouse '{}' ({}:{}/{}) still unreachable: {}",
                    self.name, self.host, self.port, self.database, failure
                );
                Ok(false)
            }
        }
    }

    /// Create the warehouse database through the administrative database.
    ///
    /// Returns `false` if the administrative connection fails. A database
    /// that already exists counts as success.
    pub async fn create_database(&self) -> Result<bool> {
        let sql = format!("CREATE DATABASE {}", quote_pg(&self.database)?);
        let params = self.params_for(&self.admin_database);
        let mut conn = match connect(&params).await {
            ConnectOutcome::Connected(conn) => conn,
            ConnectOutcome::Failed(failure) => {
                error!(
                    "create_database(): unable to connect to '{}' on {}:{}: {}",
                    self.admin_database, self.host, self.port, failure
                );
                return Ok(false);
            }
        };

        let result = async {
            conn.set_autocommit(true).await?;
            conn.batch_execute(&sql).await
        }
        .await;
        conn.close().await;

        match result {
            Ok(()) => {
                debug!("Created database '{}'", self.database);
                Ok(true)
            }
            Err(EtlError::Warehouse(e)) if e.code() == Some(&SqlState::DUPLICATE_DATABASE) => {
                warn!("Database '{}' already exists", self.database);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Whether `table_name` exists, telling absence apart from an
    /// unreachable warehouse. The match is case-sensitive.
    pub async fn table_presence(&self, table_name: &str) -> Result<TablePresence> {
        let Some(mut conn) = self.connect_or_report("table_exists").await else {
            return Ok(TablePresence::Unreachable);
        };

        let result = conn.query_one(TABLE_EXISTS_SQL, &[&table_name]).await;
        conn.close().await;

        let exists: bool = result?.try_get(0)?;
        Ok(if exists {
            TablePresence::Present
        } else {
            TablePresence::Absent
        })
    }

    /// `true` only if the table exists; an unreachable warehouse yields `false`.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        Ok(self.table_presence(table_name).await? == TablePresence::Present)
    }

    /// Create each missing table by running its DDL, in the given order.
    ///
    /// Stops at the first table that cannot be created. Tables created
    /// before that point are kept, so calling again resumes the work.
    pub async fn ensure_tables<I, K, V>(&self, tables: I, verbose: bool) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, ddl) in tables {
            let name = name.as_ref();
            match self.table_presence(name).await? {
                TablePresence::Present => {
                    debug!("Table {} already exists", name);
                    continue;
                }
                TablePresence::Unreachable => {
                    error!("Failed creating tables: warehouse unreachable");
                    return Ok(false);
                }
                TablePresence::Absent => {}
            }

            if verbose {
                info!("Table {} does not exist, creating", name);
            }

            let Some(mut conn) = self.connect_or_report("ensure_tables").await else {
                error!("Failed creating tables at {}", name);
                return Ok(false);
            };
            let result = async {
                conn.batch_execute(ddl.as_ref()).await?;
                conn.commit().await
            }
            .await;
            conn.close().await;
            result?;

            if !self.table_exists(name).await? {
                error!("Failed creating tables: {} missing after its DDL ran", name);
                return Ok(false);
            }
            if verbose {
                info!("Table {} created", name);
            }
        }

        Ok(true)
    }

    /// Remove every row of `table_name`. With `cascade`, tables referencing
    /// it through foreign keys are truncated too.
    pub async fn truncate(&self, table_name: &str, cascade: bool, verbose: bool) -> Result<bool> {
        let Some(mut conn) = self.connect_or_report("truncate").await else {
            return Ok(false);
        };

        let sql = if cascade {
            format!("TRUNCATE {} CASCADE", table_name)
        } else {
            format!("TRUNCATE {}", table_name)
        };

        let result = async {
            conn.batch_execute(&sql).await?;
            conn.commit().await
        }
        .await;
        conn.close().await;
        result?;

        if verbose {
            info!("{}: table truncated", table_name);
        }
        Ok(true)
    }

    /// Append `table` to `table_name`, writing its index as the first column.
    ///
    /// The index column is named after the table: `dim_date` gets `date_sk`.
    pub async fn write_indexed(
        &self,
        table_name: &str,
        table: &Table,
        chunk_size: Option<usize>,
        verbose: bool,
    ) -> Result<bool> {
        let key = key_column(surrogate_key_column(table_name)?, table);
        let layout = LoadLayout::new(table, Some(&key));
        let written = self.write(table_name, layout, chunk_size, verbose).await?;
        Ok(written)
    }

    /// Append `table` to `table_name` without an index column.
    pub async fn write_unindexed(
        &self,
        table_name: &str,
        table: &Table,
        chunk_size: Option<usize>,
        verbose: bool,
    ) -> Result<bool> {
        self.write(table_name, LoadLayout::new(table, None), chunk_size, verbose)
            .await
    }

    async fn write(
        &self,
        table_name: &str,
        layout: LoadLayout<'_>,
        chunk_size: Option<usize>,
        verbose: bool,
    ) -> Result<bool> {
        let create_sql = layout.create_table_sql(table_name)?;
        let inserts = layout.insert_statements(table_name, chunk_size)?;

        let Some(mut conn) = self.connect_or_report("write").await else {
            return Ok(false);
        };

        let result = async {
            conn.batch_execute(&create_sql).await?;
            for sql in &inserts {
                conn.batch_execute(sql).await?;
            }
            conn.commit().await
        }
        .await;
        conn.close().await;
        result?;

        if verbose {
            info!(
                "{}: {} rows loaded into ({}) in {} batch(es)",
                table_name,
                layout.num_rows(),
                layout.column_names().join(", "),
                inserts.len()
            );
        } else {
            debug!("{}: {} rows loaded", table_name, layout.num_rows());
        }
        Ok(true)
    }

    /// Run a query and return the whole result.
    ///
    /// Meant for read statements: a result the binary protocol cannot
    /// decode is fetched a second time as text.
    ///
    /// An unreachable warehouse yields an empty table.
    pub async fn query(&self, sql: &str) -> Result<Table> {
        match self.try_query(sql).await {
            Err(EtlError::Connect { kind, message }) => {
                error!(
                    "query(): unable to connect to warehouse '{}': {}: {}",
                    self.name, kind, message
                );
                Ok(Table::empty())
            }
            other => other,
        }
    }

    /// Run a query, returning `Err(EtlError::Connect)` if the warehouse
    /// cannot be reached.
    pub async fn try_query(&self, sql: &str) -> Result<Table> {
        let mut conn = self.get_conn().await.into_result()?;

        let result = async {
            let statement = conn.prepare(sql).await?;
            let columns = statement.columns();
            if columns.iter().all(|c| reader::decodes_binary(c.type_())) {
                let rows = conn.query(&statement, &[]).await?;
                match reader::rows_to_table(columns, &rows) {
                    Err(EtlError::Conversion(reason)) => {
                        debug!("query(): {}, reading the result as text", reason);
                    }
                    other => return other,
                }
            }
            let messages = conn.simple_query(sql).await?;
            reader::text_rows_to_table(columns, &messages)
        }
        .await;
        conn.close().await;

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;

    fn unreachable_warehouse() -> DataWarehouse {
        // Nothing listens on port 1 of the loopback interface.
        DataWarehouse::new("dw", Dbms::Postgres, "127.0.0.1", 1u16, "dw", "etl", "secret")
            .with_connect_timeout(1)
    }

    #[test]
    fn test_new_stores_parameters_verbatim() {
        let dw = DataWarehouse::new(
            "My DataWarehouse",
            Dbms::Postgres,
            "192.168.2.160",
            "5432",
            "dwbra",
            "dwbra-user",
            "pw",
        );
        assert_eq!(dw.name(), "My DataWarehouse");
        assert_eq!(dw.dbms(), Dbms::Postgres);
        assert_eq!(dw.host(), "192.168.2.160");
        assert_eq!(dw.port().as_str(), "5432");
        assert_eq!(dw.database(), "dwbra");
        assert_eq!(dw.user(), "dwbra-user");
        assert_eq!(dw.password(), "pw");
        assert_eq!(dw.connect_timeout(), DEFAULT_CONNECT_TIMEOUT_SECS);
        assert_eq!(dw.admin_database(), DEFAULT_ADMIN_DATABASE);
    }

    #[test]
    fn test_numeric_port_is_kept() {
        let dw = DataWarehouse::new("dw", Dbms::Postgres, "h", 5433, "d", "u", "p");
        assert_eq!(dw.port().as_str(), "5433");
    }

    #[test]
    fn test_debug_redacts_password() {
        let dw = DataWarehouse::new("dw", Dbms::Postgres, "h", 5432, "d", "u", "hunter2");
        let out = format!("{:?}", dw);
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn test_dbms_parsing() {
        assert_eq!("postgres".parse::<Dbms>().unwrap(), Dbms::Postgres);
        assert_eq!("PostgreSQL".parse::<Dbms>().unwrap(), Dbms::Postgres);
        assert!("oracle".parse::<Dbms>().is_err());
        assert_eq!(Dbms::Postgres.to_string(), "postgres");
    }

    #[tokio::test]
    async fn test_unreachable_warehouse_reports_failure_values() {
        let dw = unreachable_warehouse();

        assert!(!dw.test_connection().await.unwrap());
        assert!(!dw.create_database().await.unwrap());
        assert!(!dw.table_exists("dim_date").await.unwrap());
        assert_eq!(
            dw.table_presence("dim_date").await.unwrap(),
            TablePresence::Unreachable
        );
        assert!(!dw.truncate("dim_date", true, false).await.unwrap());
        assert!(!dw
            .ensure_tables([("dim_date", "CREATE TABLE dim_date (x int)")], true)
            .await
            .unwrap());

        let t = dw.query("SELECT 1").await.unwrap();
        assert_eq!(t.num_rows(), 0);
        assert_eq!(t.num_columns(), 0);
    }

    #[tokio::test]
    async fn test_try_query_surfaces_connect_error() {
        let err = unreachable_warehouse().try_query("SELECT 1").await.unwrap_err();
        assert!(matches!(
            err.connect_kind(),
            Some(ConnectErrorKind::Unreachable) | Some(ConnectErrorKind::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_write_checks_arguments_before_connecting() {
        let dw = unreachable_warehouse();
        let t = Table::from_columns(vec![Column::from_values("x", [1i32, 2])]).unwrap();

        let err = dw.write_indexed("customers", &t, None, false).await.unwrap_err();
        assert!(matches!(err, EtlError::InvalidTableName(_)));

        let err = dw.write_unindexed("t_x", &t, Some(0), false).await.unwrap_err();
        assert!(matches!(err, EtlError::Config(_)));

        assert!(!dw.write_indexed("dim_x", &t, Some(1), false).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_parameters_never_touch_the_network() {
        let dw = DataWarehouse::new("dw", Dbms::Postgres, "", 5432, "dw", "u", "p");
        let err = dw.try_query("SELECT 1").await.unwrap_err();
        assert_eq!(err.connect_kind(), Some(ConnectErrorKind::InvalidParameters));
    }
}
