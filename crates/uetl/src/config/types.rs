//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::Port;
use crate::source::{
    DEFAULT_FIREBIRD_CHARSET, DEFAULT_FIREBIRD_DRIVER, DEFAULT_MSSQL_DRIVER,
    DEFAULT_MSSQL_INSTANCE,
};
use crate::warehouse::{Dbms, SslMode, DEFAULT_ADMIN_DATABASE, DEFAULT_CONNECT_TIMEOUT_SECS};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Target data warehouse.
    pub warehouse: WarehouseConfig,

    /// Upstream sources, addressed by name.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Warehouse tables in creation order.
    #[serde(default)]
    pub tables: Vec<TableDefinition>,
}

impl Config {
    /// Look up a source by name.
    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// `(name, ddl)` pairs in declaration order.
    pub fn table_ddl(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tables.iter().map(|t| (t.name.as_str(), t.ddl.as_str()))
    }
}

/// Data warehouse (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Display name.
    #[serde(default = "default_warehouse_name")]
    pub name: String,

    /// Engine kind (default: postgres).
    #[serde(default)]
    pub dbms: Dbms,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: Port,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Connect timeout in seconds (default: 3).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// SSL mode (default: disable).
    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Database to connect to when creating the warehouse database.
    #[serde(default = "default_admin_database")]
    pub admin_database: String,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
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

/// An upstream source, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    Mssql(MssqlSourceConfig),
    Firebird(FirebirdSourceConfig),
}

impl SourceConfig {
    pub fn name(&self) -> &str {
        match self {
            SourceConfig::Mssql(c) => &c.name,
            SourceConfig::Firebird(c) => &c.name,
        }
    }

    pub fn host(&self) -> &str {
        match self {
            SourceConfig::Mssql(c) => &c.host,
            SourceConfig::Firebird(c) => &c.host,
        }
    }

    pub fn database(&self) -> &str {
        match self {
            SourceConfig::Mssql(c) => &c.database,
            SourceConfig::Firebird(c) => &c.database,
        }
    }

    pub fn user(&self) -> &str {
        match self {
            SourceConfig::Mssql(c) => &c.user,
            SourceConfig::Firebird(c) => &c.user,
        }
    }
}

/// SQL Server source configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct MssqlSourceConfig {
    /// Unique source name.
    pub name: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 1433). Leave empty to address a named
    /// instance instead.
    #[serde(default = "default_mssql_port")]
    pub port: Port,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Named instance (default: SQLEXPRESS).
    #[serde(default = "default_mssql_instance")]
    pub instance: String,

    /// ODBC driver name.
    #[serde(default = "default_mssql_driver")]
    pub driver: String,
}

impl fmt::Debug for MssqlSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlSourceConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("instance", &self.instance)
            .field("driver", &self.driver)
            .finish()
    }
}

/// Firebird source configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct FirebirdSourceConfig {
    /// Unique source name.
    pub name: String,

    /// Server host.
    pub host: String,

    /// Server port (default: 3050).
    #[serde(default = "default_firebird_port")]
    pub port: Port,

    /// Path of the database file on the server.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Connection character set (default: latin1).
    #[serde(default = "default_firebird_charset")]
    pub charset: String,

    /// ODBC driver name.
    #[serde(default = "default_firebird_driver")]
    pub driver: String,
}

impl fmt::Debug for FirebirdSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebirdSourceConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .field("driver", &self.driver)
            .finish()
    }
}

/// A warehouse table and the DDL that creates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub ddl: String,
}

fn default_warehouse_name() -> String {
    "Data Warehouse".to_string()
}

fn default_pg_port() -> Port {
    Port::from(5432u16)
}

fn default_mssql_port() -> Port {
    Port::from(1433u16)
}

fn default_firebird_port() -> Port {
    Port::from(3050u16)
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_admin_database() -> String {
    DEFAULT_ADMIN_DATABASE.to_string()
}

fn default_mssql_instance() -> String {
    DEFAULT_MSSQL_INSTANCE.to_string()
}

fn default_mssql_driver() -> String {
    DEFAULT_MSSQL_DRIVER.to_string()
}

fn default_firebird_charset() -> String {
    DEFAULT_FIREBIRD_CHARSET.to_string()
}

fn default_firebird_driver() -> String {
    DEFAULT_FIREBIRD_DRIVER.to_string()
}
