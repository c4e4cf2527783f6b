//! Firebird source over ODBC.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::config::FirebirdSourceConfig;
use crate::core::{Port, Table};
use crate::error::Result;

use super::odbc::{driver_attribute, quote_value, OdbcHandle};
use super::DataSource;

pub const DEFAULT_FIREBIRD_CHARSET: &str = "latin1";
pub const DEFAULT_FIREBIRD_DRIVER: &str = "Firebird/InterBase(r) driver";

/// A Firebird database file served by a Firebird server.
pub struct FirebirdSource {
    name: String,
    host: String,
    port: Port,
    database_path: String,
    user: String,
    password: String,
    charset: String,
    driver: String,
    handle: OdbcHandle,
}

impl fmt::Debug for FirebirdSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FirebirdSource")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("charset", &self.charset)
            .field("driver", &self.driver)
            .field("connected", &self.handle.is_open())
            .finish()
    }
}

impl FirebirdSource {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<Port>,
        database_path: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: port.into(),
            database_path: database_path.into(),
            user: user.into(),
            password: password.into(),
            charset: DEFAULT_FIREBIRD_CHARSET.to_string(),
            driver: DEFAULT_FIREBIRD_DRIVER.to_string(),
            handle: OdbcHandle::default(),
        }
    }

    pub fn from_config(config: &FirebirdSourceConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.host.clone(),
            config.port.clone(),
            config.database.clone(),
            config.user.clone(),
            config.password.clone(),
        )
        .with_charset(config.charset.clone())
        .with_driver(config.driver.clone())
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> &Port {
        &self.port
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Server-qualified database: `host/port:path`.
    pub fn dsn(&self) -> String {
        format!("{}/{}:{}", self.host, self.port, self.database_path)
    }

    fn build_connection_string(&self, password: &str) -> String {
        format!(
            "{}Dbname={};UID={};PWD={};Charset={};",
            driver_attribute(&self.driver),
            quote_value(&self.dsn()),
            quote_value(&self.user),
            quote_value(password),
            quote_value(&self.charset),
        )
    }

    /// ODBC connection string for this source.
    pub fn connection_string(&self) -> String {
        self.build_connection_string(&self.password)
    }
}

#[async_trait]
impl DataSource for FirebirdSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_connected(&self) -> bool {
        self.handle.is_open()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.handle.is_open() {
            return Ok(());
        }
        let redacted = self.build_connection_string("***");
        self.handle.open(&self.connection_string(), &redacted)?;
        info!("Connected to Firebird source '{}': {}", self.name, self.dsn());
        Ok(())
    }

    fn dispose(&mut self) {
        if self.handle.close() {
            info!("Disposed Firebird source '{}'", self.name);
        }
    }

    async fn query(&mut self, sql: &str) -> Result<Table> {
        self.connect().await?;
        self.handle.fetch_table(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> FirebirdSource {
        FirebirdSource::new(
            "legacy",
            "fbhost",
            3050,
            "/data/erp.fdb",
            "SYSDBA",
            "masterkey",
        )
    }

    #[test]
    fn test_defaults() {
        let s = source();
        assert_eq!(s.charset(), DEFAULT_FIREBIRD_CHARSET);
        assert_eq!(s.driver(), DEFAULT_FIREBIRD_DRIVER);
        assert_eq!(s.dsn(), "fbhost/3050:/data/erp.fdb");
    }

    #[test]
    fn test_connection_string() {
        assert_eq!(
            source().with_charset("UTF8").connection_string(),
            "Driver={Firebird/InterBase(r) driver};Dbname=fbhost/3050:/data/erp.fdb;\
             UID=SYSDBA;PWD=masterkey;Charset=UTF8;"
        );
    }

    #[test]
    fn test_windows_path_is_kept() {
        let s = FirebirdSource::new("l", "h", "3050", "C:\\db\\ERP.FDB", "u", "p");
        assert!(s.connection_string().contains("Dbname=h/3050:C:\\db\\ERP.FDB;"));
    }

    #[test]
    fn test_debug_hides_password() {
        let out = format!("{:?}", source());
        assert!(out.contains("[REDACTED]"));
        assert!(!out.contains("masterkey"));
    }
}
