//! SQL Server source over ODBC.

use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::config::MssqlSourceConfig;
use crate::core::{Port, Table};
use crate::error::Result;

use super::odbc::{driver_attribute, quote_value, OdbcHandle};
use super::DataSource;

pub const DEFAULT_MSSQL_INSTANCE: &str = "SQLEXPRESS";
pub const DEFAULT_MSSQL_DRIVER: &str = "ODBC Driver 18 for SQL Server";

/// A SQL Server database read through the Microsoft ODBC driver.
pub struct MssqlSource {
    name: String,
    host: String,
    port: Port,
    database: String,
    user: String,
    password: String,
    instance: String,
    driver: String,
    handle: OdbcHandle,
}

impl fmt::Debug for MssqlSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlSource")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("instance", &self.instance)
            .field("driver", &self.driver)
            .field("connected", &self.handle.is_open())
            .finish()
    }
}

impl MssqlSource {
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        port: impl Into<Port>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: port.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            instance: DEFAULT_MSSQL_INSTANCE.to_string(),
            driver: DEFAULT_MSSQL_DRIVER.to_string(),
            handle: OdbcHandle::default(),
        }
    }

    pub fn from_config(config: &MssqlSourceConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.host.clone(),
            config.port.clone(),
            config.database.clone(),
            config.user.clone(),
            config.password.clone(),
        )
        .with_instance(config.instance.clone())
        .with_driver(config.driver.clone())
    }

    /// Named instance, used when no port is given.
    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
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

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// `host,port`, or `host\instance` when the port is empty.
    fn server(&self) -> String {
        if self.port.is_empty() {
            format!("{}\\{}", self.host, self.instance)
        } else {
            format!("{},{}", self.host, self.port)
        }
    }

    fn build_connection_string(&self, password: &str) -> String {
        format!(
            "{}Server={};Database={};UID={};PWD={};TrustServerCertificate=yes;",
            driver_attribute(&self.driver),
            quote_value(&self.server()),
            quote_value(&self.database),
            quote_value(&self.user),
            quote_value(password),
        )
    }

    /// ODBC connection string for this source.
    pub fn connection_string(&self) -> String {
        self.build_connection_string(&self.password)
    }
}

#[async_trait]
impl DataSource for MssqlSource {
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
        info!(
            "Connected to SQL Server source '{}': {}/{}",
            self.name,
            self.server(),
            self.database
        );
        Ok(())
    }

    fn dispose(&mut self) {
        if self.handle.close() {
            info!("Disposed SQL Server source '{}'", self.name);
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

    fn source() -> MssqlSource {
        MssqlSource::new("erp", "10.0.0.5", 1433, "sales", "reader", "s3cret")
    }

    #[test]
    fn test_defaults() {
        let s = source();
        assert_eq!(s.instance(), DEFAULT_MSSQL_INSTANCE);
        assert_eq!(s.driver(), DEFAULT_MSSQL_DRIVER);
        assert_eq!(s.name(), "erp");
        assert!(!s.is_connected());
    }

    #[test]
    fn test_connection_string_with_port() {
        assert_eq!(
            source().connection_string(),
            "Driver={ODBC Driver 18 for SQL Server};Server=10.0.0.5,1433;Database=sales;\
             UID=reader;PWD=s3cret;TrustServerCertificate=yes;"
        );
    }

    #[test]
    fn test_connection_string_uses_instance_without_port() {
        let s = MssqlSource::new("erp", "srv", "", "sales", "reader", "pw")
            .with_instance("PROD")
            .with_driver("ODBC Driver 17 for SQL Server");
        let cs = s.connection_string();
        assert!(cs.starts_with("Driver={ODBC Driver 17 for SQL Server};"));
        assert!(cs.contains("Server=srv\\PROD;"));
    }

    #[test]
    fn test_password_with_semicolon_is_braced() {
        let s = MssqlSource::new("erp", "srv", 1433, "sales", "reader", "a;b");
        assert!(s.connection_string().contains("PWD={a;b};"));
    }

    #[test]
    fn test_debug_and_display_string_hide_password() {
        let s = source();
        assert!(!format!("{:?}", s).contains("s3cret"));
        assert!(s.build_connection_string("***").contains("PWD=***;"));
    }

    #[test]
    fn test_dispose_without_connection_is_noop() {
        let mut s = source();
        s.dispose();
        assert!(!s.is_connected());
    }
}
