//! Single-connection provider for the warehouse engine.
//!
//! [`connect`] never returns an error: a failed attempt is reported as
//! [`ConnectOutcome::Failed`] carrying the classified cause, so callers can
//! branch on the outcome without unwinding.

use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, SimpleQueryMessage, Statement};
use tracing::{debug, warn};

use crate::core::Port;
use crate::error::{ConnectErrorKind, EtlError, Result};

use super::tls::{SslMode, TlsBuilder};

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 3;

/// Everything needed to open one session.
#[derive(Clone)]
pub struct ConnectParams {
    pub host: String,
    pub port: Port,
    pub database: String,
    pub user: String,
    pub password: String,
    pub timeout_secs: u64,
    pub ssl_mode: SslMode,
}

impl fmt::Debug for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

impl ConnectParams {
    pub fn new(
        host: impl Into<String>,
        port: impl Into<Port>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: port.into(),
            database: database.into(),
            user: user.into(),
            password: password.into(),
            timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            ssl_mode: SslMode::default(),
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    /// Check the parameter constraints and return the parsed port.
    pub fn validate(&self) -> std::result::Result<u16, ConnectFailure> {
        let invalid = |message: String| ConnectFailure {
            kind: ConnectErrorKind::InvalidParameters,
            message,
        };

        if self.timeout_secs == 0 {
            return Err(invalid("connect timeout must be a positive number of seconds".into()));
        }
        for (field, value) in [
            ("host", &self.host),
            ("database", &self.database),
            ("user", &self.user),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(format!("{} must not be empty", field)));
            }
        }

        self.port
            .to_u16()
            .map_err(|_| invalid(format!("invalid port '{}'", self.port)))
    }

    fn pg_config(&self, port: u16) -> PgConfig {
        let mut pg_config = PgConfig::new();
        pg_config.host(&self.host);
        pg_config.port(port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config.connect_timeout(Duration::from_secs(self.timeout_secs));
        pg_config
    }
}

/// A failed connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectFailure {
    pub kind: ConnectErrorKind,
    pub message: String,
}

impl fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<ConnectFailure> for EtlError {
    fn from(failure: ConnectFailure) -> Self {
        EtlError::Connect {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

/// Result of [`connect`].
#[derive(Debug)]
pub enum ConnectOutcome {
    Connected(PgConnection),
    Failed(ConnectFailure),
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }

    /// Convert to a `Result`, turning a failure into [`EtlError::Connect`].
    pub fn into_result(self) -> Result<PgConnection> {
        match self {
            ConnectOutcome::Connected(conn) => Ok(conn),
            ConnectOutcome::Failed(failure) => Err(failure.into()),
        }
    }
}

/// Open one session to the engine described by `params`.
///
/// The returned connection is owned by the caller and should be
/// [closed](PgConnection::close) when done.
pub async fn connect(params: &ConnectParams) -> ConnectOutcome {
    let port = match params.validate() {
        Ok(port) => port,
        Err(failure) => return ConnectOutcome::Failed(failure),
    };

    let tls = match TlsBuilder::new(params.ssl_mode).build() {
        Ok(tls) => tls,
        Err(e) => {
            return ConnectOutcome::Failed(ConnectFailure {
                kind: ConnectErrorKind::Tls,
                message: e.to_string(),
            })
        }
    };

    let config = params.pg_config(port);
    let limit = Duration::from_secs(params.timeout_secs);

    let attempt = match tls {
        None => match tokio::time::timeout(limit, config.connect(NoTls)).await {
            Ok(Ok((client, connection))) => Ok(Ok((client, spawn_connection(connection)))),
            Ok(Err(e)) => Ok(Err(e)),
            Err(elapsed) => Err(elapsed),
        },
        Some(tls) => match tokio::time::timeout(limit, config.connect(tls)).await {
            Ok(Ok((client, connection))) => Ok(Ok((client, spawn_connection(connection)))),
            Ok(Err(e)) => Ok(Err(e)),
            Err(elapsed) => Err(elapsed),
        },
    };

    match attempt {
        Ok(Ok((client, driver))) => {
            debug!(
                "Connected to PostgreSQL: {}:{}/{}",
                params.host, port, params.database
            );
            ConnectOutcome::Connected(PgConnection::new(client, driver))
        }
        Ok(Err(e)) => ConnectOutcome::Failed(ConnectFailure {
            kind: ConnectErrorKind::classify_pg(&e),
            message: e.to_string(),
        }),
        Err(_) => ConnectOutcome::Failed(ConnectFailure {
            kind: ConnectErrorKind::Timeout,
            message: format!(
                "no answer from {}:{} within {}s",
                params.host, port, params.timeout_secs
            ),
        }),
    }
}

/// Drive the protocol half of a tokio-postgres connection.
fn spawn_connection<S, T>(connection: tokio_postgres::Connection<S, T>) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection error: {}", e);
        }
    })
}

/// A live warehouse session.
///
/// Sessions start in transactional mode: the first statement opens a
/// transaction that stays open until [`commit`](Self::commit). After
/// [`set_autocommit(true)`](Self::set_autocommit) each statement commits on
/// its own, which statements such as `CREATE DATABASE` require.
pub struct PgConnection {
    client: Client,
    driver: JoinHandle<()>,
    autocommit: bool,
    in_transaction: bool,
}

impl fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnection")
            .field("autocommit", &self.autocommit)
            .field("in_transaction", &self.in_transaction)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

impl PgConnection {
    fn new(client: Client, driver: JoinHandle<()>) -> Self {
        Self {
            client,
            driver,
            autocommit: false,
            in_transaction: false,
        }
    }

    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    /// Switch between autocommit and transactional mode.
    ///
    /// Turning autocommit on while a transaction is open commits it first.
    pub async fn set_autocommit(&mut self, on: bool) -> Result<()> {
        if on && self.in_transaction {
            self.commit().await?;
        }
        self.autocommit = on;
        Ok(())
    }

    async fn begin_if_needed(&mut self) -> Result<()> {
        if !self.autocommit && !self.in_transaction {
            self.client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
        }
        Ok(())
    }

    /// Run one or more statements through the simple query protocol.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        self.begin_if_needed().await?;
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// Run a single statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        self.begin_if_needed().await?;
        Ok(self.client.execute(sql, params).await?)
    }

    pub async fn prepare(&mut self, sql: &str) -> Result<Statement> {
        Ok(self.client.prepare(sql).await?)
    }

    pub async fn query(
        &mut self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>> {
        self.begin_if_needed().await?;
        Ok(self.client.query(statement, params).await?)
    }

    /// Run `sql` through the simple query protocol; every value arrives in
    /// its text form.
    pub async fn simple_query(&mut self, sql: &str) -> Result<Vec<SimpleQueryMessage>> {
        self.begin_if_needed().await?;
        Ok(self.client.simple_query(sql).await?)
    }

    pub async fn query_one(&mut self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        self.begin_if_needed().await?;
        Ok(self.client.query_one(sql, params).await?)
    }

    /// Commit the open transaction, if any.
    pub async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Roll back the open transaction, if any.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client.batch_execute("ROLLBACK").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Close the session. Uncommitted work is discarded by the server.
    pub async fn close(self) {
        let PgConnection { client, driver, .. } = self;
        drop(client);
        if let Err(e) = driver.await {
            warn!("PostgreSQL connection task ended abnormally: {}", e);
        }
    }
}
