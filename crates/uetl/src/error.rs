//! Error types for the ETL library.

use std::fmt;

use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Why a connection could not be established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// Empty host/database/user, unparsable port or a zero timeout.
    InvalidParameters,
    /// Host could not be reached (DNS, refused, reset).
    Unreachable,
    /// The connect timeout elapsed.
    Timeout,
    /// Credentials were rejected by the engine.
    AuthRejected,
    /// The engine is up but the requested database does not exist.
    DatabaseMissing,
    /// TLS setup or handshake failed.
    Tls,
    /// Anything the classifier does not recognize.
    Other,
}

impl fmt::Display for ConnectErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectErrorKind::InvalidParameters => "invalid connection parameters",
            ConnectErrorKind::Unreachable => "engine unreachable",
            ConnectErrorKind::Timeout => "connect timeout exceeded",
            ConnectErrorKind::AuthRejected => "authentication rejected",
            ConnectErrorKind::DatabaseMissing => "database does not exist",
            ConnectErrorKind::Tls => "TLS failure",
            ConnectErrorKind::Other => "connection failure",
        };
        f.write_str(s)
    }
}

impl ConnectErrorKind {
    /// Classify a PostgreSQL connection error.
    pub fn classify_pg(err: &tokio_postgres::Error) -> Self {
        if let Some(db) = err.as_db_error() {
            let code = db.code();
            if code == &SqlState::INVALID_CATALOG_NAME {
                return ConnectErrorKind::DatabaseMissing;
            }
            if code == &SqlState::INVALID_PASSWORD
                || code == &SqlState::INVALID_AUTHORIZATION_SPECIFICATION
            {
                return ConnectErrorKind::AuthRejected;
            }
            return ConnectErrorKind::Other;
        }

        let mut source = std::error::Error::source(err);
        while let Some(e) = source {
            if let Some(io) = e.downcast_ref::<std::io::Error>() {
                return Self::classify_io(io.kind());
            }
            if e.downcast_ref::<rustls::Error>().is_some() {
                return ConnectErrorKind::Tls;
            }
            source = e.source();
        }

        ConnectErrorKind::Other
    }

    /// Classify an I/O error kind raised while connecting.
    pub fn classify_io(kind: std::io::ErrorKind) -> Self {
        match kind {
            std::io::ErrorKind::TimedOut => ConnectErrorKind::Timeout,
            _ => ConnectErrorKind::Unreachable,
        }
    }
}

/// Main error type for ETL operations.
#[derive(Error, Debug)]
pub enum EtlError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection could not be established
    #[error("Connection failed ({kind}): {message}")]
    Connect {
        kind: ConnectErrorKind,
        message: String,
    },

    /// Warehouse statement failed
    #[error("Data warehouse error: {0}")]
    Warehouse(#[from] tokio_postgres::Error),

    /// Source database connection or statement failed
    #[error("Source database error: {0}")]
    Source(#[from] odbc_api::Error),

    /// Table name does not follow the `<prefix>_<suffix>` convention
    #[error("Cannot derive surrogate key column from table name '{0}': expected '<prefix>_<suffix>'")]
    InvalidTableName(String),

    /// Result value could not be represented
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl EtlError {
    /// Create a Connect error.
    pub fn connect(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        EtlError::Connect {
            kind,
            message: message.into(),
        }
    }

    /// Connection failure kind, if this is a connection error.
    pub fn connect_kind(&self) -> Option<ConnectErrorKind> {
        match self {
            EtlError::Connect { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config(_) | EtlError::Yaml(_) | EtlError::InvalidTableName(_) => 2,
            EtlError::Connect { .. } => 3,
            EtlError::Warehouse(_) | EtlError::Source(_) | EtlError::Conversion(_) => 4,
            EtlError::Io(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for ETL operations.
pub type Result<T> = std::result::Result<T, EtlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_io_timeout() {
        assert_eq!(
            ConnectErrorKind::classify_io(std::io::ErrorKind::TimedOut),
            ConnectErrorKind::Timeout
        );
        assert_eq!(
            ConnectErrorKind::classify_io(std::io::ErrorKind::ConnectionRefused),
            ConnectErrorKind::Unreachable
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EtlError::Config("x".into()).exit_code(), 2);
        assert_eq!(
            EtlError::connect(ConnectErrorKind::Timeout, "slow").exit_code(),
            3
        );
        assert_eq!(EtlError::InvalidTableName("date".into()).exit_code(), 2);
    }

    #[test]
    fn test_connect_kind() {
        let err = EtlError::connect(ConnectErrorKind::AuthRejected, "bad password");
        assert_eq!(err.connect_kind(), Some(ConnectErrorKind::AuthRejected));
        assert_eq!(EtlError::Config("x".into()).connect_kind(), None);
        assert!(err.to_string().contains("authentication rejected"));
    }

    #[test]
    fn test_format_detailed_includes_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.yaml");
        let err = EtlError::from(io);
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: IO error: missing.yaml"));
    }
}
