//! Upstream data sources.
//!
//! A source stores its connection parameters at construction and opens its
//! engine handle on first use (or eagerly through [`enter`]). The handle is
//! kept for later queries until [`DataSource::dispose`] is called.

mod firebird;
mod mssql;
pub mod odbc;

use std::fmt;
use std::ops::{Deref, DerefMut};

use async_trait::async_trait;

use crate::config::SourceConfig;
use crate::core::Table;
use crate::error::Result;

pub use firebird::{FirebirdSource, DEFAULT_FIREBIRD_CHARSET, DEFAULT_FIREBIRD_DRIVER};
pub use mssql::{MssqlSource, DEFAULT_MSSQL_DRIVER, DEFAULT_MSSQL_INSTANCE};

/// What kind of system a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A database management system.
    Dbms,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Dbms => f.write_str("dbms"),
        }
    }
}

/// Trait for extracting tables from an upstream system.
#[async_trait]
pub trait DataSource: Send {
    /// Unique name of the source.
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind {
        SourceKind::Dbms
    }

    /// Whether the engine handle is currently open.
    fn is_connected(&self) -> bool;

    /// Open the engine handle now. Does nothing if it is already open.
    async fn connect(&mut self) -> Result<()>;

    /// Release the engine handle. Safe to call when nothing is open.
    fn dispose(&mut self);

    /// Run `sql` and return the whole result, opening the handle first if
    /// needed. The handle stays open afterwards.
    async fn query(&mut self, sql: &str) -> Result<Table>;
}

/// Scoped use of a source: the handle is released when the scope is dropped.
pub struct SourceScope<'a, S: DataSource + ?Sized> {
    source: &'a mut S,
}

impl<S: DataSource + ?Sized> Deref for SourceScope<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        self.source
    }
}

impl<S: DataSource + ?Sized> DerefMut for SourceScope<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.source
    }
}

impl<S: DataSource + ?Sized> Drop for SourceScope<'_, S> {
    fn drop(&mut self) {
        self.source.dispose();
    }
}

/// Open `source` eagerly and return a guard that disposes it on every exit
/// path.
///
/// If opening fails nothing is held, so nothing needs disposing.
pub async fn enter<S: DataSource + ?Sized>(source: &mut S) -> Result<SourceScope<'_, S>> {
    source.connect().await?;
    Ok(SourceScope { source })
}

/// Build the source described by a config entry.
pub fn from_config(config: &SourceConfig) -> Box<dyn DataSource> {
    match config {
        SourceConfig::Mssql(c) => Box::new(MssqlSource::from_config(c)),
        SourceConfig::Firebird(c) => Box::new(FirebirdSource::from_config(c)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;
    use crate::error::EtlError;

    #[derive(Default)]
    struct MockSource {
        connected: bool,
        fail_connect: bool,
        connects: usize,
        disposals: usize,
        queries: usize,
    }

    #[async_trait]
    impl DataSource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn connect(&mut self) -> Result<()> {
            if self.fail_connect {
                return Err(EtlError::Config("no engine".into()));
            }
            if !self.connected {
                self.connected = true;
                self.connects += 1;
            }
            Ok(())
        }

        fn dispose(&mut self) {
            self.connected = false;
            self.disposals += 1;
        }

        async fn query(&mut self, sql: &str) -> Result<Table> {
            self.connect().await?;
            self.queries += 1;
            if sql.contains("boom") {
                return Err(EtlError::Conversion("boom".into()));
            }
            Table::from_columns(vec![Column::from_values("one", [1i32])])
        }
    }

    #[tokio::test]
    async fn test_enter_connects_eagerly_and_disposes_on_drop() {
        let mut source = MockSource::default();
        {
            let scope = enter(&mut source).await.unwrap();
            assert!(scope.is_connected());
        }
        assert!(!source.is_connected());
        assert_eq!(source.connects, 1);
        assert_eq!(source.disposals, 1);
    }

    #[tokio::test]
    async fn test_scope_disposes_on_error_path() {
        async fn run(source: &mut MockSource) -> Result<Table> {
            let mut scope = enter(source).await?;
            let result = scope.query("SELECT boom").await;
            result
        }

        let mut source = MockSource::default();
        assert!(run(&mut source).await.is_err());
        assert_eq!(source.disposals, 1);
        assert!(!source.connected);
    }

    #[tokio::test]
    async fn test_failed_enter_holds_nothing() {
        let mut source = MockSource {
            fail_connect: true,
            ..Default::default()
        };
        assert!(enter(&mut source).await.is_err());
        assert_eq!(source.disposals, 0);
    }

    #[tokio::test]
    async fn test_lazy_query_reuses_handle() {
        let mut source = MockSource::default();
        assert!(!source.is_connected());
        source.query("SELECT 1").await.unwrap();
        source.query("SELECT 1").await.unwrap();
        assert!(source.is_connected());
        assert_eq!(source.connects, 1);
        assert_eq!(source.queries, 2);
        assert_eq!(source.kind(), SourceKind::Dbms);
    }
}
