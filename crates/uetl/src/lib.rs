//! # uetl
//!
//! Minimalist ETL library for loading a PostgreSQL data warehouse.
//!
//! - **Warehouse manager**: connectivity check with create-if-missing,
//!   ordered table creation, truncation and append-mode bulk writes
//! - **Connection provider** returning a typed success/failure outcome
//!   instead of raising on connect errors
//! - **Sources** for SQL Server and Firebird over ODBC, with scoped
//!   disposal of their engine handle
//!
//! ## Example
//!
//! ```rust,no_run
//! use uetl::{source, DataSource, DataWarehouse, Dbms, MssqlSource};
//!
//! #[tokio::main]
//! async fn main() -> uetl::Result<()> {
//!     let dw = DataWarehouse::new("DW", Dbms::Postgres, "localhost", 5432, "dw", "etl", "pw");
//!     if !dw.test_connection().await? {
//!         std::process::exit(1);
//!     }
//!
//!     let mut erp = MssqlSource::new("erp", "sql01", 1433, "sales", "reader", "pw");
//!     let days = {
//!         let mut scope = source::enter(&mut erp).await?;
//!         let days = scope.query("SELECT day, holiday FROM calendar").await?;
//!         days
//!     };
//!     dw.write_indexed("dim_date", &days, Some(1000), true).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod source;
pub mod warehouse;

pub use config::{Config, SourceConfig, TableDefinition, WarehouseConfig};
pub use crate::core::{Column, Port, SqlNullType, SqlValue, Table};
pub use error::{ConnectErrorKind, EtlError, Result};
pub use source::{DataSource, FirebirdSource, MssqlSource, SourceKind, SourceScope};
pub use warehouse::{ConnectOutcome, DataWarehouse, Dbms, SslMode, TablePresence};
