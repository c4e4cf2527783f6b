//! Core data types shared by the warehouse and the sources.
//!
//! - [`value`]: typed scalar cells with typed NULLs
//! - [`table`]: the in-memory table passed from extract to load
//! - [`identifier`]: identifier quoting and the surrogate key naming rule
//! - [`port`]: ports accepted as numbers or strings

pub mod identifier;
pub mod port;
pub mod table;
pub mod value;

pub use port::Port;
pub use table::{Column, Table};
pub use value::{SqlNullType, SqlValue};
