//! Scalar cell values carried between sources and the warehouse.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Type hint for NULL values.
///
/// Keeps a column typed even when a cell is NULL, so that the
/// warehouse DDL and literal casts stay correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

impl SqlNullType {
    /// PostgreSQL column type used when the warehouse creates a table.
    pub fn pg_type(&self) -> &'static str {
        match self {
            SqlNullType::Bool => "BOOLEAN",
            SqlNullType::I16 => "SMALLINT",
            SqlNullType::I32 => "INTEGER",
            SqlNullType::I64 => "BIGINT",
            SqlNullType::F32 => "REAL",
            SqlNullType::F64 => "DOUBLE PRECISION",
            SqlNullType::String => "TEXT",
            SqlNullType::Bytes => "BYTEA",
            SqlNullType::Uuid => "UUID",
            SqlNullType::Decimal => "NUMERIC",
            SqlNullType::DateTime => "TIMESTAMP",
            SqlNullType::DateTimeOffset => "TIMESTAMPTZ",
            SqlNullType::Date => "DATE",
            SqlNullType::Time => "TIME",
        }
    }

    /// Cast suffix for a literal of this type.
    fn pg_cast(&self) -> &'static str {
        match self {
            SqlNullType::Bool => "::boolean",
            SqlNullType::I16 => "::smallint",
            SqlNullType::I32 => "::integer",
            SqlNullType::I64 => "::bigint",
            SqlNullType::F32 => "::real",
            SqlNullType::F64 => "::double precision",
            SqlNullType::String => "::text",
            SqlNullType::Bytes => "::bytea",
            SqlNullType::Uuid => "::uuid",
            SqlNullType::Decimal => "::numeric",
            SqlNullType::DateTime => "::timestamp",
            SqlNullType::DateTimeOffset => "::timestamptz",
            SqlNullType::Date => "::date",
            SqlNullType::Time => "::time",
        }
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL with type hint.
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
    /// Timestamp with timezone offset.
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null(_))
    }

    /// Get the SqlNullType for this value (its column type).
    #[must_use]
    pub fn null_type(&self) -> SqlNullType {
        match self {
            SqlValue::Null(t) => *t,
            SqlValue::Bool(_) => SqlNullType::Bool,
            SqlValue::I16(_) => SqlNullType::I16,
            SqlValue::I32(_) => SqlNullType::I32,
            SqlValue::I64(_) => SqlNullType::I64,
            SqlValue::F32(_) => SqlNullType::F32,
            SqlValue::F64(_) => SqlNullType::F64,
            SqlValue::Text(_) => SqlNullType::String,
            SqlValue::Bytes(_) => SqlNullType::Bytes,
            SqlValue::Uuid(_) => SqlNullType::Uuid,
            SqlValue::Decimal(_) => SqlNullType::Decimal,
            SqlValue::DateTime(_) => SqlNullType::DateTime,
            SqlValue::DateTimeOffset(_) => SqlNullType::DateTimeOffset,
            SqlValue::Date(_) => SqlNullType::Date,
            SqlValue::Time(_) => SqlNullType::Time,
        }
    }

    /// Render as a PostgreSQL literal for use in an INSERT statement.
    pub fn to_pg_literal(&self) -> String {
        match self {
            SqlValue::Null(t) => format!("NULL{}", t.pg_cast()),
            SqlValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            SqlValue::I16(n) => n.to_string(),
            SqlValue::I32(n) => n.to_string(),
            SqlValue::I64(n) => n.to_string(),
            SqlValue::F32(n) => float_literal(f64::from(*n), "::real"),
            SqlValue::F64(n) => float_literal(*n, "::double precision"),
            SqlValue::Text(s) => format!("'{}'", escape_sql_string(s)),
            SqlValue::Bytes(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            SqlValue::Uuid(u) => format!("'{}'::uuid", u),
            SqlValue::Decimal(d) => format!("{}::numeric", d),
            SqlValue::DateTime(dt) => {
                format!("'{}'::timestamp", dt.format("%Y-%m-%d %H:%M:%S%.6f"))
            }
            SqlValue::DateTimeOffset(dt) => format!("'{}'::timestamptz", dt.to_rfc3339()),
            SqlValue::Date(d) => format!("'{}'::date", d),
            SqlValue::Time(t) => format!("'{}'::time", t),
        }
    }

    /// Parse the text rendering of a cell into a typed value.
    ///
    /// ODBC sources are fetched as text; the column's data type decides how
    /// each cell is read back. Text that does not parse as the declared type
    /// is kept as `Text` rather than dropped.
    pub fn parse_text(text: Option<&str>, ty: SqlNullType) -> SqlValue {
        let Some(s) = text else {
            return SqlValue::Null(ty);
        };
        let trimmed = s.trim();

        let parsed = match ty {
            SqlNullType::Bool => match trimmed {
                "1" | "true" | "True" | "TRUE" | "t" => Some(SqlValue::Bool(true)),
                "0" | "false" | "False" | "FALSE" | "f" => Some(SqlValue::Bool(false)),
                _ => None,
            },
            SqlNullType::I16 => trimmed.parse().ok().map(SqlValue::I16),
            SqlNullType::I32 => trimmed.parse().ok().map(SqlValue::I32),
            SqlNullType::I64 => trimmed.parse().ok().map(SqlValue::I64),
            SqlNullType::F32 => trimmed.parse().ok().map(SqlValue::F32),
            SqlNullType::F64 => trimmed.parse().ok().map(SqlValue::F64),
            SqlNullType::Decimal => Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .ok()
                .map(SqlValue::Decimal),
            SqlNullType::Uuid => Uuid::parse_str(trimmed).ok().map(SqlValue::Uuid),
            SqlNullType::DateTime => parse_datetime(trimmed).map(SqlValue::DateTime),
            SqlNullType::DateTimeOffset => DateTime::parse_from_rfc3339(trimmed)
                .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f %:z"))
                .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z"))
                .or_else(|_| DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%#z"))
                .ok()
                .map(SqlValue::DateTimeOffset),
            SqlNullType::Date => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .map(SqlValue::Date),
            SqlNullType::Time => NaiveTime::parse_from_str(trimmed, "%H:%M:%S%.f")
                .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
                .ok()
                .map(SqlValue::Time),
            SqlNullType::Bytes => {
                let hex_str = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed);
                hex::decode(hex_str).ok().map(SqlValue::Bytes)
            }
            SqlNullType::String => return SqlValue::Text(s.to_string()),
        };

        parsed.unwrap_or_else(|| SqlValue::Text(s.to_string()))
    }
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

fn float_literal(n: f64, cast: &str) -> String {
    if n.is_nan() {
        format!("'NaN'{}", cast)
    } else if n.is_infinite() {
        let sign = if n.is_sign_negative() { "-" } else { "" };
        format!("'{}Infinity'{}", sign, cast)
    } else {
        n.to_string()
    }
}

/// Escape a string for SQL literal use.
fn escape_sql_string(s: &str) -> String {
    s.replace('\'', "''")
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null(_) => f.write_str("NULL"),
            SqlValue::Bool(b) => write!(f, "{}", b),
            SqlValue::I16(n) => write!(f, "{}", n),
            SqlValue::I32(n) => write!(f, "{}", n),
            SqlValue::I64(n) => write!(f, "{}", n),
            SqlValue::F32(n) => write!(f, "{}", n),
            SqlValue::F64(n) => write!(f, "{}", n),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Bytes(b) => write!(f, "\\x{}", hex::encode(b)),
            SqlValue::Uuid(u) => write!(f, "{}", u),
            SqlValue::Decimal(d) => write!(f, "{}", d),
            SqlValue::DateTime(dt) => write!(f, "{}", dt),
            SqlValue::DateTimeOffset(dt) => write!(f, "{}", dt.to_rfc3339()),
            SqlValue::Date(d) => write!(f, "{}", d),
            SqlValue::Time(t) => write!(f, "{}", t),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::I16(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I32(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::F32(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl From<DateTime<FixedOffset>> for SqlValue {
    fn from(v: DateTime<FixedOffset>) -> Self {
        SqlValue::DateTimeOffset(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue
where
    T: TypedNull,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => SqlValue::Null(T::NULL_TYPE),
        }
    }
}

/// Types that know which typed NULL stands for their absence.
pub trait TypedNull {
    const NULL_TYPE: SqlNullType;
}

macro_rules! typed_null {
    ($($t:ty => $n:ident),* $(,)?) => {
        $(impl TypedNull for $t {
            const NULL_TYPE: SqlNullType = SqlNullType::$n;
        })*
    };
}

typed_null! {
    bool => Bool,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Bytes,
    Uuid => Uuid,
    Decimal => Decimal,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeOffset,
    NaiveDate => Date,
    NaiveTime => Time,
}
