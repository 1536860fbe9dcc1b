//! Row decoding into JSON values.
//!
//! Decoding happens in two steps. The column's declared type picks a
//! [`TypeCategory`], and a backend-specific decoder turns the value into a
//! [`Cell`]. Rendering a [`Cell`] as JSON is shared by every backend.
//!
//! Values that fail to decode are reported as `null` and logged; a single
//! unreadable column never fails the whole statement.

use crate::models::{DatabaseType, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, ColumnIndex, Database, Decode, Row as SqlxRow, Type, TypeInfo, ValueRef};
use tracing::warn;

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Timestamp,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_ascii_lowercase();

    // SQLite declares NUMERIC affinity for plain "numeric" and stores reals there
    if lower == "numeric" && db == DatabaseType::SQLite {
        return TypeCategory::Float;
    }
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    match lower.as_str() {
        "datetime" | "date" | "time" | "timetz" => return TypeCategory::Timestamp,
        "bool" | "boolean" => return TypeCategory::Boolean,
        "real" | "float4" | "float8" => return TypeCategory::Float,
        "json" | "jsonb" => return TypeCategory::Json,
        "bytea" => return TypeCategory::Binary,
        "name" | "uuid" => return TypeCategory::Text,
        _ => {}
    }

    // Text and binary before integers: MySQL has TINYTEXT and TINYBLOB
    if lower.starts_with("timestamp") {
        TypeCategory::Timestamp
    } else if lower.contains("blob") || lower.contains("binary") {
        TypeCategory::Binary
    } else if ["char", "text", "clob"].iter().any(|k| lower.contains(k)) {
        TypeCategory::Text
    } else if ["int", "serial", "tiny"].iter().any(|k| lower.contains(k)) {
        TypeCategory::Integer
    } else if lower.contains("float") || lower.contains("double") {
        TypeCategory::Float
    } else {
        TypeCategory::Unknown
    }
}

/// One decoded column value, before rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
    /// Zoned point in time
    Instant(DateTime<Utc>),
    /// Date or time of day without a zone
    Civil(String),
}

impl Cell {
    /// Render as JSON.
    ///
    /// Binary values become base64, or UTF-8 text when `decode_binary` is set
    /// and the bytes are valid UTF-8. Non-finite floats have no JSON number
    /// form and are rendered as text.
    pub fn into_json(self, decode_binary: bool) -> JsonValue {
        use base64::{Engine as _, engine::general_purpose::STANDARD};

        match self {
            Cell::Null => JsonValue::Null,
            Cell::Int(v) => v.into(),
            Cell::UInt(v) => v.into(),
            Cell::Float(v) => serde_json::Number::from_f64(v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Cell::Bool(v) => JsonValue::Bool(v),
            Cell::Text(v) | Cell::Civil(v) => JsonValue::String(v),
            Cell::Bytes(bytes) if decode_binary => match String::from_utf8(bytes) {
                Ok(text) => JsonValue::String(text),
                Err(e) => JsonValue::String(STANDARD.encode(e.as_bytes())),
            },
            Cell::Bytes(bytes) => JsonValue::String(STANDARD.encode(bytes)),
            Cell::Json(v) => v,
            Cell::Instant(t) => JsonValue::String(t.to_rfc3339()),
        }
    }
}

/// Rust types a column of `DB` can be decoded into.
trait Decodable<'r, DB: Database>: Decode<'r, DB> + Type<DB> {}

impl<'r, DB: Database, T: Decode<'r, DB> + Type<DB>> Decodable<'r, DB> for T {}

/// Decode column `idx` as `T`.
///
/// `None` means `T` does not fit the column, so the caller can try the next
/// candidate type; SQL NULL is `Some(Cell::Null)`.
fn cell<'r, R, T>(row: &'r R, idx: usize, wrap: impl FnOnce(T) -> Cell) -> Option<Cell>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    T: Decodable<'r, R::Database>,
{
    match row.try_get::<Option<T>, _>(idx) {
        Ok(Some(v)) => Some(wrap(v)),
        Ok(None) => Some(Cell::Null),
        Err(_) => None,
    }
}

/// Zoned timestamps first, then the zone-less date/time types.
fn timestamp_cell<'r, R>(row: &'r R, idx: usize) -> Option<Cell>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    DateTime<Utc>: Decodable<'r, R::Database>,
    NaiveDateTime: Decodable<'r, R::Database>,
    NaiveDate: Decodable<'r, R::Database>,
    NaiveTime: Decodable<'r, R::Database>,
{
    cell(row, idx, Cell::Instant)
        .or_else(|| cell(row, idx, |v: NaiveDateTime| Cell::Civil(v.to_string())))
        .or_else(|| cell(row, idx, |v: NaiveDate| Cell::Civil(v.to_string())))
        .or_else(|| cell(row, idx, |v: NaiveTime| Cell::Civil(v.to_string())))
}

/// Categories every backend decodes the same way. Falls back to text.
fn scalar_cell<'r, R>(row: &'r R, idx: usize, category: TypeCategory) -> Option<Cell>
where
    R: SqlxRow,
    usize: ColumnIndex<R>,
    bool: Decodable<'r, R::Database>,
    i64: Decodable<'r, R::Database>,
    f64: Decodable<'r, R::Database>,
    String: Decodable<'r, R::Database>,
    Vec<u8>: Decodable<'r, R::Database>,
    DateTime<Utc>: Decodable<'r, R::Database>,
    NaiveDateTime: Decodable<'r, R::Database>,
    NaiveDate: Decodable<'r, R::Database>,
    NaiveTime: Decodable<'r, R::Database>,
{
    let decoded = match category {
        TypeCategory::Integer => cell(row, idx, Cell::Int),
        TypeCategory::Float | TypeCategory::Decimal => cell(row, idx, Cell::Float),
        TypeCategory::Boolean => cell(row, idx, Cell::Bool),
        TypeCategory::Binary => cell(row, idx, Cell::Bytes),
        TypeCategory::Timestamp => timestamp_cell(row, idx),
        TypeCategory::Text | TypeCategory::Json | TypeCategory::Unknown => None,
    };
    decoded.or_else(|| cell(row, idx, Cell::Text))
}

fn mysql_cell(row: &MySqlRow, idx: usize, category: TypeCategory) -> Option<Cell> {
    let decoded = match category {
        TypeCategory::Decimal => cell(row, idx, |v: Decimal| Cell::Text(v.to_string())),
        // Width and signedness must match the column exactly
        TypeCategory::Integer => cell(row, idx, Cell::Int)
            .or_else(|| cell(row, idx, |v: i32| Cell::Int(v.into())))
            .or_else(|| cell(row, idx, |v: i16| Cell::Int(v.into())))
            .or_else(|| cell(row, idx, |v: i8| Cell::Int(v.into())))
            .or_else(|| cell(row, idx, Cell::UInt))
            .or_else(|| cell(row, idx, |v: u32| Cell::UInt(v.into())))
            .or_else(|| cell(row, idx, |v: u16| Cell::UInt(v.into())))
            .or_else(|| cell(row, idx, |v: u8| Cell::UInt(v.into()))),
        TypeCategory::Float => {
            cell(row, idx, Cell::Float).or_else(|| cell(row, idx, |v: f32| Cell::Float(v.into())))
        }
        TypeCategory::Json => cell(row, idx, Cell::Json),
        other => return scalar_cell(row, idx, other),
    };
    decoded.or_else(|| cell(row, idx, Cell::Text))
}

fn postgres_cell(row: &PgRow, idx: usize, category: TypeCategory) -> Option<Cell> {
    let decoded = match category {
        TypeCategory::Decimal => cell(row, idx, |v: Decimal| Cell::Text(v.to_string())),
        TypeCategory::Integer => cell(row, idx, Cell::Int)
            .or_else(|| cell(row, idx, |v: i32| Cell::Int(v.into())))
            .or_else(|| cell(row, idx, |v: i16| Cell::Int(v.into()))),
        TypeCategory::Float => {
            cell(row, idx, Cell::Float).or_else(|| cell(row, idx, |v: f32| Cell::Float(v.into())))
        }
        TypeCategory::Json => cell(row, idx, Cell::Json),
        other => return scalar_cell(row, idx, other),
    };
    decoded.or_else(|| cell(row, idx, Cell::Text))
}

fn sqlite_cell(row: &SqliteRow, idx: usize, category: TypeCategory) -> Option<Cell> {
    // Expression columns carry no declared type; use the value's storage class
    let category = match category {
        TypeCategory::Unknown => {
            let raw = row.try_get_raw(idx).ok()?;
            if raw.is_null() {
                return Some(Cell::Null);
            }
            categorize_type(raw.type_info().name(), DatabaseType::SQLite)
        }
        other => other,
    };

    match category {
        // JSON is stored as text; keep it as text if it does not parse
        TypeCategory::Json => cell(row, idx, |v: String| match serde_json::from_str(&v) {
            Ok(json) => Cell::Json(json),
            Err(_) => Cell::Text(v),
        }),
        other => scalar_cell(row, idx, other),
    }
}

type CellDecoder<R> = fn(&R, usize, TypeCategory) -> Option<Cell>;

fn decode_row<R: SqlxRow>(
    row: &R,
    db: DatabaseType,
    decode_cell: CellDecoder<R>,
    decode_binary: bool,
) -> Row {
    row.columns()
        .iter()
        .map(|col| {
            let type_name = col.type_info().name();
            let category = categorize_type(type_name, db);
            let cell = decode_cell(row, col.ordinal(), category).unwrap_or_else(|| {
                warn!(
                    column = col.name(),
                    type_name = type_name,
                    "Column could not be decoded, reporting null"
                );
                Cell::Null
            });
            (col.name().to_string(), cell.into_json(decode_binary))
        })
        .collect()
}

/// Conversion of a driver row into an ordered JSON map.
pub trait RowToJson {
    fn to_json_row(&self, decode_binary: bool) -> Row;
}

impl RowToJson for MySqlRow {
    fn to_json_row(&self, decode_binary: bool) -> Row {
        decode_row(self, DatabaseType::MySQL, mysql_cell, decode_binary)
    }
}

impl RowToJson for PgRow {
    fn to_json_row(&self, decode_binary: bool) -> Row {
        decode_row(self, DatabaseType::PostgreSQL, postgres_cell, decode_binary)
    }
}

impl RowToJson for SqliteRow {
    fn to_json_row(&self, decode_binary: bool) -> Row {
        decode_row(self, DatabaseType::SQLite, sqlite_cell, decode_binary)
    }
}
