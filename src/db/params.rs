//! Parameter binding utilities for database queries.
//!
//! This module binds [`BindValue`]s to database-specific query objects.
//! Output slots never reach these functions as real parameters: statement
//! builders render them into the SQL text, so they bind as NULL here.

use crate::models::BindValue;
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgTypeInfo};
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Encode, MySql, Postgres, Sqlite, Type};

/// PostgreSQL NULL sent with parameter type OID 0; the server infers the
/// type from where the placeholder appears.
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q BindValue,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match param {
        BindValue::Null | BindValue::Out(_) => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.as_str()),
        BindValue::Timestamp(v) => query.bind(*v),
        BindValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q BindValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        BindValue::Null | BindValue::Out(_) => query.bind(UntypedNull),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.as_str()),
        BindValue::Timestamp(v) => query.bind(*v),
        BindValue::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q BindValue,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match param {
        BindValue::Null | BindValue::Out(_) => query.bind(None::<String>),
        BindValue::Bool(v) => query.bind(*v),
        BindValue::Int(v) => query.bind(*v),
        BindValue::Float(v) => query.bind(*v),
        BindValue::Text(v) => query.bind(v.as_str()),
        BindValue::Timestamp(v) => query.bind(*v),
        // SQLite doesn't have native JSON type, store as string
        BindValue::Json(v) => query.bind(v.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_null_is_untyped() {
        assert_eq!(UntypedNull::type_info().oid(), Some(Oid(0)));
    }
}
