//! Statement execution on a single checked-out connection.
//!
//! Each module below provides the same interface adapted to its database type.
//! The code structure is intentionally parallel to make differences obvious.
//! Functions return raw driver errors where the caller knows the statement
//! context; multi-statement helpers return [`DbError`] directly because only
//! they know which statement failed.
//!
//! When a statement has no binds it is sent as raw SQL, which keeps statements
//! that cannot be prepared (e.g. `CREATE PROCEDURE` on MySQL) working.

use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::sql::ProcedureCall;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{BindValue, ProcedureResult, QueryOptions, Row, TransactionUnit};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value as JsonValue;
use sqlx::{Connection, Executor, Row as SqlxRow};
use tracing::warn;

/// First non-null value of the first row.
fn first_value(rows: Vec<Row>) -> Option<JsonValue> {
    rows.into_iter()
        .next()
        .and_then(|row| row.into_iter().next())
        .map(|(_, value)| value)
        .filter(|value| !value.is_null())
}

fn log_rollback_failure(error: &sqlx::Error) {
    warn!(error = %error, "Rollback of uncommitted statement failed");
}

pub mod mysql {
    use super::*;
    use sqlx::mysql::{MySqlConnection, MySqlQueryResult, MySqlRow};

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
        options: &QueryOptions,
    ) -> Result<Vec<Row>, sqlx::Error> {
        let limit = options.row_limit();
        let rows: Vec<MySqlRow> = if binds.is_empty() {
            conn.fetch(sql).take(limit).try_collect().await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_mysql_param(query, bind);
            }
            query.fetch(&mut *conn).take(limit).try_collect().await?
        };
        Ok(rows
            .iter()
            .map(|r| r.to_json_row(options.decode_binary))
            .collect())
    }

    async fn run(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<MySqlQueryResult, sqlx::Error> {
        if binds.is_empty() {
            conn.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_mysql_param(query, bind);
            }
            query.execute(&mut *conn).await
        }
    }

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        Ok(run(conn, sql, binds).await?.rows_affected())
    }

    /// Run the statement in a transaction that is always rolled back.
    pub async fn execute_uncommitted(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = conn.begin().await?;
        match execute(&mut tx, sql, binds).await {
            Ok(rows_affected) => {
                tx.rollback().await?;
                Ok(rows_affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log_rollback_failure(&rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn fetch_count(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<i64, sqlx::Error> {
        let row = if binds.is_empty() {
            conn.fetch_one(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_mysql_param(query, bind);
            }
            query.fetch_one(&mut *conn).await?
        };
        row.try_get::<i64, _>(0)
    }

    /// Generated key of an insert, taken from the driver's last insert id.
    ///
    /// Tables without an AUTO_INCREMENT column report 0, which is treated as absent.
    pub async fn insert_key(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<Option<JsonValue>, sqlx::Error> {
        let result = run(conn, sql, binds).await?;
        Ok(match result.last_insert_id() {
            0 => None,
            id => Some(JsonValue::from(id)),
        })
    }

    pub async fn run_transaction(
        conn: &mut MySqlConnection,
        units: &[TransactionUnit],
    ) -> DbResult<()> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| DbError::execution("BEGIN", &[], e))?;

        for (index, unit) in units.iter().enumerate() {
            if let Err(cause) = execute(&mut tx, &unit.sql, &unit.binds).await {
                let rollback_error = tx.rollback().await.err();
                return Err(DbError::transaction_failed(
                    index,
                    DbError::execution(&unit.sql, &unit.binds, cause),
                    rollback_error,
                ));
            }
        }

        tx.commit().await.map_err(DbError::commit_failed)
    }

    /// Call a routine, then read its output variables back on the same connection.
    pub async fn call_procedure(
        conn: &mut MySqlConnection,
        call: &ProcedureCall,
        options: &QueryOptions,
    ) -> DbResult<ProcedureResult> {
        let rows = fetch_rows(conn, &call.sql, &call.binds, options)
            .await
            .map_err(|e| DbError::execution(&call.sql, &call.binds, e))?;

        let outputs = match &call.output_sql {
            Some(output_sql) => {
                let mut selected = fetch_rows(conn, output_sql, &[], &QueryOptions::default())
                    .await
                    .map_err(|e| DbError::execution(output_sql, &[], e))?;
                if selected.is_empty() {
                    Row::new()
                } else {
                    call.label_outputs(selected.swap_remove(0))
                }
            }
            None => Row::new(),
        };

        Ok(ProcedureResult { outputs, rows })
    }
}

pub mod postgres {
    use super::*;
    use sqlx::postgres::{PgConnection, PgQueryResult, PgRow};

    pub async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
        options: &QueryOptions,
    ) -> Result<Vec<Row>, sqlx::Error> {
        let limit = options.row_limit();
        let rows: Vec<PgRow> = if binds.is_empty() {
            conn.fetch(sql).take(limit).try_collect().await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_postgres_param(query, bind);
            }
            query.fetch(&mut *conn).take(limit).try_collect().await?
        };
        Ok(rows
            .iter()
            .map(|r| r.to_json_row(options.decode_binary))
            .collect())
    }

    async fn run(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<PgQueryResult, sqlx::Error> {
        if binds.is_empty() {
            conn.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_postgres_param(query, bind);
            }
            query.execute(&mut *conn).await
        }
    }

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        Ok(run(conn, sql, binds).await?.rows_affected())
    }

    /// Run the statement in a transaction that is always rolled back.
    pub async fn execute_uncommitted(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = conn.begin().await?;
        match execute(&mut tx, sql, binds).await {
            Ok(rows_affected) => {
                tx.rollback().await?;
                Ok(rows_affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log_rollback_failure(&rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn fetch_count(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<i64, sqlx::Error> {
        let row = if binds.is_empty() {
            conn.fetch_one(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_postgres_param(query, bind);
            }
            query.fetch_one(&mut *conn).await?
        };
        row.try_get::<i64, _>(0)
    }

    /// Generated key of an `INSERT ... RETURNING` statement.
    pub async fn insert_key(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<Option<JsonValue>, sqlx::Error> {
        let rows = fetch_rows(conn, sql, binds, &QueryOptions::default()).await?;
        Ok(first_value(rows))
    }

    pub async fn run_transaction(
        conn: &mut PgConnection,
        units: &[TransactionUnit],
    ) -> DbResult<()> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| DbError::execution("BEGIN", &[], e))?;

        for (index, unit) in units.iter().enumerate() {
            if let Err(cause) = execute(&mut tx, &unit.sql, &unit.binds).await {
                let rollback_error = tx.rollback().await.err();
                return Err(DbError::transaction_failed(
                    index,
                    DbError::execution(&unit.sql, &unit.binds, cause),
                    rollback_error,
                ));
            }
        }

        tx.commit().await.map_err(DbError::commit_failed)
    }

    /// Call a procedure. Output arguments come back as the single result row.
    pub async fn call_procedure(
        conn: &mut PgConnection,
        call: &ProcedureCall,
        options: &QueryOptions,
    ) -> DbResult<ProcedureResult> {
        let mut rows = fetch_rows(conn, &call.sql, &call.binds, options)
            .await
            .map_err(|e| DbError::execution(&call.sql, &call.binds, e))?;

        let outputs = if call.has_outputs() && !rows.is_empty() {
            call.label_outputs(rows.remove(0))
        } else {
            Row::new()
        };

        Ok(ProcedureResult { outputs, rows })
    }
}

pub mod sqlite {
    use super::*;
    use sqlx::sqlite::{SqliteConnection, SqliteQueryResult, SqliteRow};

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
        options: &QueryOptions,
    ) -> Result<Vec<Row>, sqlx::Error> {
        let limit = options.row_limit();
        let rows: Vec<SqliteRow> = if binds.is_empty() {
            conn.fetch(sql).take(limit).try_collect().await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_sqlite_param(query, bind);
            }
            query.fetch(&mut *conn).take(limit).try_collect().await?
        };
        Ok(rows
            .iter()
            .map(|r| r.to_json_row(options.decode_binary))
            .collect())
    }

    async fn run(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<SqliteQueryResult, sqlx::Error> {
        if binds.is_empty() {
            conn.execute(sql).await
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_sqlite_param(query, bind);
            }
            query.execute(&mut *conn).await
        }
    }

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        Ok(run(conn, sql, binds).await?.rows_affected())
    }

    /// Run the statement in a transaction that is always rolled back.
    pub async fn execute_uncommitted(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = conn.begin().await?;
        match execute(&mut tx, sql, binds).await {
            Ok(rows_affected) => {
                tx.rollback().await?;
                Ok(rows_affected)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    log_rollback_failure(&rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn fetch_count(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<i64, sqlx::Error> {
        let row = if binds.is_empty() {
            conn.fetch_one(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for bind in binds {
                query = bind_sqlite_param(query, bind);
            }
            query.fetch_one(&mut *conn).await?
        };
        row.try_get::<i64, _>(0)
    }

    /// Generated key of an `INSERT ... RETURNING` statement.
    pub async fn insert_key(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> Result<Option<JsonValue>, sqlx::Error> {
        let rows = fetch_rows(conn, sql, binds, &QueryOptions::default()).await?;
        Ok(first_value(rows))
    }

    pub async fn run_transaction(
        conn: &mut SqliteConnection,
        units: &[TransactionUnit],
    ) -> DbResult<()> {
        let mut tx = conn
            .begin()
            .await
            .map_err(|e| DbError::execution("BEGIN", &[], e))?;

        for (index, unit) in units.iter().enumerate() {
            if let Err(cause) = execute(&mut tx, &unit.sql, &unit.binds).await {
                let rollback_error = tx.rollback().await.err();
                return Err(DbError::transaction_failed(
                    index,
                    DbError::execution(&unit.sql, &unit.binds, cause),
                    rollback_error,
                ));
            }
        }

        tx.commit().await.map_err(DbError::commit_failed)
    }
}
