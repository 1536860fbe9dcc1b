//! Query execution engine.
//!
//! [`QueryExecutor`] is the public statement API. Every operation checks out
//! exactly one connection from the [`PoolManager`], runs its work, and
//! releases the connection before returning, on success and on failure alike.
//! A `transaction` keeps its one connection for the whole unit sequence.
//!
//! Identifiers and where-clause text passed to the table helpers are spliced
//! into SQL unchanged (see [`crate::db::sql`]); only bind values are
//! parameterized.

use crate::db::pool::{DbConnection, PoolManager, PooledConnection};
use crate::db::sql;
use crate::error::{DbError, DbResult};
use crate::impl_db_dispatch;
use crate::models::{
    BindValue, BoundStatement, ColumnValues, DatabaseType, InsertOutcome, ProcedureArg,
    ProcedureResult, QueryOptions, Row, TransactionUnit,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Statement executor over a shared pool.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    pool: Arc<PoolManager>,
}

impl QueryExecutor {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    async fn checkout(&self) -> DbResult<PooledConnection> {
        Ok(self.pool.acquire().await?)
    }

    fn db_type(&self) -> DbResult<DatabaseType> {
        Ok(self.pool.config().database_type()?)
    }

    /// Run a read statement and return its rows in database order.
    ///
    /// An empty result set is an empty vector. `options.max_rows` stops the
    /// fetch early; surplus rows are never read from the server.
    pub async fn query(
        &self,
        sql: &str,
        binds: &[BindValue],
        options: &QueryOptions,
    ) -> DbResult<Vec<Row>> {
        reject_out_binds(binds)?;
        let start = Instant::now();
        debug!(
            sql = %sql,
            binds = binds.len(),
            max_rows = ?options.max_rows,
            "Executing query"
        );

        let mut conn = self.checkout().await?;
        let result = impl_db_dispatch!(conn.connection_mut(), c, backend => {
            backend::fetch_rows(c, sql, binds, options).await
        });
        conn.release().await;

        let rows = result.map_err(|e| execution_error(sql, binds, e))?;
        debug!(
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query completed"
        );
        Ok(rows)
    }

    /// [`QueryExecutor::query`] with the statement's own binds and options.
    pub async fn query_statement(&self, statement: &BoundStatement) -> DbResult<Vec<Row>> {
        self.query(&statement.sql, &statement.binds, &statement.options).await
    }

    /// Run a mutating statement and return the affected row count.
    ///
    /// With `auto_commit` false the statement runs inside a transaction that
    /// is rolled back before the connection is released: the count is
    /// reported but the change never becomes visible. Use
    /// [`QueryExecutor::transaction`] to commit several statements together.
    pub async fn execute(
        &self,
        sql: &str,
        binds: &[BindValue],
        auto_commit: bool,
    ) -> DbResult<u64> {
        reject_out_binds(binds)?;
        let start = Instant::now();
        debug!(
            sql = %sql,
            binds = binds.len(),
            auto_commit = auto_commit,
            "Executing statement"
        );

        let mut conn = self.checkout().await?;
        let result = impl_db_dispatch!(conn.connection_mut(), c, backend => {
            if auto_commit {
                backend::execute(c, sql, binds).await
            } else {
                backend::execute_uncommitted(c, sql, binds).await
            }
        });
        conn.release().await;

        let rows_affected = result.map_err(|e| execution_error(sql, binds, e))?;
        debug!(
            rows_affected = rows_affected,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Statement completed"
        );
        Ok(rows_affected)
    }

    /// Run `units` in order on one connection and commit them together.
    ///
    /// If unit `k` fails, everything is rolled back and
    /// [`DbError::TransactionFailed`] reports `failed_index = k`. An empty
    /// sequence succeeds without touching the pool.
    pub async fn transaction(&self, units: &[TransactionUnit]) -> DbResult<()> {
        if units.is_empty() {
            debug!("Empty transaction, nothing to run");
            return Ok(());
        }
        for unit in units {
            reject_out_binds(&unit.binds)?;
        }

        let start = Instant::now();
        debug!(units = units.len(), "Starting transaction");

        let mut conn = self.checkout().await?;
        let result = impl_db_dispatch!(conn.connection_mut(), c, backend => {
            backend::run_transaction(c, units).await
        });
        conn.release().await;

        match result {
            Ok(()) => {
                debug!(
                    units = units.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Transaction rolled back");
                Err(e)
            }
        }
    }

    /// Invoke stored routine `name`.
    ///
    /// Arguments holding [`BindValue::Out`] are output slots; their values are
    /// returned in [`ProcedureResult::outputs`] under the argument name, or
    /// `out<position>` when unnamed. Not available on SQLite.
    pub async fn procedure(
        &self,
        name: &str,
        args: &[ProcedureArg],
        options: &QueryOptions,
    ) -> DbResult<ProcedureResult> {
        let call = sql::procedure_call(self.db_type()?, name, args)?;
        debug!(
            procedure = %name,
            sql = %call.sql,
            outputs = call.output_keys.len(),
            "Calling procedure"
        );

        let mut conn = self.checkout().await?;
        let result = match conn.connection_mut() {
            DbConnection::MySql(c) => {
                crate::db::backend::mysql::call_procedure(c, &call, options).await
            }
            DbConnection::Postgres(c) => {
                crate::db::backend::postgres::call_procedure(c, &call, options).await
            }
            DbConnection::SQLite(_) => Err(DbError::unsupported(
                "stored procedure call",
                DatabaseType::SQLite,
            )),
        };
        conn.release().await;

        match result {
            Ok(result) => {
                debug!(
                    procedure = %name,
                    rows = result.rows.len(),
                    "Procedure completed"
                );
                Ok(result)
            }
            Err(e) => {
                error!(procedure = %name, error = %e, "Procedure call failed");
                Err(e)
            }
        }
    }

    /// First row of a query, or `None` when it returns no rows.
    pub async fn get_one(
        &self,
        sql: &str,
        binds: &[BindValue],
        options: &QueryOptions,
    ) -> DbResult<Option<Row>> {
        let options = options.clone().with_max_rows(1);
        let rows = self.query(sql, binds, &options).await?;
        Ok(rows.into_iter().next())
    }

    /// Whether any row of `table` matches `where_clause`.
    pub async fn exists(
        &self,
        table: &str,
        where_clause: &str,
        binds: &[BindValue],
    ) -> DbResult<bool> {
        let sql = sql::count(table, Some(where_clause))?;
        Ok(self.count(&sql, binds).await? > 0)
    }

    /// Insert one row built from `values`.
    ///
    /// With `returning` set, returns the generated value of that column
    /// ([`InsertOutcome::KeyAbsent`] if the database produced none). On MySQL
    /// the value is the AUTO_INCREMENT id regardless of the column named.
    /// Without it, returns the affected row count.
    pub async fn insert(
        &self,
        table: &str,
        values: &ColumnValues,
        returning: Option<&str>,
    ) -> DbResult<InsertOutcome> {
        let returning = match returning.map(str::trim) {
            Some("") => {
                return Err(DbError::invalid_input(
                    "Returning column name cannot be blank",
                ));
            }
            other => other,
        };
        let sql = sql::insert(self.db_type()?, table, values, returning)?;
        let binds = values.values();

        let Some(column) = returning else {
            let rows_affected = self.execute(&sql, &binds, true).await?;
            return Ok(InsertOutcome::RowsAffected(rows_affected));
        };

        reject_out_binds(&binds)?;
        debug!(sql = %sql, binds = binds.len(), returning = %column, "Executing insert");

        let mut conn = self.checkout().await?;
        let result = impl_db_dispatch!(conn.connection_mut(), c, backend => {
            backend::insert_key(c, &sql, &binds).await
        });
        conn.release().await;

        match result.map_err(|e| execution_error(&sql, &binds, e))? {
            Some(key) => {
                debug!(table = %table, key = %key, "Row inserted");
                Ok(InsertOutcome::Key(key))
            }
            None => {
                debug!(table = %table, "Row inserted without a generated key");
                Ok(InsertOutcome::KeyAbsent)
            }
        }
    }

    /// Update rows of `table` matching `where_clause`.
    ///
    /// Binds are the column values in `values` order followed by `where_binds`.
    pub async fn update(
        &self,
        table: &str,
        values: &ColumnValues,
        where_clause: &str,
        where_binds: &[BindValue],
    ) -> DbResult<u64> {
        let sql = sql::update(self.db_type()?, table, values, where_clause)?;
        let mut binds = values.values();
        binds.extend_from_slice(where_binds);
        self.execute(&sql, &binds, true).await
    }

    pub async fn delete(
        &self,
        table: &str,
        where_clause: &str,
        binds: &[BindValue],
    ) -> DbResult<u64> {
        let sql = sql::delete(table, where_clause)?;
        self.execute(&sql, binds, true).await
    }

    /// Remove every row of `table`.
    pub async fn truncate(&self, table: &str) -> DbResult<()> {
        let sql = sql::truncate(self.db_type()?, table)?;
        self.execute(&sql, &[], true).await?;
        Ok(())
    }

    pub async fn row_count(&self, table: &str) -> DbResult<u64> {
        let sql = sql::count(table, None)?;
        self.count(&sql, &[]).await
    }

    async fn count(&self, sql: &str, binds: &[BindValue]) -> DbResult<u64> {
        reject_out_binds(binds)?;
        debug!(sql = %sql, binds = binds.len(), "Executing count");

        let mut conn = self.checkout().await?;
        let result = impl_db_dispatch!(conn.connection_mut(), c, backend => {
            backend::fetch_count(c, sql, binds).await
        });
        conn.release().await;

        let count = result.map_err(|e| execution_error(sql, binds, e))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Output slots only make sense for procedure calls.
fn reject_out_binds(binds: &[BindValue]) -> DbResult<()> {
    match binds.iter().position(BindValue::is_out) {
        Some(idx) => Err(DbError::invalid_input(format!(
            "Bind {} is an output slot; output binds are only valid for procedure calls",
            idx + 1
        ))),
        None => Ok(()),
    }
}

fn execution_error(sql: &str, binds: &[BindValue], cause: sqlx::Error) -> DbError {
    let err = DbError::execution(sql, binds, cause);
    error!(
        sql = %sql,
        binds = ?binds,
        error = %err,
        "Statement failed"
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OutKind;

    #[test]
    fn test_reject_out_binds() {
        assert!(reject_out_binds(&[BindValue::Int(1), BindValue::Null]).is_ok());

        let err = reject_out_binds(&[BindValue::Int(1), BindValue::out(OutKind::Integer)])
            .unwrap_err();
        match err {
            DbError::InvalidInput { message } => assert!(message.starts_with("Bind 2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_execution_error_keeps_context() {
        let err = execution_error(
            "DELETE FROM t WHERE id = ?",
            &[BindValue::Int(3)],
            sqlx::Error::RowNotFound,
        );
        match err {
            DbError::ExecutionFailed { sql, binds, .. } => {
                assert_eq!(sql, "DELETE FROM t WHERE id = ?");
                assert_eq!(binds, vec![BindValue::Int(3)]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
