//! pooldb
//!
//! A pooled relational database access layer for SQLite, PostgreSQL and
//! MySQL. One [`PoolManager`] owns the connection pool; a [`QueryExecutor`]
//! built on it runs parameterized statements, stored procedures and atomic
//! multi-statement transactions, releasing every connection it checks out.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, PoolConfig};
pub use db::{PoolManager, QueryExecutor};
pub use error::{DbError, DbResult, PoolError};
pub use models::{
    BindValue, BoundStatement, ColumnValues, InsertOutcome, OutKind, PoolStats, ProcedureArg,
    ProcedureResult, QueryOptions, Row, TransactionUnit,
};
