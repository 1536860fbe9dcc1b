//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Connection pool management
//! - Statement execution and transactions
//! - Statement builders for the table helpers
//! - Type mappings
//! - Database dispatch macros for reducing code duplication

pub mod backend;
pub mod executor;
#[macro_use]
pub mod macros;
pub mod params;
pub mod pool;
pub mod sql;
pub mod types;

pub use executor::QueryExecutor;
pub use pool::{DbConnection, DbPool, PoolManager, PooledConnection};
pub use sql::ProcedureCall;
