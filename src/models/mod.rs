//! Data models for pooldb.
//!
//! This module re-exports all model types used throughout the crate.

pub mod bind;
pub mod connection;
pub mod statement;

// Re-export commonly used types
pub use bind::{BindValue, OutKind};
pub use connection::{DatabaseType, PoolStats};
pub use statement::{
    BoundStatement, ColumnValues, InsertOutcome, ProcedureArg, ProcedureResult, QueryOptions, Row,
    TransactionUnit,
};
