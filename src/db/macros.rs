//! Database dispatch macros for reducing code duplication.
//!
//! The backend modules in [`crate::db::backend`] expose the same function
//! names with database-specific connection types. These macros select the
//! module matching a checked-out connection so each operation is written once.

/// Dispatch on a `DbConnection`, binding the underlying connection and the
/// matching backend module.
///
/// # Example
///
/// ```ignore
/// let rows = impl_db_dispatch!(conn.connection_mut(), c, backend => {
///     backend::fetch_rows(c, sql, binds, options).await
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, $c:ident, $backend:ident => $body:expr) => {
        match $conn {
            $crate::db::pool::DbConnection::MySql($c) => {
                use $crate::db::backend::mysql as $backend;
                $body
            }
            $crate::db::pool::DbConnection::Postgres($c) => {
                use $crate::db::backend::postgres as $backend;
                $body
            }
            $crate::db::pool::DbConnection::SQLite($c) => {
                use $crate::db::backend::sqlite as $backend;
                $body
            }
        }
    };
}

/// Dispatch on a `DbPool`, binding the pool in every arm.
#[macro_export]
macro_rules! impl_pool_dispatch {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::db::pool::DbPool::MySql($p) => $body,
            $crate::db::pool::DbPool::Postgres($p) => $body,
            $crate::db::pool::DbPool::SQLite($p) => $body,
        }
    };
}

pub use impl_db_dispatch;
pub use impl_pool_dispatch;
