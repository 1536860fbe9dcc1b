//! Connection-related data models.
//!
//! This module defines the backend type detection and the pool statistics
//! snapshot returned by the pool manager.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.trim().to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// Render the positional placeholder for the 1-based bind `position`.
    ///
    /// PostgreSQL numbers its placeholders (`$1`, `$2`, ...); MySQL and SQLite
    /// use anonymous `?` markers filled in order.
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", position),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Whether `INSERT ... RETURNING` is available for generated keys.
    pub fn supports_returning(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::SQLite)
    }

    /// Whether stored procedures can be invoked.
    pub fn supports_procedures(&self) -> bool {
        matches!(self, Self::PostgreSQL | Self::MySQL)
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Point-in-time occupancy and throughput counters for the pool.
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub db_type: DatabaseType,
    /// Open connections, idle or in use
    pub size: u32,
    pub idle: usize,
    /// Connections currently held by callers
    pub active: usize,
    /// Highest `active` value observed since the manager was created
    pub peak_active: usize,
    pub min_size: u32,
    pub max_size: u32,
    pub increment: u32,
    pub total_acquired: u64,
    pub total_released: u64,
    pub acquire_failures: u64,
    /// Number of pools created by this manager (re-initialization after shutdown increments it)
    pub generation: u64,
    pub created_at: DateTime<Utc>,
}

impl PoolStats {
    /// Connections open but not held by a caller.
    pub fn available(&self) -> usize {
        self.idle
    }

    /// Check whether every acquired connection has been returned.
    pub fn is_balanced(&self) -> bool {
        self.total_acquired == self.total_released && self.active == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_database_type() {
        assert_eq!(
            DatabaseType::from_connection_string("postgres://u:p@localhost/db"),
            Some(DatabaseType::PostgreSQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("MARIADB://localhost/db"),
            Some(DatabaseType::MySQL)
        );
        assert_eq!(
            DatabaseType::from_connection_string("sqlite:data.db"),
            Some(DatabaseType::SQLite)
        );
        assert_eq!(
            DatabaseType::from_connection_string("localhost:1521/ORCLPDB1"),
            None
        );
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(3), "$3");
        assert_eq!(DatabaseType::MySQL.placeholder(3), "?");
        assert_eq!(DatabaseType::SQLite.placeholder(1), "?");
    }

    #[test]
    fn test_capabilities() {
        assert!(DatabaseType::SQLite.supports_returning());
        assert!(!DatabaseType::MySQL.supports_returning());
        assert!(!DatabaseType::SQLite.supports_procedures());
    }
}
