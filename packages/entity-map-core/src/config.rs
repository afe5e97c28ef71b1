//! Database configuration.

use crate::transaction::IsolationLevel;

/// Database configuration shared by sessions and the storage collaborator.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Isolation level used for implicit flush transactions
    pub default_isolation: IsolationLevel,
    /// Statement timeout in milliseconds, delegated to the storage collaborator
    pub statement_timeout_ms: u64,
    /// Initial row capacity per table
    pub initial_table_capacity: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            default_isolation: IsolationLevel::ReadCommitted,
            statement_timeout_ms: 5000, // 5 seconds default
            initial_table_capacity: 1024,
        }
    }
}
