//! Transaction context state machine.

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// Isolation level forwarded verbatim to the storage collaborator.
///
/// The core does not implement isolation itself; it only guarantees that
/// all writes within an active context go through the same scoped
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Lifecycle state of a transaction context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    None,
    Active,
    Committed,
    RolledBack,
}

/// Per-session transaction context.
///
/// States: none -> active -> (committed | rolled back), terminal at the
/// last two. Sessions swap in a fresh context for each transaction.
#[derive(Debug)]
pub struct TransactionContext {
    state: TxState,
    isolation: Option<IsolationLevel>,
}

impl TransactionContext {
    /// Creates a context with no transaction.
    pub fn new() -> Self {
        Self {
            state: TxState::None,
            isolation: None,
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// Returns the isolation level of the current or finished transaction.
    pub fn isolation(&self) -> Option<IsolationLevel> {
        self.isolation
    }

    /// Returns `true` while a transaction is active.
    pub fn is_active(&self) -> bool {
        self.state == TxState::Active
    }

    /// Transitions none -> active.
    ///
    /// # Returns
    /// `Result<(), DbError>` failing with `AlreadyActive` unless the context
    /// is fresh.
    pub fn begin(&mut self, isolation: IsolationLevel) -> Result<(), DbError> {
        if self.state != TxState::None {
            return Err(DbError::AlreadyActive);
        }
        self.state = TxState::Active;
        self.isolation = Some(isolation);
        Ok(())
    }

    /// Transitions active -> committed (terminal).
    pub fn commit(&mut self) -> Result<(), DbError> {
        if !self.is_active() {
            return Err(DbError::NotActive);
        }
        self.state = TxState::Committed;
        Ok(())
    }

    /// Transitions active -> rolled back (terminal).
    pub fn rollback(&mut self) -> Result<(), DbError> {
        if !self.is_active() {
            return Err(DbError::NotActive);
        }
        self.state = TxState::RolledBack;
        Ok(())
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}
