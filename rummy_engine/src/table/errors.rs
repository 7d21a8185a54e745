//! Table error types.

use thiserror::Error;

use crate::errors::{ErrorCode, ServiceError};
use crate::game::{GameError, UserId};
use crate::persistence::PersistenceError;
use crate::wallet::{TableId, WalletError};

/// Errors raised by matchmaking and table commands
#[derive(Debug, Error)]
pub enum TableError {
    #[error("boot value must be a positive integer, got {0:?}")]
    InvalidBootValue(String),

    #[error("tables seat 2-6 players, got {0}")]
    InvalidPlayerCount(usize),

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("Table {0} is closed")]
    TableClosed(TableId),

    #[error("Table is full")]
    TableFull,

    /// The join idempotency key was already processed
    #[error("Join request {0:?} already processed")]
    DuplicateJoin(String),

    #[error("User {0} is not seated at this table")]
    NotSeated(UserId),

    /// Seated, but not dealt into the current round
    #[error("User {0} is not playing the current round")]
    NotInRound(UserId),

    #[error("No round in progress")]
    NoGame,

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("Snapshot error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl TableError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TableError::InvalidBootValue(_) | TableError::InvalidPlayerCount(_) => {
                ErrorCode::InvalidRequest
            }
            TableError::TableNotFound(_) => ErrorCode::NotFound,
            TableError::TableFull
            | TableError::DuplicateJoin(_)
            | TableError::NotSeated(_)
            | TableError::NotInRound(_)
            | TableError::NoGame => ErrorCode::Conflict,
            TableError::Game(e) => e.code(),
            TableError::Wallet(e) => e.code(),
            TableError::TableClosed(_) | TableError::Persistence(_) => ErrorCode::ServerError,
        }
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            TableError::Wallet(e) => e.client_message(),
            TableError::Persistence(_) | TableError::TableClosed(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<&TableError> for ServiceError {
    fn from(err: &TableError) -> Self {
        ServiceError::new(err.code(), err.client_message())
    }
}

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;
