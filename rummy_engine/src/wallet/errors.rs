//! Wallet error types.

use thiserror::Error;
use uuid::Uuid;

use super::models::TableId;
use crate::errors::ErrorCode;
use crate::game::{Money, UserId};

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Balance below the requested hold
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientWallet { available: Money, required: Money },

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// An active hold already exists for this seat
    #[error("User {user_id} already holds funds at table {table_id}")]
    HoldExists { user_id: UserId, table_id: TableId },

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(Money),

    /// Unknown match outcome
    #[error("Match outcome {0} not found")]
    MatchNotFound(Uuid),

    /// Non-database storage failure
    #[error("Storage unavailable: {0}")]
    Storage(String),
}

impl WalletError {
    pub fn code(&self) -> ErrorCode {
        match self {
            WalletError::InsufficientWallet { .. } | WalletError::WalletNotFound(_) => {
                ErrorCode::InsufficientWallet
            }
            WalletError::HoldExists { .. } => ErrorCode::Conflict,
            WalletError::InvalidAmount(_) => ErrorCode::InvalidRequest,
            WalletError::MatchNotFound(_) => ErrorCode::NotFound,
            WalletError::Database(_) | WalletError::Storage(_) => ErrorCode::ServerError,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            // Sanitize database errors - don't expose SQL details
            WalletError::Database(_) | WalletError::Storage(_) => "Internal server error".to_string(),
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            WalletError::InsufficientWallet { .. } => "Insufficient wallet balance".to_string(),
            WalletError::HoldExists { .. } => "Funds already held for this table".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
