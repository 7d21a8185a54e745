//! Authentication error types.

use thiserror::Error;

use crate::errors::ErrorCode;
use crate::game::UserId;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// JWT token error
    #[error("JWT error: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    /// Token is valid but issued for another user
    #[error("Token subject {token_user} does not match user {claimed_user}")]
    UserMismatch {
        token_user: UserId,
        claimed_user: UserId,
    },

    /// No token supplied
    #[error("Missing token")]
    MissingToken,
}

impl AuthError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Unauthorized
    }

    /// Get a client-safe error message
    pub fn client_message(&self) -> String {
        match self {
            AuthError::JwtError(_) => "Invalid token".to_string(),
            AuthError::UserMismatch { .. } => "Token does not belong to this user".to_string(),
            AuthError::MissingToken => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
