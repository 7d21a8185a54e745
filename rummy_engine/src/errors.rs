//! Shared error taxonomy delivered to clients in ack payloads.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Numeric error codes shared by every client-facing failure.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed payload or illegal game action
    InvalidRequest,
    /// Bad or missing credentials
    Unauthorized,
    /// Hold cannot be placed
    InsufficientWallet,
    /// Unknown table or game
    NotFound,
    /// Out-of-turn action, duplicate join, double settlement attempt
    Conflict,
    /// Event dropped by the per-socket throttle
    RateLimited,
    /// Unexpected failure or persistence unavailable
    ServerError,
}

impl ErrorCode {
    /// Numeric value sent on the wire.
    pub fn as_u16(self) -> u16 {
        match self {
            ErrorCode::InvalidRequest => 4000,
            ErrorCode::Unauthorized => 4010,
            ErrorCode::InsufficientWallet => 4020,
            ErrorCode::NotFound => 4040,
            ErrorCode::Conflict => 4090,
            ErrorCode::RateLimited => 4290,
            ErrorCode::ServerError => 5000,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::InsufficientWallet => "INSUFFICIENT_WALLET",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::RateLimited => "RATE_LIMITED",
            ErrorCode::ServerError => "SERVER_ERROR",
        };
        write!(f, "{repr}")
    }
}

/// A failure already reduced to its client-facing form.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{code}: {message}")]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            ErrorCode::InvalidRequest,
            ErrorCode::Unauthorized,
            ErrorCode::InsufficientWallet,
            ErrorCode::NotFound,
            ErrorCode::Conflict,
            ErrorCode::RateLimited,
            ErrorCode::ServerError,
        ];
        let unique: std::collections::HashSet<u16> = codes.iter().map(|c| c.as_u16()).collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn test_service_error_display() {
        let err = ServiceError::conflict("not your turn");
        assert_eq!(err.to_string(), "CONFLICT: not your turn");
    }
}
