//! Verification of event tokens issued by the external auth service.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use super::errors::{AuthError, AuthResult};
use crate::game::UserId;

/// JWT claims carried by event tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// User ID
    pub sub: UserId,
    /// Expiration timestamp
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Checks that a token is valid and belongs to the claimed user.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> AuthResult<TokenClaims>;

    /// Verifies `token` and requires its subject to be `user_id`.
    fn verify_user(&self, token: &str, user_id: UserId) -> AuthResult<TokenClaims> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let claims = self.verify(token)?;
        if claims.sub != user_id {
            return Err(AuthError::UserMismatch {
                token_user: claims.sub,
                claimed_user: user_id,
            });
        }
        Ok(claims)
    }
}

/// HS256 verifier sharing a secret with the auth service
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenVerifier for JwtVerifier {
    /// Verify an access token
    ///
    /// # Arguments
    ///
    /// * `token` - JWT access token
    ///
    /// # Returns
    ///
    /// * `AuthResult<TokenClaims>` - Decoded claims or error
    fn verify(&self, token: &str) -> AuthResult<TokenClaims> {
        let token_data = decode::<TokenClaims>(token, &self.key, &self.validation)?;
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret-with-enough-length-0123456789";

    fn token(sub: UserId, exp_offset: i64, secret: &str) -> String {
        let claims = TokenClaims {
            sub,
            exp: Utc::now().timestamp() + exp_offset,
            iat: Some(Utc::now().timestamp()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let verifier = JwtVerifier::new(SECRET);
        let claims = verifier.verify_user(&token(42, 3600, SECRET), 42).unwrap();
        assert_eq!(claims.sub, 42);
    }

    #[test]
    fn test_token_for_other_user() {
        let verifier = JwtVerifier::new(SECRET);
        let err = verifier.verify_user(&token(42, 3600, SECRET), 7).unwrap_err();
        assert!(matches!(err, AuthError::UserMismatch { .. }));
    }

    #[test]
    fn test_expired_and_forged_tokens() {
        let verifier = JwtVerifier::new(SECRET);
        assert!(verifier.verify(&token(42, -3600, SECRET)).is_err());
        assert!(verifier.verify(&token(42, 3600, "another-secret-entirely-000000")).is_err());
        assert!(matches!(verifier.verify_user("", 42), Err(AuthError::MissingToken)));
    }
}
