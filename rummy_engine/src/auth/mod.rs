//! Token verification for socket events.
//!
//! Tokens are issued elsewhere; this module only verifies them. Every event
//! that acts on behalf of a user carries a token whose `sub` claim must
//! match the user id in the event.

pub mod errors;
pub mod verifier;

pub use errors::{AuthError, AuthResult};
pub use verifier::{JwtVerifier, TokenClaims, TokenVerifier};
