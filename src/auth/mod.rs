//! Caller authentication.
//!
//! - [`token`]: stateless signed API keys ([`TokenAuthority`]).
//! - [`basic`]: the optional HTTP Basic transport credential.

pub mod basic;
pub mod token;

pub use basic::{BasicAuthError, TransportCredential, parse_basic_auth_header};
pub use token::{
    SecretKey, TokenAuthority, TokenClaims, TokenError, Verification, is_weak_secret,
};
