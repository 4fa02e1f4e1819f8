//! HTTP Basic transport credential.
//!
//! A single process-wide `username:password` pair that gates the service
//! banner and, per endpoint, query routes. It is separate from API keys.
//! Only the password is compared; the username a client sends is ignored.

use base64::prelude::*;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Errors parsing an `Authorization` header or a configured credential.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BasicAuthError {
    #[error("authorization header must start with 'Basic '")]
    MissingScheme,
    #[error("invalid base64 in credentials")]
    InvalidBase64,
    #[error("invalid UTF-8 in credentials")]
    InvalidUtf8,
    #[error("credentials must be in format 'username:password'")]
    MissingSeparator,
}

/// Parse `Authorization: Basic <base64(username:password)>`.
///
/// The password may itself contain colons; only the first one separates.
pub fn parse_basic_auth_header(header: &str) -> Result<(String, String), BasicAuthError> {
    let encoded = header
        .strip_prefix("Basic ")
        .ok_or(BasicAuthError::MissingScheme)?;

    let bytes = BASE64_STANDARD
        .decode(encoded.trim().as_bytes())
        .map_err(|_| BasicAuthError::InvalidBase64)?;
    let decoded = String::from_utf8(bytes).map_err(|_| BasicAuthError::InvalidUtf8)?;

    split_credentials(&decoded)
}

fn split_credentials(credentials: &str) -> Result<(String, String), BasicAuthError> {
    let (username, password) = credentials
        .split_once(':')
        .ok_or(BasicAuthError::MissingSeparator)?;
    Ok((username.to_string(), password.to_string()))
}

/// The configured transport credential.
#[derive(Clone)]
pub struct TransportCredential {
    username: String,
    password: String,
}

impl TransportCredential {
    /// Parse the configured `username:password` string.
    pub fn parse(configured: &str) -> Result<Self, BasicAuthError> {
        let (username, password) = split_credentials(configured)?;
        Ok(Self { username, password })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check an `Authorization` header value.
    ///
    /// Exact, case-sensitive password match. A missing or unparseable header
    /// fails.
    pub fn check(&self, header: Option<&str>) -> bool {
        let Some(header) = header else {
            return false;
        };
        match parse_basic_auth_header(header) {
            Ok((_, password)) => bool::from(password.as_bytes().ct_eq(self.password.as_bytes())),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for TransportCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportCredential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
