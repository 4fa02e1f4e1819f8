//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use crate::auth::{TransportCredential, is_weak_secret};
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no [[endpoint]] blocks configured")]
    NoEndpoints,
    #[error("endpoint route {0:?} must start with '/' and must not contain ':', '*', '{{' or '}}'")]
    InvalidRoute(String),
    #[error("endpoint route {0} is configured more than once")]
    DuplicateRoute(String),
    #[error("endpoint {0} has an empty database path")]
    EmptyDatabase(String),
    #[error("security.basic_auth must be in format 'username:password'")]
    InvalidBasicAuth,
    #[error("endpoint {0} sets require_basic_auth but security.basic_auth is not configured")]
    BasicAuthNotConfigured(String),
    #[error("security.secret_key is shorter than 32 bytes")]
    WeakSecretKey,
}

impl ValidationError {
    /// Errors an operator may explicitly accept.
    pub fn is_overridable(&self) -> bool {
        matches!(self, Self::WeakSecretKey)
    }
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.endpoints.is_empty() {
        errors.push(ValidationError::NoEndpoints);
    }

    let mut seen = HashSet::new();
    for endpoint in &config.endpoints {
        let route = &endpoint.route;
        if !route.starts_with('/') || route.contains([':', '*', '{', '}']) {
            errors.push(ValidationError::InvalidRoute(route.clone()));
        }
        if !seen.insert(route.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.clone()));
        }
        if endpoint.database.trim().is_empty() {
            errors.push(ValidationError::EmptyDatabase(route.clone()));
        }
        if endpoint.require_basic_auth && config.security.basic_auth.is_none() {
            errors.push(ValidationError::BasicAuthNotConfigured(route.clone()));
        }
    }

    if let Some(ref credential) = config.security.basic_auth
        && TransportCredential::parse(credential).is_err()
    {
        errors.push(ValidationError::InvalidBasicAuth);
    }

    if let Some(ref secret) = config.security.secret_key
        && is_weak_secret(secret)
    {
        errors.push(ValidationError::WeakSecretKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
