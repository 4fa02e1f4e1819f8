//! Configuration loading and management.
//!
//! - [`types`]: config struct definitions and environment overrides
//! - [`validation`]: startup checks

mod types;
mod validation;

pub use types::{
    Config, ConfigError, ENV_ALLOW_WEAK_SECRET, ENV_BASIC_AUTH, ENV_SECRET_KEY, EndpointConfig,
    SecurityConfig, ServerConfig,
};
pub use validation::{ValidationError, validate};
