//! sqlgate - SQL-over-HTTP gateway.
//!
//! Accepts SQL queries over HTTP, classifies them, and executes them against
//! configured SQLite databases. Read queries are open; anything else needs
//! an HMAC-signed API key.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod metrics;
pub mod policy;
pub mod registry;
pub mod telemetry;
