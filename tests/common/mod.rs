//! Integration test common infrastructure.
//!
//! Provides an in-process gateway bound to an ephemeral port and a small
//! HTTP client for driving it.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{SECRET, TestServer};
