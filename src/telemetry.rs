//! Telemetry utilities for request timing and tracing spans.

use std::time::Instant;

/// Guard for timing a query request and recording its latency.
///
/// Records when dropped.
pub struct QueryTimer {
    route: String,
    start: Instant,
}

impl QueryTimer {
    /// Start timing a request to `route`.
    pub fn new(route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_latency(&self.route, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one HTTP request, tagged with a fresh request id.
    pub fn request(route: &str) -> Span {
        let request_id = uuid::Uuid::new_v4();
        info_span!("request", route = %route, request_id = %request_id)
    }
}
