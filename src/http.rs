//! HTTP surface.
//!
//! - `POST {route}` for every registered endpoint.
//! - `GET /` lists the endpoints (behind the transport credential, if one is
//!   configured).
//! - `/metrics` is served on its own port by [`run_metrics_server`].
//!
//! API keys are read from the JSON body's `api_key` field, falling back to
//! the `api-key` header.

use crate::error::GatewayError;
use crate::registry::{EndpointRegistry, QueryRequest, QueryResponse};
use crate::telemetry::spans;
use axum::extract::rejection::JsonRejection;
use axum::extract::{MatchedPath, State};
use axum::http::{HeaderMap, Uri, header};
use axum::routing::{MethodRouter, get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, warn};

/// Header carrying an API key when the body has none.
pub const API_KEY_HEADER: &str = "api-key";

#[derive(Clone)]
pub struct AppState {
    registry: Arc<EndpointRegistry>,
}

/// Build the router for every endpoint in `registry`.
pub fn router(registry: Arc<EndpointRegistry>) -> Router {
    let mut router = Router::new();
    let mut index_served = false;

    for route in registry.routes() {
        let mut methods: MethodRouter<AppState> = post(run_query);
        if route == "/" {
            methods = methods.get(index);
            index_served = true;
        }
        router = router.route(route, methods);
    }
    if !index_served {
        router = router.route("/", get(index));
    }

    router.fallback(not_found).with_state(AppState { registry })
}

/// Serve `registry` on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    registry: Arc<EndpointRegistry>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn run_query(
    State(state): State<AppState>,
    path: MatchedPath,
    headers: HeaderMap,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, GatewayError> {
    let route = path.as_str().to_owned();
    let span = spans::request(&route);

    async move {
        let authorization = header_str(&headers, header::AUTHORIZATION);

        let mut request = match payload {
            Ok(Json(request)) => request,
            Err(rejection) => {
                // Do not describe the body to callers who fail the transport check.
                let guarded = state
                    .registry
                    .get(&route)
                    .is_some_and(|endpoint| endpoint.requires_transport_auth());
                if guarded && !state.registry.check_transport(authorization) {
                    return Err(GatewayError::TransportAuth);
                }
                return Err(GatewayError::InvalidBody(rejection.body_text()));
            }
        };

        if request.presented_key().is_none()
            && let Some(key) = header_str(&headers, API_KEY_HEADER)
        {
            request.api_key = Some(key.to_string());
        }

        match state.registry.handle(&route, authorization, request).await {
            Ok(response) => Ok(Json(response)),
            Err(e) => {
                if let GatewayError::Execution(ref db_err) = e {
                    warn!(error = %db_err, "Query execution failed");
                }
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    if !state
        .registry
        .check_transport(header_str(&headers, header::AUTHORIZATION))
    {
        return Err(GatewayError::TransportAuth);
    }

    let endpoints: Vec<&str> = state.registry.routes().collect();
    Ok(Json(json!({
        "message": "POST {\"query\": ...} to one of the endpoints",
        "endpoints": endpoints,
        "api_keys": state.registry.authority().is_configured(),
    })))
}

async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::UnknownRoute(uri.path().to_string())
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `0.0.0.0:port` and serves the `/metrics` endpoint.
/// This is a long-running task that should be spawned in the background.
pub async fn run_metrics_server(port: u16) {
    let app = Router::new().route("/metrics", get(metrics_handler));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Prometheus HTTP server listening on {}", addr);

    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Metrics server error: {}", e);
    }
}
