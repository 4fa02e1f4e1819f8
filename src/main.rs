//! sqlgate - SQL-over-HTTP gateway.

use sqlgate::config::{Config, ENV_ALLOW_WEAK_SECRET, ValidationError, validate};
use sqlgate::registry::EndpointRegistry;
use sqlgate::{http, metrics};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    check_config(&config)?;

    info!(
        listen = %config.server.listen,
        endpoints = config.endpoints.len(),
        "Starting sqlgate"
    );

    if config.security.secret_key.is_none() {
        warn!("No secret_key configured: every presented API key will be refused");
    }

    let registry = Arc::new(EndpointRegistry::from_config(&config).await?);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_metrics_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    let listener = TcpListener::bind(config.server.listen).await?;
    info!(addr = %config.server.listen, "Listening for queries");

    http::serve(listener, registry, shutdown_signal()).await?;

    info!("Shut down");
    Ok(())
}

/// Log every validation error and refuse to start, unless the only problems
/// are ones the operator explicitly accepted.
fn check_config(config: &Config) -> anyhow::Result<()> {
    let Err(errors) = validate(config) else {
        return Ok(());
    };

    let allow_weak = std::env::var(ENV_ALLOW_WEAK_SECRET).is_ok();
    let mut fatal = 0;
    for e in &errors {
        if allow_weak && e.is_overridable() {
            warn!(
                "INSECURE: {} (allowed via {})",
                e, ENV_ALLOW_WEAK_SECRET
            );
            continue;
        }
        error!("Config error: {}", e);
        fatal += 1;
    }

    if errors.iter().any(|e| matches!(e, ValidationError::WeakSecretKey)) && !allow_weak {
        error!("  API keys are signed with security.secret_key; a short secret makes them forgeable.");
        error!("  Generate a secure secret with:");
        error!("    openssl rand -hex 32");
        error!("  For testing only, set {}=1 to bypass this check.", ENV_ALLOW_WEAK_SECRET);
    }

    if fatal > 0 {
        return Err(anyhow::anyhow!(
            "Refusing to start with {} configuration error(s). See error messages above.",
            fatal
        ));
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
