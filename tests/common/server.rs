//! Test server management.
//!
//! Runs the gateway inside the test process on `127.0.0.1:0`.

use sqlgate::config::Config;
use sqlgate::registry::EndpointRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Secret every test server signs keys with.
pub const SECRET: &str = "integration-secret-0123456789abcdef";

/// A running gateway.
pub struct TestServer {
    addr: SocketAddr,
    registry: Arc<EndpointRegistry>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    _data_dir: tempfile::TempDir,
}

impl TestServer {
    /// Two endpoints: `/sqlite/main` (open) and `/sqlite/guarded` (basic auth).
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_security(&format!(
            "secret_key = \"{SECRET}\"\nbasic_auth = \"admin:hunter2\""
        ))
        .await
    }

    /// Same endpoints as [`spawn`](Self::spawn) without a secret key.
    pub async fn spawn_without_secret() -> anyhow::Result<Self> {
        Self::spawn_with_security("basic_auth = \"admin:hunter2\"").await
    }

    async fn spawn_with_security(security: &str) -> anyhow::Result<Self> {
        let data_dir = tempfile::tempdir()?;
        let config_content = format!(
            r#"
[server]
listen = "127.0.0.1:0"
metrics_port = 0

[security]
{security}

[[endpoint]]
route = "/sqlite/main"
database = "{db}"

[[endpoint]]
route = "/sqlite/guarded"
database = ":memory:"
require_basic_auth = true
"#,
            db = data_dir.path().join("main.db").display(),
        );

        let config: Config = toml::from_str(&config_content)?;
        sqlgate::config::validate(&config)
            .map_err(|errors| anyhow::anyhow!("invalid test config: {errors:?}"))?;
        let registry = Arc::new(EndpointRegistry::from_config(&config).await?);

        let listener = TcpListener::bind(config.server.listen).await?;
        let addr = listener.local_addr()?;

        let (tx, rx) = oneshot::channel();
        let serve_registry = Arc::clone(&registry);
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = sqlgate::http::serve(listener, serve_registry, shutdown).await {
                eprintln!("test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            registry,
            shutdown: Some(tx),
            handle: Some(handle),
            _data_dir: data_dir,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Issue a key with the server's secret.
    pub fn issue_key(&self, subject: &str, days: u32, unlimited: bool) -> String {
        self.registry
            .authority()
            .issue(subject, days, unlimited)
            .expect("Failed to issue key")
    }

    /// Issue a key that expired `days_ago` days ago.
    pub fn issue_expired_key(&self, subject: &str, days_ago: u32) -> String {
        let issued_at = chrono::Utc::now().timestamp() - i64::from(days_ago + 1) * 86_400;
        self.registry
            .authority()
            .issue_at(subject, 1, false, issued_at)
            .expect("Failed to issue key")
    }

    /// Stop the server and wait for it to exit.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
