//! qscope API server with graceful shutdown

use axum::{middleware, Router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

use qscope_queue::{MemoryQueue, MemorySeed, QueueStore, TimeoutStore};

use crate::error::ApiError;
use crate::inspector::BatchOptions;
use crate::middleware::{cors_layer, request_id_middleware, timeout_layer, tracing_middleware};
use crate::routes::api_router;
use crate::state::AppState;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// Request timeout
    pub timeout: Duration,
    /// Deadline applied to every queue store call
    pub store_timeout: Duration,
    /// Per-key deletions in flight during a batch
    pub batch_concurrency: usize,
    /// Batch deletions report unresolved keys as failed after this
    pub batch_deadline: Duration,
    /// JSON fixture loaded into the in-memory store
    pub seed_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            timeout: Duration::from_secs(30),
            store_timeout: Duration::from_millis(5000),
            batch_concurrency: BatchOptions::DEFAULT_CONCURRENCY,
            batch_deadline: BatchOptions::DEFAULT_DEADLINE,
            seed_file: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = %name, value = %raw, "Ignoring malformed environment value");
            None
        }
    }
}

/// Positive integer setting; zero falls back to the default
fn env_positive(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    env_parse::<u64>(lookup, name).filter(|n| {
        if *n == 0 {
            tracing::warn!(var = %name, "Ignoring zero value");
        }
        *n > 0
    })
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create from any name-to-value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let port: u16 = env_parse(&lookup, "QSCOPE_PORT")
            .or_else(|| env_parse(&lookup, "PORT"))
            .unwrap_or(8080);

        let timeout = env_positive(&lookup, "QSCOPE_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let store_timeout = env_positive(&lookup, "QSCOPE_STORE_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.store_timeout);

        let batch_concurrency = env_parse::<usize>(&lookup, "QSCOPE_BATCH_CONCURRENCY")
            .filter(|n| *n > 0)
            .unwrap_or(defaults.batch_concurrency);

        let batch_deadline = env_positive(&lookup, "QSCOPE_BATCH_DEADLINE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.batch_deadline);

        let seed_file = lookup("QSCOPE_SEED_FILE")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            timeout,
            store_timeout,
            batch_concurrency,
            batch_deadline,
            seed_file,
        }
    }

    /// Batch deadline actually applied.
    ///
    /// Kept at 90% of the request timeout at most, so a batch always
    /// returns its partial result before the timeout layer answers 408.
    pub fn effective_batch_deadline(&self) -> Duration {
        let ceiling = self.timeout.saturating_sub(self.timeout / 10);
        if self.batch_deadline > ceiling {
            tracing::warn!(
                batch_deadline_ms = self.batch_deadline.as_millis() as u64,
                timeout_ms = self.timeout.as_millis() as u64,
                clamped_ms = ceiling.as_millis() as u64,
                "Batch deadline exceeds request timeout, clamping"
            );
            ceiling
        } else {
            self.batch_deadline
        }
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            concurrency: self.batch_concurrency,
            deadline: Some(self.effective_batch_deadline()),
        }
    }
}

/// qscope API Server
pub struct QscopeServer {
    config: ServerConfig,
    app_state: AppState,
}

impl QscopeServer {
    /// Create a server backed by the in-memory store, seeded from
    /// `config.seed_file` when one is set
    pub async fn new(config: ServerConfig) -> Result<Self, ApiError> {
        let memory = match &config.seed_file {
            Some(path) => {
                let raw = tokio::fs::read(path).await?;
                let seed: MemorySeed = serde_json::from_slice(&raw).map_err(|e| {
                    ApiError::Internal(format!("Invalid seed file {}: {}", path.display(), e))
                })?;
                tracing::info!(
                    path = %path.display(),
                    queues = seed.queues.len(),
                    "Loaded queue seed"
                );
                MemoryQueue::from_seed(seed).await
            }
            None => {
                tracing::warn!("QSCOPE_SEED_FILE not set, starting with an empty in-memory store");
                MemoryQueue::new()
            }
        };

        let store: Arc<dyn QueueStore> = Arc::new(TimeoutStore::new(memory, config.store_timeout));
        Ok(Self::with_store(config, store))
    }

    /// Create a server over an existing store handle
    pub fn with_store(config: ServerConfig, store: Arc<dyn QueueStore>) -> Self {
        let app_state = AppState::new(store, config.batch_options());
        Self { config, app_state }
    }

    /// Get the configured router
    pub fn router(&self) -> Router {
        api_router(self.app_state.clone())
            // Timeout
            .layer(timeout_layer(self.config.timeout))
            // CORS
            .layer(cors_layer())
            // Tracing
            .layer(middleware::from_fn(tracing_middleware))
            // Request ID (outermost - runs first)
            .layer(middleware::from_fn(request_id_middleware))
    }

    /// Run the server with graceful shutdown
    pub async fn run(self) -> Result<(), ApiError> {
        let app = self.router();
        let addr = self.config.addr;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("qscope API listening on http://{}", addr);

        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Initialize tracing subscriber
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,qscope=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.batch_options(), BatchOptions::default());
    }

    fn config_from(vars: &[(&str, &str)]) -> ServerConfig {
        let vars: std::collections::HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_config_from_lookup() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("QSCOPE_TIMEOUT_SECS", "60"),
            ("QSCOPE_BATCH_CONCURRENCY", "2"),
            ("QSCOPE_SEED_FILE", "/tmp/seed.json"),
        ]);
        assert_eq!(config.addr.port(), 9000);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.seed_file, Some(PathBuf::from("/tmp/seed.json")));

        let config = config_from(&[("QSCOPE_PORT", "7000"), ("PORT", "9000")]);
        assert_eq!(config.addr.port(), 7000);
    }

    #[test]
    fn test_zero_and_malformed_values_fall_back() {
        let config = config_from(&[
            ("QSCOPE_BATCH_DEADLINE_SECS", "0"),
            ("QSCOPE_TIMEOUT_SECS", "0"),
            ("QSCOPE_STORE_TIMEOUT_MS", "soon"),
            ("QSCOPE_BATCH_CONCURRENCY", "0"),
        ]);
        assert_eq!(config.batch_deadline, BatchOptions::DEFAULT_DEADLINE);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.store_timeout, Duration::from_secs(5));
        assert_eq!(config.batch_concurrency, BatchOptions::DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_batch_deadline_clamped_below_request_timeout() {
        let config = config_from(&[("QSCOPE_TIMEOUT_SECS", "10")]);
        assert_eq!(config.batch_options().deadline, Some(Duration::from_secs(9)));

        let config = ServerConfig {
            timeout: Duration::from_millis(200),
            ..Default::default()
        };
        assert_eq!(config.batch_options().deadline, Some(Duration::from_millis(180)));

        // Defaults already leave headroom
        assert_eq!(
            ServerConfig::default().batch_options().deadline,
            Some(BatchOptions::DEFAULT_DEADLINE)
        );
    }

    #[tokio::test]
    async fn test_server_loads_seed_file() {
        let path = std::env::temp_dir().join(format!("qscope-seed-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"{"queues":[{"name":"critical","tasks":[{"id":"t1","queue":"","type":"email:send","state":"pending"}]}]}"#,
        )
        .await
        .unwrap();

        let config = ServerConfig {
            seed_file: Some(path.clone()),
            ..Default::default()
        };
        let server = QscopeServer::new(config).await.unwrap();
        let stats = server
            .app_state
            .inspector()
            .queue_stats("critical")
            .await
            .unwrap();
        assert_eq!(stats.pending, 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_seed_file_is_an_error() {
        let config = ServerConfig {
            seed_file: Some(PathBuf::from("/nonexistent/qscope-seed.json")),
            ..Default::default()
        };
        assert!(matches!(
            QscopeServer::new(config).await,
            Err(ApiError::Internal(_))
        ));
    }
}
