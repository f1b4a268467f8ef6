//! API Server
//!
//! Serves the REST API with peer address information attached to every
//! request, so registrations can record the caller's address.

use crate::error::{Error, Result};
use crate::state::InstanceRegistry;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

use super::rest::RestRouter;

/// Default REST API port
pub const DEFAULT_API_PORT: u16 = 3000;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// REST API bind address
    pub rest_addr: SocketAddr,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            rest_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_API_PORT)),
        }
    }
}

// =============================================================================
// API Server
// =============================================================================

/// REST API server for instance registration
pub struct ApiServer {
    config: ApiServerConfig,
    registry: InstanceRegistry,
    shutdown_tx: broadcast::Sender<()>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: ApiServerConfig, registry: InstanceRegistry) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            shutdown_tx,
        }
    }

    /// Run the API server until shutdown
    pub async fn run(&self) -> Result<()> {
        info!("Starting instance registration API");
        info!("  REST API: {}", self.config.rest_addr);

        let rest_handle = self.spawn_rest_server();

        match rest_handle.await {
            Ok(result) => result,
            Err(e) => {
                error!("REST server task failed: {:?}", e);
                Err(Error::Internal(format!("REST server task failed: {}", e)))
            }
        }
    }

    /// Spawn the REST server
    fn spawn_rest_server(&self) -> tokio::task::JoinHandle<Result<()>> {
        let addr = self.config.rest_addr;
        let registry = self.registry.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move { run_rest_server(addr, registry, shutdown_rx).await })
    }

    /// Trigger graceful shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Bind and run the REST API server
async fn run_rest_server(
    addr: SocketAddr,
    registry: InstanceRegistry,
    shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Configuration(format!("Failed to bind REST server on {}: {}", addr, e)))?;

    info!("REST API listening on {}", addr);
    serve(listener, registry, shutdown_rx).await
}

/// Serve the REST API on an already bound listener
pub async fn serve(
    listener: TcpListener,
    registry: InstanceRegistry,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let app = RestRouter::new(registry).build();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("REST server shutting down");
    })
    .await
    .map_err(|e| Error::Internal(format!("REST server error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::state::{PersistConfig, PersistedState};
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[test]
    fn test_default_config() {
        let config = ApiServerConfig::default();
        assert_eq!(config.rest_addr.port(), 3000);
        assert!(config.rest_addr.ip().is_unspecified());
    }

    async fn raw_request(addr: SocketAddr, request: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        String::from_utf8(response).unwrap()
    }

    #[tokio::test]
    async fn test_register_records_peer_address() {
        let tmp = TempDir::new().unwrap();
        let registry = InstanceRegistry::new(
            PersistedState::default(),
            PersistConfig {
                path: tmp.path().join("statefile.json"),
            },
            Metrics::new().unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let server = tokio::spawn(serve(listener, registry.clone(), shutdown_rx));

        let response = raw_request(
            addr,
            "POST /register?mac_address=52:54:00:12:34:56 HTTP/1.1\r\n\
             Host: localhost\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.ends_with("{}"));
        assert_eq!(
            registry
                .snapshot_addresses()
                .get("52:54:00:12:34:56")
                .map(String::as_str),
            Some("127.0.0.1")
        );

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
