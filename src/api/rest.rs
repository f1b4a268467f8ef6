//! REST API Handlers
//!
//! Implements the registration, configuration and listing endpoints.

use crate::error::Error;
use crate::state::{InstanceConfig, InstanceRegistry};
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

// =============================================================================
// Request Types
// =============================================================================

/// Query string carried by `/register` and `/set_instance_env`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceQuery {
    /// NIC hardware address identifying the instance
    #[serde(default)]
    pub mac_address: Option<String>,
}

impl InstanceQuery {
    fn identity(&self) -> Result<&str, Error> {
        self.mac_address
            .as_deref()
            .ok_or(Error::MissingParameter("mac_address"))
    }
}

// =============================================================================
// REST Router
// =============================================================================

/// REST API router builder
pub struct RestRouter {
    registry: InstanceRegistry,
}

impl RestRouter {
    /// Create a new REST router
    pub fn new(registry: InstanceRegistry) -> Self {
        Self { registry }
    }

    /// Build the Axum router
    pub fn build(self) -> Router {
        let state = AppState {
            registry: self.registry,
        };

        Router::new()
            // Instance endpoints
            .route("/register", post(register_instance))
            .route("/set_instance_env", post(set_instance_env))
            .route("/instances", get(list_instances))
            // Health endpoint
            .route("/health", get(health_check))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    registry: InstanceRegistry,
}

// =============================================================================
// Handlers
// =============================================================================

/// Register a booting instance and reply with its configuration
async fn register_instance(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<InstanceQuery>,
) -> Response {
    let Some(ConnectInfo(peer)) = peer else {
        error!(
            mac_address = ?query.mac_address,
            "Could not parse remote addr into ip/port combination"
        );
        return error_response(Error::MissingPeerAddress);
    };

    let identity = match query.identity() {
        Ok(identity) => identity,
        Err(e) => {
            warn!(peer = %peer, "Registration without mac_address");
            return error_response(e);
        }
    };

    let instance_ip = peer_ip(peer).to_string();
    info!(ip = %instance_ip, mac_address = %identity, "Instance registered");
    state.registry.register_address(identity, &instance_ip);

    let config = match state.registry.get_config(identity) {
        Some(config) => config,
        None => {
            error!(mac_address = %identity, "No env set for instance, replying with empty map");
            InstanceConfig::new()
        }
    };

    debug!(mac_address = %identity, env = ?config, "Responding with instance env");
    (StatusCode::OK, Json(config)).into_response()
}

/// Assign the configuration handed to an instance when it registers
async fn set_instance_env(
    State(state): State<AppState>,
    Query(query): Query<InstanceQuery>,
    body: Bytes,
) -> Response {
    let identity = match query.identity() {
        Ok(identity) => identity,
        Err(e) => return error_response(e),
    };

    let config = match parse_config_document(&body) {
        Ok(config) => config,
        Err(e) => {
            warn!(mac_address = %identity, error = %e, "Rejected instance env");
            return error_response(e);
        }
    };

    info!(mac_address = %identity, env = ?config, "Env set for instance");
    state.registry.set_config(identity, config);

    (StatusCode::OK, "success\n").into_response()
}

/// List every registered instance address
async fn list_instances(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.registry.snapshot_addresses()))
}

/// Health check
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Parse a flat JSON string→string document
fn parse_config_document(body: &[u8]) -> Result<InstanceConfig, Error> {
    serde_json::from_slice(body).map_err(|e| Error::InvalidConfigDocument {
        payload: String::from_utf8_lossy(body).into_owned(),
        reason: e.to_string(),
    })
}

/// Peer IP without the port; IPv4-mapped IPv6 peers are reported as IPv4
fn peer_ip(peer: SocketAddr) -> IpAddr {
    peer.ip().to_canonical()
}

/// Plain-text error reply; malformed requests get 400, anything else 500
fn error_response(err: Error) -> Response {
    let status = if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, format!("{}\n", err)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use crate::state::{PersistConfig, PersistedState};
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use std::net::Ipv6Addr;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_registry(tmp: &TempDir) -> InstanceRegistry {
        InstanceRegistry::new(
            PersistedState::default(),
            PersistConfig {
                path: tmp.path().join("statefile.json"),
            },
            Metrics::new().unwrap(),
        )
    }

    fn test_app(registry: &InstanceRegistry) -> Router {
        RestRouter::new(registry.clone())
            .build()
            .layer(MockConnectInfo(SocketAddr::from(([10, 0, 0, 7], 41000))))
    }

    async fn send(app: Router, method: &str, uri: &str, body: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_register_without_config_returns_empty() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);

        let (status, body) = send(test_app(&registry), "POST", "/register?mac_address=X", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{}");
        assert_eq!(
            registry.snapshot_addresses().get("X").map(String::as_str),
            Some("10.0.0.7")
        );
    }

    #[tokio::test]
    async fn test_set_env_then_register() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);

        let (status, body) = send(
            test_app(&registry),
            "POST",
            "/set_instance_env?mac_address=X",
            r#"{"FOO":"BAR"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success\n");

        let (status, body) = send(test_app(&registry), "POST", "/register?mac_address=X", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"FOO":"BAR"}"#);
    }

    #[tokio::test]
    async fn test_malformed_env_keeps_previous_config() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);
        let mut env = InstanceConfig::new();
        env.insert("FOO".into(), "BAR".into());
        registry.set_config("X", env.clone());

        let (status, body) = send(
            test_app(&registry),
            "POST",
            "/set_instance_env?mac_address=X",
            r#"{"FOO": 1"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains(r#"{"FOO": 1"#));
        assert_eq!(registry.lookup_config("X"), env);
    }

    #[tokio::test]
    async fn test_non_string_values_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);

        let (status, _) = send(
            test_app(&registry),
            "POST",
            "/set_instance_env?mac_address=X",
            r#"{"PORT": 8080}"#,
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(registry.get_config("X").is_none());
    }

    #[tokio::test]
    async fn test_list_instances() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);
        registry.register_address("mac-1", "10.0.0.8");

        send(test_app(&registry), "POST", "/register?mac_address=mac-2", "").await;
        let (status, body) = send(test_app(&registry), "GET", "/instances", "").await;

        assert_eq!(status, StatusCode::OK);
        let listed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            listed,
            serde_json::json!({ "mac-1": "10.0.0.8", "mac-2": "10.0.0.7" })
        );
    }

    #[tokio::test]
    async fn test_register_without_peer_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);
        let app = RestRouter::new(registry.clone()).build();

        let (status, _) = send(app, "POST", "/register?mac_address=X", "").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(registry.snapshot_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_register_without_identity_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);

        let (status, body) = send(test_app(&registry), "POST", "/register", "").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("mac_address"));
        assert!(registry.snapshot_addresses().is_empty());
    }

    #[tokio::test]
    async fn test_health() {
        let tmp = TempDir::new().unwrap();
        let registry = test_registry(&tmp);

        let (status, body) = send(test_app(&registry), "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_error_response_status() {
        let response = error_response(Error::MissingParameter("mac_address"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = error_response(Error::Internal("encoder failed".into()));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"Internal error: encoder failed\n");
    }

    #[test]
    fn test_peer_ip_strips_port_and_mapping() {
        let v4 = SocketAddr::from(([192, 168, 1, 20], 51234));
        assert_eq!(peer_ip(v4).to_string(), "192.168.1.20");

        let mapped = SocketAddr::from((Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, 0x0a00, 0x0007), 80));
        assert_eq!(peer_ip(mapped).to_string(), "10.0.0.7");
    }
}
