//! Unik Instance Listener
//!
//! Discovery and bootstrap-configuration service for freshly launched VM
//! instances on a private network.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Instance Listener                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐            ┌────────────────────────────┐  │
//! │  │  Beacon          │  udp:9876  │  REST API (:3000)          │  │
//! │  │  "unik:<ip>"     │ ─────────► │  /register                 │  │
//! │  │  every 2s        │  instances │  /set_instance_env         │  │
//! │  └──────────────────┘            │  /instances                │  │
//! │                                  └─────────────┬──────────────┘  │
//! │                                                │                  │
//! │                              ┌─────────────────┴───────────────┐ │
//! │                              │  Instance Registry              │ │
//! │                              │  addresses (RwLock)             │ │
//! │                              │  configs   (RwLock)             │ │
//! │                              └─────────────────┬───────────────┘ │
//! │                                                │ persist_async    │
//! │                              ┌─────────────────┴───────────────┐ │
//! │                              │  Persister → statefile.json     │ │
//! │                              └─────────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`api`]: REST API server and handlers
//! - [`beacon`]: Host address discovery and the subnet broadcast beacon
//! - [`state`]: Instance state store and persistence
//! - [`metrics`]: Prometheus metrics
//! - [`error`]: Error types and handling

pub mod api;
pub mod beacon;
pub mod error;
pub mod metrics;
pub mod state;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, RestRouter};

pub use beacon::{
    BeaconBroadcaster, BeaconConfig, BeaconTransport, HostAddress, UdpBeaconTransport,
};

pub use error::{Error, Result};

pub use metrics::Metrics;

pub use state::{
    InstanceConfig, InstanceRegistry, PersistConfig, PersistedState, Persister, StateStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
