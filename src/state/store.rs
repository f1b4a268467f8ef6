//! Instance State Store
//!
//! Holds the identity→address and identity→configuration tables. The two
//! tables are guarded by independent reader/writer locks so a reader of one
//! is never blocked by a writer of the other.

use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{info, warn};

// =============================================================================
// Types
// =============================================================================

/// Environment-style configuration assigned to one instance
pub type InstanceConfig = BTreeMap<String, String>;

/// Identity → address table
pub type AddressTable = BTreeMap<String, String>;

/// Identity → configuration table
pub type ConfigTable = BTreeMap<String, InstanceConfig>;

/// On-disk form of the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(rename = "Ips", default)]
    pub addresses: AddressTable,
    #[serde(rename = "Envs", default)]
    pub configs: ConfigTable,
}

impl PersistedState {
    /// Read persisted state from `path`.
    ///
    /// A missing or malformed file yields an empty state; both cases are
    /// logged and never fatal.
    pub async fn load(path: &Path) -> Self {
        let data = match tokio::fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "No state file found, maybe this is first boot");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read state file");
                return Self::default();
            }
        };

        match Self::from_slice(&data) {
            Ok(state) => {
                info!(
                    path = %path.display(),
                    instances = state.addresses.len(),
                    configs = state.configs.len(),
                    "Loaded state file"
                );
                state
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to parse state file, starting empty");
                Self::default()
            }
        }
    }

    /// Parse a persisted state document
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Serialize to the persisted JSON document
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

// =============================================================================
// State Store
// =============================================================================

/// Concurrent in-memory store for instance addresses and configuration
#[derive(Debug, Default)]
pub struct StateStore {
    addresses: RwLock<AddressTable>,
    configs: RwLock<ConfigTable>,
}

impl StateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store hydrated from persisted state
    pub fn from_persisted(state: PersistedState) -> Self {
        Self {
            addresses: RwLock::new(state.addresses),
            configs: RwLock::new(state.configs),
        }
    }

    /// Insert or overwrite the address for `identity`.
    ///
    /// Returns `true` when `identity` was not registered before.
    pub fn register_address(&self, identity: &str, address: &str) -> bool {
        self.addresses
            .write()
            .insert(identity.to_string(), address.to_string())
            .is_none()
    }

    /// Configuration for `identity`, if any has been assigned
    pub fn get_config(&self, identity: &str) -> Option<InstanceConfig> {
        self.configs.read().get(identity).cloned()
    }

    /// Configuration for `identity`, or an empty one
    pub fn lookup_config(&self, identity: &str) -> InstanceConfig {
        self.get_config(identity).unwrap_or_default()
    }

    /// Replace the configuration for `identity`
    pub fn set_config(&self, identity: &str, config: InstanceConfig) {
        self.configs.write().insert(identity.to_string(), config);
    }

    /// Copy of the full address table
    pub fn snapshot_addresses(&self) -> AddressTable {
        self.addresses.read().clone()
    }

    /// Copy of both tables for persistence
    pub fn snapshot(&self) -> PersistedState {
        let addresses = self.snapshot_addresses();
        let configs = self.configs.read().clone();
        PersistedState { addresses, configs }
    }

    /// Number of registered identities
    pub fn instance_count(&self) -> usize {
        self.addresses.read().len()
    }
}
