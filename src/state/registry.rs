//! Instance Registry
//!
//! Ties the [`StateStore`] to its [`Persister`]: every mutation is applied in
//! memory first and then schedules a persist. In-memory state stays
//! authoritative whether or not the write succeeds.

use crate::metrics::Metrics;
use crate::state::persist::{PersistConfig, Persister};
use crate::state::store::{AddressTable, InstanceConfig, PersistedState, StateStore};
use std::sync::Arc;
use tracing::debug;

/// Registration and configuration state shared by the API handlers
#[derive(Clone)]
pub struct InstanceRegistry {
    store: Arc<StateStore>,
    persister: Arc<Persister>,
    metrics: Metrics,
}

impl InstanceRegistry {
    /// Build a registry over `initial` state
    pub fn new(initial: PersistedState, config: PersistConfig, metrics: Metrics) -> Self {
        let store = Arc::new(StateStore::from_persisted(initial));
        metrics.instances.set(store.instance_count() as i64);
        let persister = Persister::new(config, store.clone(), metrics.clone());

        Self {
            store,
            persister,
            metrics,
        }
    }

    /// Load the state file named by `config` and build a registry over it
    pub async fn load(config: PersistConfig, metrics: Metrics) -> Self {
        let initial = PersistedState::load(&config.path).await;
        Self::new(initial, config, metrics)
    }

    /// Record the address of `identity` and schedule a persist
    pub fn register_address(&self, identity: &str, address: &str) {
        if self.store.register_address(identity, address) {
            self.metrics.instances.inc();
        }
        self.metrics.registrations.inc();
        debug!(mac_address = %identity, ip = %address, "Address recorded");
        self.persister.persist_async();
    }

    /// Configuration for `identity`, if any was assigned
    pub fn get_config(&self, identity: &str) -> Option<InstanceConfig> {
        self.store.get_config(identity)
    }

    /// Configuration for `identity`, or an empty one
    pub fn lookup_config(&self, identity: &str) -> InstanceConfig {
        self.store.lookup_config(identity)
    }

    /// Replace the configuration of `identity` and schedule a persist
    pub fn set_config(&self, identity: &str, config: InstanceConfig) {
        self.store.set_config(identity, config);
        self.metrics.config_updates.inc();
        self.persister.persist_async();
    }

    /// Copy of the address table
    pub fn snapshot_addresses(&self) -> AddressTable {
        self.store.snapshot_addresses()
    }

    /// Underlying persister
    pub fn persister(&self) -> &Arc<Persister> {
        &self.persister
    }
}
