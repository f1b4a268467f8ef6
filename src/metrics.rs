//! Listener Metrics
//!
//! Prometheus counters for registrations, configuration updates, persistence
//! and beacon traffic. Each [`Metrics`] owns its own registry so that tests
//! and multiple service instances never collide on the global default.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Metrics collected by the listener
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    /// Instances that called `/register`
    pub registrations: IntCounter,
    /// Successful `/set_instance_env` calls
    pub config_updates: IntCounter,
    /// Completed state file writes
    pub persists: IntCounter,
    /// Failed state file writes
    pub persist_failures: IntCounter,
    /// Beacon datagrams sent
    pub beacons_sent: IntCounter,
    /// Identities currently in the address table
    pub instances: IntGauge,
}

impl Metrics {
    /// Create and register all listener metrics
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let registrations = IntCounter::new(
            "listener_registrations_total",
            "Total number of instance registrations",
        )
        .map_err(metrics_error)?;
        let config_updates = IntCounter::new(
            "listener_config_updates_total",
            "Total number of instance configuration updates",
        )
        .map_err(metrics_error)?;
        let persists = IntCounter::new(
            "listener_persist_total",
            "Total number of state file writes",
        )
        .map_err(metrics_error)?;
        let persist_failures = IntCounter::new(
            "listener_persist_failures_total",
            "Total number of failed state file writes",
        )
        .map_err(metrics_error)?;
        let beacons_sent = IntCounter::new(
            "listener_beacons_sent_total",
            "Total number of discovery beacons sent",
        )
        .map_err(metrics_error)?;
        let instances = IntGauge::new(
            "listener_instances",
            "Number of instances in the address table",
        )
        .map_err(metrics_error)?;

        registry.register(Box::new(registrations.clone())).map_err(metrics_error)?;
        registry.register(Box::new(config_updates.clone())).map_err(metrics_error)?;
        registry.register(Box::new(persists.clone())).map_err(metrics_error)?;
        registry.register(Box::new(persist_failures.clone())).map_err(metrics_error)?;
        registry.register(Box::new(beacons_sent.clone())).map_err(metrics_error)?;
        registry.register(Box::new(instances.clone())).map_err(metrics_error)?;

        Ok(Self {
            registry,
            registrations,
            config_updates,
            persists,
            persist_failures,
            beacons_sent,
            instances,
        })
    }

    /// Encode all metrics in the Prometheus text format
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
