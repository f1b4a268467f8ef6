//! Error types for the Instance Listener
//!
//! Provides structured error types for the discovery beacon, the
//! registration API, and state persistence.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the listener
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Network Discovery Errors
    // =========================================================================
    #[error("Failed to enumerate network interfaces: {0}")]
    InterfaceEnumeration(String),

    #[error("No usable IPv4 address found on interfaces: {interfaces}")]
    NoUsableAddress { interfaces: String },

    #[error("No netmask available for address {ip}")]
    MissingNetmask { ip: Ipv4Addr },

    // =========================================================================
    // Beacon Errors
    // =========================================================================
    #[error("Failed to open beacon socket to {target}: {reason}")]
    BeaconSocket { target: String, reason: String },

    #[error("Failed to send beacon to {target}: {reason}")]
    BeaconSend { target: String, reason: String },

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    #[error("Failed to persist state to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    // =========================================================================
    // Request Errors
    // =========================================================================
    #[error("Could not determine peer address for request")]
    MissingPeerAddress,

    #[error("Missing required query parameter: {0}")]
    MissingParameter(&'static str),

    #[error("failed to unmarshal data {payload} to a string map: {reason}")]
    InvalidConfigDocument { payload: String, reason: String },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors that must stop the process rather than degrade a response
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_)
                | Error::InterfaceEnumeration(_)
                | Error::NoUsableAddress { .. }
                | Error::MissingNetmask { .. }
                | Error::BeaconSocket { .. }
                | Error::BeaconSend { .. }
        )
    }

    /// Errors caused by a malformed client request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::MissingPeerAddress
                | Error::MissingParameter(_)
                | Error::InvalidConfigDocument { .. }
        )
    }
}

/// Result type alias for the listener
pub type Result<T> = std::result::Result<T, Error>;
