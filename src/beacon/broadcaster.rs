//! Beacon Broadcaster
//!
//! Sends `unik:<host-ip>` to the subnet broadcast address on a fixed
//! interval. Booting instances listen for this datagram to learn where the
//! registration API lives. A failed send ends the loop with an error: an
//! undiscoverable listener has no purpose.

use crate::beacon::address::discover_host_address;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// UDP port instances listen on for the beacon
pub const BEACON_PORT: u16 = 9876;

/// Interval between beacons
pub const BEACON_INTERVAL: Duration = Duration::from_millis(2000);

/// Tag prefixed to the advertised address
pub const BEACON_PREFIX: &str = "unik:";

/// Build the beacon datagram for `ip`
pub fn beacon_payload(ip: Ipv4Addr) -> Vec<u8> {
    format!("{}{}", BEACON_PREFIX, ip).into_bytes()
}

// =============================================================================
// Beacon Configuration
// =============================================================================

/// Configuration for the beacon broadcaster
#[derive(Debug, Clone)]
pub struct BeaconConfig {
    /// Destination UDP port
    pub port: u16,
    /// Time between datagrams
    pub interval: Duration,
    /// Only advertise an address from this interface
    pub interface: Option<String>,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            port: BEACON_PORT,
            interval: BEACON_INTERVAL,
            interface: None,
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// One-directional datagram path the beacon is sent over
#[async_trait]
pub trait BeaconTransport: Send + Sync {
    /// Send one datagram
    async fn send(&self, payload: &[u8]) -> std::io::Result<usize>;

    /// Human-readable destination
    fn target(&self) -> String;
}

/// Broadcast-enabled UDP socket connected to the beacon destination
pub struct UdpBeaconTransport {
    socket: UdpSocket,
    target: SocketAddrV4,
}

impl UdpBeaconTransport {
    /// Open a UDP socket and connect it to `target`
    pub async fn connect(target: SocketAddrV4) -> Result<Self> {
        let socket_error = |e: std::io::Error| Error::BeaconSocket {
            target: target.to_string(),
            reason: e.to_string(),
        };

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .map_err(socket_error)?;
        socket.set_broadcast(true).map_err(socket_error)?;
        socket.connect(target).await.map_err(socket_error)?;

        Ok(Self { socket, target })
    }
}

#[async_trait]
impl BeaconTransport for UdpBeaconTransport {
    async fn send(&self, payload: &[u8]) -> std::io::Result<usize> {
        self.socket.send(payload).await
    }

    fn target(&self) -> String {
        self.target.to_string()
    }
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Periodic discovery beacon
pub struct BeaconBroadcaster<T> {
    transport: T,
    host_ip: Ipv4Addr,
    payload: Vec<u8>,
    interval: Duration,
    metrics: Metrics,
}

impl BeaconBroadcaster<UdpBeaconTransport> {
    /// Discover the host address and open the broadcast socket.
    ///
    /// Fails when no usable address or netmask exists on the host.
    pub async fn bind(config: &BeaconConfig, metrics: Metrics) -> Result<Self> {
        let host = discover_host_address(config.interface.as_deref())?;
        let broadcast = host.broadcast()?;
        let target = SocketAddrV4::new(broadcast, config.port);

        let transport = UdpBeaconTransport::connect(target).await?;
        Self::new(transport, host.ip, config.interval, metrics)
    }
}

impl<T: BeaconTransport> BeaconBroadcaster<T> {
    /// Create a broadcaster advertising `host_ip` over `transport`.
    ///
    /// The interval must be non-zero.
    pub fn new(
        transport: T,
        host_ip: Ipv4Addr,
        interval: Duration,
        metrics: Metrics,
    ) -> Result<Self> {
        if interval.is_zero() {
            return Err(Error::Configuration(
                "beacon interval must be greater than zero".into(),
            ));
        }

        Ok(Self {
            transport,
            host_ip,
            payload: beacon_payload(host_ip),
            interval,
            metrics,
        })
    }

    /// Send the beacon forever; returns only when a send fails
    pub async fn run(self) -> Result<()> {
        info!(
            ip = %self.host_ip,
            destination = %self.transport.target(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting unik discovery (udp heartbeat broadcast)"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.transport.send(&self.payload).await {
                error!(
                    destination = %self.transport.target(),
                    error = %e,
                    "Failed writing to broadcast udp socket"
                );
                return Err(Error::BeaconSend {
                    target: self.transport.target(),
                    reason: e.to_string(),
                });
            }

            self.metrics.beacons_sent.inc();
            debug!("broadcasting...");
        }
    }
}
