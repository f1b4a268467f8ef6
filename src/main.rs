//! Unik Instance Listener
//!
//! Broadcasts a discovery beacon on the local subnet and serves the
//! registration API that booting instances call to fetch their environment.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use instance_listener::{
    ApiServer, ApiServerConfig, BeaconBroadcaster, BeaconConfig, Error, InstanceRegistry,
    Metrics, PersistConfig, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Unik Instance Listener - discovery beacon and instance bootstrap configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "LISTENER_API_ADDR", default_value = "0.0.0.0:3000")]
    api_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "LISTENER_METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Path of the persisted state file
    #[arg(long, env = "LISTENER_STATE_FILE", default_value = "statefile.json")]
    state_file: PathBuf,

    /// UDP port the discovery beacon is sent to
    #[arg(long, env = "LISTENER_BEACON_PORT", default_value = "9876")]
    beacon_port: u16,

    /// Milliseconds between discovery beacons
    #[arg(
        long,
        env = "LISTENER_BEACON_INTERVAL_MS",
        default_value = "2000",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    beacon_interval_ms: u64,

    /// Only advertise an address from this network interface
    #[arg(long, env = "LISTENER_INTERFACE")]
    interface: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Verbose mode (same as --log-level debug)
    #[arg(short, long)]
    verbose: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    info!("Starting Unik Instance Listener");
    info!("  Version: {}", instance_listener::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  State file: {}", args.state_file.display());

    let metrics = Metrics::new()?;

    // Beacon setup failures are fatal before anything is served
    let beacon_config = BeaconConfig {
        port: args.beacon_port,
        interval: Duration::from_millis(args.beacon_interval_ms),
        interface: args.interface.clone(),
    };
    let beacon = BeaconBroadcaster::bind(&beacon_config, metrics.clone())
        .await
        .map_err(|e| {
            error!("Failed to start discovery beacon: {}", e);
            e
        })?;

    // Load persisted state and start the persistence worker
    let persist_config = PersistConfig {
        path: args.state_file.clone(),
    };
    let registry = InstanceRegistry::load(persist_config, metrics.clone()).await;
    let persist_worker = registry.persister().spawn();

    // Start metrics server
    let metrics_addr: SocketAddr = args.metrics_addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics address: {}", e))
    })?;
    let server_metrics = metrics.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(metrics_addr, server_metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
    };
    let api_server = Arc::new(ApiServer::new(api_config, registry.clone()));

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            signal_server.shutdown();
        }
    });

    let result = tokio::select! {
        result = api_server.run() => result,
        result = beacon.run() => {
            // run only returns on a failed send
            result.and(Err(Error::Internal("beacon stopped".into())))
        }
    };

    // Let any in-flight write finish before the final flush
    registry.persister().stop();
    if let Err(e) = persist_worker.await {
        error!("Persistence worker failed: {}", e);
    }
    if registry.persister().flush().await.is_ok() {
        info!("Final state persisted");
    }

    match &result {
        Ok(()) => info!("Listener shutdown complete"),
        Err(e) => error!("Listener stopped: {}", e),
    }
    result
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        }
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: SocketAddr, metrics: Metrics) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Response, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, std::convert::Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = if req.uri().path() == "/metrics" {
                        match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = Response::new(Body::from(buffer));
                                if let Ok(value) = content_type.parse() {
                                    response
                                        .headers_mut()
                                        .insert(hyper::header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                let mut response = Response::new(Body::from(e.to_string()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        }
                    } else {
                        let mut response = Response::new(Body::from("not found"));
                        *response.status_mut() = StatusCode::NOT_FOUND;
                        response
                    };
                    Ok::<_, std::convert::Infallible>(response)
                }
            }))
        }
    });

    info!("Metrics server listening on {}", addr);
    Server::try_bind(&addr)
        .map_err(|e| Error::Configuration(format!("Failed to bind metrics server: {}", e)))?
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
