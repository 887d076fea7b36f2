//! Sparkline - battery history collector.
//!
//! Run with: `cargo run -p sparkline-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use sparkline_core::UPower;
use sparkline_service::{AppState, Collector, Config, api, bus, run_until_stopped};
use sparkline_store::Store;

/// Sparkline - battery history collector.
#[derive(Parser, Debug)]
#[command(name = "sparkline")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// HTTP bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Disable the HTTP API.
    #[arg(long)]
    no_http: bool,

    /// Do not export the query interface on the session bus.
    #[arg(long)]
    no_export: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    // Override config with CLI args
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(bind) = args.bind {
        config.http.bind = bind;
    }
    if args.no_http {
        config.http.enabled = false;
    }
    if args.no_export {
        config.bus.export = false;
    }
    config.validate()?;

    init_tracing(&config)?;

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let state = AppState::new(store, config.clone());

    // Enroll devices
    let (upower, system_bus_lost) = UPower::connect_system(config.upower.timeout())
        .context("Failed to connect to the system bus")?;
    let collector = Collector::new(Arc::clone(&state), Arc::new(upower));
    let devices = collector.enroll().await?;

    // Export on the session bus before any worker can publish an update
    let export = if config.bus.export {
        Some(bus::export(Arc::clone(&state)).await?)
    } else {
        info!("D-Bus export disabled");
        None
    };
    let (session_bus_lost, forwarder) = match export {
        Some(export) => (Some(export.lost), Some(export.forwarder)),
        None => (None, None),
    };

    // Serve the HTTP API
    let server = if config.http.enabled {
        let app = Router::new()
            .merge(api::router())
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&state));

        let addr: SocketAddr = config.http.bind.parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Starting server on {}", addr);
        Some(tokio::spawn(async move { axum::serve(listener, app).await }))
    } else {
        info!("HTTP API disabled");
        None
    };

    let workers = collector.start(devices);

    let faults = async move {
        tokio::select! {
            reason = system_bus_lost => lost_connection("system", reason),
            reason = wait_optional(session_bus_lost) => lost_connection("session", reason),
            served = wait_optional(server) => match served {
                Ok(Ok(())) => anyhow::anyhow!("HTTP server stopped"),
                Ok(Err(e)) => anyhow::Error::new(e).context("HTTP server failed"),
                Err(e) => anyhow::Error::new(e).context("HTTP server task failed"),
            },
            stopped = wait_optional(forwarder) => match stopped {
                Ok(()) => anyhow::anyhow!("Update signal forwarder stopped"),
                Err(e) => anyhow::Error::new(e).context("Update signal forwarder failed"),
            },
        }
    };
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    run_until_stopped(workers.supervise(), faults, shutdown).await
}

fn lost_connection(
    bus: &str,
    reason: Result<String, tokio::task::JoinError>,
) -> anyhow::Error {
    match reason {
        Ok(reason) => {
            error!("Lost {} bus connection: {}", bus, reason);
            anyhow::anyhow!("lost {bus} bus connection: {reason}")
        }
        Err(e) => anyhow::Error::new(e).context(format!("{bus} bus task failed")),
    }
}

fn init_tracing(config: &Config) -> anyhow::Result<()> {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("sparkline_service=info".parse()?)
        .add_directive("sparkline_store=info".parse()?)
        .add_directive("sparkline_core=info".parse()?);
    if config.http.enabled {
        filter = filter.add_directive("tower_http=debug".parse()?);
    }

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Await a task that may not have been started; never resolves if it wasn't.
async fn wait_optional<T>(
    handle: Option<tokio::task::JoinHandle<T>>,
) -> Result<T, tokio::task::JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
