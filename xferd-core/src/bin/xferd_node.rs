//! Fleet node binary

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use xferd_core::coordinator::{FsLivenessStore, LivenessStore};
use xferd_core::logging::init_tracing;
use xferd_core::runtime::{IdleDispatcher, MessageSink, ServiceContainer, ServiceRuntime, TracingSink};
use xferd_core::{Result, XferdConfig};

#[derive(Debug, Parser)]
#[command(name = "xferd-node", about = "Transfer fleet coordination node")]
struct Args {
    /// TOML configuration file; built-in defaults when absent
    #[arg(long, env = "XFERD_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "XFERD_HOSTNAME")]
    hostname: Option<String>,

    #[arg(long, env = "XFERD_SERVICE_NAME")]
    service_name: Option<String>,

    /// Shared directory holding fleet beacons
    #[arg(long, env = "XFERD_LIVENESS_DIR")]
    liveness_dir: Option<PathBuf>,

    #[arg(long, env = "XFERD_METRICS_ADDR", default_value = "0.0.0.0:9100")]
    metrics_addr: SocketAddr,
}

fn load_config(args: &Args) -> Result<XferdConfig> {
    let mut config = match &args.config {
        Some(path) => XferdConfig::load(path)?,
        None => XferdConfig::default(),
    };
    if let Some(hostname) = &args.hostname {
        config.node.hostname = hostname.clone();
    }
    if let Some(service_name) = &args.service_name {
        config.node.service_name = service_name.clone();
    }
    if let Some(dir) = &args.liveness_dir {
        config.heartbeat.liveness_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    let runtime = match ServiceRuntime::new(&config.runtime) {
        Ok(rt) => rt,
        Err(e) => {
            error!("{}", e);
            std::process::exit(2);
        }
    };

    let code = runtime.block_on(async {
        match run(config, args.metrics_addr).await {
            Ok(code) => code,
            Err(e) => {
                error!("Node failed to start: {}", e);
                2
            }
        }
    });
    runtime.shutdown(Duration::from_secs(5));
    std::process::exit(code);
}

async fn run(config: XferdConfig, metrics_addr: SocketAddr) -> Result<i32> {
    info!(node = %config.node.node_id(), "Starting xferd node");

    let store: Arc<dyn LivenessStore> =
        Arc::new(FsLivenessStore::open(&config.heartbeat.liveness_dir).await?);
    let sink: Arc<dyn MessageSink> = Arc::new(TracingSink);
    let (container, handles) = ServiceContainer::assemble(&config, store, sink, IdleDispatcher)?;

    // Metrics API server
    tokio::spawn(async move {
        let app = Router::new()
            .route("/metrics", get(|| async { xferd_core::metrics::gather_system_metrics() }))
            .layer(CorsLayer::permissive());

        let listener = match tokio::net::TcpListener::bind(metrics_addr).await {
            Ok(l) => l,
            Err(e) => {
                warn!("Metrics listener bind failed on {}: {}", metrics_addr, e);
                return;
            }
        };
        info!("Metrics API listening on {}", metrics_addr);
        if let Err(e) = axum::serve(listener, app).await {
            warn!("Metrics server error: {}", e);
        }
    });

    let shutdown = handles.shutdown.clone();
    tokio::spawn(async move {
        let reason = tokio::select! {
            _ = tokio::signal::ctrl_c() => "interrupt signal",
            _ = terminate() => "terminate signal",
        };
        shutdown.initiate(reason);
    });

    let outcome = container.run().await;
    Ok(outcome.exit_code())
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}
