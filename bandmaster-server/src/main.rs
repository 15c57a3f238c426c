// src/main.rs
mod context;
mod routes;
mod ws;

use anyhow::Result;
use bandmaster_core::eventbus::OrchestratorEvent;
use bandmaster_core::generation::{HttpBackendGenerator, MockGenerator, TrackGenerator};
use bandmaster_core::tasks::{spawn_file_cleanup_task, spawn_session_expiry_task};
use bandmaster_core::OrchestratorConfig;
use clap::Parser;
use context::ServerContext;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "bandmaster", about = "AI band orchestration server")]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Base URL of the generation backend. Falls back to the
    /// BANDMASTER_BACKEND_URL environment variable; if neither is set
    /// the built-in mock generator is used.
    #[arg(long)]
    backend_url: Option<String>,

    /// Directory generated files are written to.
    #[arg(long, default_value = "generated_files")]
    files_dir: PathBuf,

    /// Per-track generator timeout in seconds.
    #[arg(long, default_value_t = 30)]
    generator_timeout_secs: u64,

    /// How long a disconnected plugin keeps its notification queue.
    #[arg(long, default_value_t = 120)]
    grace_period_secs: u64,

    /// Heartbeat staleness threshold in seconds; 0 disables the check.
    #[arg(long, default_value_t = 60)]
    heartbeat_timeout_secs: u64,

    /// Hours to keep generated files before cleanup.
    #[arg(long, default_value_t = 24)]
    retention_hours: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("bandmaster_core=info".parse().unwrap())
            .add_directive("bandmaster_server=info".parse().unwrap())
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let config = OrchestratorConfig {
        generator_timeout: Duration::from_secs(args.generator_timeout_secs),
        session_grace_period: Duration::from_secs(args.grace_period_secs),
        heartbeat_timeout: (args.heartbeat_timeout_secs > 0)
            .then(|| Duration::from_secs(args.heartbeat_timeout_secs)),
        file_retention: Duration::from_secs(args.retention_hours * 3600),
        files_dir: args.files_dir.clone(),
        ..Default::default()
    };

    let backend_url = args
        .backend_url
        .or_else(|| std::env::var("BANDMASTER_BACKEND_URL").ok());
    let backend_configured = backend_url.is_some();
    let generator: Arc<dyn TrackGenerator> = match backend_url {
        Some(url) => {
            info!("using HTTP generation backend at {url}");
            Arc::new(HttpBackendGenerator::new(url))
        }
        None => {
            info!("no backend configured; using mock generator");
            Arc::new(MockGenerator::new())
        }
    };

    let ctx = ServerContext::new(config, generator, backend_configured)?;

    let _meta_logger = bandmaster_core::eventbus::meta_logger::spawn_meta_logger_task(
        &ctx.event_bus,
        ctx.config.files_dir.clone(),
    );
    let _cleanup = spawn_file_cleanup_task(
        ctx.files.clone(),
        ctx.config.files_dir.clone(),
        ctx.config.file_retention,
        ctx.config.cleanup_interval,
        ctx.event_bus.shutdown_rx.clone(),
    );
    let _expiry = spawn_session_expiry_task(
        ctx.sessions.clone(),
        ctx.config.expiry_interval,
        ctx.config.heartbeat_timeout,
        ctx.event_bus.shutdown_rx.clone(),
    );

    let app = routes::router(ctx.clone());
    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!("listening on {}", args.bind);

    let bus_for_ctrlc = ctx.event_bus.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received; shutting down");
            bus_for_ctrlc.shutdown();
        }
    });

    let bus_for_ticks = ctx.event_bus.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            if bus_for_ticks.is_shutdown() {
                break;
            }
            bus_for_ticks.publish(OrchestratorEvent::Tick).await;
        }
    });

    let mut shutdown_rx = ctx.event_bus.shutdown_rx.clone();
    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stopped| *stopped).await;
        })
        .await;
    if let Err(e) = serve_result {
        error!("server error: {e}");
    }

    info!("bandmaster stopped");
    Ok(())
}
