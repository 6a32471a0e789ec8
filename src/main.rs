//! Roadmap Progress Daemon
//!
//! Serves the roadmap catalog, student progression and teacher review
//! workflow over HTTP, backed by a local SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! roadmap-progress
//!
//! # Start with custom config
//! roadmap-progress --config /path/to/config.toml
//!
//! # Start with custom HTTP port and storage directory
//! roadmap-progress --http-port 8096 --storage-dir /data/roadmaps
//!
//! # Only assigned reviewers may review a roadmap's submissions
//! roadmap-progress --strict-review-scoping
//! ```
//!
//! Callers identify themselves with the `x-user-id` and `x-user-role`
//! headers; see the `http` module for the full route table.

use clap::Parser;
use roadmap_progress::services::events::spawn_logging_listener;
use roadmap_progress::{Config, HttpServer, RoadmapDb, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roadmap-progress")]
#[command(about = "Roadmap progress tracking service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory for the database and config
    #[arg(long, env = "ROADMAP_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP bind host
    #[arg(long)]
    http_host: Option<String>,

    /// HTTP API port
    #[arg(long, env = "ROADMAP_HTTP_PORT")]
    http_port: Option<u16>,

    /// Restrict pending lists and reviews to assigned reviewers
    #[arg(long)]
    strict_review_scoping: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("roadmap_progress=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(host) = args.http_host {
        config.http_host = host;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if args.strict_review_scoping {
        config.strict_review_scoping = true;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        strict_review_scoping = config.strict_review_scoping,
        "Starting roadmap-progress"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    // Save default config if it doesn't exist
    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(RoadmapDb::open(
        &config.storage_dir,
        &config.database_file,
        config.pool_size,
        config.busy_timeout_ms,
    )?);

    let services = Arc::new(Services::new(db.clone(), config.strict_review_scoping));
    let _listener = spawn_logging_listener(services.events.clone());

    let bind_addr: SocketAddr = config.http_addr().parse()?;
    let http_server = Arc::new(HttpServer::new(services, bind_addr));

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    // Print stats before exit
    if let Ok(stats) = db.stats() {
        info!(
            roadmaps = stats.roadmap_count,
            enrolments = stats.enrolment_count,
            step_progress = stats.step_progress_count,
            "Final database stats"
        );
    }

    Ok(())
}
