//! Zentinel API Versioning - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_api_versioning::server::{serve, AppState};
use zentinel_api_versioning::{project_with, GatewayConfig, VersioningGateway};

#[derive(Parser, Debug)]
#[command(
    name = "zentinel-api-versioning",
    about = "Version-aware API gateway with deprecation headers and per-version OpenAPI documents",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "api-versioning.yaml")]
    config: PathBuf,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// Write <DIR>/<group>/swagger.json for every version and exit
    #[arg(long, value_name = "DIR")]
    emit_docs: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        let default_config = include_str!("../config/default-config.yaml");
        println!("{}", default_config);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        GatewayConfig::from_file(&args.config)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration");
        GatewayConfig::default()
    };

    if args.validate {
        config.validate()?;
        println!("Configuration is valid");
        return Ok(());
    }

    let table = config.build_table()?;
    let gateway = Arc::new(VersioningGateway::new(table, &config)?);

    if let Some(dir) = &args.emit_docs {
        emit_docs(&gateway, &config, dir).await?;
        return Ok(());
    }

    #[cfg(unix)]
    spawn_reload_on_sighup(gateway.clone(), args.config.clone());

    let listener = TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;
    let state = Arc::new(AppState::new(gateway, &config));
    serve(listener, state).await
}

async fn emit_docs(
    gateway: &VersioningGateway<String>,
    config: &GatewayConfig,
    dir: &Path,
) -> Result<()> {
    let documents = project_with(&gateway.table(), gateway.reader());
    for document in documents.values() {
        let group_dir = dir.join(&document.group_name);
        tokio::fs::create_dir_all(&group_dir)
            .await
            .with_context(|| format!("Failed to create {:?}", group_dir))?;

        let openapi = document.to_openapi(&config.documentation, gateway.reader());
        let path = group_dir.join("swagger.json");
        tokio::fs::write(&path, serde_json::to_string_pretty(&openapi)?)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!(group = %document.group_name, path = ?path, "Wrote OpenAPI document");
    }
    Ok(())
}

/// Rebuild the route table from `path` on every SIGHUP. A broken file keeps
/// the current table.
#[cfg(unix)]
fn spawn_reload_on_sighup(gateway: Arc<VersioningGateway<String>>, path: PathBuf) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGHUP handler");
                return;
            }
        };

        while hangup.recv().await.is_some() {
            info!(path = ?path, "Reloading route table");
            match GatewayConfig::from_file(&path).and_then(|config| config.build_table()) {
                Ok(table) => {
                    gateway.publish(table);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Reload failed, keeping current route table");
                }
            }
        }
    });
}
