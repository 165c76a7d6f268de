//! CMS upload server binary.

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use cms_uploads::config::AppConfig;
use cms_uploads::{setup_upload_routes, ChunkStore, LocalChunkStore};
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chunked upload endpoint for the CMS admin
#[derive(Parser, Debug)]
#[command(name = "cms-uploads")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "CMS_CONFIG",
        default_value = "config/uploads.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let config: AppConfig = figment
        .merge(Env::prefixed("CMS_").split("__"))
        .extract()
        .context("failed to load configuration (upload.max_fragment_age_secs is required and non-zero)")?;

    let store = Arc::new(LocalChunkStore::new(&config.upload));
    // reap leftovers from before a restart
    let swept = store
        .sweep_stale()
        .await
        .context("failed to prepare staging directory")?;
    tracing::info!(
        staging = %config.upload.staging_path().display(),
        swept,
        max_fragment_age_secs = config.upload.max_fragment_age_secs.get(),
        "Staging directory ready"
    );

    let app = setup_upload_routes(Router::new(), store, &config.upload);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
