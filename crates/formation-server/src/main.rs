//! formation-server binary.
//!
//! Reads `formation.toml` (or the path given with `--config`), overlays
//! `FORMATION_*` environment variables, opens the SQLite ledger and serves
//! the HTTP API.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::Context as _;
use clap::Parser;
use formation_payments::{
  HttpNotifier, LogNotifier, NotificationQueue, RetryPolicy, StripeClient, StripeConfig,
  notify::NotificationReceiver, spawn_dispatcher,
};
use formation_server::{AppState, ServerConfig};
use formation_store_sqlite::SqliteStore;
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Formation marketplace server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "formation.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("FORMATION"))
    .build()
    .context("failed to read configuration")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let provider = StripeClient::new(StripeConfig {
    api_base:   server_cfg.provider_api_base.clone(),
    secret_key: server_cfg.provider_secret_key.clone(),
  })
  .context("failed to build payment provider client")?;

  let (notifications, rx) = NotificationQueue::new();
  let notifier_task = start_notifier(&server_cfg, rx)?;

  let state = AppState::new(Arc::new(store), provider, &server_cfg, notifications)
    .context("invalid server configuration")?;

  let app = formation_server::router(state);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

  // The router held the last queue handle; wait for pending deliveries.
  notifier_task.await.context("notification dispatcher panicked")?;
  Ok(())
}

fn start_notifier(cfg: &ServerConfig, rx: NotificationReceiver) -> anyhow::Result<JoinHandle<()>> {
  let policy = RetryPolicy {
    max_attempts: cfg.notify_max_attempts,
    backoff:      Duration::from_millis(500),
  };
  Ok(match &cfg.notify_url {
    Some(url) => {
      tracing::info!(%url, "delivering notifications over HTTP");
      let notifier = HttpNotifier::new(url.clone()).context("failed to build notifier")?;
      spawn_dispatcher(Arc::new(notifier), rx, policy, cfg.notify_max_in_flight)
    }
    None => {
      tracing::info!("notify_url unset; notifications are logged only");
      spawn_dispatcher(Arc::new(LogNotifier), rx, policy, cfg.notify_max_in_flight)
    }
  })
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
    std::future::pending::<()>().await;
  }
  tracing::info!("shutting down");
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
