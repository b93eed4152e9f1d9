//! unify-server binary.
//!
//! Reads `unify.toml` (or the path specified with `--config`), layers
//! `UNIFY_*` environment variables over it, opens the SQLite store, and serves
//! the REST API over HTTP.
//!
//! Nested keys use a double underscore, e.g.
//! `UNIFY_MATCHING__NAME_SIMILARITY_THRESHOLD=0.9`.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use unify_core::engine::Engine;
use unify_server::ServerConfig;
use unify_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Unify patient deduplication server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, env = "UNIFY_CONFIG", default_value = "unify.toml")]
  config: PathBuf,

  /// Run one full duplicate scan, print the candidate count and exit.
  #[arg(long)]
  scan_once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("UNIFY")
        .prefix_separator("_")
        .separator("__"),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open_with(&store_path, server_cfg.busy_timeout())
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let engine = Arc::new(Engine::new(Arc::new(store), &server_cfg.matching));

  if cli.scan_once {
    let candidates = engine
      .detect_duplicates(&Default::default())
      .await
      .context("duplicate scan failed")?;
    println!("{} duplicate candidate(s)", candidates.len());
    return Ok(());
  }

  let scanner = server_cfg
    .scan_interval()
    .map(|interval| unify_server::spawn_scanner(engine.clone(), interval));

  let app = unify_server::router(engine);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      tokio::signal::ctrl_c().await.ok();
      tracing::info!("shutdown signal received");
    })
    .await
    .context("server error")?;

  if let Some(task) = scanner {
    task.abort();
  }
  Ok(())
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
