//! Worlds server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) layered with
//! `WORLDS__*` environment variables, opens the storage root and serves the
//! HTTP API.
//!
//! # API key hashes
//!
//! `api_keys[].key_sha256` holds the hex SHA-256 of a bearer token:
//!
//! ```
//! cargo run -p worlds-server --bin server -- --hash-key
//! ```

use std::{
  io::{self, BufRead, Write},
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use worlds_server::{AppState, ServerConfig, auth::hash_key};

#[derive(Parser)]
#[command(author, version, about = "Worlds RDF graph server")]
struct Cli {
  /// TOML configuration file; missing is fine, defaults and env apply.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Read an API key from stdin, print its SHA-256 and exit.
  #[arg(long)]
  hash_key: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  let filter = EnvFilter::builder()
    .with_default_directive(LevelFilter::INFO.into())
    .from_env_lossy();
  tracing_subscriber::fmt().with_env_filter(filter).init();

  let cli = Cli::parse();
  if cli.hash_key {
    println!("{}", hash_key(&prompt("API key: ")?));
    return Ok(());
  }

  let config = load_config(&cli.config)?;
  let bind = format!("{}:{}", config.host, config.port);
  let data_dir = config.data_dir.clone();

  let state = AppState::open(config)
    .await
    .with_context(|| format!("cannot open storage root {}", data_dir.display()))?;
  if state.auth.is_empty() {
    tracing::warn!("no api_keys configured; every request will be rejected");
  }

  let listener = TcpListener::bind(&bind)
    .await
    .with_context(|| format!("cannot bind {bind}"))?;
  tracing::info!(address = %bind, data_dir = %data_dir.display(), "serving worlds API");

  axum::serve(listener, worlds_server::router(state))
    .await
    .context("server terminated")
}

fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let mut config: ServerConfig = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("WORLDS").separator("__"))
    .build()
    .with_context(|| format!("cannot read {}", path.display()))?
    .try_deserialize()
    .context("invalid server configuration")?;

  if !config.in_memory() {
    config.data_dir = expand_home(&config.data_dir);
  }
  Ok(config)
}

fn prompt(label: &str) -> anyhow::Result<String> {
  print!("{label}");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_owned())
}

/// `~/x` → `$HOME/x`; anything else is returned unchanged.
fn expand_home(path: &Path) -> PathBuf {
  match (path.strip_prefix("~"), std::env::var_os("HOME")) {
    (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
    _ => path.to_path_buf(),
  }
}
