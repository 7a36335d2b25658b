//! Runtime configuration: an optional TOML file overlaid with `MMBI_*`
//! environment variables (`MMBI_SYNC__BATCH_SIZE=50` sets `sync.batch_size`).

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use config::{ConfigBuilder, Environment, builder::DefaultState};
use mmbi_search::SyncConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub sync:       SyncConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_owned(),
      port:       8080,
      store_path: PathBuf::from("mmbi.db"),
      sync:       SyncConfig::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` if it exists, then apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder().add_source(config::File::from(path).required(false)),
      environment(),
    )
  }

  fn from_builder(
    builder: ConfigBuilder<DefaultState>,
    env: Environment,
  ) -> anyhow::Result<Self> {
    builder
      .add_source(env)
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

/// `MMBI_` prefix, `__` between nested keys.
fn environment() -> Environment {
  Environment::with_prefix("MMBI")
    .prefix_separator("_")
    .separator("__")
    .try_parsing(true)
}

#[cfg(test)]
mod tests {
  use config::{File, FileFormat};

  use super::*;

  #[test]
  fn missing_file_yields_defaults() {
    let cfg = ServerConfig::load(Path::new("does-not-exist.toml")).unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.sync.batch_size, 100);
    assert_eq!(cfg.sync.convergence_timeout_ms, 5000);
  }

  #[test]
  fn file_values_override_defaults() {
    let toml = r#"
      port = 9000
      store_path = "/var/lib/mmbi/store.db"

      [sync]
      batch_size = 10
      max_backoff_ms = 1000
    "#;
    let cfg = ServerConfig::from_builder(
      config::Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
      environment().source(Some(config::Map::new())),
    )
    .unwrap();

    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/mmbi/store.db"));
    assert_eq!(cfg.sync.batch_size, 10);
    assert_eq!(cfg.sync.max_backoff_ms, 1000);
    assert_eq!(cfg.sync.poll_interval_ms, 250);
  }

  #[test]
  fn environment_overrides_file_and_defaults() {
    let vars = [
      ("MMBI_PORT", "9999"),
      ("MMBI_SYNC__BATCH_SIZE", "50"),
      ("MMBI_STORE_PATH", "/tmp/env.db"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect::<config::Map<_, _>>();

    let cfg = ServerConfig::from_builder(
      config::Config::builder()
        .add_source(File::from_str("port = 9000", FileFormat::Toml)),
      environment().source(Some(vars)),
    )
    .unwrap();

    assert_eq!(cfg.port, 9999);
    assert_eq!(cfg.sync.batch_size, 50);
    assert_eq!(cfg.store_path, PathBuf::from("/tmp/env.db"));
    assert_eq!(cfg.sync.poll_interval_ms, 250);
  }
}
