//! Runtime configuration, layered from an optional TOML file and `TALLY_*`
//! environment variables.
//!
//! Nested keys use `__` in the environment, e.g.
//! `TALLY_SYNC__CHUNK_SIZE=500` or `TALLY_PORT=9000`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;
use tally_client::transport::DEFAULT_BASE_URL;
use tally_sync::{Shop, SyncSettings};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path:   PathBuf,
  pub host:         String,
  pub port:         u16,
  pub api_base_url: String,
  pub shops:        Vec<Shop>,
  pub sync:         SyncSettings,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path:   PathBuf::from("tally.db"),
      host:         "127.0.0.1".to_owned(),
      port:         8080,
      api_base_url: DEFAULT_BASE_URL.to_owned(),
      shops:        Vec::new(),
      sync:         SyncSettings::default(),
    }
  }
}

impl AppConfig {
  /// Read `path` if it exists, then apply environment overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_source(config::File::from(path).required(false))
  }

  fn from_source<T>(file: T) -> anyhow::Result<Self>
  where
    T: config::Source + Send + Sync + 'static,
  {
    let settings = config::Config::builder()
      .add_source(file)
      .add_source(
        config::Environment::with_prefix("TALLY")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let cfg: Self = settings.try_deserialize().context("failed to deserialise AppConfig")?;
    cfg.sync.validate().context("invalid [sync] settings")?;
    Ok(cfg)
  }

  /// Configured shops, or only `shop_id` when given.
  pub fn shops(&self, shop_id: Option<i64>) -> anyhow::Result<Vec<Shop>> {
    match shop_id {
      None => Ok(self.shops.clone()),
      Some(id) => {
        let shop = self
          .shops
          .iter()
          .find(|s| s.shop_id == id)
          .cloned()
          .with_context(|| format!("shop {id} is not configured"))?;
        Ok(vec![shop])
      }
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use config::{File, FileFormat};

  use super::*;

  const TOML: &str = r#"
store_path = "/var/lib/tally/tally.db"
port = 9100

[[shops]]
shop_id = 1
client_id = "111"
api_key = "secret-1"

[[shops]]
shop_id = 2
client_id = "222"
api_key = "secret-2"

[sync]
chunk_size = 500

[sync.pools]
orders = 2
"#;

  #[test]
  fn file_values_override_defaults() {
    let cfg = AppConfig::from_source(File::from_str(TOML, FileFormat::Toml)).unwrap();
    assert_eq!(cfg.port, 9100);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.api_base_url, DEFAULT_BASE_URL);
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/tally/tally.db"));
    assert_eq!(cfg.shops.len(), 2);
    assert_eq!(cfg.shops[1].credentials.client_id, "222");
    assert_eq!(cfg.sync.chunk_size, 500);
    assert_eq!(cfg.sync.pools.orders, 2);
    assert_eq!(cfg.sync.page_size, SyncSettings::default().page_size);
  }

  #[test]
  fn empty_source_gives_defaults() {
    let cfg = AppConfig::from_source(File::from_str("", FileFormat::Toml)).unwrap();
    assert!(cfg.shops.is_empty());
    assert_eq!(cfg.port, 8080);
  }

  #[test]
  fn window_that_breaks_the_layout_fails_to_load() {
    let toml = "[sync.window]\nperiods = [7, 14, 28]\n";
    let err = AppConfig::from_source(File::from_str(toml, FileFormat::Toml)).unwrap_err();
    assert!(format!("{err:#}").contains("window.periods"));
  }

  #[test]
  fn shop_selection() {
    let cfg = AppConfig::from_source(File::from_str(TOML, FileFormat::Toml)).unwrap();
    assert_eq!(cfg.shops(None).unwrap().len(), 2);
    assert_eq!(cfg.shops(Some(2)).unwrap()[0].shop_id, 2);
    assert!(cfg.shops(Some(3)).is_err());
  }

  #[test]
  fn tilde_expands_to_home() {
    let plain = Path::new("/tmp/tally.db");
    assert_eq!(expand_tilde(plain), plain);
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(expand_tilde(Path::new("~/tally.db")), PathBuf::from(home).join("tally.db"));
    }
  }
}
