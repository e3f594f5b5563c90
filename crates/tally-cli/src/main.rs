//! `tally` binary.
//!
//! Reads `tally.toml` (or the path given with `--config`), opens the SQLite
//! store and then either syncs shops, prints one report, or serves the read
//! API.
//!
//! ```text
//! tally sync [--shop <id>]
//! tally show --shop <id> --report <code>
//! tally serve
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use chrono::Utc;
use clap::{Parser, Subcommand};
use settings::{AppConfig, expand_tilde};
use tally_client::{ApiClient, ReqwestTransport};
use tally_core::store::ReportStore;
use tally_store_sqlite::SqliteStore;
use tally_sync::{PipelineReport, Shop, run_pipeline};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Tally seller-analytics sync")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, global = true, default_value = "tally.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the sync pipeline for every configured shop, or just one.
  Sync {
    #[arg(long)]
    shop: Option<i64>,
  },
  /// Print the `{columns, rows}` view of one report as JSON.
  Show {
    #[arg(long)]
    shop:   i64,
    #[arg(long)]
    report: String,
  },
  /// Serve the read API.
  Serve,
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
  let cfg = AppConfig::load(&cli.config)?;

  let store_path = expand_tilde(&cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Sync { shop } => sync(&cfg, &store, shop).await,
    Command::Show { shop, report } => show(&store, shop, &report).await,
    Command::Serve => serve(&cfg, store).await,
  }
}

async fn sync_shop(cfg: &AppConfig, store: &SqliteStore, shop: &Shop) -> anyhow::Result<PipelineReport> {
  let transport =
    ReqwestTransport::new(cfg.api_base_url.clone(), &shop.credentials, cfg.sync.request_timeout())
      .context("failed to build HTTP client")?;
  let client = ApiClient::new(transport, cfg.sync.retry.clone());
  let report = run_pipeline(store, client, shop.shop_id, &cfg.sync, Utc::now())
    .await
    .with_context(|| format!("pipeline for shop {} did not start", shop.shop_id))?;
  Ok(report)
}

/// Shops run one after another; a failing shop does not stop the rest.
async fn sync(cfg: &AppConfig, store: &SqliteStore, shop: Option<i64>) -> anyhow::Result<()> {
  let shops = cfg.shops(shop)?;
  if shops.is_empty() {
    anyhow::bail!("no shops configured");
  }

  let mut reports = Vec::with_capacity(shops.len());
  let mut failed = 0;
  for shop in &shops {
    match sync_shop(cfg, store, shop).await {
      Ok(report) => reports.push(report),
      Err(e) => {
        tracing::error!(shop_id = shop.shop_id, error = %format!("{e:#}"), "shop sync failed");
        failed += 1;
      }
    }
  }

  println!("{}", serde_json::to_string_pretty(&reports)?);
  if failed > 0 {
    anyhow::bail!("{failed} of {} shops failed", shops.len());
  }
  Ok(())
}

async fn show(store: &SqliteStore, shop: i64, code: &str) -> anyhow::Result<()> {
  let view = store
    .view(shop, code)
    .await
    .with_context(|| format!("failed to read report {code}"))?
    .with_context(|| format!("no report {code} for shop {shop}"))?;
  println!("{}", serde_json::to_string_pretty(&view)?);
  Ok(())
}

async fn serve(cfg: &AppConfig, store: SqliteStore) -> anyhow::Result<()> {
  let app = tally_api::api_router(Arc::new(store));
  let address = format!("{}:{}", cfg.host, cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}
