mod api;
mod app;
mod auth;
mod cache;
mod commands;
mod config;
mod error;
mod event;
mod export;
mod filter;
mod live;
mod mutation;
mod query;
mod stats;
mod ui;
mod webhook;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::api::client::HttpApi;
use crate::api::service::DeskService;
use crate::api::types::OrderId;
use crate::cache::{CacheLayer, NoopStorage, SqliteStorage};
use crate::config::Config;
use crate::mutation::MutationCoordinator;

#[derive(Parser, Debug)]
#[command(name = "deskboard")]
#[command(about = "A terminal dashboard for helpdesk work orders")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/deskboard/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
  /// Run the identity provider webhook receiver instead of the TUI
  Webhook {
    /// Address to bind (overrides webhook.listen)
    #[arg(short, long)]
    listen: Option<String>,
  },
  /// Write the receipt and worksheet for one order, then exit
  Export {
    order_id: OrderId,
    /// Output directory (overrides export.dir)
    #[arg(short, long)]
    out: Option<PathBuf>,
  },
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env("DESKBOARD_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
}

/// The TUI owns the terminal, so its logs go to a daily file.
fn init_file_logging() -> Result<WorkerGuard> {
  let dir = dirs::data_dir()
    .ok_or_else(|| eyre!("Could not determine data directory for logs"))?
    .join("deskboard");
  std::fs::create_dir_all(&dir)?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(
    dir,
    "deskboard.log",
  ));
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(guard)
}

fn init_stderr_logging() {
  tracing_subscriber::fmt()
    .with_env_filter(env_filter())
    .with_writer(std::io::stderr)
    .init();
}

fn build_cache(config: &Config) -> CacheLayer {
  let layer = if config.cache.persist {
    match SqliteStorage::open() {
      Ok(storage) => CacheLayer::new(storage),
      Err(e) => {
        tracing::warn!(error = %e, "offline snapshots disabled");
        CacheLayer::new(NoopStorage)
      }
    }
  } else {
    CacheLayer::new(NoopStorage)
  };
  layer.with_policy(config.cache.policy())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Keep the guard alive so buffered log lines are flushed on exit
  let _guard = match args.command {
    None => Some(init_file_logging()?),
    Some(_) => {
      init_stderr_logging();
      None
    }
  };

  let config = Config::load(args.config.as_deref())?;
  let api = HttpApi::new(&config)?;
  let cache = build_cache(&config);
  let service = DeskService::new(api.clone(), cache.clone());
  let mutations = MutationCoordinator::new(api.clone(), cache);

  match args.command {
    None => {
      let mut app = app::App::new(&config, service, mutations).await?;
      app.run().await?;
    }
    Some(Cmd::Webhook { listen }) => {
      let verifier =
        webhook::WebhookVerifier::new(&Config::get_webhook_secret()?, config.webhook.tolerance_secs)?;
      let sync = webhook::UserSync::new(api, mutations);
      let listen = listen.unwrap_or_else(|| config.webhook.listen.clone());
      webhook::serve(&listen, webhook::router(verifier, sync)).await?;
    }
    Some(Cmd::Export { order_id, out }) => {
      let order = service.order(order_id).await?;
      let dir = out.unwrap_or_else(|| config.export.dir());
      let paths = export::export_order(&order.data, &dir)?;
      println!("{}", paths.receipt.display());
      println!("{}", paths.worksheet.display());
    }
  }

  Ok(())
}
