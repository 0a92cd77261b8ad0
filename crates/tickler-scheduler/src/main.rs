use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use tickler_core::db;
use tickler_core::push::{PushTransport, WebPushTransport};
use tickler_core::repository::SqliteRepository;
use tickler_core::scheduler::Scheduler;

mod config;

#[derive(Parser, Debug)]
#[command(
    name = "tickler-scheduler",
    about = "Runs the Tickler background scheduler: reminder dispatch, occurrence top-up, daily digests, and notification retention"
)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "tickler.toml")]
    config: String,

    /// Override the configured database path
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut app_config = config::AppConfig::load(&cli.config)?;
    if let Some(database) = cli.database {
        app_config.database_url = database;
    }
    app_config.validate()?;

    let pool = db::establish_connection(&app_config.database_url).await?;
    let repo = Arc::new(SqliteRepository::with_defaults(pool));

    let transport: Arc<dyn PushTransport> =
        Arc::new(WebPushTransport::new(app_config.vapid_keys()));
    if !transport.is_configured() {
        tracing::warn!("VAPID keys not configured; web push delivery is disabled");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(repo, transport);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received; waiting for in-flight jobs");
    let _ = shutdown_tx.send(true);
    scheduler_handle.await?;

    Ok(())
}
