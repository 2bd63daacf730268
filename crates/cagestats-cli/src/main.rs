use anyhow::{Context, Result};
use cagestats_storage::PgDocumentStore;
use cagestats_sync::{RunMode, SyncConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "cagestats")]
#[command(about = "UFC stats scraper and read API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl the stats site and load what it finds.
    Scrape {
        /// full | update | upcoming
        #[arg(long, default_value_t = RunMode::Full)]
        mode: RunMode,
    },
    /// Create the collection tables.
    Migrate,
    /// Serve the read-only JSON API.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,cagestats=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Scrape { mode: RunMode::Full }) {
        Commands::Scrape { mode } => {
            let summary = cagestats_sync::run_sync_from_env(mode).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("serializing run summary")?
            );
        }
        Commands::Migrate => {
            let config = SyncConfig::from_env();
            let store = PgDocumentStore::connect(&config.database_url)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            tracing::info!("migrations applied");
        }
        Commands::Serve => cagestats_web::serve_from_env().await?,
    }

    Ok(())
}
