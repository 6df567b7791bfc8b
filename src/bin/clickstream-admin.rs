use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use clickstream::config::Config;
use clickstream::models::AggregationQuery;
use clickstream::query::{AggregationQueryEngine, SummaryParams};
use clickstream::storage::connect_store;

#[derive(Parser)]
#[command(name = "clickstream-admin")]
#[command(about = "Clickstream analytics maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the analytics table and indexes
    Init,
    /// Print the aggregated summary for a short code as JSON
    Summary {
        /// Short code to summarize
        code: String,
        /// Window start (RFC3339), defaults to 24 hours before end
        #[arg(long)]
        start: Option<String>,
        /// Window end (RFC3339), defaults to now
        #[arg(long)]
        end: Option<String>,
        /// minute, hour, day, week, month or year
        #[arg(long)]
        interval: Option<String>,
    },
    /// Delete click events older than the retention window
    Prune {
        /// Keep events from the last N days
        #[arg(long)]
        older_than_days: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let store = connect_store(&config.database).await?;

    // Ensure database is initialized
    store.init().await?;

    match cli.command {
        Commands::Init => {
            println!("✓ Analytics schema is ready");
        }
        Commands::Summary {
            code,
            start,
            end,
            interval,
        } => {
            let params = SummaryParams {
                start,
                end,
                interval,
            };
            let query = AggregationQuery::from_params(code, &params, Utc::now())?;
            let summary = AggregationQueryEngine::new(store).summarize(&query).await?;
            let json = serde_json::to_string_pretty(&summary)
                .context("Failed to serialize summary")?;
            println!("{}", json);
        }
        Commands::Prune { older_than_days } => {
            let cutoff = Utc::now() - Duration::days(i64::from(older_than_days));
            let deleted = store.prune_before(cutoff).await?;
            println!(
                "✓ Deleted {} events created before {}",
                deleted,
                cutoff.to_rfc3339()
            );
        }
    }

    Ok(())
}
