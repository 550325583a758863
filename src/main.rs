use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pokesync::api::ApiClient;
use pokesync::cli;
use pokesync::db::Db;
use pokesync::importer::{run_import, ImportOptions, DEFAULT_CONCURRENCY};
use pokesync::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "pokesync",
    version,
    about = "Mirror the PokeAPI creature catalog into a local SQLite database"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Run the two-phase import: base entries first, then evolution relations
    Sync {
        /// Lowest canonical id to import
        #[arg(long, default_value_t = 1)]
        start: i64,
        /// Highest id to import (defaults to the highest id in the listing)
        #[arg(long)]
        end: Option<i64>,
        /// Maximum fetch+persist units in flight
        #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,
        /// Optional override for the local store URL
        #[arg(long)]
        db_url: Option<String>,
        /// Optional override for the remote API base URL
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Print row counts for every table in the local store
    Counts {
        /// Optional override for the local store URL
        #[arg(long)]
        db_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_util::init_env();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Sync {
            start,
            end,
            concurrency,
            db_url,
            api_url,
        } => {
            let db_url = db_url.unwrap_or_else(env_util::db_url);
            let api_url = api_url.unwrap_or_else(env_util::api_url);
            // a couple of spare connections beyond the worker budget
            let max_conns = (concurrency as u32).saturating_add(2);
            let db = Db::connect(&db_url, max_conns)
                .await
                .context("failed to open local store")?;
            let client = ApiClient::new(api_url)?;
            let opts = ImportOptions {
                start,
                end,
                concurrency,
            };
            let summary = run_import(&db, &client, &opts).await?;
            println!("{summary}");
        }
        Commands::Counts { db_url } => cli::counts::run(db_url).await?,
    }
    Ok(())
}
