//! Operator CLI: run collection or dispatch once, clear the cache, inspect what is cached.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};

use city_digest::config::AppConfig;
use city_digest::scheduler::JobOutcome;
use city_digest::types::DataType;
use city_digest::Services;

#[derive(Parser, Debug)]
#[command(name = "digest-ctl", version, about = "Operate the city digest pipeline", long_about = None)]
struct Cli {
    /// Config file (TOML or JSON). Defaults to $CITY_DIGEST_CONFIG or config/city_digest.toml.
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect and cache content for one city, or for every target city.
    Collect {
        #[arg(long)]
        city: Option<String>,
        /// YYYY-MM-DD. Defaults to today + the configured collection offset.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Send today's newsletter for one city, or run the whole daily dispatch.
    Dispatch {
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Delete cache rows; omitted filters match everything.
    ClearCache {
        #[arg(long)]
        city: Option<String>,
        #[arg(long = "type")]
        kind: Option<DataType>,
    },
    /// Show which data types are cached per target city.
    Status {
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn print_json<T: serde::Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    city_digest::init_tracing();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(p) => AppConfig::load_from(p)?,
        None => AppConfig::load_default()?,
    };
    let offset = config.schedule.collection_day_offset;
    let services = Services::from_env(config)?;
    let today = Utc::now().date_naive();

    match cli.command {
        Commands::Collect { city, date } => {
            let date = date.unwrap_or(today + Duration::days(offset));
            match city {
                Some(city) => {
                    let report = services
                        .aggregator
                        .collect_and_cache(&city, date)
                        .await
                        .with_context(|| format!("collecting {city}"))?;
                    print_json(&report)?;
                }
                None => {
                    if let JobOutcome::Completed(summary) =
                        services.fleet.run_daily_collection(date).await
                    {
                        print_json(&summary)?;
                    }
                }
            }
        }
        Commands::Dispatch { city, date } => {
            let date = date.unwrap_or(today);
            match city {
                Some(city) => print_json(&services.dispatcher.send_for_city(&city, date).await?)?,
                None => {
                    if let JobOutcome::Completed(summary) =
                        services.dispatcher.run_daily_dispatch(date).await
                    {
                        print_json(&summary)?;
                    }
                }
            }
        }
        Commands::ClearCache { city, kind } => {
            let city = city.map(|c| city_digest::types::normalize_city_name(&c));
            let n = services.stores.cache.clear(city.as_deref(), kind).await?;
            println!("deleted {n} cache row(s)");
        }
        Commands::Status { date } => {
            let date = date.unwrap_or(today);
            for city in services.fleet.target_cities().await {
                let entries = services.stores.cache.entries_for(&city, date).await?;
                let kinds: Vec<&str> = entries.iter().map(|e| e.kind.as_str()).collect();
                println!("{city:<24} {date} [{}]", kinds.join(", "));
            }
        }
    }
    Ok(())
}
