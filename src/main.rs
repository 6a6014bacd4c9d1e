use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use nanbakadai_banners::config;
use nanbakadai_banners::db;
use nanbakadai_banners::model::BannerFilter;
use nanbakadai_banners::services::BannerServices;

#[derive(Debug, Parser)]
#[command(author, version, about = "Banner maintenance for the Nanbakadai marketplace")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Count inline vs file-backed banner images
    Size,
    /// Estimate the bytes saved by moving inline images to files
    Estimate,
    /// Move inline images to files and print the report
    Migrate,
    /// List banners page by page
    List {
        #[arg(long, default_value = "1")]
        page: i64,
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Only active (true) or inactive (false) banners
        #[arg(long)]
        active: Option<bool>,
    },
    /// Show the banners the home page would serve
    Home,
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL").unwrap_or_else(|_| cfg.database_url());
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let services = BannerServices::from_config(&cfg, pool)?;

    match args.command {
        Command::Size => print_json(&services.migrator.check_database_size().await?)?,
        Command::Estimate => print_json(&services.migrator.estimate_storage_savings().await?)?,
        Command::Migrate => {
            info!("starting banner image migration");
            let report = services.migrator.migrate().await?;
            print_json(&report)?;
        }
        Command::List {
            page,
            limit,
            active,
        } => {
            let page = services
                .admin
                .list(page, limit, BannerFilter { is_active: active })
                .await?;
            print_json(&page)?;
        }
        Command::Home => {
            let banners = services.cache.get_active_banners().await;
            print_json(&banners)?;
        }
    }

    Ok(())
}
