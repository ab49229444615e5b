mod codes;
mod error;
mod import;
mod postal;
mod store;
mod tracking;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::import::{import_file, Summary};

/// Loads state and district reference data from postal directory CSVs.
#[derive(Debug, Parser)]
#[command(name = "location-import", version)]
struct Args {
    /// Re-import files even when their content hash is unchanged.
    #[arg(long)]
    force: bool,

    /// Directory containing the *.csv files.
    #[arg(long, default_value = "./data/locations")]
    dir: PathBuf,
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Could not read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    Ok(files)
}

async fn run(args: Args) -> Result<Summary> {
    let database_url = std::env::var("DATABASE_URL")
        .context("Required environment variable 'DATABASE_URL' is not set")?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .context("Could not connect to PostgreSQL")?;

    let files = csv_files(&args.dir)?;
    info!("Found {} CSV files in {}", files.len(), args.dir.display());

    let mut summary = Summary::default();
    for (i, path) in files.iter().enumerate() {
        info!("[{}/{}] {}", i + 1, files.len(), path.display());
        let outcome = import_file(&pool, path, args.force).await;
        if let Err(e) = &outcome {
            error!("{}: {e}", path.display());
        }
        summary.record(&outcome);
    }
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}=info", env!("CARGO_CRATE_NAME")))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let summary = run(Args::parse()).await?;
    println!(
        "Import finished: {} processed, {} skipped, {} failed; {} states and {} districts inserted",
        summary.processed,
        summary.skipped,
        summary.failed,
        summary.states_inserted,
        summary.districts_inserted
    );
    if summary.failed > 0 {
        bail!("{} file(s) failed to import", summary.failed);
    }
    Ok(())
}
