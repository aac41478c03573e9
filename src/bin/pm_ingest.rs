use std::path::PathBuf;

use clap::Parser;
use pmstore::{ingest_folder, IngestOptions};

#[derive(Parser)]
#[command(name = "pm-ingest")]
#[command(about = "Ingest PM CSV dumps into a partitioned parquet store")]
struct Cli {
    /// Source folder containing CSV files
    #[arg(long)]
    src: PathBuf,

    /// Output parquet store root
    #[arg(long, default_value = "./pm_store")]
    out: PathBuf,

    /// Maximum rows held in memory per batch
    #[arg(long, default_value_t = 50_000)]
    chunksize: usize,

    /// Minimal logs (warnings and errors only)
    #[arg(long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let options = IngestOptions {
        batch_size: cli.chunksize,
    };
    let summary = ingest_folder(&cli.src, &cli.out, &options)?;

    println!(
        "ingested files={}/{} rows_read={} rows_written={} rows_dropped={} segments={} in {:.2}s",
        summary.files_processed,
        summary.files_found,
        summary.rows_read,
        summary.rows_written,
        summary.rows_dropped,
        summary.segments_written,
        summary.elapsed.as_secs_f64()
    );
    if summary.groups_lost > 0 {
        eprintln!("warning: {} groups lost to write failures", summary.groups_lost);
    }
    Ok(())
}
