use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use pmstore::clean::{clean_time, parse_timestamp};
use pmstore::{query, EngineChoice, QueryRequest};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

const TIME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

#[derive(Parser)]
#[command(name = "pm-query")]
#[command(about = "Query the partitioned PM store and print the result as CSV")]
struct Cli {
    /// Store root containing NE=... partitions
    #[arg(long, default_value = "./pm_store")]
    root: PathBuf,

    /// Element identifier (required)
    #[arg(long)]
    ne: String,

    /// KPI column name; repeat for several
    #[arg(long = "kpi", required = true)]
    kpis: Vec<String>,

    /// Inclusive lower time bound (e.g. "2025-06-10 00:00")
    #[arg(long)]
    start: Option<String>,

    /// Inclusive upper time bound
    #[arg(long)]
    end: Option<String>,

    /// Case-insensitive substring filter on the TP column
    #[arg(long)]
    tp_contains: Option<String>,

    /// Keep only the latest N rows (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_rows: usize,

    /// Scan backend: auto, pushdown, or per-segment
    #[arg(long, default_value = "auto")]
    engine: String,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let engine = match cli.engine.as_str() {
        "auto" => EngineChoice::Auto,
        "pushdown" => EngineChoice::Pushdown,
        "per-segment" => EngineChoice::PerSegment,
        other => return Err(anyhow!("unknown engine: {other}")),
    };

    let request = QueryRequest {
        element_id: cli.ne,
        kpis: cli.kpis,
        start: parse_bound(cli.start.as_deref())?,
        end: parse_bound(cli.end.as_deref())?,
        tp_contains: cli.tp_contains,
        max_rows: cli.max_rows,
        engine,
    };
    let result = query(&cli.root, &request)?;

    let mut header = vec!["Time".to_string(), "NE".to_string(), "TP".to_string()];
    header.extend(result.kpi_names.iter().cloned());
    println!("{}", header.join(","));

    for row in 0..result.len() {
        let mut fields = vec![
            result.times[row]
                .format(TIME_FORMAT)
                .context("format result time")?,
            result.element_ids[row].clone(),
            result.transport_points[row].clone().unwrap_or_default(),
        ];
        for column in &result.kpi_values {
            fields.push(column[row].map(|v| v.to_string()).unwrap_or_default());
        }
        println!("{}", fields.join(","));
    }
    Ok(())
}

fn parse_bound(raw: Option<&str>) -> anyhow::Result<Option<time::PrimitiveDateTime>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    parse_timestamp(&clean_time(raw))
        .map(Some)
        .ok_or_else(|| anyhow!("unparseable time bound: {raw}"))
}
