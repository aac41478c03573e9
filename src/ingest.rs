//! Chunked CSV ingestion into the partitioned parquet store.
//!
//! Each source file is streamed in bounded batches (`batch_size` rows), so
//! memory use per step never depends on file size. Per batch: header labels
//! are trimmed, the time column is located case-insensitively, timestamps
//! are cleaned and strictly parsed (unparseable rows are dropped), the
//! element id defaults to a sentinel when the `NE` column is absent, the
//! missing-value tokens `NS` / `NA` / empty are nulled in every data column,
//! and the surviving rows are grouped by `(element_id, date)` — one new
//! segment per non-empty group.
//!
//! Faults are isolated at the smallest useful granularity: a bad row is
//! dropped, a batch without a time column is discarded, a failed group write
//! is retried once on the alternate sink and then abandoned, an unreadable
//! file is skipped. Ingestion always makes maximal forward progress.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, StringRecord};
use log::{debug, error, info, warn};

use crate::clean::{clean_time, parse_timestamp, partition_date, to_unix_micros};
use crate::error::{Error, Result};
use crate::layout::StoreLayout;
use crate::sink::{write_with_retry, SegmentBatchBuilder};

/// Element id assigned when the source has no `NE` column.
pub const UNKNOWN_ELEMENT: &str = "UNKNOWN";

/// Tokens treated as a missing value in any data column.
const MISSING_TOKENS: [&str; 3] = ["NS", "", "NA"];

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Maximum rows held in memory per processing step.
    pub batch_size: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self { batch_size: 50_000 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestSummary {
    pub files_found: usize,
    pub files_processed: usize,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_dropped: u64,
    pub batches_skipped: u64,
    pub segments_written: u64,
    pub groups_lost: u64,
    pub elapsed: Duration,
}

/// Ingest every `*.csv` file under `src` (non-recursive, sorted by name)
/// into the store rooted at `out`.
pub fn ingest_folder(src: &Path, out: &Path, options: &IngestOptions) -> Result<IngestSummary> {
    if options.batch_size == 0 {
        return Err(Error::InvalidArgument(
            "batch_size must be greater than zero".into(),
        ));
    }
    let started = Instant::now();
    fs::create_dir_all(out)?;
    let layout = StoreLayout::new(out);

    let files = list_csv_files(src)?;
    let mut summary = IngestSummary {
        files_found: files.len(),
        ..IngestSummary::default()
    };
    info!("found {} csv files in {}", files.len(), src.display());

    for (index, file) in files.iter().enumerate() {
        info!(
            "({}/{}) scanning {}",
            index + 1,
            files.len(),
            file.display()
        );
        match ingest_file(file, &layout, options.batch_size, &mut summary) {
            Ok(()) => summary.files_processed += 1,
            Err(err) => warn!("skipping file {} due to error: {err}", file.display()),
        }
    }

    summary.elapsed = started.elapsed();
    info!(
        "completed: files {}/{}, rows {} read / {} written / {} dropped, {} segments in {:.2}s",
        summary.files_processed,
        summary.files_found,
        summary.rows_read,
        summary.rows_written,
        summary.rows_dropped,
        summary.segments_written,
        summary.elapsed.as_secs_f64()
    );
    Ok(summary)
}

fn list_csv_files(src: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Stream one file batch by batch. A returned error means the file was
/// abandoned mid-way; whatever segments it already produced stay in place.
fn ingest_file(
    path: &Path,
    layout: &StoreLayout,
    batch_size: usize,
    summary: &mut IngestSummary,
) -> Result<()> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|label| label.trim().to_string())
        .collect();

    let Some(time_idx) = find_time_column(&headers) else {
        // The header applies to every batch of the file, so one discard
        // covers them all.
        warn!("no time column in {}; discarding its batches", path.display());
        summary.batches_skipped += 1;
        return Ok(());
    };
    let ne_idx = headers.iter().position(|label| label == "NE");

    let mut batch: Vec<StringRecord> = Vec::with_capacity(batch_size.min(4096));
    for record in reader.records() {
        batch.push(record?);
        if batch.len() >= batch_size {
            process_batch(&headers, time_idx, ne_idx, &batch, layout, summary)?;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        process_batch(&headers, time_idx, ne_idx, &batch, layout, summary)?;
    }
    Ok(())
}

/// Case-insensitive match on the trimmed header labels; first hit wins.
fn find_time_column(headers: &[String]) -> Option<usize> {
    headers
        .iter()
        .position(|label| label.eq_ignore_ascii_case("time"))
}

fn process_batch(
    headers: &[String],
    time_idx: usize,
    ne_idx: Option<usize>,
    records: &[StringRecord],
    layout: &StoreLayout,
    summary: &mut IngestSummary,
) -> Result<()> {
    summary.rows_read += records.len() as u64;

    // (element_id, date) -> indices into `records`, with the parsed time.
    let mut groups: BTreeMap<(String, String), Vec<(usize, i64)>> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        let raw_time = record.get(time_idx).unwrap_or("");
        let Some(parsed) = parse_timestamp(&clean_time(raw_time)) else {
            summary.rows_dropped += 1;
            continue;
        };
        let element_id = match ne_idx.and_then(|column| record.get(column)) {
            Some(value) => value.to_string(),
            None => UNKNOWN_ELEMENT.to_string(),
        };
        let date = partition_date(parsed);
        groups
            .entry((element_id, date))
            .or_default()
            .push((idx, to_unix_micros(parsed)));
    }

    // Columns carried besides Time/NE, in source order.
    let data_columns: Vec<(usize, &str)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != time_idx && Some(*idx) != ne_idx)
        .map(|(idx, name)| (idx, name.as_str()))
        .collect();
    let column_names: Vec<&str> = data_columns.iter().map(|(_, name)| *name).collect();

    for ((element_id, date), rows) in groups {
        let mut builder = SegmentBatchBuilder::new(&column_names);
        for (record_idx, time_micros) in &rows {
            let record = &records[*record_idx];
            let values = data_columns
                .iter()
                .map(|(column, _)| record.get(*column).and_then(normalize_missing))
                .collect();
            builder.push_row(*time_micros, &element_id, values);
        }

        match write_group(layout, &element_id, &date, builder) {
            Ok((path, sink)) => {
                summary.segments_written += 1;
                summary.rows_written += rows.len() as u64;
                debug!(
                    "wrote {} [{} rows, {sink}]",
                    path.display(),
                    rows.len()
                );
            }
            Err(err) => {
                summary.groups_lost += 1;
                error!("lost group NE={element_id} date={date}: {err}");
            }
        }
    }
    Ok(())
}

fn write_group(
    layout: &StoreLayout,
    element_id: &str,
    date: &str,
    builder: SegmentBatchBuilder,
) -> Result<(PathBuf, &'static str)> {
    let path = layout.new_segment_path(element_id, date)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let batch = builder.finish()?;
    let sink = write_with_retry(&path, &batch)?;
    Ok((path, sink))
}

fn normalize_missing(raw: &str) -> Option<String> {
    if MISSING_TOKENS.contains(&raw) {
        None
    } else {
        Some(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tokens_become_null() {
        assert_eq!(normalize_missing("NS"), None);
        assert_eq!(normalize_missing(""), None);
        assert_eq!(normalize_missing("NA"), None);
        assert_eq!(normalize_missing("12.5"), Some("12.5".to_string()));
        // Tokens are exact; lowercase variants are data.
        assert_eq!(normalize_missing("ns"), Some("ns".to_string()));
    }

    #[test]
    fn time_column_match_is_case_insensitive() {
        let headers = vec!["NE".to_string(), "TIME".to_string(), "TP".to_string()];
        assert_eq!(find_time_column(&headers), Some(1));
        let headers = vec!["NE".to_string(), "tp".to_string()];
        assert_eq!(find_time_column(&headers), None);
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let err = ingest_folder(
            Path::new("/nonexistent"),
            Path::new("/nonexistent-out"),
            &IngestOptions { batch_size: 0 },
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
