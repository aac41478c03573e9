//! Filtered, column-pruned, time-ordered scans over an element's segments.
//!
//! One scan contract, two conforming backends:
//!
//! - [`EngineChoice::Pushdown`]: column projection is pushed into the
//!   parquet reader, filters run per record batch, one global sort at the
//!   end.
//! - [`EngineChoice::PerSegment`]: each segment is read whole, columns are
//!   selected in memory, filtered rows are concatenated, then sorted once.
//!
//! The backends must produce equal results for well-formed stores; the
//! transport-point substring filter is case-insensitive in both.

use std::fs::File;
use std::path::{Path, PathBuf};

use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use log::warn;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use time::PrimitiveDateTime;

use crate::clean::{from_unix_micros, to_unix_micros};
use crate::error::{Error, Result};
use crate::locate::locate_segments;

const SCAN_BATCH_SIZE: usize = 8192;

/// Which scan backend executes the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineChoice {
    /// Prefer the pushdown backend.
    #[default]
    Auto,
    Pushdown,
    PerSegment,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub element_id: String,
    /// Requested KPI columns, in result order. Names absent from every
    /// scanned segment are silently dropped from the result.
    pub kpis: Vec<String>,
    pub start: Option<PrimitiveDateTime>,
    pub end: Option<PrimitiveDateTime>,
    /// Case-insensitive substring filter on the transport point.
    pub tp_contains: Option<String>,
    /// When positive, keep only the chronologically latest rows.
    pub max_rows: usize,
    pub engine: EngineChoice,
}

impl QueryRequest {
    pub fn new(element_id: impl Into<String>, kpis: Vec<String>) -> Self {
        Self {
            element_id: element_id.into(),
            kpis,
            start: None,
            end: None,
            tp_contains: None,
            max_rows: 0,
            engine: EngineChoice::Auto,
        }
    }
}

/// Column-major result table, sorted ascending by time.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    pub times: Vec<PrimitiveDateTime>,
    pub element_ids: Vec<String>,
    pub transport_points: Vec<Option<String>>,
    /// KPI columns present in the store, in request order.
    pub kpi_names: Vec<String>,
    /// Parallel to `kpi_names`; each inner vec parallels `times`.
    pub kpi_values: Vec<Vec<Option<f64>>>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn kpi(&self, name: &str) -> Option<&[Option<f64>]> {
        let idx = self.kpi_names.iter().position(|n| n == name)?;
        Some(&self.kpi_values[idx])
    }
}

struct ScanPlan {
    element_id: String,
    kpis: Vec<String>,
    start_us: Option<i64>,
    end_us: Option<i64>,
    /// Lowercased needle; matching lowercases the TP value.
    tp_needle: Option<String>,
}

struct ScanRow {
    time_us: i64,
    element_id: String,
    transport_point: Option<String>,
    /// Parallel to `ScanPlan::kpis`.
    kpi_values: Vec<Option<f64>>,
}

struct ScanOutput {
    rows: Vec<ScanRow>,
    /// Whether each requested KPI existed in at least one segment schema.
    kpi_seen: Vec<bool>,
}

trait SegmentScanner {
    fn scan(&self, paths: &[PathBuf], plan: &ScanPlan) -> Result<ScanOutput>;
}

/// Run a query against the store rooted at `root`.
///
/// An element with no partitions, or filters matching nothing, yields an
/// empty table — never an error. Missing `element_id` or an empty KPI list
/// fails fast with [`Error::InvalidArgument`].
pub fn query(root: &Path, request: &QueryRequest) -> Result<QueryResult> {
    if request.element_id.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "element_id is required for partitioned store queries".into(),
        ));
    }
    if request.kpis.is_empty() {
        return Err(Error::InvalidArgument("at least one KPI is required".into()));
    }

    let paths = locate_segments(root, &request.element_id)?;
    if paths.is_empty() {
        return Ok(QueryResult::default());
    }

    let plan = ScanPlan {
        element_id: request.element_id.clone(),
        kpis: request.kpis.clone(),
        start_us: request.start.map(to_unix_micros),
        end_us: request.end.map(to_unix_micros),
        tp_needle: request.tp_contains.as_ref().map(|s| s.to_lowercase()),
    };
    let scanner: &dyn SegmentScanner = match request.engine {
        EngineChoice::Auto | EngineChoice::Pushdown => &PushdownScanner,
        EngineChoice::PerSegment => &PerSegmentScanner,
    };

    let mut output = scanner.scan(&paths, &plan)?;
    output.rows.sort_by_key(|row| row.time_us);
    if request.max_rows > 0 && output.rows.len() > request.max_rows {
        let cut = output.rows.len() - request.max_rows;
        output.rows.drain(..cut);
    }
    if output.rows.is_empty() {
        return Ok(QueryResult::default());
    }
    Ok(assemble(output, &plan))
}

struct PushdownScanner;

impl SegmentScanner for PushdownScanner {
    fn scan(&self, paths: &[PathBuf], plan: &ScanPlan) -> Result<ScanOutput> {
        let mut output = ScanOutput {
            rows: Vec::new(),
            kpi_seen: vec![false; plan.kpis.len()],
        };
        for path in paths {
            let file = File::open(path)?;
            let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
            let schema = builder.schema().clone();
            if schema.index_of("Time").is_err() {
                warn!("segment {} has no Time column; skipped", path.display());
                continue;
            }

            let mut wanted: Vec<&str> = vec!["Time"];
            for header in ["NE", "TP"] {
                if schema.index_of(header).is_ok() {
                    wanted.push(header);
                }
            }
            for (idx, kpi) in plan.kpis.iter().enumerate() {
                if schema.index_of(kpi).is_ok() {
                    output.kpi_seen[idx] = true;
                    wanted.push(kpi.as_str());
                }
            }

            let mask = ProjectionMask::columns(builder.parquet_schema(), wanted.iter().copied());
            let reader = builder
                .with_projection(mask)
                .with_batch_size(SCAN_BATCH_SIZE)
                .build()?;
            for batch in reader {
                append_matching_rows(&batch?, plan, &mut output.rows, path)?;
            }
        }
        Ok(output)
    }
}

struct PerSegmentScanner;

impl SegmentScanner for PerSegmentScanner {
    fn scan(&self, paths: &[PathBuf], plan: &ScanPlan) -> Result<ScanOutput> {
        let mut output = ScanOutput {
            rows: Vec::new(),
            kpi_seen: vec![false; plan.kpis.len()],
        };
        for path in paths {
            match scan_whole_segment(path, plan) {
                Ok((mut rows, seen)) => {
                    output.rows.append(&mut rows);
                    for (flag, found) in output.kpi_seen.iter_mut().zip(seen) {
                        *flag |= found;
                    }
                }
                Err(err) => {
                    warn!("skipping unreadable segment {}: {err}", path.display());
                }
            }
        }
        Ok(output)
    }
}

fn scan_whole_segment(path: &Path, plan: &ScanPlan) -> Result<(Vec<ScanRow>, Vec<bool>)> {
    let file = File::open(path)?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let schema = builder.schema().clone();
    if schema.index_of("Time").is_err() {
        return Ok((Vec::new(), vec![false; plan.kpis.len()]));
    }
    let seen: Vec<bool> = plan
        .kpis
        .iter()
        .map(|kpi| schema.index_of(kpi).is_ok())
        .collect();

    let reader = builder.with_batch_size(SCAN_BATCH_SIZE).build()?;
    let mut rows = Vec::new();
    for batch in reader {
        append_matching_rows(&batch?, plan, &mut rows, path)?;
    }
    Ok((rows, seen))
}

/// Project the header and KPI columns out of one record batch and append
/// the rows that pass every filter.
fn append_matching_rows(
    batch: &RecordBatch,
    plan: &ScanPlan,
    rows: &mut Vec<ScanRow>,
    path: &Path,
) -> Result<()> {
    let schema = batch.schema();
    let Ok(time_idx) = schema.index_of("Time") else {
        return Ok(());
    };
    let times = batch
        .column(time_idx)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .ok_or_else(|| Error::Corrupt {
            path: path.to_path_buf(),
            reason: "Time column is not a microsecond timestamp",
        })?;
    let elements = schema
        .index_of("NE")
        .ok()
        .and_then(|idx| batch.column(idx).as_any().downcast_ref::<StringArray>());
    let transport_points = schema
        .index_of("TP")
        .ok()
        .and_then(|idx| batch.column(idx).as_any().downcast_ref::<StringArray>());
    let kpi_arrays: Vec<Option<&ArrayRef>> = plan
        .kpis
        .iter()
        .map(|kpi| schema.index_of(kpi).ok().map(|idx| batch.column(idx)))
        .collect();

    for row in 0..batch.num_rows() {
        if times.is_null(row) {
            continue;
        }
        let time_us = times.value(row);
        if plan.start_us.is_some_and(|start| time_us < start) {
            continue;
        }
        if plan.end_us.is_some_and(|end| time_us > end) {
            continue;
        }

        let transport_point = transport_points
            .and_then(|array| (!array.is_null(row)).then(|| array.value(row).to_string()));
        if let Some(needle) = &plan.tp_needle {
            // A row with no TP value never matches a substring filter.
            match &transport_point {
                Some(tp) if tp.to_lowercase().contains(needle.as_str()) => {}
                _ => continue,
            }
        }

        let element_id = match elements {
            Some(array) if !array.is_null(row) => array.value(row).to_string(),
            _ => plan.element_id.clone(),
        };
        let kpi_values = kpi_arrays
            .iter()
            .map(|array| array.and_then(|a| numeric_at(a, row)))
            .collect();
        rows.push(ScanRow {
            time_us,
            element_id,
            transport_point,
            kpi_values,
        });
    }
    Ok(())
}

/// Numeric coercion of a KPI cell; anything non-numeric becomes missing.
fn numeric_at(array: &ArrayRef, row: usize) -> Option<f64> {
    if array.is_null(row) {
        return None;
    }
    match array.data_type() {
        DataType::Utf8 => array
            .as_any()
            .downcast_ref::<StringArray>()
            .and_then(|a| a.value(row).trim().parse::<f64>().ok()),
        DataType::Float64 => array
            .as_any()
            .downcast_ref::<Float64Array>()
            .map(|a| a.value(row)),
        DataType::Int64 => array
            .as_any()
            .downcast_ref::<Int64Array>()
            .map(|a| a.value(row) as f64),
        _ => None,
    }
}

fn assemble(output: ScanOutput, plan: &ScanPlan) -> QueryResult {
    let kept: Vec<usize> = (0..plan.kpis.len())
        .filter(|idx| output.kpi_seen[*idx])
        .collect();
    let mut result = QueryResult {
        kpi_names: kept.iter().map(|idx| plan.kpis[*idx].clone()).collect(),
        kpi_values: vec![Vec::with_capacity(output.rows.len()); kept.len()],
        ..QueryResult::default()
    };
    for row in output.rows {
        let Some(time) = from_unix_micros(row.time_us) else {
            continue;
        };
        result.times.push(time);
        result.element_ids.push(row.element_id);
        result.transport_points.push(row.transport_point);
        for (slot, idx) in kept.iter().enumerate() {
            result.kpi_values[slot].push(row.kpi_values[*idx]);
        }
    }
    result
}
