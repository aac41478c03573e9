//! Metadata export: distinct transport points per element.
//!
//! The store exposes a read-only scan of the `TP` column; classifying the
//! names into categories or roles is a downstream concern and stays outside
//! the core.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::array::{Array, StringArray};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::layout::StoreLayout;
use crate::locate::locate_segments;

/// Distinct non-null `TP` strings observed across an element's segments.
/// Segments without a `TP` column contribute nothing.
pub fn distinct_transport_points(root: &Path, element_id: &str) -> Result<BTreeSet<String>> {
    if element_id.trim().is_empty() {
        return Err(Error::InvalidArgument(
            "element_id is required for partitioned store queries".into(),
        ));
    }
    let mut names = BTreeSet::new();
    for path in locate_segments(root, element_id)? {
        let file = File::open(&path)?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        if builder.schema().index_of("TP").is_err() {
            continue;
        }
        let mask = ProjectionMask::columns(builder.parquet_schema(), ["TP"]);
        let reader = builder.with_projection(mask).with_batch_size(8192).build()?;
        for batch in reader {
            let batch = batch?;
            let Some(column) = batch.column(0).as_any().downcast_ref::<StringArray>() else {
                continue;
            };
            for row in 0..column.len() {
                if !column.is_null(row) {
                    names.insert(column.value(row).to_string());
                }
            }
        }
    }
    Ok(names)
}

/// Element ids (path-safe form) with a partition tree under `root`.
pub fn list_elements(root: &Path) -> Result<Vec<String>> {
    let mut elements = Vec::new();
    if !root.is_dir() {
        return Ok(elements);
    }
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(id) = name.to_str().and_then(|n| n.strip_prefix("NE=")) {
            elements.push(id.to_string());
        }
    }
    elements.sort();
    Ok(elements)
}

/// Per-element metadata document for external classifiers.
#[derive(Debug, Serialize)]
pub struct TpMetadata {
    pub element_id: String,
    pub generated_at: String,
    pub transport_points: Vec<String>,
}

impl TpMetadata {
    pub fn collect(root: &Path, element_id: &str) -> Result<Self> {
        let generated_at = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        Ok(Self {
            element_id: element_id.to_string(),
            generated_at,
            transport_points: distinct_transport_points(root, element_id)?
                .into_iter()
                .collect(),
        })
    }
}

/// Write `tp_meta.json` under the element's partition tree and return its
/// path.
pub fn write_tp_metadata(root: &Path, element_id: &str) -> Result<PathBuf> {
    let metadata = TpMetadata::collect(root, element_id)?;
    let path = StoreLayout::new(root)
        .element_dir(element_id)
        .join("tp_meta.json");
    let json = serde_json::to_vec_pretty(&metadata)?;
    fs::write(&path, json)?;
    Ok(path)
}
