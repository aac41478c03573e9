//! On-disk store layout.
//!
//! ```text
//! <root>/NE=<element_id>/date=<YYYY-MM-DD>/part-<opaque-id>.parquet
//! ```
//!
//! Segment names are opaque and collision-free across concurrent ingestion
//! processes; readers must not attach meaning to segment count or boundaries.

use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};

pub const SEGMENT_EXTENSION: &str = "parquet";

static SEGMENT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Partition tree for one element: `<root>/NE=<safe-id>`.
    pub fn element_dir(&self, element_id: &str) -> PathBuf {
        self.root
            .join(format!("NE={}", sanitize_element_id(element_id)))
    }

    /// One partition: `<root>/NE=<safe-id>/date=<YYYY-MM-DD>`.
    pub fn partition_dir(&self, element_id: &str, date: &str) -> Result<PathBuf> {
        if !is_date(date) {
            return Err(Error::InvalidArgument(format!(
                "invalid partition date (expected YYYY-MM-DD): {date}"
            )));
        }
        Ok(self.element_dir(element_id).join(format!("date={date}")))
    }

    /// A fresh, never-before-used segment path inside a partition.
    pub fn new_segment_path(&self, element_id: &str, date: &str) -> Result<PathBuf> {
        Ok(self
            .partition_dir(element_id, date)?
            .join(format!("part-{}.{SEGMENT_EXTENSION}", opaque_segment_id())))
    }
}

/// Substitute path separators in an element id so it forms a single
/// directory component.
pub fn sanitize_element_id(element_id: &str) -> String {
    element_id.replace(['/', '\\'], "_")
}

/// Strict `YYYY-MM-DD` shape check for partition directory names.
pub fn is_date(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }
    bytes
        .iter()
        .enumerate()
        .all(|(idx, byte)| idx == 4 || idx == 7 || byte.is_ascii_digit())
}

/// Opaque hex segment id, unique across processes: hash of (pid, wall-clock
/// nanos, process-local counter).
fn opaque_segment_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let counter = SEGMENT_COUNTER.fetch_add(1, Ordering::Relaxed);

    let mut seed = [0u8; 28];
    seed[..4].copy_from_slice(&process::id().to_le_bytes());
    seed[4..20].copy_from_slice(&nanos.to_le_bytes());
    seed[20..].copy_from_slice(&counter.to_le_bytes());
    blake3::hash(&seed).to_hex()[..32].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_ids_with_separators_are_sanitized() {
        assert_eq!(sanitize_element_id("A/B\\C"), "A_B_C");
        assert_eq!(sanitize_element_id("NODE1"), "NODE1");
    }

    #[test]
    fn partition_dir_shape() {
        let layout = StoreLayout::new("/store");
        let dir = layout.partition_dir("NODE/1", "2025-06-10").unwrap();
        assert_eq!(dir, PathBuf::from("/store/NE=NODE_1/date=2025-06-10"));
    }

    #[test]
    fn partition_dir_rejects_bad_dates() {
        let layout = StoreLayout::new("/store");
        for bad in ["2025-6-10", "20250610", "2025-06-10T", "not-a-date"] {
            assert!(layout.partition_dir("NE", bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn segment_paths_are_unique() {
        let layout = StoreLayout::new("/store");
        let a = layout.new_segment_path("NE", "2025-06-10").unwrap();
        let b = layout.new_segment_path("NE", "2025-06-10").unwrap();
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("part-") && name.ends_with(".parquet"));
    }

    #[test]
    fn date_validation() {
        assert!(is_date("2025-06-10"));
        assert!(!is_date("2025-06-1"));
        assert!(!is_date("2025_06_10"));
    }
}
