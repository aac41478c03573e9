//! Partition locator: filesystem enumeration of one element's segments.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::layout::{StoreLayout, SEGMENT_EXTENSION};

/// All segment files under `<root>/NE=<element_id>`, recursively. An element
/// with no partition yields an empty set. No ordering guarantee; the query
/// layer imposes time order after the scan.
pub fn locate_segments(root: &Path, element_id: &str) -> Result<Vec<PathBuf>> {
    let base = StoreLayout::new(root).element_dir(element_id);
    let mut segments = Vec::new();
    if base.is_dir() {
        collect_segments(&base, &mut segments)?;
    }
    Ok(segments)
}

fn collect_segments(dir: &Path, segments: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_segments(&path, segments)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == SEGMENT_EXTENSION)
        {
            segments.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn missing_element_yields_empty_set() {
        let dir = tempfile::tempdir().unwrap();
        assert!(locate_segments(dir.path(), "NO-SUCH-NE").unwrap().is_empty());
    }

    #[test]
    fn finds_segments_across_date_partitions() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("NE=NODE1");
        for date in ["date=2025-06-10", "date=2025-06-11"] {
            let partition = base.join(date);
            fs::create_dir_all(&partition).unwrap();
            File::create(partition.join("part-aa.parquet")).unwrap();
            File::create(partition.join("notes.txt")).unwrap();
        }

        let mut found = locate_segments(dir.path(), "NODE1").unwrap();
        found.sort();
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|p| p.extension().unwrap() == "parquet"));
    }

    #[test]
    fn element_id_is_sanitized_before_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let partition = dir.path().join("NE=A_B").join("date=2025-06-10");
        fs::create_dir_all(&partition).unwrap();
        File::create(partition.join("part-aa.parquet")).unwrap();

        assert_eq!(locate_segments(dir.path(), "A/B").unwrap().len(), 1);
    }
}
