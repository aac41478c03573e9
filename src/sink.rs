//! Segment writing.
//!
//! A segment is one immutable parquet file holding a batch of rows that
//! share a partition key. Segments are self-describing: `Time` is a
//! microsecond timestamp, `NE` a string, and every other source column is
//! carried as a nullable string exactly as read (missing-value tokens
//! already nulled). Numeric coercion of KPI columns happens at query time.
//!
//! A segment is written fully at its final path or not at all: any write
//! failure removes the partial file before the error propagates, so readers
//! never observe a half-written segment.

use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;

use crate::error::Result;

/// One way of persisting a record batch as a segment file.
pub trait SegmentSink {
    fn name(&self) -> &'static str;

    fn write(&self, path: &Path, batch: &RecordBatch) -> Result<()>;
}

/// Primary sink: zstd-compressed parquet.
pub struct ZstdSink;

impl SegmentSink for ZstdSink {
    fn name(&self) -> &'static str {
        "parquet-zstd"
    }

    fn write(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        write_segment_file(path, batch, props)
    }
}

/// Alternate sink used for the one-shot retry: plain uncompressed parquet.
pub struct PlainSink;

impl SegmentSink for PlainSink {
    fn name(&self) -> &'static str {
        "parquet-plain"
    }

    fn write(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let props = WriterProperties::builder()
            .set_compression(Compression::UNCOMPRESSED)
            .build();
        write_segment_file(path, batch, props)
    }
}

/// Write with the primary sink, retrying once with the alternate on failure.
/// Returns the name of the sink that succeeded.
pub fn write_with_retry(path: &Path, batch: &RecordBatch) -> Result<&'static str> {
    let primary = ZstdSink;
    match primary.write(path, batch) {
        Ok(()) => Ok(primary.name()),
        Err(err) => {
            let alternate = PlainSink;
            log::warn!(
                "segment write via {} failed for {}: {err}; retrying via {}",
                primary.name(),
                path.display(),
                alternate.name()
            );
            alternate.write(path, batch)?;
            Ok(alternate.name())
        }
    }
}

fn write_segment_file(path: &Path, batch: &RecordBatch, props: WriterProperties) -> Result<()> {
    let result = (|| -> Result<()> {
        let file = File::create(path)?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))?;
        writer.write(batch)?;
        writer.close()?;
        Ok(())
    })();
    if result.is_err() {
        let _ = fs::remove_file(path);
    }
    result
}

/// Column-major builder for one segment's record batch.
///
/// `Time` and `NE` lead; the remaining source columns follow in source
/// order as nullable strings.
pub struct SegmentBatchBuilder {
    fields: Vec<Field>,
    times: Vec<i64>,
    element_ids: Vec<String>,
    columns: Vec<Vec<Option<String>>>,
}

impl SegmentBatchBuilder {
    /// `column_names` are the source columns to carry besides `Time`/`NE`.
    pub fn new(column_names: &[&str]) -> Self {
        let mut fields = vec![
            Field::new(
                "Time",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                false,
            ),
            Field::new("NE", DataType::Utf8, false),
        ];
        for name in column_names {
            fields.push(Field::new(*name, DataType::Utf8, true));
        }
        Self {
            columns: vec![Vec::new(); column_names.len()],
            fields,
            times: Vec::new(),
            element_ids: Vec::new(),
        }
    }

    /// `values` must parallel the `column_names` the builder was created with.
    pub fn push_row(&mut self, time_micros: i64, element_id: &str, values: Vec<Option<String>>) {
        debug_assert_eq!(values.len(), self.columns.len());
        self.times.push(time_micros);
        self.element_ids.push(element_id.to_string());
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(value);
        }
    }

    pub fn row_count(&self) -> usize {
        self.times.len()
    }

    pub fn finish(self) -> Result<RecordBatch> {
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.fields.len());
        arrays.push(Arc::new(TimestampMicrosecondArray::from(self.times)));
        arrays.push(Arc::new(
            self.element_ids
                .into_iter()
                .map(Some)
                .collect::<StringArray>(),
        ));
        for column in self.columns {
            arrays.push(Arc::new(column.into_iter().collect::<StringArray>()));
        }
        let schema = Arc::new(Schema::new(self.fields));
        Ok(RecordBatch::try_new(schema, arrays)?)
    }
}
