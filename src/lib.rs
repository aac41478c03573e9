//! Partitioned parquet store for telecom performance-monitoring exports.
//!
//! Vendor PM CSV dumps are streamed in bounded batches, their timestamps
//! cleaned and strictly parsed, and the surviving rows written as immutable
//! parquet segments partitioned by `(element, date)`:
//!
//! ```text
//! <root>/NE=<element_id>/date=<YYYY-MM-DD>/part-<opaque-id>.parquet
//! ```
//!
//! The store is append-only: segments are written once at their final path
//! and never updated, so independent ingestions and read-only queries can
//! run concurrently without coordination.
//!
//! [`ingest::ingest_folder`] is the write path; [`query::query`] is the read
//! path, returning a time-sorted, column-pruned result table.

pub mod clean;
pub mod error;
pub mod ingest;
pub mod layout;
pub mod locate;
pub mod meta;
pub mod query;
pub mod sink;

pub use error::{Error, Result};
pub use ingest::{ingest_folder, IngestOptions, IngestSummary};
pub use locate::locate_segments;
pub use query::{query, EngineChoice, QueryRequest, QueryResult};
