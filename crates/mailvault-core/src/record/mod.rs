//! Record Store: the persistent table of ingested-message records.
//!
//! The single source of truth for lifecycle state. Stages never talk to each
//! other directly; the ingestor inserts, the classification stage fills the
//! organization/spam/invoice fields, the export stager sets `processed_path`
//! and finally `uploaded`. Records are mutated in place, never replaced, and
//! the pipeline never deletes them.

mod model;
mod repository;

pub use model::{Classification, HeaderSnapshot, NewRecord, Record, RecordFilter, RecordId};
pub use repository::RecordRepository;
