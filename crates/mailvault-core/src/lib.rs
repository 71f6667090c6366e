//! # mailvault-core
//!
//! Core pipeline logic for `MailVault` email archiving.
//!
//! This crate provides:
//! - Record store (`SQLite`) for imported email metadata
//! - Mailbox ingestion with attachment extraction
//! - PDF decrypt/extract engine with crash-safe file handling
//! - Sender classification via an external text classifier, with a
//!   per-sender organization cache
//! - Export staging into a date/organization tree and remote upload

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod classify;
mod error;
pub mod export;
pub mod ingest;
pub mod pdf;
pub mod record;

pub use classify::{
    Classifier, ClassifierError, ClassifyReport, ClassifyRequest, ClassifyStage, EvictionPolicy,
    OrgCache, parse_verdict,
};
pub use error::{Error, Result};
pub use export::mirror::DirMirror;
pub use export::{
    ExportReport, ExportStager, FolderCache, RemoteEntry, RemoteStore, StoreError,
};
pub use ingest::spool::SpoolMailbox;
pub use ingest::{
    DateFilter, IngestReport, Ingestor, MailboxError, MailboxProvider, MailboxSession,
};
pub use pdf::{ExtractOutcome, PdfEngine};
pub use record::{
    Classification, HeaderSnapshot, NewRecord, Record, RecordFilter, RecordId, RecordRepository,
};
