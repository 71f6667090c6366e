//! Error types for the pipeline core.

use thiserror::Error;

/// Errors that can occur in pipeline operations.
///
/// Per-message and per-record failures (bad subject encoding, a PDF that
/// will not decrypt, a malformed classifier response) are handled at their
/// call sites and never surface here; this type covers the failures that
/// abort an operation: store-layer errors, mailbox connection loss, and
/// local I/O problems outside the decrypt engine's guarded region.
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// MIME parsing failed.
    #[error("MIME error: {0}")]
    Mime(#[from] mailvault_mime::Error),

    /// Mailbox collaborator failed.
    #[error("Mailbox error: {0}")]
    Mailbox(#[from] crate::ingest::MailboxError),

    /// Remote storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[from] crate::export::StoreError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
