//! Record Store data models.

use chrono::{DateTime, Utc};

/// Store-assigned record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId(pub i64);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Diagnostic snapshot of routing and spam-filter headers.
///
/// Captured at ingestion for troubleshooting; nothing in the pipeline reads
/// these back.
#[derive(Debug, Clone, Default)]
pub struct HeaderSnapshot {
    /// Return-Path header.
    pub return_path: Option<String>,
    /// Envelope-To header.
    pub envelope_to: Option<String>,
    /// Delivery-date header, parsed.
    pub delivery_date: Option<DateTime<Utc>>,
    /// First Received header.
    pub received_from: Option<String>,
    /// DKIM-Signature header.
    pub dkim_signature: Option<String>,
    /// X-Spam-Status header.
    pub spam_status: Option<String>,
    /// X-Spam-Report header.
    pub spam_report: Option<String>,
}

/// A record ready for insertion, before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Account the message was fetched from.
    pub mailbox_account: String,
    /// Decoded subject line.
    pub subject: String,
    /// Sender (From header, verbatim).
    pub sender: String,
    /// Plain-text body snapshot.
    pub body: String,
    /// Timestamp from the Date header, or ingestion time as fallback.
    pub received_at: DateTime<Utc>,
    /// Spam flag from the subject heuristic.
    pub is_spam: bool,
    /// Whether a PDF attachment was extracted.
    pub has_attachment: bool,
    /// Path of the saved PDF attachment, if any.
    pub attachment_path: Option<String>,
    /// Diagnostic header snapshot.
    pub headers: HeaderSnapshot,
}

/// One ingested message and its processing state.
#[derive(Debug, Clone)]
pub struct Record {
    /// Store-assigned identity, immutable.
    pub id: RecordId,
    /// Account the message was fetched from.
    pub mailbox_account: String,
    /// Decoded subject line.
    pub subject: String,
    /// Sender (From header, verbatim).
    pub sender: String,
    /// Organization name, unset until classified.
    pub sender_organization: Option<String>,
    /// Plain-text body snapshot.
    pub body: String,
    /// Timestamp from the Date header, or ingestion time as fallback.
    pub received_at: DateTime<Utc>,
    /// Spam flag (subject heuristic at ingest, classifier afterwards).
    pub is_spam: bool,
    /// Invoice flag, set by classification.
    pub is_invoice: bool,
    /// Whether a PDF attachment was extracted.
    pub has_attachment: bool,
    /// Path of the saved PDF attachment, if any.
    pub attachment_path: Option<String>,
    /// Path of the staged export copy, set by the export stager.
    pub processed_path: Option<String>,
    /// Terminal flag: the staged copy reached the remote store.
    pub uploaded: bool,
    /// Diagnostic header snapshot.
    pub headers: HeaderSnapshot,
}

/// Classification result committed to a record and its sender cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Resolved organization name.
    pub organization: String,
    /// Spam judgment.
    pub is_spam: bool,
    /// Invoice judgment (probability strictly above the threshold).
    pub is_invoice: bool,
}

/// Filter for administrative record queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Restrict to one mailbox account.
    pub mailbox_account: Option<String>,
    /// Restrict by attachment presence.
    pub has_attachment: Option<bool>,
    /// Restrict by spam flag.
    pub is_spam: Option<bool>,
}
