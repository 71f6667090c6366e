//! Mailbox Ingestor.
//!
//! Converts raw mail messages from a connected mailbox session into Record
//! Store entries: subject decoding, plain-body extraction, PDF attachment
//! saving, year/month filtering, and per-message error isolation. The
//! mailbox transport itself is a collaborator behind [`MailboxSession`];
//! this module only depends on the message-shape contract it yields.

pub mod spool;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use mailvault_mime::Message;

use crate::Result;
use crate::record::{HeaderSnapshot, NewRecord, RecordId, RecordRepository};

/// Sentinel stored when a subject header cannot be decoded.
pub const SUBJECT_DECODE_ERROR: &str = "(Error decoding subject)";

/// Subject marker some upstream filters prepend to suspected spam.
const SPAM_SUBJECT_MARKER: &str = "***SPAM***";

/// Errors surfaced by the mailbox collaborator.
///
/// Connection and per-fetch failures are kept distinct from parse errors:
/// a failed fetch skips one message, a failed connection aborts the
/// account's run.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    /// Connecting or logging in failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A mailbox command (select, search) failed.
    #[error("Mailbox command failed: {0}")]
    Command(String),

    /// Fetching a single message failed.
    #[error("Failed to fetch message {id}: {reason}")]
    Fetch {
        /// Message identifier.
        id: String,
        /// Transport-level reason.
        reason: String,
    },

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A connected mailbox session.
#[allow(async_fn_in_trait)]
pub trait MailboxSession {
    /// Select the inbox.
    async fn select_inbox(&mut self) -> std::result::Result<(), MailboxError>;

    /// Enumerate all message identifiers in the selected mailbox.
    async fn search_all(&mut self) -> std::result::Result<Vec<String>, MailboxError>;

    /// Fetch one message's raw RFC 822 bytes.
    async fn fetch(&mut self, id: &str) -> std::result::Result<Vec<u8>, MailboxError>;

    /// Close the session. Callers invoke this even after errors.
    async fn logout(&mut self) -> std::result::Result<(), MailboxError>;
}

/// Yields connected sessions for one configured account.
#[allow(async_fn_in_trait)]
pub trait MailboxProvider {
    /// Session type produced by this provider.
    type Session: MailboxSession;

    /// Connect and authenticate.
    async fn connect(&self) -> std::result::Result<Self::Session, MailboxError>;
}

/// Optional year/month filter applied to a message's delivery date.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateFilter {
    /// Keep only messages delivered in this year.
    pub year: Option<i32>,
    /// Keep only messages delivered in this month (1-12).
    pub month: Option<u32>,
}

impl DateFilter {
    /// Whether any component is set.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.year.is_some() || self.month.is_some()
    }

    /// Whether a delivery date passes the filter.
    ///
    /// A message without a delivery date cannot match an active filter.
    #[must_use]
    pub fn matches(&self, delivery_date: Option<DateTime<Utc>>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(date) = delivery_date else {
            return false;
        };
        if self.year.is_some_and(|y| date.year() != y) {
            return false;
        }
        if self.month.is_some_and(|m| date.month() != m) {
            return false;
        }
        true
    }
}

/// Counters for one ingestion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Message identifiers enumerated (before the skip offset).
    pub total: usize,
    /// Records created.
    pub stored: usize,
    /// Messages silently dropped by the date filter.
    pub skipped: usize,
    /// Messages that failed to fetch, parse, or persist.
    pub failed: usize,
}

/// Ingests one account's mailbox into the Record Store.
#[derive(Debug, Clone)]
pub struct Ingestor {
    account: String,
    save_dir: PathBuf,
    filter: DateFilter,
    skip: usize,
}

impl Ingestor {
    /// Create an ingestor for one account.
    ///
    /// `skip` drops that many identifiers from the front of the mailbox
    /// enumeration, for resuming large imports.
    #[must_use]
    pub fn new(
        account: impl Into<String>,
        save_dir: impl Into<PathBuf>,
        filter: DateFilter,
        skip: usize,
    ) -> Self {
        Self {
            account: account.into(),
            save_dir: save_dir.into(),
            filter,
            skip,
        }
    }

    /// Process every qualifying message in the session's inbox.
    ///
    /// Per-message failures (fetch, parse, persist) are logged and counted;
    /// they never abort the remaining scan. The caller owns the session
    /// lifecycle and logs out afterwards, error or not.
    ///
    /// # Errors
    ///
    /// Returns an error only for whole-mailbox failures: select or search
    /// failing, or the attachment directory being uncreatable.
    pub async fn run<S: MailboxSession>(
        &self,
        session: &mut S,
        repo: &RecordRepository,
    ) -> Result<IngestReport> {
        session.select_inbox().await?;
        let ids = session.search_all().await?;
        fs::create_dir_all(&self.save_dir)?;

        let mut report = IngestReport {
            total: ids.len(),
            ..IngestReport::default()
        };

        for (index, id) in ids.iter().enumerate().skip(self.skip) {
            let raw = match session.fetch(id).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(account = self.account, id, error = %e, "failed to fetch message");
                    report.failed += 1;
                    continue;
                }
            };

            match self.process_raw(repo, &raw).await {
                Ok(Some(_)) => report.stored += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    warn!(account = self.account, id, error = %e, "failed to process message");
                    report.failed += 1;
                }
            }

            // Progress is observability only; nothing synchronizes on it
            debug!(
                account = self.account,
                processed = index + 1,
                total = report.total,
                "ingest progress"
            );
        }

        Ok(report)
    }

    /// Ingest a single message by identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetch, parse, or insert fails.
    pub async fn import_message<S: MailboxSession>(
        &self,
        session: &mut S,
        repo: &RecordRepository,
        id: &str,
    ) -> Result<Option<RecordId>> {
        session.select_inbox().await?;
        let raw = session.fetch(id).await?;
        fs::create_dir_all(&self.save_dir)?;
        self.process_raw(repo, &raw).await
    }

    /// Turn one raw message into a record, or `None` if the date filter
    /// drops it.
    async fn process_raw(&self, repo: &RecordRepository, raw: &[u8]) -> Result<Option<RecordId>> {
        let message = Message::parse(raw)?;

        let subject = match message.headers.get_decoded("subject") {
            Ok(subject) => subject.unwrap_or_default(),
            Err(e) => {
                warn!(account = self.account, error = %e, "failed to decode subject");
                SUBJECT_DECODE_ERROR.to_string()
            }
        };
        let sender = message.from().unwrap_or_default().to_string();
        let body = message.plain_body();
        let received_at = message
            .date()
            .map_or_else(Utc::now, |d| d.with_timezone(&Utc));

        let headers = HeaderSnapshot {
            return_path: header_string(&message, "return-path"),
            envelope_to: header_string(&message, "envelope-to"),
            delivery_date: message
                .date_header("delivery-date")
                .map(|d| d.with_timezone(&Utc)),
            received_from: header_string(&message, "received"),
            dkim_signature: header_string(&message, "dkim-signature"),
            spam_status: header_string(&message, "x-spam-status"),
            spam_report: header_string(&message, "x-spam-report"),
        };

        let mut attachment_path = None;
        for part in message.attachments() {
            let Some(filename) = part.filename() else {
                continue;
            };
            if !filename.to_lowercase().ends_with(".pdf") {
                continue;
            }
            match self.save_attachment(part.decode_body()?.as_slice(), &filename, &sender) {
                Ok(path) => attachment_path = Some(path.to_string_lossy().into_owned()),
                Err(e) => {
                    warn!(account = self.account, filename, error = %e, "failed to save attachment");
                }
            }
        }

        // Filter strictly after extraction: non-matching messages are
        // wasted work, not errors
        if !self.filter.matches(headers.delivery_date) {
            return Ok(None);
        }

        let record = NewRecord {
            mailbox_account: self.account.clone(),
            is_spam: subject.contains(SPAM_SUBJECT_MARKER),
            has_attachment: attachment_path.is_some(),
            subject,
            sender,
            body,
            received_at,
            attachment_path,
            headers,
        };

        let id = repo.insert(&record).await?;
        debug!(account = self.account, record = %id, "stored message");
        Ok(Some(id))
    }

    /// Save attachment bytes under a collision-free name built from a fresh
    /// random identifier, the sender, and the original filename.
    fn save_attachment(&self, bytes: &[u8], filename: &str, sender: &str) -> std::io::Result<PathBuf> {
        let unique_name = format!(
            "{}_{}_{}",
            Uuid::new_v4(),
            sanitize_component(sender),
            sanitize_component(filename)
        );
        let path = self.save_dir.join(unique_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

fn header_string(message: &Message, name: &str) -> Option<String> {
    message.headers.get(name).map(ToString::to_string)
}

/// Keep sender/filename fragments from escaping the save directory.
fn sanitize_component(value: &str) -> String {
    value.replace(['/', '\\'], "-")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::spool::SpoolMailbox;
    use super::*;

    const PDF_B64: &str = "JVBERi0xLjQ="; // "%PDF-1.4"

    fn with_pdf_eml(sender: &str, delivery: &str) -> String {
        format!(
            concat!(
                "From: {sender}\r\n",
                "Subject: Invoice attached\r\n",
                "Date: {delivery}\r\n",
                "Delivery-date: {delivery}\r\n",
                "Content-Type: multipart/mixed; boundary=B\r\n",
                "\r\n",
                "--B\r\n",
                "Content-Type: text/plain\r\n",
                "\r\n",
                "Invoice in attachment.\r\n",
                "--B\r\n",
                "Content-Type: application/pdf\r\n",
                "Content-Disposition: attachment; filename=\"invoice.pdf\"\r\n",
                "Content-Transfer-Encoding: base64\r\n",
                "\r\n",
                "{pdf}\r\n",
                "--B--\r\n",
            ),
            sender = sender,
            delivery = delivery,
            pdf = PDF_B64,
        )
    }

    fn plain_eml(sender: &str, delivery: &str) -> String {
        format!(
            "From: {sender}\r\nSubject: Hello\r\nDate: {delivery}\r\nDelivery-date: {delivery}\r\n\r\nJust text.\r\n"
        )
    }

    async fn run_ingest(
        spool_dir: &Path,
        save_dir: &Path,
        filter: DateFilter,
        skip: usize,
    ) -> (RecordRepository, IngestReport) {
        let repo = RecordRepository::in_memory().await.unwrap();
        let provider = SpoolMailbox::new(spool_dir);
        let mut session = provider.connect().await.unwrap();
        let ingestor = Ingestor::new("inbox@example.com", save_dir, filter, skip);
        let report = ingestor.run(&mut session, &repo).await.unwrap();
        session.logout().await.unwrap();
        (repo, report)
    }

    #[tokio::test]
    async fn filter_keeps_only_matching_month() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        fs::write(
            spool.join("001.eml"),
            with_pdf_eml("sender@x.com", "Sun, 03 Nov 2024 10:00:00 +0000"),
        )
        .unwrap();
        fs::write(
            spool.join("002.eml"),
            plain_eml("other@y.com", "Tue, 01 Oct 2024 08:00:00 +0000"),
        )
        .unwrap();

        let save_dir = dir.path().join("attachments");
        let filter = DateFilter {
            year: Some(2024),
            month: Some(11),
        };
        let (repo, report) = run_ingest(&spool, &save_dir, filter, 0).await;

        assert_eq!(report.total, 2);
        assert_eq!(report.stored, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 0);

        let records = repo.all().await.unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.sender, "sender@x.com");
        assert!(record.has_attachment);
        assert!(record.sender_organization.is_none());
        let saved = record.attachment_path.as_deref().unwrap();
        assert!(saved.ends_with("invoice.pdf"));
        assert_eq!(fs::read(saved).unwrap(), b"%PDF-1.4");
    }

    #[tokio::test]
    async fn no_filter_stores_everything_with_spam_heuristic() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        fs::write(
            spool.join("001.eml"),
            "From: spammer@z.com\r\nSubject: ***SPAM*** win now\r\n\r\nclick here\r\n",
        )
        .unwrap();
        fs::write(
            spool.join("002.eml"),
            plain_eml("friend@y.com", "Tue, 01 Oct 2024 08:00:00 +0000"),
        )
        .unwrap();

        let (repo, report) =
            run_ingest(&spool, &dir.path().join("att"), DateFilter::default(), 0).await;

        assert_eq!(report.stored, 2);
        let records = repo.all().await.unwrap();
        let spam = records
            .iter()
            .find(|r| r.sender == "spammer@z.com")
            .unwrap();
        assert!(spam.is_spam);
        assert!(!spam.has_attachment);
    }

    #[tokio::test]
    async fn skip_offset_drops_leading_messages() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        for i in 1..=3 {
            fs::write(
                spool.join(format!("{i:03}.eml")),
                plain_eml(
                    &format!("s{i}@x.com"),
                    "Tue, 01 Oct 2024 08:00:00 +0000",
                ),
            )
            .unwrap();
        }

        let (repo, report) =
            run_ingest(&spool, &dir.path().join("att"), DateFilter::default(), 2).await;

        assert_eq!(report.total, 3);
        assert_eq!(report.stored, 1);
        assert_eq!(repo.all().await.unwrap()[0].sender, "s3@x.com");
    }

    #[tokio::test]
    async fn undecodable_subject_gets_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        // Encoded word with invalid Base64 payload
        fs::write(
            spool.join("001.eml"),
            "From: a@x.com\r\nSubject: =?utf-8?B?###?=\r\n\r\nbody\r\n",
        )
        .unwrap();

        let (repo, _) =
            run_ingest(&spool, &dir.path().join("att"), DateFilter::default(), 0).await;
        assert_eq!(repo.all().await.unwrap()[0].subject, SUBJECT_DECODE_ERROR);
    }

    #[tokio::test]
    async fn active_filter_drops_messages_without_delivery_date() {
        let dir = tempfile::tempdir().unwrap();
        let spool = dir.path().join("spool");
        fs::create_dir_all(&spool).unwrap();
        fs::write(spool.join("001.eml"), "From: a@x.com\r\nSubject: x\r\n\r\nbody\r\n").unwrap();

        let filter = DateFilter {
            year: Some(2024),
            month: None,
        };
        let (repo, report) = run_ingest(&spool, &dir.path().join("att"), filter, 0).await;
        assert_eq!(report.skipped, 1);
        assert!(repo.all().await.unwrap().is_empty());
    }
}
