//! Classification Stage.
//!
//! For each record with an extracted-pending PDF and no known organization,
//! resolves the sender organization, spam flag, and invoice judgment via an
//! external text classifier, with a per-sender in-memory cache in front of
//! both the decryption work and the external call. Records whose attachment
//! yields no text, or whose classifier response is absent or malformed, are
//! left unclassified for a later run.

mod cache;

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::pdf::PdfEngine;
use crate::record::{Classification, RecordRepository};

pub use cache::{EvictionPolicy, OrgCache};

/// Bound on the PDF-text excerpt handed to the classifier.
pub const PDF_EXCERPT_CHARS: usize = 2000;

/// Invoice probabilities strictly above this mark a record as an invoice.
pub const INVOICE_THRESHOLD: f64 = 0.6;

/// Request handed to the external classification collaborator.
#[derive(Debug, Clone)]
pub struct ClassifyRequest {
    /// Sender address, verbatim from the record.
    pub sender: String,
    /// Plain-text email body.
    pub body: String,
    /// Extracted PDF text, truncated to [`PDF_EXCERPT_CHARS`].
    pub pdf_excerpt: String,
}

/// Failure of the external classification collaborator.
///
/// Timeouts, transport errors, and service-side rejections all land here;
/// the stage treats them alike (record left unclassified, retried later).
#[derive(Debug, thiserror::Error)]
#[error("classifier call failed: {0}")]
pub struct ClassifierError(pub String);

/// External text-classification collaborator.
///
/// The response is free-form text expected to contain one JSON object with
/// keys `organization`, `spam`, and `invoice`.
#[allow(async_fn_in_trait)]
pub trait Classifier {
    /// Classify one record's sender/body/PDF-excerpt triple.
    async fn classify(&self, request: &ClassifyRequest) -> std::result::Result<String, ClassifierError>;
}

/// Shape of the JSON object embedded in a classifier response.
#[derive(Debug, Deserialize)]
struct RawVerdict {
    organization: String,
    spam: String,
    invoice: f64,
}

/// Parses a classifier response into a classification.
///
/// Tolerates surrounding prose: only the substring from the first `{` to
/// the last `}` is parsed. Returns `None` when no such window exists, the
/// JSON is malformed, or a required key is missing — the caller leaves the
/// record unclassified in that case.
#[must_use]
pub fn parse_verdict(response: &str) -> Option<Classification> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }

    let raw: RawVerdict = serde_json::from_str(&response[start..=end]).ok()?;
    Some(Classification {
        organization: raw.organization,
        is_spam: raw.spam.trim().eq_ignore_ascii_case("yes"),
        is_invoice: raw.invoice > INVOICE_THRESHOLD,
    })
}

/// Counters for one classification run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Records selected for this pass.
    pub examined: usize,
    /// Records that received a classification.
    pub classified: usize,
    /// Subset of `classified` that was served from the cache.
    pub from_cache: usize,
    /// Records left unclassified for a later run.
    pub deferred: usize,
}

/// The classification stage, wiring repository, decrypt engine, cache, and
/// the external classifier together.
pub struct ClassifyStage<'a, C: Classifier> {
    repo: &'a RecordRepository,
    engine: &'a PdfEngine,
    classifier: &'a C,
    cache: &'a mut OrgCache,
}

impl<'a, C: Classifier> ClassifyStage<'a, C> {
    /// Create a stage over the given collaborators.
    ///
    /// The cache is owned by the caller so its lifetime (and eviction
    /// policy) is an explicit choice rather than module state.
    pub fn new(
        repo: &'a RecordRepository,
        engine: &'a PdfEngine,
        classifier: &'a C,
        cache: &'a mut OrgCache,
    ) -> Self {
        Self {
            repo,
            engine,
            classifier,
            cache,
        }
    }

    /// Classify all pending records.
    ///
    /// Per-record failures (missing file, empty extraction, classifier
    /// error, malformed response) defer that record and move on; only
    /// store-layer errors abort the run.
    ///
    /// # Errors
    ///
    /// Returns an error if a Record Store operation fails.
    pub async fn run(&mut self) -> Result<ClassifyReport> {
        let pending = self.repo.unclassified_with_pdf().await?;
        let mut report = ClassifyReport {
            examined: pending.len(),
            ..ClassifyReport::default()
        };

        for record in pending {
            let Some(attachment_path) = record.attachment_path.as_deref() else {
                report.deferred += 1;
                continue;
            };
            if !Path::new(attachment_path).exists() {
                debug!(record = %record.id, path = attachment_path, "attachment file missing");
                report.deferred += 1;
                continue;
            }

            if let Some(cached) = self.cache.get(&record.sender).cloned() {
                if self.repo.apply_classification(record.id, &cached).await? {
                    info!(
                        record = %record.id,
                        organization = cached.organization,
                        "classified from cache"
                    );
                    report.classified += 1;
                    report.from_cache += 1;
                }
                continue;
            }

            let text = self.engine.extract_text(Path::new(attachment_path));
            if text.trim().is_empty() {
                // No text extracted; reason already logged by the engine.
                report.deferred += 1;
                continue;
            }

            let request = ClassifyRequest {
                sender: record.sender.clone(),
                body: record.body.clone(),
                pdf_excerpt: text.chars().take(PDF_EXCERPT_CHARS).collect(),
            };
            let response = match self.classifier.classify(&request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(record = %record.id, error = %e, "classifier unavailable");
                    report.deferred += 1;
                    continue;
                }
            };

            let Some(classification) = parse_verdict(&response) else {
                warn!(record = %record.id, response, "unexpected classifier response format");
                report.deferred += 1;
                continue;
            };

            if self
                .repo
                .apply_classification(record.id, &classification)
                .await?
            {
                info!(
                    record = %record.id,
                    organization = classification.organization,
                    spam = classification.is_spam,
                    invoice = classification.is_invoice,
                    "classified"
                );
                report.classified += 1;
            }
            // Cache and record are written together so they always agree
            self.cache.insert(&record.sender, classification);
        }

        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::record::{HeaderSnapshot, NewRecord};
    use chrono::Utc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted classifier that counts invocations.
    struct FakeClassifier {
        response: Mutex<String>,
        calls: AtomicUsize,
    }

    impl FakeClassifier {
        fn new(response: &str) -> Self {
            Self {
                response: Mutex::new(response.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for FakeClassifier {
        async fn classify(
            &self,
            _request: &ClassifyRequest,
        ) -> std::result::Result<String, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.response.lock().unwrap().clone())
        }
    }

    fn new_record(sender: &str, attachment: &Path) -> NewRecord {
        NewRecord {
            mailbox_account: "inbox@example.com".to_string(),
            subject: "Invoice".to_string(),
            sender: sender.to_string(),
            body: "see attachment".to_string(),
            received_at: Utc::now(),
            is_spam: false,
            has_attachment: true,
            attachment_path: Some(attachment.to_string_lossy().into_owned()),
            headers: HeaderSnapshot::default(),
        }
    }

    #[test]
    fn verdict_parses_with_surrounding_prose() {
        let response = "Sure! Here is the result:\n{\"organization\": \"Acme\", \"spam\": \"No\", \"invoice\": 0.8}\nLet me know.";
        let verdict = parse_verdict(response).unwrap();
        assert_eq!(verdict.organization, "Acme");
        assert!(!verdict.is_spam);
        assert!(verdict.is_invoice);
    }

    #[test]
    fn verdict_spam_is_case_insensitive_yes() {
        let verdict =
            parse_verdict(r#"{"organization": "X", "spam": " YES ", "invoice": 0.1}"#).unwrap();
        assert!(verdict.is_spam);
        assert!(!verdict.is_invoice);
    }

    #[test]
    fn verdict_invoice_tie_at_threshold_is_false() {
        let verdict =
            parse_verdict(r#"{"organization": "X", "spam": "no", "invoice": 0.6}"#).unwrap();
        assert!(!verdict.is_invoice);
    }

    #[test]
    fn verdict_rejects_missing_braces_and_keys() {
        assert!(parse_verdict("no json here").is_none());
        assert!(parse_verdict(r#"{"organization": "X", "spam": "no"}"#).is_none());
        assert!(parse_verdict("} backwards {").is_none());
    }

    #[tokio::test]
    async fn cached_sender_skips_classifier_entirely() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("a.pdf");
        // Cache hits never open the file, presence is all that is checked
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let repo = RecordRepository::in_memory().await.unwrap();
        let id = repo.insert(&new_record("known@x.com", &pdf)).await.unwrap();

        let engine = PdfEngine::default();
        let classifier = FakeClassifier::new("should never be called");
        let mut cache = OrgCache::default();
        cache.insert(
            "known@x.com",
            Classification {
                organization: "Acme".to_string(),
                is_spam: false,
                is_invoice: true,
            },
        );

        let mut stage = ClassifyStage::new(&repo, &engine, &classifier, &mut cache);
        let report = stage.run().await.unwrap();

        assert_eq!(report.classified, 1);
        assert_eq!(report.from_cache, 1);
        assert_eq!(classifier.call_count(), 0);
        let record = repo.get(id).await.unwrap().unwrap();
        assert_eq!(record.sender_organization.as_deref(), Some("Acme"));
    }

    #[tokio::test]
    async fn missing_attachment_file_defers_record() {
        let repo = RecordRepository::in_memory().await.unwrap();
        let id = repo
            .insert(&new_record("a@x.com", Path::new("/nonexistent/a.pdf")))
            .await
            .unwrap();

        let engine = PdfEngine::default();
        let classifier = FakeClassifier::new("unused");
        let mut cache = OrgCache::default();
        let mut stage = ClassifyStage::new(&repo, &engine, &classifier, &mut cache);
        let report = stage.run().await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(classifier.call_count(), 0);
        let record = repo.get(id).await.unwrap().unwrap();
        assert!(record.sender_organization.is_none());
    }

    #[tokio::test]
    async fn unreadable_pdf_defers_without_classifier_call() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        std::fs::write(&pdf, b"not really a pdf").unwrap();

        let repo = RecordRepository::in_memory().await.unwrap();
        let id = repo.insert(&new_record("a@x.com", &pdf)).await.unwrap();

        let engine = PdfEngine::default();
        let classifier = FakeClassifier::new("unused");
        let mut cache = OrgCache::default();
        let mut stage = ClassifyStage::new(&repo, &engine, &classifier, &mut cache);
        let report = stage.run().await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(classifier.call_count(), 0);
        assert!(cache.is_empty());
        let record = repo.get(id).await.unwrap().unwrap();
        assert!(record.sender_organization.is_none());
    }
}
