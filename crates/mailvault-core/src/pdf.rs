//! PDF Decrypt/Extract Engine.
//!
//! Turns a possibly-encrypted PDF file on disk into extracted plain text,
//! trying a list of candidate passwords. The operation never fails past its
//! boundary: every failure is reported as "no text extracted" with a logged
//! reason, and the file at the original path is guaranteed to survive intact
//! (untouched, or decrypted in place) with no stray work files left behind.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, warn};

/// Result of one extraction attempt, as an explicit enumeration instead of
/// error control flow driving the password loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractOutcome {
    /// Text was extracted; the file is decrypted in place if it was encrypted.
    Extracted(String),
    /// The file is encrypted and no candidate password unlocked it.
    NoPasswordWorked,
    /// The encryption scheme is not supported by the runtime; no further
    /// passwords were tried.
    UnsupportedCipher,
    /// The file could not be read, parsed, or rewritten.
    IoFailure(String),
}

/// Outcome of a single password attempt, driving the retry loop.
enum PasswordAttempt {
    /// Decrypted and the first page is accessible.
    Unlocked(Document),
    /// Wrong password (including "decrypts but pages stay locked"); try the
    /// next candidate.
    Wrong,
    /// Unsupported cipher; abort the loop.
    Unsupported,
}

/// Restores the aside copy and removes work files unless disarmed.
///
/// Holding the rename protocol in a drop guard means every early return —
/// parse error, wrong passwords, failed save — puts the original file back
/// and sweeps up `.tmp`/`.decrypted` leftovers.
struct RestoreGuard {
    original: PathBuf,
    aside: PathBuf,
    staged: PathBuf,
    disarmed: bool,
}

impl Drop for RestoreGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.staged);
        if !self.disarmed && self.aside.exists() {
            if let Err(e) = fs::rename(&self.aside, &self.original) {
                warn!(
                    original = %self.original.display(),
                    aside = %self.aside.display(),
                    error = %e,
                    "failed to restore original file after extraction failure"
                );
            }
        }
    }
}

/// Decrypt/extract engine with an ordered candidate password list.
#[derive(Debug, Clone, Default)]
pub struct PdfEngine {
    passwords: Vec<String>,
}

impl PdfEngine {
    /// Create an engine with the given candidate passwords, tried in order.
    #[must_use]
    pub const fn new(passwords: Vec<String>) -> Self {
        Self { passwords }
    }

    /// Extract all text from the PDF at `path`.
    ///
    /// Returns an empty string on any unrecoverable failure; the reason is
    /// logged. This is the boundary the classification stage calls through.
    #[must_use]
    pub fn extract_text(&self, path: &Path) -> String {
        match self.try_extract(path) {
            ExtractOutcome::Extracted(text) => text,
            ExtractOutcome::NoPasswordWorked => {
                warn!(path = %path.display(), "unable to decrypt PDF with provided passwords");
                String::new()
            }
            ExtractOutcome::UnsupportedCipher => {
                warn!(path = %path.display(), "PDF uses an unsupported encryption scheme");
                String::new()
            }
            ExtractOutcome::IoFailure(reason) => {
                warn!(path = %path.display(), reason, "error reading PDF");
                String::new()
            }
        }
    }

    /// Extract text, reporting the distinct failure kinds.
    ///
    /// Protocol: the original is renamed aside before anything touches it;
    /// a decrypted version is materialized as a separate staged file and
    /// atomically renamed into the original's name; the aside copy is
    /// deleted only after that swap. After this returns, exactly one file
    /// exists at `path`.
    pub fn try_extract(&self, path: &Path) -> ExtractOutcome {
        let aside = sibling(path, ".tmp");
        let staged = sibling(path, ".decrypted");

        if let Err(e) = fs::rename(path, &aside) {
            return ExtractOutcome::IoFailure(format!("cannot move file aside: {e}"));
        }
        let mut guard = RestoreGuard {
            original: path.to_path_buf(),
            aside: aside.clone(),
            staged: staged.clone(),
            disarmed: false,
        };

        let doc = match Document::load(&aside) {
            Ok(doc) => doc,
            Err(e) => return ExtractOutcome::IoFailure(format!("cannot parse PDF: {e}")),
        };

        if !doc.is_encrypted() {
            // Nothing to rewrite; the guard's restore puts the file back as-is.
            return ExtractOutcome::Extracted(extract_pages(&doc));
        }

        let mut unlocked = None;
        for password in &self.passwords {
            match attempt_password(&aside, password) {
                PasswordAttempt::Unlocked(doc) => {
                    debug!(path = %path.display(), "decryption successful");
                    unlocked = Some(doc);
                    break;
                }
                PasswordAttempt::Wrong => {}
                PasswordAttempt::Unsupported => return ExtractOutcome::UnsupportedCipher,
            }
        }
        let Some(mut doc) = unlocked else {
            return ExtractOutcome::NoPasswordWorked;
        };

        // Materialize the decrypted document, then swap it into place.
        doc.trailer.remove(b"Encrypt");
        if let Err(e) = doc.save(&staged) {
            return ExtractOutcome::IoFailure(format!("cannot write decrypted PDF: {e}"));
        }
        if let Err(e) = fs::rename(&staged, path) {
            return ExtractOutcome::IoFailure(format!("cannot swap decrypted PDF in: {e}"));
        }
        if let Err(e) = fs::remove_file(&aside) {
            // The decrypted file is in place; losing the aside copy is not
            // worth failing the extraction over.
            warn!(aside = %aside.display(), error = %e, "could not remove aside copy");
        }
        guard.disarmed = true;

        ExtractOutcome::Extracted(extract_pages(&doc))
    }
}

/// Try one candidate password against a fresh load of the document.
///
/// A password that decrypts the container but leaves the first page
/// unreadable counts as wrong.
fn attempt_password(path: &Path, password: &str) -> PasswordAttempt {
    let mut doc = match Document::load(path) {
        Ok(doc) => doc,
        Err(_) => return PasswordAttempt::Wrong,
    };

    match doc.decrypt(password) {
        Ok(()) => {}
        Err(e) => {
            if is_unsupported_cipher(&e) {
                return PasswordAttempt::Unsupported;
            }
            return PasswordAttempt::Wrong;
        }
    }

    // Probe the first page to confirm the content really unlocked.
    let Some(first_page) = doc.get_pages().keys().next().copied() else {
        return PasswordAttempt::Wrong;
    };
    match doc.extract_text(&[first_page]) {
        Ok(_) => PasswordAttempt::Unlocked(doc),
        Err(_) => PasswordAttempt::Wrong,
    }
}

/// lopdf exposes no stable taxonomy for decryption failures, so the
/// environment-unsupported condition is detected from the error rendering.
fn is_unsupported_cipher(err: &lopdf::Error) -> bool {
    let rendering = err.to_string().to_lowercase();
    rendering.contains("unsupported") || rendering.contains("not supported")
        || rendering.contains("not implemented")
}

/// Concatenate the text of all pages, one newline separator per page.
fn extract_pages(doc: &Document) -> String {
    let mut text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => debug!(page = page_number, error = %e, "page yielded no text"),
        }
        text.push('\n');
    }
    text
}

/// Build a sibling path by appending `suffix` to the file name.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(ToOwned::to_owned).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{Object, Stream, dictionary};

    /// Write a small single-page PDF with extractable text.
    fn write_sample_pdf(path: &Path, text: &str) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().unwrap(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn extracts_text_from_unencrypted_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invoice.pdf");
        write_sample_pdf(&path, "Total due 123.45 EUR");

        let before = fs::read(&path).unwrap();
        let engine = PdfEngine::new(vec!["unused".to_string()]);
        let text = engine.extract_text(&path);

        assert!(text.contains("Total due 123.45 EUR"));
        // Unencrypted input is left byte-identical, with no work files
        assert_eq!(fs::read(&path).unwrap(), before);
        assert!(!sibling(&path, ".tmp").exists());
        assert!(!sibling(&path, ".decrypted").exists());
    }

    #[test]
    fn page_count_survives_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        write_sample_pdf(&path, "page one");

        let pages_before = Document::load(&path).unwrap().get_pages().len();
        let engine = PdfEngine::default();
        let _ = engine.extract_text(&path);
        let pages_after = Document::load(&path).unwrap().get_pages().len();
        assert_eq!(pages_before, pages_after);
    }

    #[test]
    fn garbage_file_reports_io_failure_and_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"this is not a pdf").unwrap();

        let engine = PdfEngine::new(vec!["secret".to_string()]);
        let outcome = engine.try_extract(&path);

        assert!(matches!(outcome, ExtractOutcome::IoFailure(_)));
        assert_eq!(fs::read(&path).unwrap(), b"this is not a pdf");
        assert!(!sibling(&path, ".tmp").exists());
        assert!(!sibling(&path, ".decrypted").exists());
    }

    #[test]
    fn missing_file_is_io_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pdf");
        let engine = PdfEngine::default();
        assert!(matches!(
            engine.try_extract(&path),
            ExtractOutcome::IoFailure(_)
        ));
    }

    #[test]
    fn extract_text_boundary_never_panics_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"junk").unwrap();
        let engine = PdfEngine::default();
        assert_eq!(engine.extract_text(&path), "");
    }

    // RC4 40-bit (V1/R2) document, user password "hunter2", one page
    // reading "Locked invoice 77".
    const ENCRYPTED_PDF: &[u8] = include_bytes!("../tests/data/encrypted.pdf");

    #[test]
    fn later_password_in_list_unlocks_and_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.pdf");
        fs::write(&path, ENCRYPTED_PDF).unwrap();

        let engine = PdfEngine::new(vec![
            "wrong".to_string(),
            "also wrong".to_string(),
            "hunter2".to_string(),
        ]);
        let text = engine.extract_text(&path);

        assert!(text.contains("Locked invoice 77"));
        // The file was rewritten decrypted under its original name
        assert!(!Document::load(&path).unwrap().is_encrypted());
        assert!(!sibling(&path, ".tmp").exists());
        assert!(!sibling(&path, ".decrypted").exists());
    }

    #[test]
    fn exhausted_password_list_restores_original_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.pdf");
        fs::write(&path, ENCRYPTED_PDF).unwrap();

        let engine = PdfEngine::new(vec!["wrong".to_string(), "also wrong".to_string()]);
        assert_eq!(engine.try_extract(&path), ExtractOutcome::NoPasswordWorked);

        assert_eq!(fs::read(&path).unwrap(), ENCRYPTED_PDF);
        assert!(!sibling(&path, ".tmp").exists());
        assert!(!sibling(&path, ".decrypted").exists());
        assert_eq!(engine.extract_text(&path), "");
    }
}
