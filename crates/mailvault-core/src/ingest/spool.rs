//! Filesystem spool mailbox: a directory of `.eml` files.
//!
//! The bundled [`MailboxSession`] implementation for tests and local
//! operation. A real IMAP transport is an external collaborator that plugs
//! in behind the same trait.

use std::fs;
use std::path::PathBuf;

use super::{MailboxError, MailboxProvider, MailboxSession};

/// Provider over a spool directory.
#[derive(Debug, Clone)]
pub struct SpoolMailbox {
    dir: PathBuf,
}

impl SpoolMailbox {
    /// Create a provider for the given spool directory.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MailboxProvider for SpoolMailbox {
    type Session = SpoolSession;

    async fn connect(&self) -> Result<Self::Session, MailboxError> {
        if !self.dir.is_dir() {
            return Err(MailboxError::Connection(format!(
                "spool directory not found: {}",
                self.dir.display()
            )));
        }
        Ok(SpoolSession {
            dir: self.dir.clone(),
        })
    }
}

/// A "connected" spool directory.
#[derive(Debug)]
pub struct SpoolSession {
    dir: PathBuf,
}

impl MailboxSession for SpoolSession {
    async fn select_inbox(&mut self) -> Result<(), MailboxError> {
        // The spool has a single folder; connecting already validated it
        Ok(())
    }

    async fn search_all(&mut self) -> Result<Vec<String>, MailboxError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(MailboxError::Io)? {
            let entry = entry.map_err(MailboxError::Io)?;
            let path = entry.path();
            let is_eml = path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"));
            if is_eml && path.is_file() {
                if let Some(name) = path.file_name() {
                    ids.push(name.to_string_lossy().into_owned());
                }
            }
        }
        // Mailbox order is file-name order
        ids.sort();
        Ok(ids)
    }

    async fn fetch(&mut self, id: &str) -> Result<Vec<u8>, MailboxError> {
        // Identifiers come from search_all; refuse anything path-like
        if id.contains(['/', '\\']) || id.contains("..") {
            return Err(MailboxError::Fetch {
                id: id.to_string(),
                reason: "invalid message identifier".to_string(),
            });
        }
        fs::read(self.dir.join(id)).map_err(|e| MailboxError::Fetch {
            id: id.to_string(),
            reason: e.to_string(),
        })
    }

    async fn logout(&mut self) -> Result<(), MailboxError> {
        Ok(())
    }
}
