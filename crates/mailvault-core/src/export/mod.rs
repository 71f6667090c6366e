//! Export Stager.
//!
//! Two phases per invocation: *categorize* copies classified attachments
//! into a `<base>/<year>/<month-name>/<organization>` staging tree and
//! records `processed_path`; *upload* mirrors staged files to the remote
//! store collaborator and flips the terminal `uploaded` flag. Both phases
//! are idempotent on their own selection filters, so a crash mid-batch is
//! recovered by simply running again.

pub mod mirror;

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::Result;
use crate::record::{Record, RecordRepository};

/// Failure of the remote storage collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Remote-side failure (auth, quota, missing folder, transport).
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Local I/O failure while reading the file to upload.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One child of a remote folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Store-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether this entry is a folder.
    pub is_folder: bool,
}

/// Remote object-store collaborator.
///
/// The pipeline only needs enough surface to mirror a local directory
/// tree: list a folder, create a folder, create a file from a local path.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// List the children of a folder.
    async fn list_children(&self, folder_id: &str)
    -> std::result::Result<Vec<RemoteEntry>, StoreError>;

    /// Create a folder under a parent, returning its id.
    async fn create_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> std::result::Result<String, StoreError>;

    /// Upload a local file into a folder, returning the new file's id.
    async fn create_file(
        &self,
        parent_id: &str,
        local_path: &Path,
    ) -> std::result::Result<String, StoreError>;
}

/// `(parent_id, name) -> child_id` cache over remote folder lookups.
///
/// Each remote level is listed at most once per run, instead of one list
/// call per record per level.
#[derive(Debug, Default)]
pub struct FolderCache {
    entries: HashMap<(String, String), String>,
    listed: HashSet<String>,
}

impl FolderCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a folder under `parent_id`, reusing an existing remote
    /// folder by name or creating it.
    ///
    /// # Errors
    ///
    /// Returns an error if the list or create call fails.
    pub async fn ensure_folder<S: RemoteStore>(
        &mut self,
        store: &S,
        parent_id: &str,
        name: &str,
    ) -> std::result::Result<String, StoreError> {
        let key = (parent_id.to_string(), name.to_string());
        if let Some(id) = self.entries.get(&key) {
            return Ok(id.clone());
        }

        if !self.listed.contains(parent_id) {
            for entry in store.list_children(parent_id).await? {
                if entry.is_folder {
                    self.entries
                        .insert((parent_id.to_string(), entry.name), entry.id);
                }
            }
            self.listed.insert(parent_id.to_string());
            if let Some(id) = self.entries.get(&key) {
                return Ok(id.clone());
            }
        }

        let id = store.create_folder(parent_id, name).await?;
        self.entries.insert(key, id.clone());
        Ok(id)
    }
}

/// Counters for one export run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportReport {
    /// Records staged by the categorize phase.
    pub staged: usize,
    /// Records uploaded and marked terminal.
    pub uploaded: usize,
    /// Staged files found missing on disk (operational anomaly, skipped).
    pub missing: usize,
}

/// Default categorize-phase batch size.
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// The export stager.
pub struct ExportStager<'a, S: RemoteStore> {
    repo: &'a RecordRepository,
    store: &'a S,
    base_dir: PathBuf,
    root_folder_id: String,
    batch_size: u32,
}

impl<'a, S: RemoteStore> ExportStager<'a, S> {
    /// Create a stager over the staging base directory and a remote root
    /// folder.
    pub fn new(
        repo: &'a RecordRepository,
        store: &'a S,
        base_dir: impl Into<PathBuf>,
        root_folder_id: impl Into<String>,
        batch_size: u32,
    ) -> Self {
        Self {
            repo,
            store,
            base_dir: base_dir.into(),
            root_folder_id: root_folder_id.into(),
            batch_size,
        }
    }

    /// Run both phases: categorize, then upload.
    ///
    /// # Errors
    ///
    /// Returns an error if a Record Store operation fails.
    pub async fn run(&self) -> Result<ExportReport> {
        let staged = self.categorize().await?;
        let (uploaded, missing) = self.upload().await?;
        Ok(ExportReport {
            staged,
            uploaded,
            missing,
        })
    }

    /// Copy up to `batch_size` classified attachments into the staging
    /// tree and record their `processed_path` in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the selection query or the batch commit fails.
    pub async fn categorize(&self) -> Result<usize> {
        let batch = self.repo.classified_unstaged(self.batch_size).await?;
        let mut staged = Vec::new();

        for record in &batch {
            match self.stage_record(record) {
                Ok(Some(destination)) => {
                    staged.push((record.id, destination));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(record = %record.id, error = %e, "failed to stage attachment");
                }
            }
        }

        // One commit for the whole batch; a crash before this point leaves
        // only unreferenced copies that re-staging overwrites
        self.repo.mark_staged(&staged).await?;
        Ok(staged.len())
    }

    /// Copy one record's attachment into its destination directory.
    fn stage_record(&self, record: &Record) -> std::io::Result<Option<String>> {
        let Some(attachment) = record.attachment_path.as_deref() else {
            return Ok(None);
        };
        let source = Path::new(attachment);
        if !source.exists() {
            warn!(record = %record.id, path = attachment, "attachment file missing");
            return Ok(None);
        }

        let organization = record
            .sender_organization
            .as_deref()
            .filter(|o| !o.is_empty())
            .unwrap_or("Unknown");
        let when = record.received_at;
        let directory = self
            .base_dir
            .join(when.format("%Y").to_string())
            .join(when.format("%B").to_string())
            .join(organization.replace(['/', '\\'], "-"));
        fs::create_dir_all(&directory)?;

        let Some(file_name) = source.file_name() else {
            return Ok(None);
        };
        let destination = directory.join(file_name);
        fs::copy(source, &destination)?;
        // fs::copy carries permissions but not timestamps; the staged copy
        // keeps the source's modification time
        let modified = fs::metadata(source)?.modified()?;
        fs::File::options()
            .write(true)
            .open(&destination)?
            .set_times(fs::FileTimes::new().set_modified(modified))?;
        info!(
            record = %record.id,
            from = attachment,
            to = %destination.display(),
            "staged attachment"
        );
        Ok(Some(destination.to_string_lossy().into_owned()))
    }

    /// Upload every staged-but-not-uploaded record, committing per record.
    ///
    /// Returns `(uploaded, missing)` counts.
    ///
    /// # Errors
    ///
    /// Returns an error if a Record Store operation fails.
    pub async fn upload(&self) -> Result<(usize, usize)> {
        let pending = self.repo.staged_not_uploaded().await?;
        let mut folders = FolderCache::new();
        let mut uploaded = 0;
        let mut missing = 0;

        for record in pending {
            let Some(processed) = record.processed_path.as_deref() else {
                continue;
            };
            let path = Path::new(processed);
            if !path.exists() {
                // Not retried automatically and not deleted; an operator
                // has to look at this one
                warn!(record = %record.id, path = processed, "staged file missing, skipping upload");
                missing += 1;
                continue;
            }

            match self.upload_one(&mut folders, path).await {
                Ok(()) => {
                    if self.repo.mark_uploaded(record.id).await? {
                        info!(record = %record.id, path = processed, "uploaded");
                        uploaded += 1;
                    }
                }
                Err(e) => {
                    warn!(record = %record.id, error = %e, "upload failed, will retry next run");
                }
            }
        }

        Ok((uploaded, missing))
    }

    /// Mirror one staged file into the remote store, creating the folder
    /// chain for its staging-relative path.
    async fn upload_one(
        &self,
        folders: &mut FolderCache,
        path: &Path,
    ) -> std::result::Result<(), StoreError> {
        let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);

        let mut parent = self.root_folder_id.clone();
        if let Some(directories) = relative.parent() {
            for component in directories.components() {
                let name = component.as_os_str().to_string_lossy();
                parent = folders.ensure_folder(self.store, &parent, &name).await?;
            }
        }

        self.store.create_file(&parent, path).await?;
        Ok(())
    }
}
