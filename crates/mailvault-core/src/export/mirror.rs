//! Local-directory remote store: mirrors uploads into a directory tree.
//!
//! The bundled [`RemoteStore`] implementation for tests and local
//! operation. Folder identifiers are paths relative to the mirror root;
//! the root folder's identifier is the empty string.

use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{RemoteEntry, RemoteStore, StoreError};

/// Remote store backed by a local directory.
#[derive(Debug, Clone)]
pub struct DirMirror {
    root: PathBuf,
}

impl DirMirror {
    /// Create a mirror rooted at the given directory, creating it if
    /// needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the root directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Identifier of the mirror root, for use as a stager's root folder.
    #[must_use]
    pub fn root_id() -> String {
        String::new()
    }

    fn resolve(&self, folder_id: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(folder_id);
        // Identifiers only ever come from this store's own create_folder
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if folder_id.contains("..") || (!folder_id.is_empty() && escapes) {
            return Err(StoreError::Remote(format!(
                "invalid folder identifier: {folder_id}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

impl RemoteStore for DirMirror {
    async fn list_children(&self, folder_id: &str) -> Result<Vec<RemoteEntry>, StoreError> {
        let dir = self.resolve(folder_id)?;
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut children = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let id = if folder_id.is_empty() {
                name.clone()
            } else {
                format!("{folder_id}/{name}")
            };
            children.push(RemoteEntry {
                id,
                is_folder: entry.path().is_dir(),
                name,
            });
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(children)
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, StoreError> {
        let id = if parent_id.is_empty() {
            name.to_string()
        } else {
            format!("{parent_id}/{name}")
        };
        fs::create_dir_all(self.resolve(&id)?)?;
        Ok(id)
    }

    async fn create_file(
        &self,
        parent_id: &str,
        local_path: &Path,
    ) -> Result<String, StoreError> {
        let file_name = local_path
            .file_name()
            .ok_or_else(|| StoreError::Remote(format!("not a file: {}", local_path.display())))?
            .to_string_lossy()
            .into_owned();
        let id = if parent_id.is_empty() {
            file_name
        } else {
            format!("{parent_id}/{file_name}")
        };
        fs::copy(local_path, self.resolve(&id)?)?;
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn folders_and_files_land_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DirMirror::new(dir.path().join("remote")).unwrap();

        let year = mirror.create_folder("", "2024").await.unwrap();
        let month = mirror.create_folder(&year, "November").await.unwrap();
        assert_eq!(month, "2024/November");

        let source = dir.path().join("a.pdf");
        fs::write(&source, b"%PDF-1.4").unwrap();
        let file_id = mirror.create_file(&month, &source).await.unwrap();
        assert_eq!(file_id, "2024/November/a.pdf");
        assert!(dir.path().join("remote/2024/November/a.pdf").is_file());
    }

    #[tokio::test]
    async fn list_children_reports_folders_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DirMirror::new(dir.path()).unwrap();
        mirror.create_folder("", "2024").await.unwrap();
        let source = dir.path().join("loose.txt");
        fs::write(&source, b"x").unwrap();
        mirror.create_file("", &source).await.unwrap();

        let children = mirror.list_children("").await.unwrap();
        let folder = children.iter().find(|c| c.name == "2024").unwrap();
        assert!(folder.is_folder);
        let file = children.iter().find(|c| c.name == "loose.txt").unwrap();
        assert!(!file.is_folder);
    }

    #[tokio::test]
    async fn listing_an_unknown_folder_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DirMirror::new(dir.path()).unwrap();
        assert!(mirror.list_children("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rejects_escaping_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let mirror = DirMirror::new(dir.path()).unwrap();
        assert!(mirror.list_children("../outside").await.is_err());
    }
}
