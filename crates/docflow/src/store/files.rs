use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::FileSource;
use crate::error::FileError;
use crate::sanitize;

/// Reads uploaded files from a directory on local or mounted storage.
pub struct LocalFileSource {
    root: PathBuf,
}

impl LocalFileSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a storage key below the root. Keys may not be absolute or
    /// climb out of the root.
    pub fn resolve(&self, storage_path: &str) -> Result<PathBuf, FileError> {
        let key = storage_path.trim();
        if key.is_empty() {
            return Err(FileError::InvalidPath("empty storage path".to_string()));
        }

        let relative = Path::new(key);
        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FileError::InvalidPath(key.to_string()));
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileSource for LocalFileSource {
    async fn fetch(&self, storage_path: &str) -> Result<Vec<u8>, FileError> {
        let path = self.resolve(storage_path)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(
                    file = %sanitize::redact_path(&path),
                    bytes = bytes.len(),
                    "Fetched stored file"
                );
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FileError::NotFound(path)),
            Err(e) => Err(FileError::Read { path, source: e }),
        }
    }
}
