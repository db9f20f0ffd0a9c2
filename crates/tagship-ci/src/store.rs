//! Build-artifact storage on the local filesystem.
//!
//! Archives are written through a temp file in the same directory and then
//! persisted over the final name, so readers never see a partial archive.

use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use tagship_core::{checksum_name, ArchiveArtifact, ArtifactStore, UploadError};

/// Filesystem-backed build-artifact store.
///
/// Layout: `<root>/<archive name>` plus `<root>/<archive name>.sha256`.
/// Storing a name again replaces both files.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    // Atomic write: temp file in the same directory, then rename.
    fn write_atomic(&self, name: &str, data: &[u8]) -> std::io::Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(data)?;
        tmp.persist(self.artifact_path(name)).map_err(|e| e.error)?;
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, artifact: &ArchiveArtifact) -> Result<(), UploadError> {
        if artifact.name.contains(['/', '\\']) || artifact.name.starts_with('.') {
            return Err(UploadError::Rejected {
                name: artifact.name.clone(),
                reason: "artifact name must be a plain file name".to_string(),
            });
        }

        let store = self.clone();
        let name = artifact.name.clone();
        let bytes = artifact.bytes.clone();
        let checksum = artifact.checksum_line();

        tokio::task::spawn_blocking(move || {
            store.write_atomic(&name, &bytes)?;
            store.write_atomic(&checksum_name(&name), checksum.as_bytes())
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|r| r)
        .map_err(|source| UploadError::Io {
            name: artifact.name.clone(),
            source,
        })
    }
}
