//! gzip-compressed tar packaging of build outputs.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::Path;

use tagship_core::{ArchiveArtifact, ArchiveError, Archiver, BuildOutput};

/// Packs the single compiled binary at the root of a `.tar.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGzArchiver {
    level: Option<u32>,
}

impl TarGzArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the gzip compression level (0-9).
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Some(level.min(9)),
        }
    }

    fn compression(&self) -> Compression {
        self.level.map(Compression::new).unwrap_or_default()
    }
}

#[async_trait]
impl Archiver for TarGzArchiver {
    async fn archive(
        &self,
        output: &BuildOutput,
        name: &str,
    ) -> Result<ArchiveArtifact, ArchiveError> {
        let path = output.path.clone();
        let name = name.to_string();
        let compression = self.compression();

        tokio::task::spawn_blocking(move || pack(&path, &name, compression))
            .await
            .map_err(|e| ArchiveError::Io {
                name: output.job.archive_name(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }
}

/// Build the archive bytes for the file at `path`.
pub fn pack(path: &Path, name: &str, compression: Compression) -> Result<ArchiveArtifact, ArchiveError> {
    let io_err = |source: std::io::Error| ArchiveError::Io {
        name: name.to_string(),
        source,
    };

    if !path.is_file() {
        return Err(ArchiveError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    let file_name = path.file_name().ok_or_else(|| ArchiveError::NotAFile {
        path: path.to_path_buf(),
    })?;

    let encoder = GzEncoder::new(Vec::new(), compression);
    let mut tar_builder = tar::Builder::new(encoder);
    tar_builder
        .append_path_with_name(path, file_name)
        .map_err(io_err)?;
    let encoder = tar_builder.into_inner().map_err(io_err)?;
    let bytes = encoder.finish().map_err(io_err)?;

    Ok(ArchiveArtifact::new(name, bytes))
}
