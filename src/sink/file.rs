//! File-backed sink, one file per blob

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::Sink;
use crate::{ReplayError, Result};

/// Writes each blob to `dir/name`, replacing any existing file
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    /// Create a sink rooted at `dir`, creating the directory if needed
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Output directory
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl Sink for FileSink {
    async fn send(&self, name: &str, blob: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let path = self.dir.join(name);

        tokio::fs::write(&path, blob)
            .await
            .map_err(|e| ReplayError::Sink {
                target: path.display().to_string(),
                reason: e.to_string(),
            })?;

        debug!("Wrote {} bytes to {}", blob.len(), path.display());
        Ok(())
    }
}

/// Reject names that would leave the output directory
///
/// # Errors
///
/// Returns error if the name is empty, hidden, or contains a path component
fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ReplayError::InvalidFileName(
            "File name cannot be empty".to_string(),
        ));
    }

    if name.contains('/') || name.contains('\\') {
        return Err(ReplayError::InvalidFileName(format!(
            "File name cannot contain path separators: {name}"
        )));
    }

    if name.starts_with('.') {
        return Err(ReplayError::InvalidFileName(format!(
            "File name cannot start with dot: {name}"
        )));
    }

    if name.contains('\0') {
        return Err(ReplayError::InvalidFileName(
            "File name cannot contain null bytes".to_string(),
        ));
    }

    if name.contains("..") {
        return Err(ReplayError::InvalidFileName(format!(
            "File name cannot contain '..': {name}"
        )));
    }

    Ok(())
}
