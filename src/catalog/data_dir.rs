//! Data directory
//!
//! Style documents live under `styles/` or `workspaces/<ws>/styles/`. In
//! read-only mode the directory is shared with another node and nothing is
//! written or deleted.

use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::error::{ClusterError, Result};

use super::StyleInfo;

#[derive(Debug)]
pub struct DataDirectory {
    root: PathBuf,
    read_only: AtomicBool,
}

impl DataDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::Acquire)
    }

    pub fn set_read_only(&self, read_only: bool) {
        let was = self.read_only.swap(read_only, Ordering::AcqRel);
        if was != read_only {
            info!(
                "Data directory {} is now {}",
                self.root.display(),
                if read_only { "read-only" } else { "writable" }
            );
        }
    }

    /// Path of a style document relative to the data directory root
    pub fn style_document_path(style: &StyleInfo) -> String {
        match &style.workspace {
            Some(ws) => format!("workspaces/{}/styles/{}", ws.name, style.filename),
            None => format!("styles/{}", style.filename),
        }
    }

    /// Resolve a relative document path, rejecting absolute paths and paths
    /// leaving the data directory
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let path = Path::new(relative);
        if relative.is_empty() {
            return Err(ClusterError::InvalidArgument(
                "empty document path".to_string(),
            ));
        }
        for component in path.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                _ => {
                    return Err(ClusterError::InvalidArgument(format!(
                        "document path '{}' escapes the data directory",
                        relative
                    )))
                }
            }
        }
        Ok(self.root.join(path))
    }

    pub async fn read(&self, relative: &str) -> Result<String> {
        let path = self.resolve(relative)?;
        Ok(tokio::fs::read_to_string(path).await?)
    }

    /// Write a document. Returns false when the directory is read-only.
    pub async fn write(&self, relative: &str, content: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        if self.is_read_only() {
            warn!("Read-only data directory, not writing {}", relative);
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        debug!("Wrote {} ({} bytes)", path.display(), content.len());
        Ok(true)
    }

    /// Delete a document. Returns false when the directory is read-only or
    /// the document does not exist.
    pub async fn delete(&self, relative: &str) -> Result<bool> {
        let path = self.resolve(relative)?;
        if self.is_read_only() {
            warn!("Read-only data directory, not deleting {}", relative);
            return Ok(false);
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
