//! Resume checkpoint: the key of the item being processed, kept on disk.

use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::types::ItemKey;

/// Errors reading or writing the checkpoint.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// The checkpoint file could not be read, written or removed.
    #[error("checkpoint {path}: {source}")]
    Io {
        /// Checkpoint file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Durable storage for a single resume point.
///
/// At most one key is live at a time; recording replaces the previous one.
pub trait ResumeCheckpoint {
    /// Persist `key` as the resume point.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be persisted.
    fn record(&mut self, key: &ItemKey) -> Result<(), CheckpointError>;

    /// The persisted resume point, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store exists but cannot be read.
    fn load(&self) -> Result<Option<ItemKey>, CheckpointError>;

    /// Forget the resume point.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be removed.
    fn clear(&mut self) -> Result<(), CheckpointError>;
}

/// A checkpoint stored as the sole line of a small text file.
///
/// The file's existence at startup signals an interrupted run.
#[derive(Debug, Clone)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    /// File name used inside the config directory.
    pub const DEFAULT_FILE_NAME: &'static str = "resume.txt";

    /// A checkpoint at `path`. Nothing is touched until first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the checkpoint file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, source: io::Error) -> CheckpointError {
        CheckpointError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl ResumeCheckpoint for FileCheckpoint {
    fn record(&mut self, key: &ItemKey) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| self.err(e))?;
        }
        // Written beside the target, then renamed over it.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, format!("{key}\n")).map_err(|e| self.err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.err(e))?;
        debug!(%key, "checkpoint recorded");
        Ok(())
    }

    fn load(&self) -> Result<Option<ItemKey>, CheckpointError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text
                .lines()
                .next()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(ItemKey::new)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.err(e)),
        }
    }

    fn clear(&mut self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.err(e)),
        }
    }
}
