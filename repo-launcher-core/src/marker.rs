//! The crash-safe "installation in progress" marker.
//!
//! The marker is an empty file whose existence is the whole state. It is
//! created before the repository or the environment is touched and removed
//! only after an install session succeeds, so a launch that finds it knows the
//! previous run was interrupted and must redo everything.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MARKER_FILE_NAME: &str = "installing";

#[derive(Debug, Clone)]
pub struct SyncStateStore {
    path: PathBuf,
}

impl SyncStateStore {
    /// Marker keyed to the launcher's working directory.
    pub fn new(work_dir: &Path) -> Self {
        Self {
            path: work_dir.join(MARKER_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_present(&self) -> bool {
        self.path.exists()
    }

    pub fn mark(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::File::create(&self.path)?;
        info!(path = %self.path.display(), "Install marker created");
        Ok(())
    }

    /// Remove the marker. A marker that is already gone is not an error.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "Install marker cleared");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Install marker already absent");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
