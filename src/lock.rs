// src/lock.rs

//! Single-instance mutual exclusion
//!
//! Two concurrent runs would race over the shared working directory and the
//! platform installer, so a run holds an exclusive non-blocking flock on a
//! well-known lock file for its lifetime. A second instance fails fast with
//! a distinct exit status instead of queueing.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Default lock file location.
pub const DEFAULT_LOCK_PATH: &str = "/tmp/loopdown.lock";

/// RAII guard over the instance lock; released and removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Acquire the lock at `path`, failing immediately if another instance
    /// holds it.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)?;

        file.try_lock_exclusive().map_err(|_| Error::AlreadyRunning)?;
        debug!("Acquired instance lock at {}", path.display());

        Ok(InstanceLock {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Err(e) = fs2::FileExt::unlock(&self.file) {
            warn!("Unable to release instance lock: {}", e);
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(
                "Unable to remove lock file {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
