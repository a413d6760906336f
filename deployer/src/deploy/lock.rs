//! Per-tree run lock
//!
//! An advisory `flock` on a file next to the repository metadata, so a
//! webhook-triggered run and a manual `pushdeploy-deploy` never pull or
//! restart the same working tree at the same time. The lock belongs to the
//! open file; it is released when [`RunLock`] is dropped or the process dies.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use crate::errors::LockError;

pub const LOCK_FILE: &str = "pushdeploy.lock";

/// Exclusive hold on a project root
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// `.git/pushdeploy.lock` inside a repository, `.pushdeploy.lock` otherwise
    pub fn path_for(project_root: &Path) -> PathBuf {
        let git_dir = project_root.join(".git");
        if git_dir.is_dir() {
            git_dir.join(LOCK_FILE)
        } else {
            project_root.join(format!(".{}", LOCK_FILE))
        }
    }

    /// Take the lock without waiting
    pub fn try_acquire(project_root: &Path) -> Result<Self, LockError> {
        let path = Self::path_for(project_root);
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(LockError::Held { path });
            }
            return Err(LockError::Io { path, source: e });
        }

        // Owner pid, for whoever inspects a stuck lock by hand
        if let Err(e) = file
            .set_len(0)
            .and_then(|_| writeln!(file, "{}", std::process::id()))
        {
            debug!("Could not record pid in {}: {}", path.display(), e);
        }

        debug!("Acquired run lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Unlocking {} failed: {}", self.path.display(), e);
        }
    }
}
