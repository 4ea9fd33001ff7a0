//! File-based locking so two runs of one schedule never rotate the same
//! snapshot history at once

use anyhow::{Context, Result};
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type HeldLock = (RwLock<File>, Option<RwLockWriteGuard<'static, File>>);

/// Exclusive lock on one region/period schedule, released on drop
pub struct RunLock {
    _held: Box<HeldLock>,
    lock_path: PathBuf,
}

impl RunLock {
    /// Take the lock for `name` inside `directory` without blocking.
    /// Fails when another run holds it.
    pub fn acquire(directory: &Path, name: &str) -> Result<Self> {
        let lock_path = Self::lock_path(directory, name);

        debug!("Attempting to acquire run lock: {:?}", lock_path);

        std::fs::create_dir_all(directory)
            .with_context(|| format!("Failed to create lock directory: {:?}", directory))?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .with_context(|| format!("Failed to open lock file: {:?}", lock_path))?;

        let mut held: Box<HeldLock> = Box::new((RwLock::new(file), None));

        // SAFETY: the guard borrows the RwLock stored in the same heap
        // allocation, which never moves while the box is alive. Tuple fields
        // drop in declaration order, so `Drop` takes the guard out first.
        let lock_ptr = &mut held.0 as *mut RwLock<File>;
        let guard = unsafe { (*lock_ptr).try_write() }.with_context(|| {
            format!("Schedule '{}' is already running (lock held)", name)
        })?;

        let guard: RwLockWriteGuard<'static, File> = unsafe { std::mem::transmute(guard) };
        held.1 = Some(guard);

        info!("Acquired run lock: {}", name);

        Ok(Self {
            _held: held,
            lock_path,
        })
    }

    /// Lock file name for a region/period pair
    pub fn schedule_name(region: &str, period: &str) -> String {
        format!("{}-{}", region, period)
    }

    fn lock_path(directory: &Path, name: &str) -> PathBuf {
        directory.join(format!("snapshot-rotator-{}.lock", name))
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // Release the guard while the RwLock it borrows is still alive
        self._held.1.take();

        info!("Released run lock: {:?}", self.lock_path);

        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            debug!("Failed to remove lock file: {}", e);
        }
    }
}
