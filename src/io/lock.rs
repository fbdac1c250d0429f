//! Lock file management for single-instance enforcement.
//!
//! The daemon holds an exclusive `flock` on `$XDG_RUNTIME_DIR/solbright.lock`
//! for its whole lifetime. The file contains the PID so that a second
//! instance can report who holds it, and so that leftovers from a crashed
//! process can be told apart from a live daemon.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::common::constants::LOCK_FILE_NAME;
use crate::common::utils;

/// Runtime directory for the lock file and the IPC socket.
///
/// `$XDG_RUNTIME_DIR`, falling back to `/run/user/{uid}`.
pub fn runtime_dir() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(format!("/run/user/{}", nix::unistd::getuid())),
    }
}

pub fn lock_path() -> PathBuf {
    runtime_dir().join(LOCK_FILE_NAME)
}

/// An acquired instance lock. Released and removed on drop.
#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire the lock at the default location.
pub fn acquire_lock() -> Result<InstanceLock> {
    acquire_lock_at(&lock_path())
}

/// Acquire an exclusive lock on `path`.
///
/// A lock left behind by a process that no longer runs is removed and the
/// acquisition retried once. A lock held by a live process is an error
/// naming its PID.
pub fn acquire_lock_at(path: &Path) -> Result<InstanceLock> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create runtime directory {}", parent.display()))?;
    }

    match try_lock(path)? {
        Some(lock) => Ok(lock),
        None => {
            handle_lock_conflict(path)?;
            try_lock(path)?.ok_or_else(|| {
                anyhow::anyhow!("Failed to acquire lock after removing stale lock file")
            })
        }
    }
}

fn try_lock(path: &Path) -> Result<Option<InstanceLock>> {
    // Open without truncating; the holder's PID must stay readable
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .with_context(|| format!("Failed to open lock file {}", path.display()))?;

    if file.try_lock_exclusive().is_err() {
        return Ok(None);
    }

    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.flush()?;

    Ok(Some(InstanceLock {
        file,
        path: path.to_path_buf(),
    }))
}

/// Decide what to do about a lock we could not take.
///
/// Returns `Ok(())` when the lock was stale and has been removed.
fn handle_lock_conflict(path: &Path) -> Result<()> {
    match read_lock_pid(path) {
        Some(pid) if utils::is_process_running(pid) => {
            anyhow::bail!("solbright is already running (PID: {pid})")
        }
        Some(pid) => {
            log_warning!("Removing stale lock file (process {pid} no longer running)");
        }
        None => {
            log_warning!("Lock file contains invalid PID, removing stale lock");
        }
    }
    let _ = std::fs::remove_file(path);
    Ok(())
}

/// PID recorded in a lock file, if readable.
pub fn read_lock_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()?
        .lines()
        .next()?
        .trim()
        .parse()
        .ok()
}

/// PID of the running daemon, if there is one.
pub fn running_instance() -> Option<u32> {
    read_lock_pid(&lock_path()).filter(|pid| utils::is_process_running(*pid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("solbright.lock");

        let lock = acquire_lock_at(&path).unwrap();
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));

        let err = acquire_lock_at(&path).unwrap_err();
        assert!(err.to_string().contains("already running"));

        drop(lock);
        assert!(!path.exists());
        assert!(acquire_lock_at(&path).is_ok());
    }

    #[test]
    fn test_unlocked_leftover_file_is_reused() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("solbright.lock");
        std::fs::write(&path, "garbage\n").unwrap();

        let _lock = acquire_lock_at(&path).unwrap();
        assert_eq!(read_lock_pid(&path), Some(std::process::id()));
    }

    #[test]
    #[serial]
    fn test_runtime_dir_prefers_xdg() {
        let original = std::env::var("XDG_RUNTIME_DIR").ok();
        unsafe {
            std::env::set_var("XDG_RUNTIME_DIR", "/tmp/solbright-test-runtime");
        }
        assert_eq!(
            lock_path(),
            PathBuf::from("/tmp/solbright-test-runtime/solbright.lock")
        );
        unsafe {
            std::env::remove_var("XDG_RUNTIME_DIR");
        }
        assert!(runtime_dir().to_string_lossy().starts_with("/run/user/"));
        unsafe {
            if let Some(value) = original {
                std::env::set_var("XDG_RUNTIME_DIR", value);
            }
        }
    }
}
