//! Single-instance lock file
//!
//! Two runs against the same queue could both fetch a message before either
//! commits its pickup. The lock file keeps a second run from starting while
//! the first is alive.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, Write},
    os::unix::{fs::MetadataExt, io::AsRawFd},
    path::{Path, PathBuf},
};

use mailout_common::{
    internal,
    tracing::{error, warn},
};
use thiserror::Error;

const ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("{} is held by running process {pid}", path.display())]
    Held { path: PathBuf, pid: i32 },

    #[error("Could not create lock file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A lock file holding the pid of the process that owns it
///
/// Ownership is an exclusive `flock` on the open file, so a file left behind
/// by a crashed run is never locked and is simply taken over. The file is
/// removed when the lock is dropped.
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
    _file: File,
}

impl PidLock {
    /// Open `path`, take an exclusive lock on it and write the current pid.
    ///
    /// # Errors
    ///
    /// [`LockError::Held`] if another process owns the lock, [`LockError::Io`]
    /// if the file cannot be opened or locked.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, LockError> {
        let path = path.into();
        let io_error = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        for _ in 0..ATTEMPTS {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .map_err(io_error)?;

            if !try_lock(&file).map_err(io_error)? {
                return Err(LockError::Held {
                    pid: read_pid(&path).unwrap_or_default(),
                    path: path.clone(),
                });
            }

            // The previous owner unlinks the file before releasing its lock,
            // so the inode locked here may no longer be the one at `path`.
            if !is_same_file(&file, &path).map_err(io_error)? {
                continue;
            }

            if let Some(stale) = read_pid(&path) {
                warn!(path = %path.display(), pid = stale, "Taking over stale lock file");
            }

            file.set_len(0).map_err(io_error)?;
            writeln!(file, "{}", std::process::id()).map_err(io_error)?;

            internal!(level = DEBUG, path = %path.display(), "Acquired lock file");
            return Ok(Self { path, _file: file });
        }

        Err(io_error(io::Error::new(
            io::ErrorKind::WouldBlock,
            "lock file kept being replaced",
        )))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            error!(path = %self.path.display(), error = %e, "Could not remove lock file");
        }
    }
}

/// `Ok(false)` if another open file holds the lock.
fn try_lock(file: &File) -> io::Result<bool> {
    // SAFETY: the descriptor is owned by `file` and stays open for the call
    let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if ret == 0 {
        return Ok(true);
    }

    let e = io::Error::last_os_error();
    if e.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Ok(false)
    } else {
        Err(e)
    }
}

fn is_same_file(file: &File, path: &Path) -> io::Result<bool> {
    let opened = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(opened.dev() == current.dev() && opened.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn read_pid(path: &Path) -> Option<i32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};

    use super::*;

    fn own_pid() -> i32 {
        i32::try_from(std::process::id()).unwrap()
    }

    #[test]
    fn test_acquire_writes_pid_and_drop_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailout.pid");

        let lock = PidLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(own_pid()));
        assert_eq!(lock.path(), path);

        drop(lock);
        assert!(!path.exists());
    }

    #[test]
    fn test_live_holder_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailout.pid");

        let _held = PidLock::acquire(&path).unwrap();
        let err = PidLock::acquire(&path).unwrap_err();
        assert!(matches!(err, LockError::Held { pid, .. } if pid == own_pid()));
    }

    #[test]
    fn test_stale_lock_is_replaced() {
        let dir = tempfile::tempdir().unwrap();

        for stale in ["not a pid\n", "0\n", "2147483647\n"] {
            let path = dir.path().join("mailout.pid");
            fs::write(&path, stale).unwrap();

            let lock = PidLock::acquire(&path).unwrap();
            assert_eq!(read_pid(&path), Some(own_pid()), "{stale:?}");
            drop(lock);
        }
    }

    #[test]
    fn test_released_lock_can_be_reacquired() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailout.pid");

        drop(PidLock::acquire(&path).unwrap());
        let lock = PidLock::acquire(&path).unwrap();
        assert_eq!(read_pid(&path), Some(own_pid()));
        drop(lock);
    }

    #[test]
    fn test_concurrent_takeover_of_stale_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailout.pid");
        fs::write(&path, "2147483647\n").unwrap();

        let barrier = Arc::new(Barrier::new(8));
        let attempts = (0..8)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    PidLock::acquire(path)
                })
            })
            .collect::<Vec<_>>();

        let results = attempts
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Vec<_>>();

        assert_eq!(results.iter().filter(|result| result.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|result| result.as_ref().err())
                .all(|err| matches!(err, LockError::Held { .. }))
        );
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = PidLock::acquire(dir.path().join("missing/mailout.pid")).unwrap_err();
        assert!(matches!(err, LockError::Io { .. }));
    }
}
