// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager lock handling.
//!
//! Dpkg and apt serialize themselves through POSIX record locks placed on a
//! handful of lock files. Other processes, e.g., unattended-upgrades, may be
//! holding those locks when hostprep wants to install something. So, before
//! every batch installation we wait for the locks to clear, but only for a
//! bounded amount of time.
//!
//! Locks are probed with `F_GETLK`, which reports a conflicting lock without
//! ever taking it. Locks held by our own process never conflict, which is fine
//! given that hostprep never holds these locks itself.

use nix::{
    fcntl::{fcntl, FcntlArg},
    libc,
};
use std::{
    fs::OpenOptions,
    io::ErrorKind,
    os::fd::AsRawFd,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};
use tracing::{info, instrument};

/// Lock files used by dpkg and apt.
pub const APT_LOCK_FILES: [&str; 4] = [
    "/var/lib/dpkg/lock-frontend",
    "/var/lib/dpkg/lock",
    "/var/lib/apt/lists/lock",
    "/var/cache/apt/archives/lock",
];

/// Bounded wait on a set of lock files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockWait {
    files: Vec<PathBuf>,
    timeout: Duration,
    interval: Duration,
}

impl LockWait {
    /// Construct new lock wait over target lock files.
    pub fn new(files: impl IntoIterator<Item = impl Into<PathBuf>>, timeout: Duration) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
            timeout,
            interval: Duration::from_secs(1),
        }
    }

    /// Construct new lock wait over the standard dpkg and apt lock files.
    pub fn apt(timeout: Duration) -> Self {
        Self::new(APT_LOCK_FILES, timeout)
    }

    /// Set polling interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Block until every lock file is free.
    ///
    /// # Errors
    ///
    /// - Return [`LockError::Timeout`] if any lock is still held once the
    ///   timeout elapses.
    /// - Return [`LockError::Probe`] if a lock file cannot be queried.
    pub fn wait(&self) -> Result<()> {
        self.wait_with(lock_holder)
    }

    #[instrument(skip(self, probe), level = "debug")]
    pub(crate) fn wait_with<F>(&self, mut probe: F) -> Result<()>
    where
        F: FnMut(&Path) -> Result<Option<i32>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut announced = false;

        loop {
            let mut held = None;
            for file in &self.files {
                if let Some(pid) = probe(file)? {
                    held = Some((file, pid));
                    break;
                }
            }

            let Some((file, pid)) = held else {
                return Ok(());
            };

            if Instant::now() >= deadline {
                return Err(LockError::Timeout {
                    path: file.clone(),
                    pid,
                    waited: self.timeout,
                });
            }

            if !announced {
                info!(
                    "waiting for package manager lock {:?} held by pid {pid}",
                    file.display()
                );
                announced = true;
            }

            thread::sleep(self.interval);
        }
    }
}

/// Find process holding write lock on target file.
///
/// A missing lock file means nobody holds it.
///
/// # Errors
///
/// - Return [`LockError::Probe`] if the file cannot be opened or queried.
pub fn lock_holder(path: &Path) -> Result<Option<i32>> {
    let file = match OpenOptions::new().read(true).write(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(LockError::Probe {
                path: path.into(),
                source: err,
            })
        }
    };

    let mut query = whole_file_write_lock();
    fcntl(file.as_raw_fd(), FcntlArg::F_GETLK(&mut query)).map_err(|errno| LockError::Probe {
        path: path.into(),
        source: errno.into(),
    })?;

    if i32::from(query.l_type) == libc::F_UNLCK {
        Ok(None)
    } else {
        Ok(Some(query.l_pid))
    }
}

/// Write lock over the whole file, as dpkg and apt take it.
fn whole_file_write_lock() -> libc::flock {
    libc::flock {
        l_type: libc::F_WRLCK as libc::c_short,
        l_whence: libc::SEEK_SET as libc::c_short,
        l_start: 0,
        l_len: 0,
        l_pid: 0,
    }
}

/// Lock wait error types.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock still held after waiting.
    #[error("package manager lock {:?} still held by pid {pid} after {waited:?}", path.display())]
    Timeout {
        path: PathBuf,
        pid: i32,
        waited: Duration,
    },

    /// Lock file could not be queried.
    #[error("failed to query lock file {:?}", path.display())]
    Probe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = LockError> = std::result::Result<T, E>;
