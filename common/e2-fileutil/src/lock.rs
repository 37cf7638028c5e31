use std::os::fd::AsRawFd;
use std::path::Path;

use anyhow::Result;
use nix::{
    dir::Dir,
    fcntl::{flock, FlockArg, OFlag},
    sys::stat::Mode,
};
use tracing::instrument;

/// An exclusive lock on a directory, released on drop.
///
/// Used for at-most-one-concurrent-fetch per cache entry (§4.4 invariant,
/// §8 invariant 6) and for exclusive chroot locking (component M).
pub struct DirLock {
    _fd: Dir,
}

impl DirLock {
    /// Acquires an exclusive lock on `dir`, blocking until it's available.
    #[instrument]
    pub fn acquire(dir: &Path) -> Result<DirLock> {
        let fd = Dir::open(dir, OFlag::O_DIRECTORY | OFlag::O_CLOEXEC, Mode::empty())?;
        flock(fd.as_raw_fd(), FlockArg::LockExclusive)?;
        Ok(DirLock { _fd: fd })
    }

    /// Attempts to acquire the lock without blocking; returns `Ok(None)` if
    /// another process currently holds it.
    #[instrument]
    pub fn try_acquire(dir: &Path) -> Result<Option<DirLock>> {
        let fd = Dir::open(dir, OFlag::O_DIRECTORY | OFlag::O_CLOEXEC, Mode::empty())?;
        match flock(fd.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => Ok(Some(DirLock { _fd: fd })),
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
