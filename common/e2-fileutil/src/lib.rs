//! Temp directory, locking, and filesystem helpers shared by the cache (F),
//! chroot controller (M), and build pipeline (L).

mod atomic;
mod lock;
mod remove;
mod tempdir;

pub use atomic::publish_atomically;
pub use lock::DirLock;
pub use remove::remove_dir_all_with_chmod;
pub use tempdir::{SafeTempDir, SafeTempDirBuilder};
