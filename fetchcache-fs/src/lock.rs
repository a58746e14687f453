use std::fs::File;
use std::io;

use fs2::FileExt;

/// Exclusive advisory lock held until drop.
pub(crate) struct LockedFile {
    file: File,
}

impl LockedFile {
    /// Blocks until the exclusive lock on `file` is acquired.
    pub(crate) fn acquire(file: File) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }

    pub(crate) fn file(&mut self) -> &mut File {
        &mut self.file
    }
}

impl Drop for LockedFile {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.file) {
            tracing::debug!(?error, "Failed to release cache file lock");
        }
    }
}
