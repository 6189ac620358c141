//! Staging file management.
//!
//! A relay stages the object in a private temporary file that lives for
//! exactly one invocation. [`Stager`] creates it; [`StagingFile::release`]
//! closes and deletes it, attempting both steps and reporting both
//! failures.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::CloneError;

/// Name prefix of staging files.
pub const TEMP_PREFIX: &str = "mediarelay_";

/// A temporary file owned by one relay invocation.
///
/// Fetch workers write into it concurrently through
/// [`write_at`](Self::write_at) (disjoint offsets); the push stage then
/// reads it sequentially after a rewind.
pub trait StagingFile: Read + Seek + Send + Sync {
    /// Writes a prefix of `buf` at `offset` without moving the cursor used by reads.
    ///
    /// Blocking; callers write at most one part (512 KiB) per call.
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Location of the file on disk.
    fn path(&self) -> &Path;

    /// Closes the handle and deletes the file.
    ///
    /// Both steps are always attempted; their failures are composed.
    fn release(self: Box<Self>) -> Result<(), CloneError>;
}

/// Creates staging files.
pub trait Stager: Send + Sync {
    fn acquire(&self) -> io::Result<Box<dyn StagingFile>>;
}

/// Stages into uniquely named files in a directory (the system temp dir by default).
#[derive(Debug, Clone, Default)]
pub struct TempStager {
    dir: Option<PathBuf>,
}

impl TempStager {
    /// Stages into the system temporary directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages into `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }
}

impl Stager for TempStager {
    fn acquire(&self) -> io::Result<Box<dyn StagingFile>> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(TEMP_PREFIX);
        let file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, path) = file.into_parts();
        Ok(Box::new(TempStaging { file, path }))
    }
}

/// Staging file created by [`TempStager`].
///
/// If dropped without [`release`](StagingFile::release), the file is still
/// removed (errors ignored).
pub struct TempStaging {
    file: File,
    path: TempPath,
}

impl Read for TempStaging {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Seek for TempStaging {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }
}

impl StagingFile for TempStaging {
    fn write_at(&self, buf: &[u8], offset: u64) -> io::Result<usize> {
        positional_write(&self.file, buf, offset)
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn release(self: Box<Self>) -> Result<(), CloneError> {
        let TempStaging { file, path } = *self;
        let closed = close(file);
        let removed = path.close();
        compose_release(closed, removed)
    }
}

/// Flushes and drops the handle.
///
/// Syncs the handle to disk and drops it.
///
/// `File` swallows errors from close(2) on drop, so deferred write-back
/// failures (ENOSPC, EIO) are collected by the sync instead.
fn close(file: File) -> io::Result<()> {
    file.sync_all()?;
    drop(file);
    Ok(())
}

/// Folds the outcomes of the close and delete steps into one result.
pub(crate) fn compose_release(
    closed: io::Result<()>,
    removed: io::Result<()>,
) -> Result<(), CloneError> {
    let failures = [
        closed.err().map(CloneError::CloseTemp),
        removed.err().map(CloneError::RemoveTemp),
    ];
    match failures.into_iter().flatten().reduce(CloneError::combine) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn positional_write(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}
