//! Filesystem access used by the walker.

use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// A regular file found directly inside a directory.
#[derive(Debug)]
pub struct FileEntry {
    /// Full path of the file.
    pub path: PathBuf,
    /// Size in bytes, or the error hit while reading it.
    pub size: io::Result<u64>,
}

impl FileEntry {
    /// A file whose size is known.
    pub fn sized(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size: Ok(size),
        }
    }
}

/// Directory listing operations the walker depends on.
///
/// Both calls only look at immediate children. Either may fail for the whole
/// directory (for example with [`io::ErrorKind::PermissionDenied`]).
pub trait FileSystem: Send + Sync {
    /// Regular files directly inside `dir`.
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileEntry>>;

    /// Subdirectories directly inside `dir`.
    fn list_subdirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`FileSystem`] over `std::fs`.
///
/// Symbolic links are never reported, so the walk cannot loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFileSystem;

impl StdFileSystem {
    fn entries(dir: &Path) -> io::Result<impl Iterator<Item = std::fs::DirEntry>> {
        let dir = dir.to_path_buf();
        Ok(std::fs::read_dir(&dir)?.filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                None
            }
        }))
    }
}

impl FileSystem for StdFileSystem {
    fn list_files(&self, dir: &Path) -> io::Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        for entry in Self::entries(dir)? {
            let file_type = match entry.file_type() {
                Ok(t) => t,
                Err(e) => {
                    files.push(FileEntry {
                        path: entry.path(),
                        size: Err(e),
                    });
                    continue;
                }
            };
            if file_type.is_file() {
                files.push(FileEntry {
                    path: entry.path(),
                    size: entry.metadata().map(|m| m.len()),
                });
            }
        }
        Ok(files)
    }

    fn list_subdirs(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        Ok(Self::entries(dir)?
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .map(|entry| entry.path())
            .collect())
    }
}
