//! Filesystem trait definitions.
//!
//! # Semantics contract
//!
//! All [`FileSystem`] implementations must enforce POSIX-like behavior:
//!
//! 1. **No duplicate names**: a path names at most one entry (file,
//!    directory, or symlink).
//! 2. **Type-safe writes**: writing to a directory path fails with an
//!    "is a directory" error.
//! 3. **Parent requirement**: writes and `mkdir` (without `recursive`)
//!    require the parent directory to exist.
//! 4. **Symlink transparency**: `read_file`, `write_file`, `stat`, and
//!    `read_dir` follow symlinks; `lstat`, `read_link`, and `rm` operate on
//!    the link itself.
//!
//! Errors are reported as `std::io::Error` values (via [`crate::Error::Io`])
//! whose kinds the interpreter maps onto shell diagnostics and exit
//! statuses.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Options for [`FileSystem::write_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Append instead of truncating.
    pub append: bool,
    /// Fail if the file already exists (used by `noclobber`).
    pub create_new: bool,
}

impl WriteOptions {
    /// Truncating write (the default).
    pub fn truncate() -> Self {
        Self::default()
    }

    /// Appending write.
    pub fn append() -> Self {
        Self {
            append: true,
            create_new: false,
        }
    }
}

/// Options for [`FileSystem::rm`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RmOptions {
    /// Remove directories and their contents.
    pub recursive: bool,
    /// Ignore missing paths.
    pub force: bool,
}

/// Type of a filesystem entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    File,
    Directory,
    Symlink,
}

impl FileType {
    pub fn is_file(&self) -> bool {
        matches!(self, FileType::File)
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, FileType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, FileType::Symlink)
    }
}

/// File or directory metadata.
///
/// Modification times are logical ticks, not wall-clock instants: the
/// filesystem hands out monotonically increasing stamps so `-nt`/`-ot`
/// comparisons are deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metadata {
    pub file_type: FileType,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Unix permission bits, e.g. `0o644`.
    pub mode: u32,
    /// Logical modification stamp.
    pub mtime: u64,
}

/// An entry in a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Entry name (not the full path).
    pub name: String,
    pub file_type: FileType,
}

/// Async virtual filesystem consumed by the interpreter.
///
/// Implementations must be `Send + Sync`; use interior mutability for
/// state. All paths handed in are absolute (the interpreter resolves
/// relative paths against its working directory first).
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a file's contents, following symlinks.
    async fn read_file(&self, path: &Path) -> Result<Vec<u8>>;

    /// Write a file, creating it if necessary (parent must exist).
    async fn write_file(&self, path: &Path, content: &[u8], opts: WriteOptions) -> Result<()>;

    /// Metadata for `path`, following symlinks.
    async fn stat(&self, path: &Path) -> Result<Metadata>;

    /// Metadata for `path` itself (symlinks are not followed).
    async fn lstat(&self, path: &Path) -> Result<Metadata>;

    /// Directory entries, sorted by name.
    async fn read_dir(&self, path: &Path) -> Result<Vec<DirEntry>>;

    /// Create a symlink at `link` pointing to `target`.
    async fn symlink(&self, target: &Path, link: &Path) -> Result<()>;

    /// A symlink's target.
    async fn read_link(&self, path: &Path) -> Result<PathBuf>;

    /// Canonical path: symlinks resolved, `.`/`..` eliminated. The final
    /// component must exist.
    async fn realpath(&self, path: &Path) -> Result<PathBuf>;

    /// Create a directory; with `recursive`, create missing parents and
    /// tolerate an existing directory.
    async fn mkdir(&self, path: &Path, recursive: bool) -> Result<()>;

    /// Remove a file, symlink, or directory.
    async fn rm(&self, path: &Path, opts: RmOptions) -> Result<()>;

    /// Change permission bits.
    async fn chmod(&self, path: &Path, mode: u32) -> Result<()>;

    /// Set the modification stamp.
    async fn utimes(&self, path: &Path, mtime: u64) -> Result<()>;

    /// Does the path exist (following symlinks)?
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Copy a file (or, with `recursive`, a directory tree).
    async fn cp(&self, src: &Path, dst: &Path, recursive: bool) -> Result<()>;

    /// Rename/move an entry.
    async fn mv(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// Error constructors shared by implementations so messages stay uniform.
pub(crate) mod fs_errors {
    use crate::Error;
    use std::io::{Error as IoError, ErrorKind};

    pub fn not_found(path: &std::path::Path) -> Error {
        IoError::new(
            ErrorKind::NotFound,
            format!("{}: No such file or directory", path.display()),
        )
        .into()
    }

    pub fn is_a_directory(path: &std::path::Path) -> Error {
        IoError::other(format!("{}: Is a directory", path.display())).into()
    }

    pub fn not_a_directory(path: &std::path::Path) -> Error {
        IoError::other(format!("{}: Not a directory", path.display())).into()
    }

    pub fn already_exists(path: &std::path::Path) -> Error {
        IoError::new(
            ErrorKind::AlreadyExists,
            format!("{}: File exists", path.display()),
        )
        .into()
    }

    pub fn directory_not_empty(path: &std::path::Path) -> Error {
        IoError::other(format!("{}: Directory not empty", path.display())).into()
    }

    pub fn too_many_links(path: &std::path::Path) -> Error {
        IoError::other(format!(
            "{}: Too many levels of symbolic links",
            path.display()
        ))
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_type_predicates() {
        assert!(FileType::File.is_file());
        assert!(FileType::Directory.is_dir());
        assert!(FileType::Symlink.is_symlink());
        assert!(!FileType::Symlink.is_file());
    }

    #[test]
    fn write_options_constructors() {
        assert!(!WriteOptions::truncate().append);
        assert!(WriteOptions::append().append);
        assert!(!WriteOptions::append().create_new);
    }

    #[test]
    fn error_messages_are_shell_like() {
        let err = fs_errors::not_found(Path::new("/tmp/x"));
        assert_eq!(format!("{err}"), "io error: /tmp/x: No such file or directory");
    }
}
