//! Copy option models and top-level error types.

use std::path::PathBuf;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Symlink handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnumCopySymlinkStrategy {
    /// Follow the link and copy the target bytes/entries.
    #[default]
    Dereference,
    /// Create a symbolic link at destination (do not copy target bytes).
    CopySymlinks,
    /// Ignore symlink entries.
    SkipSymlinks,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// Input options for `copy_tree`.
///
/// An existing destination root is always replaced and existing files are
/// always overwritten.
#[derive(Debug, Clone)]
pub struct SpecCopyOptions {
    /// Symlink handling behavior.
    pub rule_symlink: EnumCopySymlinkStrategy,
    /// Maximum worker threads for file-copy stage.
    pub num_workers_max: Option<usize>,
    /// Copy permissions, timestamps and (on Linux) extended attributes.
    pub if_preserve_metadata: bool,
}

impl Default for SpecCopyOptions {
    fn default() -> Self {
        Self {
            rule_symlink: EnumCopySymlinkStrategy::Dereference,
            num_workers_max: None,
            if_preserve_metadata: true,
        }
    }
}

/// One copy failure item with path + error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecCopyError {
    /// Failed source or destination path.
    pub path: PathBuf,
    /// User-facing error text.
    pub exception: String,
}

/// "Top-level call failed" errors (input validation / setup stage).
#[derive(Debug, thiserror::Error)]
pub enum CopyTreeError {
    /// Source path is not a directory.
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    /// Source and destination overlap (`src` contains `dst` or vice versa).
    #[error(
        "Source and destination directories overlap: {} <-> {}",
        .dir_source.display(),
        .dir_destination.display()
    )]
    SourceDestinationOverlap {
        /// Source directory as given.
        dir_source: PathBuf,
        /// Destination directory as given.
        dir_destination: PathBuf,
    },
    /// Destination directory initialization failed.
    #[error("Failed to initialize destination {}: {message}", .path.display())]
    DestinationInitFailed {
        /// Destination path that failed initialization.
        path: PathBuf,
        /// Underlying IO error text.
        message: String,
    },
}

/// Single-file copy failure.
#[derive(Debug, thiserror::Error)]
pub enum CopyFileError {
    /// Destination is a directory, expected a file path.
    #[error("Destination is a directory: {}", .0.display())]
    DestinationIsDirectory(PathBuf),
    /// Underlying IO failure on `path`.
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path the failing operation touched.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
