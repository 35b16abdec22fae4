//! Manifest value types, assembly options and errors.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shipkit_io_fs::{EnumCopySymlinkStrategy, SpecCopyOptions};

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Per-state transfer policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumStateOption {
    /// Derive entries from the live top-level contents of the source root,
    /// ignoring the declared file list.
    FullTransfer,
}

impl EnumStateOption {
    /// All known options, in declaration order.
    pub const ALL: [Self; 1] = [Self::FullTransfer];

    /// Canonical document spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FullTransfer => "full_transfer",
        }
    }

    /// Parse a document option name (case-insensitive, `-` accepted for `_`).
    pub fn parse(value: &str) -> Option<Self> {
        let c_normalized = value.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|enum_option| enum_option.as_str() == c_normalized)
    }
}

impl fmt::Display for EnumStateOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse option names declared for `state`; any unknown name fails.
pub fn parse_state_options<S: AsRef<str>>(
    state: &str,
    names: &[S],
) -> Result<BTreeSet<EnumStateOption>, ManifestError> {
    names
        .iter()
        .map(|name| {
            EnumStateOption::parse(name.as_ref()).ok_or_else(|| ManifestError::UnknownOption {
                state: state.to_string(),
                option: name.as_ref().to_string(),
            })
        })
        .collect()
}

/// Category of a [`ManifestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumManifestErrorKind {
    /// Unreadable manifest file or unknown state name.
    NotFound,
    /// Document is missing a required key or has the wrong shape.
    Structural,
    /// A state block is present but empty.
    EmptyContent,
    /// Invalid name, states mapping or option.
    Validation,
    /// Filesystem operation failed during assembly or dump.
    CopyFailure,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region StructsAndErrors

/// One `source -> destination` mapping, both relative.
///
/// Serialized as a two-element sequence `[source, destination]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(PathBuf, PathBuf)", into = "(PathBuf, PathBuf)")]
pub struct SpecFileEntry {
    /// Path relative to the state's source root.
    pub source: PathBuf,
    /// Path relative to the assembly destination.
    pub destination: PathBuf,
}

impl SpecFileEntry {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }

    /// Identity mapping: `path -> path`.
    pub fn same(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            source: path.clone(),
            destination: path,
        }
    }
}

impl From<(PathBuf, PathBuf)> for SpecFileEntry {
    fn from((source, destination): (PathBuf, PathBuf)) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl From<SpecFileEntry> for (PathBuf, PathBuf) {
    fn from(entry: SpecFileEntry) -> Self {
        (entry.source, entry.destination)
    }
}

impl fmt::Display for SpecFileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.source.display(),
            self.destination.display()
        )
    }
}

/// Assembly configuration shared by every state of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecAssembleOptions {
    /// Symlink handling inside copied directory trees.
    pub rule_symlink: EnumCopySymlinkStrategy,
    /// Maximum worker threads for the file-copy stage of a tree copy.
    pub num_workers_max: Option<usize>,
    /// Copy permissions and timestamps along with file bytes.
    pub if_preserve_metadata: bool,
}

impl Default for SpecAssembleOptions {
    fn default() -> Self {
        Self {
            rule_symlink: EnumCopySymlinkStrategy::Dereference,
            num_workers_max: None,
            if_preserve_metadata: true,
        }
    }
}

impl SpecAssembleOptions {
    pub fn to_copy_options(&self) -> SpecCopyOptions {
        SpecCopyOptions {
            rule_symlink: self.rule_symlink,
            num_workers_max: self.num_workers_max,
            if_preserve_metadata: self.if_preserve_metadata,
        }
    }
}

/// Errors raised by manifest loading, mutation and assembly.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Could not open manifest file '{}': {source}", .path.display())]
    ManifestFileUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("No state named '{name}' in manifest")]
    StateNotFound { name: String },
    #[error("No path provided. Check manifest file")]
    MissingBasePath,
    #[error("Missing file list in state '{state}'")]
    MissingFileList { state: String },
    #[error("Malformed manifest document: {message}")]
    MalformedDocument { message: String },
    #[error("Malformed state '{state}': {message}")]
    MalformedState { state: String, message: String },
    #[error("State '{state}' missing content")]
    EmptyStateContent { state: String },
    #[error("Invalid state name {name:?}: must be a non-empty string")]
    InvalidStateName { name: String },
    #[error("Invalid states mapping: {message}")]
    InvalidStates { message: String },
    #[error("Unknown option '{option}' in state '{state}'")]
    UnknownOption { state: String, option: String },
    #[error("Copy failed at '{}': {message}", .path.display())]
    CopyFailure { path: PathBuf, message: String },
    #[error("Could not write manifest file '{}': {source}", .path.display())]
    ManifestFileUnwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ManifestError {
    pub fn kind(&self) -> EnumManifestErrorKind {
        match self {
            Self::ManifestFileUnreadable { .. } | Self::StateNotFound { .. } => {
                EnumManifestErrorKind::NotFound
            }
            Self::MissingBasePath
            | Self::MissingFileList { .. }
            | Self::MalformedDocument { .. }
            | Self::MalformedState { .. } => EnumManifestErrorKind::Structural,
            Self::EmptyStateContent { .. } => EnumManifestErrorKind::EmptyContent,
            Self::InvalidStateName { .. }
            | Self::InvalidStates { .. }
            | Self::UnknownOption { .. } => EnumManifestErrorKind::Validation,
            Self::CopyFailure { .. } | Self::ManifestFileUnwritable { .. } => {
                EnumManifestErrorKind::CopyFailure
            }
        }
    }

    pub(crate) fn copy_failure(path: &Path, message: impl fmt::Display) -> Self {
        Self::CopyFailure {
            path: path.to_path_buf(),
            message: message.to_string(),
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::{EnumManifestErrorKind, EnumStateOption, ManifestError, parse_state_options};

    #[test]
    fn state_option_parse_is_lenient_about_spelling() {
        assert_eq!(
            EnumStateOption::parse("FULL_TRANSFER"),
            Some(EnumStateOption::FullTransfer)
        );
        assert_eq!(
            EnumStateOption::parse("full-transfer"),
            Some(EnumStateOption::FullTransfer)
        );
        assert_eq!(EnumStateOption::parse("partial"), None);
    }

    #[test]
    fn parse_state_options_rejects_unknown_names() {
        let set_options =
            parse_state_options("a", &["full_transfer", "full_transfer"]).expect("known");
        assert_eq!(set_options.len(), 1);

        let err = parse_state_options("a", &["full_transfer", "compress"]).expect_err("unknown");
        assert!(matches!(
            &err,
            ManifestError::UnknownOption { option, .. } if option == "compress"
        ));
        assert_eq!(err.kind(), EnumManifestErrorKind::Validation);
    }
}
