//! A named, ordered set of file mappings forming one buildable bundle.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::assemble::assemble_entries;
use crate::report::{ReportAssemble, ReportIntegrity, SpecIntegrityEntry};
use crate::spec::{EnumStateOption, ManifestError, SpecAssembleOptions, SpecFileEntry};

/// Reject empty or whitespace-only state names.
pub fn validate_state_name(name: &str) -> Result<(), ManifestError> {
    if name.trim().is_empty() {
        return Err(ManifestError::InvalidStateName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct State {
    name: String,
    path: Option<PathBuf>,
    files: Vec<SpecFileEntry>,
    options: BTreeSet<EnumStateOption>,
}

impl State {
    /// Empty state with no explicit source root.
    pub fn new(name: impl Into<String>) -> Result<Self, ManifestError> {
        let name = name.into();
        validate_state_name(&name)?;
        Ok(Self {
            name,
            path: None,
            files: Vec::new(),
            options: BTreeSet::new(),
        })
    }

    /// Full constructor.
    ///
    /// Without an explicit `path`, a state whose sources are all absolute
    /// takes their common prefix as its source root.
    pub fn try_new(
        name: impl Into<String>,
        files: Vec<SpecFileEntry>,
        path: Option<PathBuf>,
        options: BTreeSet<EnumStateOption>,
    ) -> Result<Self, ManifestError> {
        let mut state = Self::new(name)?.with_files(files).with_options(options);
        if path.is_some() {
            state.path = path;
        }
        Ok(state)
    }

    pub fn with_files(mut self, files: Vec<SpecFileEntry>) -> Self {
        self.files = files;
        if self.path.is_none() {
            self.path = self.derive_fallback_path();
        }
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_options(mut self, options: BTreeSet<EnumStateOption>) -> Self {
        self.options = options;
        self
    }

    ////////////////////////////////////////////////////////////////////////////
    // #region Accessors

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the state; an invalid name leaves the current one in place.
    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ManifestError> {
        let name = name.into();
        validate_state_name(&name)?;
        tracing::info!("Setting state name to {name}");
        self.name = name;
        Ok(())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: Option<PathBuf>) {
        self.path = path;
    }

    pub fn files(&self) -> &[SpecFileEntry] {
        &self.files
    }

    pub fn set_files(&mut self, files: Vec<SpecFileEntry>) {
        self.files = files;
    }

    pub fn push_file(&mut self, entry: SpecFileEntry) {
        self.files.push(entry);
    }

    pub fn clear_files(&mut self) {
        self.files.clear();
    }

    pub fn options(&self) -> &BTreeSet<EnumStateOption> {
        &self.options
    }

    pub fn has_option(&self, enum_option: EnumStateOption) -> bool {
        self.options.contains(&enum_option)
    }

    pub fn set_options(&mut self, options: BTreeSet<EnumStateOption>) {
        self.options = options;
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region PathResolution

    /// Longest common component-wise prefix of all entry sources.
    pub fn determine_path(&self) -> Option<PathBuf> {
        let mut iter_sources = self.files.iter().map(|entry| entry.source.as_path());
        let mut l_common: Vec<Component<'_>> = iter_sources.next()?.components().collect();
        for path_source in iter_sources {
            let n_shared = l_common
                .iter()
                .zip(path_source.components())
                .take_while(|(a, b)| **a == *b)
                .count();
            l_common.truncate(n_shared);
        }
        if l_common.is_empty() {
            return None;
        }
        Some(l_common.iter().collect())
    }

    fn derive_fallback_path(&self) -> Option<PathBuf> {
        let b_all_absolute = !self.files.is_empty()
            && self.files.iter().all(|entry| entry.source.is_absolute());
        if b_all_absolute {
            self.determine_path()
        } else {
            None
        }
    }

    /// Directory entry sources are resolved against: the explicit path, or
    /// `base/name`.
    pub fn source_root(&self, base: &Path) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => base.join(&self.name),
        }
    }

    /// Effective entry list for an assembly against `base`.
    pub fn resolve_entries(&self, base: &Path) -> Result<Vec<SpecFileEntry>, ManifestError> {
        let dir_src_root = self.source_root(base);
        self.options
            .iter()
            .find_map(|enum_option| match enum_option {
                EnumStateOption::FullTransfer => Some(list_top_level_entries(&dir_src_root)),
            })
            .unwrap_or_else(|| Ok(self.files.clone()))
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Operations

    /// Check every declared entry source under `base`; never fails.
    pub fn check_integrity(&self, base: &Path) -> ReportIntegrity {
        let dir_src_root = self.source_root(base);
        tracing::info!("Checking state integrity ({})", self.name);

        let entries = self
            .files
            .iter()
            .map(|entry| {
                let path = dir_src_root.join(&entry.source);
                let if_exists = path.exists();
                if if_exists {
                    tracing::info!("   Found   <-- {}", entry.source.display());
                } else {
                    tracing::warn!("   Missing <-- {} does not exist", path.display());
                }
                SpecIntegrityEntry {
                    source: entry.source.clone(),
                    path,
                    if_exists,
                }
            })
            .collect();

        ReportIntegrity {
            name: self.name.clone(),
            entries,
        }
    }

    /// Assemble with default [`SpecAssembleOptions`].
    pub fn assemble(&self, base: &Path, dest: &Path) -> Result<ReportAssemble, ManifestError> {
        self.assemble_with(base, dest, &SpecAssembleOptions::default())
    }

    pub fn assemble_with(
        &self,
        base: &Path,
        dest: &Path,
        spec_options: &SpecAssembleOptions,
    ) -> Result<ReportAssemble, ManifestError> {
        let entries = self.resolve_entries(base)?;
        let dir_src_root = self.source_root(base);
        assemble_entries(&self.name, &dir_src_root, dest, &entries, spec_options)
    }

    // #endregion
}

/// Every top-level child of `dir_src_root`, mapped to itself, sorted by name.
fn list_top_level_entries(dir_src_root: &Path) -> Result<Vec<SpecFileEntry>, ManifestError> {
    let iter_entries =
        fs::read_dir(dir_src_root).map_err(|e| ManifestError::copy_failure(dir_src_root, e))?;

    let mut l_names = Vec::new();
    for entry_res in iter_entries {
        let entry = entry_res.map_err(|e| ManifestError::copy_failure(dir_src_root, e))?;
        l_names.push(entry.file_name());
    }
    l_names.sort();
    Ok(l_names.into_iter().map(SpecFileEntry::same).collect())
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let l_files = self
            .files
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        write!(f, "{} -- [{}]", self.name, l_files.join(", "))
    }
}
