//! Manifest: a base source path plus named states.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::doc::{parse_manifest_document, render_manifest_document};
use crate::report::{ReportAssemble, ReportIntegrity};
use crate::spec::{EnumStateOption, ManifestError, SpecAssembleOptions, SpecFileEntry};
use crate::state::State;

/// Tool for managing a multistate workflow.
///
/// A manifest is either built up programmatically from [`Manifest::new`] or
/// loaded from a YAML document (see [`crate::doc`] for the layout).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    path: Option<PathBuf>,
    states: BTreeMap<String, State>,
    spec_options: SpecAssembleOptions,
}

impl Manifest {
    pub fn new() -> Self {
        tracing::info!("Creating empty manifest");
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let mut manifest = Self::default();
        manifest.load_manifest_file(path)?;
        Ok(manifest)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ManifestError> {
        let mut manifest = Self::default();
        manifest.load_manifest_str(text)?;
        Ok(manifest)
    }

    pub fn with_copy_options(mut self, spec_options: SpecAssembleOptions) -> Self {
        self.spec_options = spec_options;
        self
    }

    ////////////////////////////////////////////////////////////////////////////
    // #region Loading

    /// Load a manifest file, replacing the base path and all states.
    pub fn load_manifest_file(&mut self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        tracing::info!("Loading manifest file '{}'", path.display());
        let text = fs::read_to_string(path).map_err(|e| {
            tracing::error!("Could not open file '{}'", path.display());
            ManifestError::ManifestFileUnreadable {
                path: path.to_path_buf(),
                source: e,
            }
        })?;
        self.load_manifest_str(&text)
    }

    /// Load manifest text. Nothing is modified unless every state is valid.
    pub fn load_manifest_str(&mut self, text: &str) -> Result<(), ManifestError> {
        let doc = parse_manifest_document(text).inspect_err(|e| tracing::error!("{e}"))?;
        tracing::info!("Setting manifest path to '{}'", doc.path.display());

        tracing::info!("Building states");
        let mut states = BTreeMap::new();
        for (name, doc_state) in doc.states {
            let state = doc_state
                .into_state(&doc.path, &name)
                .inspect_err(|e| tracing::error!("{e}"))?;
            states.insert(name, state);
        }
        tracing::info!("States built ({})", states.len());

        self.path = Some(doc.path);
        self.states = states;
        Ok(())
    }

    /// Serialize the manifest back into document form.
    pub fn to_yaml_string(&self) -> Result<String, ManifestError> {
        let base = self.path.as_deref().ok_or(ManifestError::MissingBasePath)?;
        render_manifest_document(base, &self.states)
    }

    /// Write the manifest document to `path`.
    pub fn dump_manifest_file(&self, path: impl AsRef<Path>) -> Result<(), ManifestError> {
        let path = path.as_ref();
        let text = self.to_yaml_string()?;
        fs::write(path, text).map_err(|e| ManifestError::ManifestFileUnwritable {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::info!("Wrote manifest file '{}'", path.display());
        Ok(())
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Accessors

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn set_path(&mut self, path: impl Into<PathBuf>) {
        self.path = Some(path.into());
    }

    pub fn copy_options(&self) -> &SpecAssembleOptions {
        &self.spec_options
    }

    pub fn states(&self) -> &BTreeMap<String, State> {
        &self.states
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// Replace all states; every key must equal its state's name.
    pub fn set_states(&mut self, states: BTreeMap<String, State>) -> Result<(), ManifestError> {
        for (key, state) in &states {
            if key != state.name() {
                let err = ManifestError::InvalidStates {
                    message: format!("key '{key}' holds state named '{}'", state.name()),
                };
                tracing::error!("{err}");
                return Err(err);
            }
        }
        self.states = states;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Mutation

    /// Add a state built from the given parts.
    ///
    /// Returns `Ok(false)` (and keeps the existing state) when `name` is taken
    /// and `force` is not set.
    pub fn add_state(
        &mut self,
        name: &str,
        path: Option<PathBuf>,
        files: Vec<SpecFileEntry>,
        force: bool,
        options: BTreeSet<EnumStateOption>,
    ) -> Result<bool, ManifestError> {
        let state = State::try_new(name, files, path, options)?;
        Ok(self.insert_state(state, force))
    }

    /// Insert a prepared state under its own name.
    pub fn insert_state(&mut self, state: State, force: bool) -> bool {
        if self.states.contains_key(state.name()) && !force {
            tracing::warn!("State '{}' already exists", state.name());
            return false;
        }
        tracing::info!("State '{}' added", state.name());
        self.states.insert(state.name().to_string(), state);
        true
    }

    pub fn remove_state(&mut self, name: &str) -> Option<State> {
        let state = self.states.remove(name);
        match &state {
            Some(_) => tracing::info!("Removing state: {name}"),
            None => tracing::warn!("No state found: {name}"),
        }
        state
    }

    pub fn clear_states(&mut self) {
        self.states.clear();
    }

    // #endregion
    ////////////////////////////////////////////////////////////////////////////
    // #region Operations

    /// Base path a state resolves against; states with an explicit path do
    /// not need one.
    fn derive_base_path(&self, state: &State) -> Result<PathBuf, ManifestError> {
        match (&self.path, state.path()) {
            (Some(path), _) => Ok(path.clone()),
            (None, Some(_)) => Ok(PathBuf::new()),
            (None, None) => Err(ManifestError::MissingBasePath),
        }
    }

    /// Build the state named `name` into `dest`.
    pub fn assemble(
        &self,
        name: &str,
        dest: impl AsRef<Path>,
    ) -> Result<ReportAssemble, ManifestError> {
        let dest = dest.as_ref();
        let state = self.states.get(name).ok_or_else(|| {
            tracing::error!("No state named '{name}'");
            ManifestError::StateNotFound {
                name: name.to_string(),
            }
        })?;
        let base = self.derive_base_path(state)?;

        tracing::info!("Assembling state '{name}' in '{}'", dest.display());
        let report = state.assemble_with(&base, dest, &self.spec_options)?;
        tracing::info!("Assembled state '{name}'");
        Ok(report)
    }

    /// Integrity report of every state, in name order.
    pub fn check_integrity(&self) -> Result<Vec<ReportIntegrity>, ManifestError> {
        self.states
            .values()
            .map(|state| {
                let report = state.check_integrity(&self.derive_base_path(state)?);
                if report.is_broken() {
                    tracing::warn!("State {} is broken.", state.name());
                }
                Ok(report)
            })
            .collect()
    }

    /// `true` when any state has a missing entry source.
    pub fn is_broken(&self) -> Result<bool, ManifestError> {
        Ok(self
            .check_integrity()?
            .iter()
            .any(ReportIntegrity::is_broken))
    }

    // #endregion
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::{Path, PathBuf};

    use tempfile::TempDir;

    use super::Manifest;
    use crate::spec::{EnumManifestErrorKind, EnumStateOption, ManifestError, SpecFileEntry};
    use crate::state::State;

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    /// Lay out `<tmp>/states/{state_a,state_b}` and a manifest referencing them.
    fn setup_good_manifest(tmp: &TempDir) -> PathBuf {
        let base = tmp.path().join("states");
        write_text(&base.join("state_a/a.txt"), "a");
        write_text(&base.join("state_a/conf/settings.ini"), "[x]");
        write_text(&base.join("state_b/b.txt"), "b");
        write_text(&base.join("state_b/extra/c.txt"), "c");

        let path_manifest = tmp.path().join("good_manifest.yml");
        write_text(
            &path_manifest,
            &format!(
                "path: {}\n\
                 state_a:\n  files:\n    - [a.txt, a.txt]\n    - [conf, etc/conf]\n\
                 state_b:\n  options: [full_transfer]\n  files: []\n",
                base.display()
            ),
        );
        path_manifest
    }

    #[test]
    fn empty_manifest_has_no_path_or_states() {
        let manifest = Manifest::new();
        assert_eq!(manifest.path(), None);
        assert!(manifest.is_empty());
    }

    #[test]
    fn instances_do_not_share_states() {
        let mut m1 = Manifest::new();
        m1.add_state("x", None, vec![], false, BTreeSet::new())
            .expect("add");
        let m2 = Manifest::new();
        assert_eq!(m1.len(), 1);
        assert_eq!(m2.len(), 0);
    }

    #[test]
    fn load_good_manifest_declares_exact_states() {
        let tmp = TempDir::new().expect("tempdir");
        let path_manifest = setup_good_manifest(&tmp);

        let manifest = Manifest::from_file(&path_manifest).expect("load");
        assert_eq!(manifest.path(), Some(tmp.path().join("states").as_path()));
        assert_eq!(
            manifest.states().keys().cloned().collect::<Vec<_>>(),
            vec!["state_a".to_string(), "state_b".to_string()]
        );
        assert!(
            manifest.states()["state_b"].has_option(EnumStateOption::FullTransfer)
        );
        assert!(!manifest.is_broken().expect("integrity"));
    }

    #[test]
    fn unreadable_file_is_not_found() {
        let tmp = TempDir::new().expect("tempdir");
        let err = Manifest::from_file(tmp.path().join("some/manifest.yml")).expect_err("missing");
        assert!(matches!(err, ManifestError::ManifestFileUnreadable { .. }));
        assert_eq!(err.kind(), EnumManifestErrorKind::NotFound);
    }

    #[test]
    fn failed_load_leaves_manifest_untouched() {
        let mut manifest = Manifest::from_yaml_str("path: /src\nkeep:\n  files: []\n").expect("ok");
        let err = manifest
            .load_manifest_str("path: /other\nnew:\n  files: []\nbroken:\n")
            .expect_err("broken state");
        assert_eq!(err.kind(), EnumManifestErrorKind::EmptyContent);
        assert_eq!(manifest.path(), Some(Path::new("/src")));
        assert!(manifest.state("keep").is_some());
        assert!(manifest.state("new").is_none());
    }

    #[test]
    fn assemble_declared_files_and_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let manifest = Manifest::from_file(setup_good_manifest(&tmp)).expect("load");
        let dst = tmp.path().join("out");

        let report = manifest.assemble("state_a", &dst).expect("assemble");
        assert_eq!(report.cnt_artifacts(), 2);
        assert_eq!(std::fs::read_to_string(dst.join("a.txt")).expect("read"), "a");
        assert_eq!(
            std::fs::read_to_string(dst.join("etc/conf/settings.ini")).expect("read"),
            "[x]"
        );

        manifest.assemble("state_a", &dst).expect("re-assemble");
        assert_eq!(std::fs::read_to_string(dst.join("a.txt")).expect("read"), "a");
    }

    #[test]
    fn assemble_full_transfer_state() {
        let tmp = TempDir::new().expect("tempdir");
        let manifest = Manifest::from_file(setup_good_manifest(&tmp)).expect("load");
        let dst = tmp.path().join("out");

        let report = manifest.assemble("state_b", &dst).expect("assemble");
        assert_eq!(report.cnt_artifacts(), 2);
        assert!(dst.join("b.txt").is_file());
        assert!(dst.join("extra/c.txt").is_file());
    }

    #[test]
    fn assemble_unknown_state_writes_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let manifest = Manifest::from_file(setup_good_manifest(&tmp)).expect("load");
        let dst = tmp.path().join("out");

        let err = manifest.assemble("state_z", &dst).expect_err("unknown");
        assert!(matches!(err, ManifestError::StateNotFound { .. }));
        assert_eq!(err.kind(), EnumManifestErrorKind::NotFound);
        assert!(!dst.exists());
    }

    #[test]
    fn assemble_without_base_path_fails() {
        let mut manifest = Manifest::new();
        manifest
            .add_state("x", None, vec![SpecFileEntry::same("f")], false, BTreeSet::new())
            .expect("add");
        let err = manifest.assemble("x", "/nowhere").expect_err("no base");
        assert!(matches!(err, ManifestError::MissingBasePath));
    }

    #[test]
    fn add_state_respects_force() {
        let mut manifest = Manifest::new();
        let b_added = manifest
            .add_state("x", None, vec![SpecFileEntry::same("f")], false, BTreeSet::new())
            .expect("add");
        assert!(b_added);

        let b_added = manifest
            .add_state("x", None, vec![SpecFileEntry::same("g")], false, BTreeSet::new())
            .expect("add");
        assert!(!b_added);
        assert_eq!(manifest.states()["x"].files(), &[SpecFileEntry::same("f")]);

        let b_added = manifest
            .add_state("x", None, vec![SpecFileEntry::same("g")], true, BTreeSet::new())
            .expect("add");
        assert!(b_added);
        assert_eq!(manifest.states()["x"].files(), &[SpecFileEntry::same("g")]);
    }

    #[test]
    fn add_state_rejects_invalid_name() {
        let mut manifest = Manifest::new();
        let err = manifest
            .add_state("", None, vec![], false, BTreeSet::new())
            .expect_err("empty name");
        assert_eq!(err.kind(), EnumManifestErrorKind::Validation);
        assert!(manifest.is_empty());
    }

    #[test]
    fn remove_and_clear_states() {
        let mut manifest = Manifest::new();
        manifest.insert_state(State::new("state_a").expect("state"), false);

        assert!(manifest.remove_state("state_b").is_none());
        assert_eq!(manifest.len(), 1);
        assert!(manifest.remove_state("state_a").is_some());
        assert_eq!(manifest.len(), 0);

        manifest.insert_state(State::new("a").expect("state"), false);
        manifest.insert_state(State::new("b").expect("state"), false);
        manifest.clear_states();
        assert!(manifest.is_empty());
    }

    #[test]
    fn set_states_validates_keys() {
        let mut manifest = Manifest::new();
        manifest.set_states(BTreeMap::new()).expect("empty map");
        assert!(manifest.is_empty());

        let states = BTreeMap::from([(
            "state_a".to_string(),
            State::new("state_a").expect("state"),
        )]);
        manifest.set_states(states).expect("matching keys");
        assert_eq!(manifest.len(), 1);

        let states = BTreeMap::from([(
            "state_a".to_string(),
            State::new("other").expect("state"),
        )]);
        let err = manifest.set_states(states).expect_err("mismatched key");
        assert_eq!(err.kind(), EnumManifestErrorKind::Validation);
        assert_eq!(manifest.states()["state_a"].name(), "state_a");
    }

    #[test]
    fn state_keys_always_match_state_names() {
        let mut manifest =
            Manifest::from_yaml_str("path: /src\nb:\n  files: []\na:\n  files: []\n")
                .expect("load");
        manifest
            .add_state("c", None, vec![], false, BTreeSet::new())
            .expect("add");
        manifest
            .add_state("a", None, vec![SpecFileEntry::same("f")], true, BTreeSet::new())
            .expect("replace");
        manifest.remove_state("b");

        assert_eq!(manifest.len(), 2);
        assert!(manifest.states().iter().all(|(key, state)| key == state.name()));
    }

    #[test]
    fn check_integrity_flags_broken_states() {
        let tmp = TempDir::new().expect("tempdir");
        let base = tmp.path().join("states");
        write_text(&base.join("ok/a.txt"), "a");

        let manifest = Manifest::from_yaml_str(&format!(
            "path: {}\nok:\n  files: [[a.txt, a.txt]]\nbad:\n  files: [[gone.txt, gone.txt]]\n",
            base.display()
        ))
        .expect("load");

        let l_reports = manifest.check_integrity().expect("integrity");
        let dict_broken = l_reports
            .iter()
            .map(|r| (r.name.as_str(), r.is_broken()))
            .collect::<BTreeMap<_, _>>();
        assert!(!dict_broken["ok"]);
        assert!(dict_broken["bad"]);
        assert!(manifest.is_broken().expect("integrity"));
    }

    #[test]
    fn dump_then_load_round_trips() {
        let tmp = TempDir::new().expect("tempdir");
        let mut manifest = Manifest::from_yaml_str(
            "path: /srv/states\n\
             plain:\n  files: [[a.txt, out/a.txt]]\n\
             nested:\n  path: sub/dir\n  files: [[b, b]]\n\
             full:\n  options: [full_transfer]\n  files: []\n",
        )
        .expect("load");
        manifest
            .add_state(
                "elsewhere",
                Some(PathBuf::from("/opt/other")),
                vec![SpecFileEntry::same("c")],
                false,
                BTreeSet::new(),
            )
            .expect("add");

        let path_dump = tmp.path().join("dump.yml");
        manifest.dump_manifest_file(&path_dump).expect("dump");
        let reloaded = Manifest::from_file(&path_dump).expect("reload");

        assert_eq!(reloaded, manifest);
        assert_eq!(
            reloaded.states()["nested"].path(),
            Some(Path::new("/srv/states/nested/sub/dir"))
        );
    }

    #[test]
    fn dump_requires_base_path() {
        let err = Manifest::new().to_yaml_string().expect_err("no base");
        assert!(matches!(err, ManifestError::MissingBasePath));
    }
}
