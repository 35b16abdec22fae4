use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use pyo3::exceptions::{PyFileNotFoundError, PyKeyError, PyOSError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;
use shipkit_io_fs::EnumCopySymlinkStrategy;
use shipkit_log::{EnumLogFormat, EnumLogLevel, SpecLogConfig, init_logging};
use shipkit_manifest::{
    EnumManifestErrorKind, EnumStateOption, Manifest, ManifestError, ReportAssemble,
    ReportIntegrity, SpecAssembleOptions, SpecFileEntry, State, parse_state_options,
};

const N_BRIDGE_ABI_VERSION: u64 = 1;
const C_BRIDGE_CONTRACT_VERSION: &str = "shipkit.manifest.v1";
const C_BRIDGE_TRANSPORT: &str = "rust_native";

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

////////////////////////////////////////////////////////////////////////////////
// #region Reports

#[pyclass(name = "ReportIntegrity")]
#[derive(Debug, Clone)]
struct PyReportIntegrity {
    #[pyo3(get)]
    name: String,
    #[pyo3(get)]
    found: Vec<String>,
    #[pyo3(get)]
    missing: Vec<String>,
}

impl From<ReportIntegrity> for PyReportIntegrity {
    fn from(report: ReportIntegrity) -> Self {
        let (l_found, l_missing): (Vec<_>, Vec<_>) =
            report.entries.into_iter().partition(|e| e.if_exists);
        Self {
            name: report.name,
            found: l_found.iter().map(|e| path_to_string(&e.source)).collect(),
            missing: l_missing.iter().map(|e| path_to_string(&e.source)).collect(),
        }
    }
}

#[pymethods]
impl PyReportIntegrity {
    #[getter]
    fn is_broken(&self) -> bool {
        !self.missing.is_empty()
    }

    #[pyo3(signature = (prefix = "[INTEGRITY]"))]
    fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} state={} found={} missing={} broken={}",
            self.name,
            self.found.len(),
            self.missing.len(),
            self.is_broken()
        )
    }

    fn __str__(&self) -> String {
        self.format("[INTEGRITY]")
    }
}

#[pyclass(name = "ReportAssemble")]
#[derive(Debug, Clone)]
struct PyReportAssemble {
    #[pyo3(get)]
    name: String,
    #[pyo3(get)]
    cnt_files: u64,
    #[pyo3(get)]
    cnt_trees: u64,
    #[pyo3(get)]
    cnt_replaced: u64,
    #[pyo3(get)]
    cnt_dirs_created: u64,
    #[pyo3(get)]
    cnt_tree_entries: u64,
    #[pyo3(get)]
    warnings: Vec<String>,
}

impl From<ReportAssemble> for PyReportAssemble {
    fn from(report: ReportAssemble) -> Self {
        Self {
            name: report.name,
            cnt_files: report.cnt_files,
            cnt_trees: report.cnt_trees,
            cnt_replaced: report.cnt_replaced,
            cnt_dirs_created: report.cnt_dirs_created,
            cnt_tree_entries: report.cnt_tree_entries,
            warnings: report.warnings,
        }
    }
}

#[pymethods]
impl PyReportAssemble {
    #[getter]
    fn cnt_artifacts(&self) -> u64 {
        self.cnt_files + self.cnt_trees
    }

    fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_files".to_string(), self.cnt_files);
        dict_counts.insert("cnt_trees".to_string(), self.cnt_trees);
        dict_counts.insert("cnt_replaced".to_string(), self.cnt_replaced);
        dict_counts.insert("cnt_dirs_created".to_string(), self.cnt_dirs_created);
        dict_counts.insert("cnt_tree_entries".to_string(), self.cnt_tree_entries);
        dict_counts.insert("cnt_warnings".to_string(), self.warnings.len() as u64);
        dict_counts
    }

    #[pyo3(signature = (prefix = "[ASSEMBLE]"))]
    fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} state={} files={} trees={} replaced={} dirs_created={} tree_entries={}",
            self.name,
            self.cnt_files,
            self.cnt_trees,
            self.cnt_replaced,
            self.cnt_dirs_created,
            self.cnt_tree_entries
        )
    }

    fn __str__(&self) -> String {
        self.format("[ASSEMBLE]")
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Parsing

fn parse_rule_symlink(value: &str) -> PyResult<EnumCopySymlinkStrategy> {
    match value {
        "dereference" => Ok(EnumCopySymlinkStrategy::Dereference),
        "copy_symlinks" => Ok(EnumCopySymlinkStrategy::CopySymlinks),
        "skip_symlinks" => Ok(EnumCopySymlinkStrategy::SkipSymlinks),
        _ => Err(PyValueError::new_err(format!(
            "Invalid symlink strategy: `{value}`. Expected one of: ['dereference', 'copy_symlinks', 'skip_symlinks']"
        ))),
    }
}

fn parse_log_level(value: &str) -> PyResult<EnumLogLevel> {
    EnumLogLevel::parse(value).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Invalid log level: `{value}`. Expected one of: ['trace', 'debug', 'info', 'warn', 'error']"
        ))
    })
}

fn parse_log_format(value: &str) -> PyResult<EnumLogFormat> {
    EnumLogFormat::parse(value).ok_or_else(|| {
        PyValueError::new_err(format!(
            "Invalid log format: `{value}`. Expected one of: ['text', 'json']"
        ))
    })
}

fn parse_options(name: &str, options: Option<Vec<String>>) -> PyResult<BTreeSet<EnumStateOption>> {
    parse_state_options(name, &options.unwrap_or_default()).map_err(map_manifest_error)
}

fn extract_state_name(name: &Bound<'_, PyAny>) -> PyResult<String> {
    name.extract::<String>().map_err(|_| {
        PyValueError::new_err(format!(
            "Invalid state name {name}: must be a non-empty string"
        ))
    })
}

fn parse_files(files: Option<Vec<(String, String)>>) -> Vec<SpecFileEntry> {
    files
        .unwrap_or_default()
        .into_iter()
        .map(|(source, destination)| SpecFileEntry::new(source, destination))
        .collect()
}

fn map_manifest_error(exception: ManifestError) -> PyErr {
    let message = exception.to_string();
    match exception.kind() {
        EnumManifestErrorKind::NotFound => match exception {
            ManifestError::ManifestFileUnreadable { .. } => PyFileNotFoundError::new_err(message),
            _ => PyKeyError::new_err(message),
        },
        EnumManifestErrorKind::Structural => PyKeyError::new_err(message),
        EnumManifestErrorKind::EmptyContent => PyTypeError::new_err(message),
        EnumManifestErrorKind::Validation => PyValueError::new_err(message),
        EnumManifestErrorKind::CopyFailure => PyOSError::new_err(message),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region State

#[pyclass(name = "State")]
#[derive(Debug, Clone)]
struct PyState {
    inner: State,
}

#[pymethods]
impl PyState {
    #[new]
    #[pyo3(signature = (name, files = None, path = None, options = None))]
    fn new(
        name: Bound<'_, PyAny>,
        files: Option<Vec<(String, String)>>,
        path: Option<PathBuf>,
        options: Option<Vec<String>>,
    ) -> PyResult<Self> {
        let name = extract_state_name(&name)?;
        let set_options = parse_options(&name, options)?;
        let inner = State::try_new(name, parse_files(files), path, set_options)
            .map_err(map_manifest_error)?;
        Ok(Self { inner })
    }

    #[getter]
    fn name(&self) -> String {
        self.inner.name().to_string()
    }

    #[setter]
    fn set_name(&mut self, name: Bound<'_, PyAny>) -> PyResult<()> {
        let name = extract_state_name(&name)?;
        self.inner.set_name(name).map_err(map_manifest_error)
    }

    #[getter]
    fn path(&self) -> Option<String> {
        self.inner.path().map(path_to_string)
    }

    #[setter]
    fn set_path(&mut self, path: Option<PathBuf>) {
        self.inner.set_path(path);
    }

    #[getter]
    fn files(&self) -> Vec<(String, String)> {
        self.inner
            .files()
            .iter()
            .map(|entry| (path_to_string(&entry.source), path_to_string(&entry.destination)))
            .collect()
    }

    #[setter]
    fn set_files(&mut self, files: Vec<(String, String)>) {
        self.inner.set_files(parse_files(Some(files)));
    }

    #[getter]
    fn options(&self) -> Vec<String> {
        self.inner
            .options()
            .iter()
            .map(|enum_option| enum_option.as_str().to_string())
            .collect()
    }

    #[setter]
    fn set_options(&mut self, options: Vec<String>) -> PyResult<()> {
        let set_options = parse_options(self.inner.name(), Some(options))?;
        self.inner.set_options(set_options);
        Ok(())
    }

    fn clear_files(&mut self) {
        self.inner.clear_files();
    }

    fn determine_path(&self) -> Option<String> {
        self.inner.determine_path().as_deref().map(path_to_string)
    }

    fn check_integrity(&self, base: PathBuf) -> PyReportIntegrity {
        PyReportIntegrity::from(self.inner.check_integrity(&base))
    }

    fn is_broken(&self, base: PathBuf) -> bool {
        self.inner.check_integrity(&base).is_broken()
    }

    fn assemble(&self, py: Python<'_>, base: PathBuf, dest: PathBuf) -> PyResult<PyReportAssemble> {
        let report = py.allow_threads(|| self.inner.assemble(&base, &dest));
        let report = report.map_err(map_manifest_error)?;
        Ok(PyReportAssemble::from(report))
    }

    fn __len__(&self) -> usize {
        self.inner.len()
    }

    fn __str__(&self) -> String {
        self.inner.to_string()
    }

    fn __repr__(&self) -> String {
        format!("State({:?})", self.inner.name())
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Manifest

#[pyclass(name = "Manifest")]
#[derive(Debug)]
struct PyManifest {
    path: Option<PathBuf>,
    /// Live handles: edits made through `m.states[name]` land here.
    states: BTreeMap<String, Py<PyState>>,
    spec_options: SpecAssembleOptions,
}

impl PyManifest {
    fn from_manifest(py: Python<'_>, manifest: Manifest) -> PyResult<Self> {
        let states = manifest
            .states()
            .iter()
            .map(|(name, state)| {
                let py_state = Py::new(
                    py,
                    PyState {
                        inner: state.clone(),
                    },
                )?;
                Ok((name.clone(), py_state))
            })
            .collect::<PyResult<_>>()?;
        Ok(Self {
            path: manifest.path().map(Path::to_path_buf),
            states,
            spec_options: manifest.copy_options().clone(),
        })
    }

    /// Core manifest built from the current state handles.
    fn snapshot(&self, py: Python<'_>) -> PyResult<Manifest> {
        let mut manifest = Manifest::default().with_copy_options(self.spec_options.clone());
        if let Some(path) = &self.path {
            manifest.set_path(path.clone());
        }
        let states = self
            .states
            .iter()
            .map(|(name, py_state)| (name.clone(), py_state.borrow(py).inner.clone()))
            .collect();
        manifest.set_states(states).map_err(map_manifest_error)?;
        Ok(manifest)
    }
}

#[pymethods]
impl PyManifest {
    #[new]
    #[pyo3(signature = (
        filename = None,
        rule_symlink = "dereference",
        num_workers_max = None,
        if_preserve_metadata = true
    ))]
    fn new(
        py: Python<'_>,
        filename: Option<PathBuf>,
        rule_symlink: &str,
        num_workers_max: Option<usize>,
        if_preserve_metadata: bool,
    ) -> PyResult<Self> {
        let spec_options = SpecAssembleOptions {
            rule_symlink: parse_rule_symlink(rule_symlink)?,
            num_workers_max,
            if_preserve_metadata,
        };
        let manifest = match filename {
            Some(path) => Manifest::from_file(path).map_err(map_manifest_error)?,
            None => Manifest::new(),
        };
        Self::from_manifest(py, manifest.with_copy_options(spec_options))
    }

    /// Build a manifest from YAML text instead of a file.
    #[staticmethod]
    fn from_yaml(py: Python<'_>, text: &str) -> PyResult<Self> {
        let manifest = Manifest::from_yaml_str(text).map_err(map_manifest_error)?;
        Self::from_manifest(py, manifest)
    }

    fn load(&mut self, py: Python<'_>, filename: PathBuf) -> PyResult<()> {
        let manifest = Manifest::from_file(filename).map_err(map_manifest_error)?;
        let loaded = Self::from_manifest(py, manifest)?;
        self.path = loaded.path;
        self.states = loaded.states;
        Ok(())
    }

    #[getter]
    fn path(&self) -> Option<String> {
        self.path.as_deref().map(path_to_string)
    }

    #[setter]
    fn set_path(&mut self, path: PathBuf) {
        self.path = Some(path);
    }

    /// Held states by name; the `State` values are the manifest's own objects.
    #[getter]
    fn states(&self) -> BTreeMap<String, Py<PyState>> {
        Python::with_gil(|py| {
            self.states
                .iter()
                .map(|(name, py_state)| (name.clone(), py_state.clone_ref(py)))
                .collect()
        })
    }

    #[setter]
    fn set_states(&mut self, states: Bound<'_, PyAny>) -> PyResult<()> {
        let py = states.py();
        let dict_states = states
            .downcast::<PyDict>()
            .map_err(|_| PyTypeError::new_err("states must be a dict of {name: State}"))?;

        let mut map_states = BTreeMap::new();
        for (key, value) in dict_states.iter() {
            let name: String = key
                .extract()
                .map_err(|_| PyTypeError::new_err(format!("State names must be str, got {key}")))?;
            let py_state = value.downcast::<PyState>().map_err(|_| {
                PyTypeError::new_err(format!("states['{name}'] is not a State"))
            })?;
            map_states.insert(name, py_state.clone().unbind());
        }

        let states_checked = map_states
            .iter()
            .map(|(name, py_state)| (name.clone(), py_state.borrow(py).inner.clone()))
            .collect();
        Manifest::default()
            .set_states(states_checked)
            .map_err(map_manifest_error)?;
        self.states = map_states;
        Ok(())
    }

    #[pyo3(signature = (name, path = None, files = None, force = false, options = None))]
    fn add_state(
        &mut self,
        py: Python<'_>,
        name: &str,
        path: Option<PathBuf>,
        files: Option<Vec<(String, String)>>,
        force: bool,
        options: Option<Vec<String>>,
    ) -> PyResult<bool> {
        let set_options = parse_options(name, options)?;
        let state = State::try_new(name, parse_files(files), path, set_options)
            .map_err(map_manifest_error)?;
        if self.states.contains_key(name) && !force {
            tracing::warn!("State '{name}' already exists");
            return Ok(false);
        }
        tracing::info!("State '{name}' added");
        self.states
            .insert(name.to_string(), Py::new(py, PyState { inner: state })?);
        Ok(true)
    }

    fn remove_state(&mut self, name: &str) -> Option<Py<PyState>> {
        let py_state = self.states.remove(name);
        match &py_state {
            Some(_) => tracing::info!("Removing state: {name}"),
            None => tracing::warn!("No state found: {name}"),
        }
        py_state
    }

    fn clear_states(&mut self) {
        self.states.clear();
    }

    fn assemble(&self, py: Python<'_>, name: &str, dest: PathBuf) -> PyResult<PyReportAssemble> {
        let manifest = self.snapshot(py)?;
        let report = py.allow_threads(|| manifest.assemble(name, &dest));
        let report = report.map_err(map_manifest_error)?;
        Ok(PyReportAssemble::from(report))
    }

    fn check_integrity(&self, py: Python<'_>) -> PyResult<Vec<PyReportIntegrity>> {
        let manifest = self.snapshot(py)?;
        let l_reports = manifest.check_integrity().map_err(map_manifest_error)?;
        Ok(l_reports.into_iter().map(PyReportIntegrity::from).collect())
    }

    fn is_broken(&self, py: Python<'_>) -> PyResult<bool> {
        let manifest = self.snapshot(py)?;
        manifest.is_broken().map_err(map_manifest_error)
    }

    fn dump(&self, py: Python<'_>, filename: PathBuf) -> PyResult<()> {
        let manifest = self.snapshot(py)?;
        manifest
            .dump_manifest_file(filename)
            .map_err(map_manifest_error)
    }

    fn to_yaml(&self, py: Python<'_>) -> PyResult<String> {
        let manifest = self.snapshot(py)?;
        manifest.to_yaml_string().map_err(map_manifest_error)
    }

    fn __len__(&self) -> usize {
        self.states.len()
    }

    fn __contains__(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    fn __repr__(&self) -> String {
        format!(
            "Manifest(path={:?}, states={:?})",
            self.path(),
            self.states.keys().collect::<Vec<_>>()
        )
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[pyfunction(name = "init_logging")]
#[pyo3(signature = (level = "info", format = "text"))]
fn init_logging_py(level: &str, format: &str) -> PyResult<bool> {
    let config = SpecLogConfig {
        level: parse_log_level(level)?,
        format: parse_log_format(format)?,
    };
    let b_installed = init_logging(config);
    if b_installed {
        tracing::debug!("Logging initialized at level {level}");
    }
    Ok(b_installed)
}

#[pymodule]
fn _shipkit_manifest_rs(module: &Bound<'_, PyModule>) -> PyResult<()> {
    module.add_class::<PyState>()?;
    module.add_class::<PyManifest>()?;
    module.add_class::<PyReportIntegrity>()?;
    module.add_class::<PyReportAssemble>()?;
    module.add_function(wrap_pyfunction!(init_logging_py, module)?)?;
    module.add("__bridge_abi__", N_BRIDGE_ABI_VERSION)?;
    module.add("__bridge_contract__", C_BRIDGE_CONTRACT_VERSION)?;
    module.add("__bridge_transport__", C_BRIDGE_TRANSPORT)?;
    Ok(())
}
