//! YAML manifest document schema.
//!
//! ```yaml
//! path: /srv/states          # required
//! state_a:
//!   path: sub                # optional, relative to <path>/<state>
//!   options: [full_transfer] # optional
//!   files:
//!     - [src/a.txt, a.txt]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::spec::{ManifestError, SpecFileEntry, parse_state_options};
use crate::state::{State, validate_state_name};

const C_KEY_PATH: &str = "path";
const C_KEY_FILES: &str = "files";

/// One state block, validated for shape but not yet for option names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct DocState {
    pub(crate) files: Vec<[String; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<String>,
}

/// Parsed top-level document, states in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DocManifest {
    pub(crate) path: PathBuf,
    pub(crate) states: Vec<(String, DocState)>,
}

impl DocState {
    /// Build the [`State`] named `name` whose default root is `base/name`.
    pub(crate) fn into_state(self, base: &Path, name: &str) -> Result<State, ManifestError> {
        validate_state_name(name)?;
        let set_options = parse_state_options(name, self.options.as_deref().unwrap_or_default())?;
        let l_files = self
            .files
            .into_iter()
            .map(|[source, destination]| SpecFileEntry::new(source, destination))
            .collect::<Vec<_>>();

        let mut state = State::new(name)?.with_options(set_options);
        state.set_files(l_files);
        if let Some(path_override) = self.path {
            state.set_path(Some(base.join(name).join(path_override)));
        }
        Ok(state)
    }

    pub(crate) fn from_state(state: &State, base: &Path) -> Self {
        let files = state
            .files()
            .iter()
            .map(|entry| {
                [
                    entry.source.to_string_lossy().into_owned(),
                    entry.destination.to_string_lossy().into_owned(),
                ]
            })
            .collect();
        let options = (!state.options().is_empty()).then(|| {
            state
                .options()
                .iter()
                .map(|enum_option| enum_option.as_str().to_string())
                .collect()
        });
        let path = derive_path_override(state, base).map(|p| p.to_string_lossy().into_owned());

        Self {
            files,
            options,
            path,
        }
    }
}

/// Override to write back for `state`, such that reloading resolves to the
/// same source root. `None` when the root is the default `base/name`.
fn derive_path_override(state: &State, base: &Path) -> Option<PathBuf> {
    let path_state = state.path()?;
    let dir_default = base.join(state.name());
    if path_state == dir_default {
        return None;
    }
    if let Ok(path_rel) = path_state.strip_prefix(&dir_default) {
        return Some(path_rel.to_path_buf());
    }
    // Absolute overrides survive the join on reload unchanged.
    Some(std::path::absolute(path_state).unwrap_or_else(|_| path_state.to_path_buf()))
}

fn malformed_state(state: &str, message: impl ToString) -> ManifestError {
    ManifestError::MalformedState {
        state: state.to_string(),
        message: message.to_string(),
    }
}

/// Parse and shape-check a manifest document.
pub(crate) fn parse_manifest_document(text: &str) -> Result<DocManifest, ManifestError> {
    let value: Value =
        serde_yaml::from_str(text).map_err(|e| ManifestError::MalformedDocument {
            message: e.to_string(),
        })?;

    let mapping = match value {
        Value::Mapping(mapping) => mapping,
        Value::Null => return Err(ManifestError::MissingBasePath),
        _ => {
            return Err(ManifestError::MalformedDocument {
                message: "top level must be a mapping".to_string(),
            });
        }
    };

    let mut value_path = None;
    let mut l_blocks = Vec::with_capacity(mapping.len());
    for (key, value) in mapping {
        if key.as_str() == Some(C_KEY_PATH) {
            value_path = Some(value);
        } else {
            l_blocks.push((key, value));
        }
    }

    let path = match value_path {
        Some(Value::String(path)) => PathBuf::from(path),
        Some(_) => {
            return Err(ManifestError::MalformedDocument {
                message: "`path` must be a string".to_string(),
            });
        }
        None => return Err(ManifestError::MissingBasePath),
    };

    let mut states = Vec::with_capacity(l_blocks.len());
    for (key, value) in l_blocks {
        let name = match key {
            Value::String(name) => name,
            other => {
                return Err(ManifestError::MalformedDocument {
                    message: format!("state names must be strings, got {other:?}"),
                });
            }
        };
        let doc_state = parse_state_block(&name, value)?;
        states.push((name, doc_state));
    }

    Ok(DocManifest { path, states })
}

/// `true` for blocks carrying no content at all: null, `false`, zero, or an
/// empty string, sequence or mapping.
fn is_empty_block(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Sequence(l) => l.is_empty(),
        Value::Mapping(m) => m.is_empty(),
        Value::Tagged(_) => false,
    }
}

fn parse_state_block(name: &str, value: Value) -> Result<DocState, ManifestError> {
    if is_empty_block(&value) {
        return Err(ManifestError::EmptyStateContent {
            state: name.to_string(),
        });
    }
    let Value::Mapping(block) = value else {
        return Err(malformed_state(name, "state block must be a mapping"));
    };
    if block.get(C_KEY_FILES).is_none_or(Value::is_null) {
        return Err(ManifestError::MissingFileList {
            state: name.to_string(),
        });
    }
    serde_yaml::from_value(Value::Mapping(block)).map_err(|e| malformed_state(name, e))
}

/// Render `base` and `states` in document form.
pub(crate) fn render_manifest_document(
    base: &Path,
    states: &BTreeMap<String, State>,
) -> Result<String, ManifestError> {
    let mut mapping = Mapping::new();
    mapping.insert(
        Value::from(C_KEY_PATH),
        Value::from(base.to_string_lossy().into_owned()),
    );
    for (name, state) in states {
        let value_state = serde_yaml::to_value(DocState::from_state(state, base)).map_err(|e| {
            ManifestError::MalformedDocument {
                message: e.to_string(),
            }
        })?;
        mapping.insert(Value::from(name.as_str()), value_state);
    }
    serde_yaml::to_string(&Value::Mapping(mapping)).map_err(|e| ManifestError::MalformedDocument {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{DocState, parse_manifest_document};
    use crate::spec::{EnumManifestErrorKind, ManifestError};

    #[test]
    fn parses_states_in_document_order() {
        let doc = parse_manifest_document(
            "path: /src\nzeta:\n  files: [[a, b]]\nalpha:\n  files: []\n  options: [full_transfer]\n  path: sub\n",
        )
        .expect("parse");

        assert_eq!(doc.path, PathBuf::from("/src"));
        let l_names = doc.states.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>();
        assert_eq!(l_names, vec!["zeta", "alpha"]);
        assert_eq!(
            doc.states[1].1,
            DocState {
                files: vec![],
                options: Some(vec!["full_transfer".to_string()]),
                path: Some("sub".to_string()),
            }
        );
    }

    #[test]
    fn missing_path_is_structural() {
        let err = parse_manifest_document("state_a:\n  files: [[a, a]]\n").expect_err("no path");
        assert!(matches!(err, ManifestError::MissingBasePath));
        assert_eq!(err.kind(), EnumManifestErrorKind::Structural);

        let err = parse_manifest_document("").expect_err("empty doc");
        assert!(matches!(err, ManifestError::MissingBasePath));
    }

    #[test]
    fn missing_files_and_empty_blocks_are_distinct() {
        let err = parse_manifest_document("path: /src\ns:\n  options: []\n").expect_err("no files");
        assert!(matches!(err, ManifestError::MissingFileList { ref state } if state == "s"));

        let err = parse_manifest_document("path: /src\ns:\n  files:\n").expect_err("null files");
        assert!(matches!(err, ManifestError::MissingFileList { .. }));

        let err = parse_manifest_document("path: /src\ns:\n").expect_err("null block");
        assert!(matches!(err, ManifestError::EmptyStateContent { ref state } if state == "s"));
        assert_eq!(err.kind(), EnumManifestErrorKind::EmptyContent);

        let err = parse_manifest_document("path: /src\ns: {}\n").expect_err("empty block");
        assert!(matches!(err, ManifestError::EmptyStateContent { .. }));
    }

    #[test]
    fn any_empty_block_is_missing_content() {
        for c_block in ["[]", "''", "false", "0"] {
            let err = parse_manifest_document(&format!("path: /src\ns: {c_block}\n"))
                .expect_err("empty block");
            assert_eq!(err.kind(), EnumManifestErrorKind::EmptyContent, "{c_block}");
        }

        let err = parse_manifest_document("path: /src\ns: [[a, a]]\n").expect_err("sequence");
        assert!(matches!(err, ManifestError::MalformedState { .. }));
    }

    #[test]
    fn malformed_pairs_name_the_state() {
        let err = parse_manifest_document("path: /src\ns:\n  files: [[only_one]]\n")
            .expect_err("bad pair");
        assert!(matches!(err, ManifestError::MalformedState { ref state, .. } if state == "s"));
        assert_eq!(err.kind(), EnumManifestErrorKind::Structural);
    }

    #[test]
    fn into_state_resolves_override_and_rejects_unknown_options() {
        let doc_state = DocState {
            files: vec![["a".to_string(), "b".to_string()]],
            options: None,
            path: Some("nested".to_string()),
        };
        let state = doc_state.into_state(Path::new("/src"), "s").expect("state");
        assert_eq!(state.path(), Some(Path::new("/src/s/nested")));

        let doc_state = DocState {
            files: vec![],
            options: Some(vec!["bogus".to_string()]),
            path: None,
        };
        let err = doc_state
            .into_state(Path::new("/src"), "s")
            .expect_err("unknown option");
        assert_eq!(err.kind(), EnumManifestErrorKind::Validation);
    }
}
