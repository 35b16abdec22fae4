//! `shipkit_manifest`:
//! declarative multistate file assembly driven by a YAML manifest.
//!
//! - `manifest` : base path plus named states; load, dump, assemble
//! - `state`    : one named bundle of `source -> destination` entries
//! - `assemble` : per-entry copy dispatch onto `shipkit_io_fs`
//! - `report`   : integrity and assembly report models
//! - `spec`     : enums/options/errors
//! - `doc`      : YAML document schema

mod assemble;
mod doc;
pub mod manifest;
pub mod report;
pub mod spec;
pub mod state;

pub use assemble::assemble_entries;
pub use manifest::Manifest;
pub use report::{ReportAssemble, ReportAssembleBuilder, ReportIntegrity, SpecIntegrityEntry};
pub use spec::{
    EnumManifestErrorKind, EnumStateOption, ManifestError, SpecAssembleOptions, SpecFileEntry,
    parse_state_options,
};
pub use state::{State, validate_state_name};
