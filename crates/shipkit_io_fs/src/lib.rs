//! `shipkit_io_fs`:
//! filesystem copy primitives used by the state assembler.
//!
//! - `copy`   : single-file copy, parent creation, tree copy orchestration
//! - `spec`   : enums/options/errors
//! - `report` : run-time report model
//! - `util`   : shared helper functions

pub mod copy;
pub mod report;
pub mod spec;
mod util;

pub use copy::{copy_file, copy_tree, ensure_parent_dir};
pub use report::{ReportCopy, ReportCopyBuilder};
pub use spec::{
    CopyFileError, CopyTreeError, EnumCopySymlinkStrategy, SpecCopyError, SpecCopyOptions,
};
