//! Copy dispatch for resolved state entries.

use std::path::Path;

use shipkit_io_fs::{copy_file, copy_tree, ensure_parent_dir};

use crate::report::{ReportAssemble, ReportAssembleBuilder};
use crate::spec::{ManifestError, SpecAssembleOptions, SpecFileEntry};

/// Copy every entry from `dir_src_root` into `dir_dest`, in order.
///
/// Per entry: create the destination parent tree if missing; a directory
/// source replaces any existing destination and is copied whole; a file
/// source overwrites its destination. The first failure aborts the run and
/// nothing already copied is rolled back.
pub fn assemble_entries(
    name_state: &str,
    dir_src_root: &Path,
    dir_dest: &Path,
    entries: &[SpecFileEntry],
    spec_options: &SpecAssembleOptions,
) -> Result<ReportAssemble, ManifestError> {
    let mut builder = ReportAssembleBuilder::new(name_state);

    for entry in entries {
        let path_src = dir_src_root.join(&entry.source);
        let path_dst = dir_dest.join(&entry.destination);
        tracing::info!(
            "Copying from {} --> {}",
            path_src.display(),
            path_dst.display()
        );

        let b_created =
            ensure_parent_dir(&path_dst).map_err(|e| ManifestError::copy_failure(&path_dst, e))?;
        if b_created {
            tracing::debug!("Creating directory tree for {}", path_dst.display());
            builder.add_dir_created();
        }

        if path_src.is_dir() {
            let report_copy = copy_tree(&path_src, &path_dst, spec_options.to_copy_options())
                .map_err(|e| ManifestError::copy_failure(&path_src, e))?;
            if let Some(spec_error) = report_copy.first_error() {
                return Err(ManifestError::copy_failure(
                    &spec_error.path,
                    &spec_error.exception,
                ));
            }
            builder.add_tree(report_copy);
        } else {
            copy_file(&path_src, &path_dst, spec_options.if_preserve_metadata)
                .map_err(|e| ManifestError::copy_failure(&path_src, e))?;
            builder.add_file();
        }
    }

    let report = builder.build();
    tracing::info!("{name_state} build complete... {report}");
    Ok(report)
}
