//! Single-file copy, tree traversal and copy orchestration.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::report::{ReportCopy, ReportCopyBuilder};
use crate::spec::{CopyFileError, CopyTreeError, EnumCopySymlinkStrategy, SpecCopyOptions};
use crate::util::{
    calculate_worker_limit, copy_file_bytes, create_symbolic_link, is_overlap, remove_existing,
    should_error_broken_symlink, validate_destination_path_safety,
};

////////////////////////////////////////////////////////////////////////////////
// #region Primitives

/// Create the parent directory tree of `path` if it is missing.
///
/// Returns `true` when at least one directory was created.
pub fn ensure_parent_dir(path: &Path) -> io::Result<bool> {
    match path.parent() {
        Some(path_parent) if !path_parent.as_os_str().is_empty() && !path_parent.exists() => {
            fs::create_dir_all(path_parent)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Copy one regular file from `path_file_src` to `path_file_dst`, replacing
/// any existing destination file.
pub fn copy_file(
    path_file_src: &Path,
    path_file_dst: &Path,
    if_preserve_metadata: bool,
) -> Result<(), CopyFileError> {
    fs::metadata(path_file_src).map_err(|e| CopyFileError::Io {
        path: path_file_src.to_path_buf(),
        source: e,
    })?;

    if path_file_dst.is_dir() {
        return Err(CopyFileError::DestinationIsDirectory(
            path_file_dst.to_path_buf(),
        ));
    }
    copy_file_bytes(path_file_src, path_file_dst, if_preserve_metadata).map_err(|e| {
        CopyFileError::Io {
            path: path_file_dst.to_path_buf(),
            source: e,
        }
    })?;
    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region TreeCopy

#[derive(Debug, Clone)]
struct SpecCopyTaskFile {
    path_file_src: PathBuf,
    path_file_dst: PathBuf,
}

#[derive(Debug)]
struct SpecCopyContext {
    path_dir_dst: PathBuf,
    spec_cp_options: SpecCopyOptions,
    builder_cp_report: ReportCopyBuilder,
    /// `(dev, ino)` of the directories on the current recursion path.
    set_dirs_ancestors: HashSet<(u64, u64)>,
    l_tasks_file_copy: Vec<SpecCopyTaskFile>,
}

/// Copy a directory tree from `dir_source` to `dir_destination`.
///
/// An existing destination (file or tree) is removed before copying, so a
/// repeated call yields an identical tree.
///
/// Returns [`ReportCopy`] when the run completes (with possible per-entry errors
/// stored in the report). Returns [`CopyTreeError`] only for top-level setup and
/// validation failures.
pub fn copy_tree<P, Q>(
    dir_source: P,
    dir_destination: Q,
    spec_cp_options: SpecCopyOptions,
) -> Result<ReportCopy, CopyTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let path_dir_src = dir_source.as_ref().to_path_buf();
    let path_dir_dst = dir_destination.as_ref().to_path_buf();

    if !path_dir_src.is_dir() {
        return Err(CopyTreeError::SourceNotDirectory(path_dir_src));
    }
    if is_overlap(&path_dir_src, &path_dir_dst) {
        return Err(CopyTreeError::SourceDestinationOverlap {
            dir_source: path_dir_src,
            dir_destination: path_dir_dst,
        });
    }

    let mut builder_cp_report = ReportCopyBuilder::default();
    let init_failed = |path: &Path, message: String| CopyTreeError::DestinationInitFailed {
        path: path.to_path_buf(),
        message,
    };

    if fs::symlink_metadata(&path_dir_dst).is_ok() {
        remove_existing(&path_dir_dst).map_err(|e| init_failed(&path_dir_dst, e.to_string()))?;
        builder_cp_report.add_removed();
    }

    fs::create_dir_all(&path_dir_dst).map_err(|e| init_failed(&path_dir_dst, e.to_string()))?;

    let mut spec_cp_ctx = SpecCopyContext {
        path_dir_dst: path_dir_dst.clone(),
        spec_cp_options,
        builder_cp_report,
        set_dirs_ancestors: HashSet::new(),
        l_tasks_file_copy: Vec::new(),
    };

    walk_directory(&path_dir_src, &path_dir_dst, &mut spec_cp_ctx);
    flush_file_copy_tasks(&mut spec_cp_ctx);

    let report_copy = spec_cp_ctx.builder_cp_report.build();
    tracing::debug!(
        src = %path_dir_src.display(),
        dst = %path_dir_dst.display(),
        "{report_copy}"
    );
    Ok(report_copy)
}

fn run_file_copy_task(
    spec_task: &SpecCopyTaskFile,
    path_dir_dst_root: &Path,
    if_preserve_metadata: bool,
) -> Result<(), String> {
    validate_destination_path_safety(&spec_task.path_file_dst, path_dir_dst_root)?;
    copy_file_bytes(
        &spec_task.path_file_src,
        &spec_task.path_file_dst,
        if_preserve_metadata,
    )
    .map_err(|e| e.to_string())
}

fn flush_file_copy_tasks(spec_cp_ctx: &mut SpecCopyContext) {
    let l_tasks_file_copy = std::mem::take(&mut spec_cp_ctx.l_tasks_file_copy);
    if l_tasks_file_copy.is_empty() {
        return;
    }

    let path_dir_dst_root = spec_cp_ctx.path_dir_dst.clone();
    let if_preserve_metadata = spec_cp_ctx.spec_cp_options.if_preserve_metadata;
    let run_serial = |l_tasks: Vec<SpecCopyTaskFile>| {
        l_tasks
            .into_iter()
            .map(|spec_task| {
                let res_copy =
                    run_file_copy_task(&spec_task, &path_dir_dst_root, if_preserve_metadata);
                (spec_task.path_file_dst, res_copy)
            })
            .collect::<Vec<_>>()
    };

    let n_workers_max = calculate_worker_limit(spec_cp_ctx.spec_cp_options.num_workers_max);
    let l_results = if n_workers_max <= 1 || l_tasks_file_copy.len() == 1 {
        run_serial(l_tasks_file_copy)
    } else {
        match ThreadPoolBuilder::new().num_threads(n_workers_max).build() {
            Ok(thread_pool) => thread_pool.install(|| {
                l_tasks_file_copy
                    .into_par_iter()
                    .map(|spec_task| {
                        let res_copy = run_file_copy_task(
                            &spec_task,
                            &path_dir_dst_root,
                            if_preserve_metadata,
                        );
                        (spec_task.path_file_dst, res_copy)
                    })
                    .collect::<Vec<_>>()
            }),
            Err(_) => {
                spec_cp_ctx.builder_cp_report.add_warning(format!(
                    "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial copy."
                ));
                run_serial(l_tasks_file_copy)
            }
        }
    };

    for (path_file_dst, res_copy) in l_results {
        match res_copy {
            Ok(()) => spec_cp_ctx.builder_cp_report.add_copied(),
            Err(msg) => spec_cp_ctx.builder_cp_report.add_error(path_file_dst, msg),
        }
    }
}

#[cfg(unix)]
fn derive_dir_key(path_dir: &Path) -> Option<(u64, u64)> {
    use std::os::unix::fs::MetadataExt;

    fs::metadata(path_dir)
        .ok()
        .map(|stat_dir| (stat_dir.dev(), stat_dir.ino()))
}

#[cfg(not(unix))]
fn derive_dir_key(_path_dir: &Path) -> Option<(u64, u64)> {
    None
}

/// Recurse into `path_dir_src`, cutting dereferenced links that point back
/// at one of its own ancestors. Sibling links to one directory are each
/// copied in full.
fn walk_directory(path_dir_src: &Path, path_dir_dst: &Path, spec_cp_ctx: &mut SpecCopyContext) {
    let key_dir = match spec_cp_ctx.spec_cp_options.rule_symlink {
        EnumCopySymlinkStrategy::Dereference => derive_dir_key(path_dir_src),
        _ => None,
    };
    if let Some(key_dir) = key_dir {
        if !spec_cp_ctx.set_dirs_ancestors.insert(key_dir) {
            spec_cp_ctx.builder_cp_report.add_error(
                path_dir_src.to_path_buf(),
                format!("Symlink loop detected: {}", path_dir_src.display()),
            );
            return;
        }
    }

    walk_directory_entries(path_dir_src, path_dir_dst, spec_cp_ctx);

    if let Some(key_dir) = key_dir {
        spec_cp_ctx.set_dirs_ancestors.remove(&key_dir);
    }
}

fn walk_directory_entries(
    path_dir_src: &Path,
    path_dir_dst: &Path,
    spec_cp_ctx: &mut SpecCopyContext,
) {
    let enum_rule_symlink = spec_cp_ctx.spec_cp_options.rule_symlink;

    let iter_entries = match fs::read_dir(path_dir_src) {
        Ok(iter) => iter,
        Err(e) => {
            spec_cp_ctx
                .builder_cp_report
                .add_error(path_dir_src.to_path_buf(), e.to_string());
            return;
        }
    };

    let mut l_entries = Vec::new();
    for entry_res in iter_entries {
        match entry_res {
            Ok(entry) => l_entries.push(entry),
            Err(e) => spec_cp_ctx.builder_cp_report.add_error(
                path_dir_src.to_path_buf(),
                format!("Failed to read directory entry ({e})"),
            ),
        }
    }
    l_entries.sort_by_key(|entry| entry.file_name());

    for entry in l_entries {
        let path_entry_src = entry.path();
        let path_entry_dst = path_dir_dst.join(entry.file_name());
        spec_cp_ctx.builder_cp_report.add_scanned();

        let cfg_file_type = match entry.file_type() {
            Ok(v) => v,
            Err(e) => {
                spec_cp_ctx
                    .builder_cp_report
                    .add_error(path_entry_src, e.to_string());
                continue;
            }
        };

        if cfg_file_type.is_symlink() {
            match enum_rule_symlink {
                EnumCopySymlinkStrategy::SkipSymlinks => {
                    spec_cp_ctx.builder_cp_report.add_skipped();
                    continue;
                }
                EnumCopySymlinkStrategy::CopySymlinks => {
                    if let Err(message) =
                        validate_destination_path_safety(&path_entry_dst, &spec_cp_ctx.path_dir_dst)
                    {
                        spec_cp_ctx
                            .builder_cp_report
                            .add_error(path_entry_dst, message);
                        continue;
                    }
                    create_symbolic_link(
                        &path_entry_src,
                        &path_entry_dst,
                        &mut spec_cp_ctx.builder_cp_report,
                    );
                    continue;
                }
                EnumCopySymlinkStrategy::Dereference => {
                    if should_error_broken_symlink(&path_entry_src, enum_rule_symlink) {
                        spec_cp_ctx.builder_cp_report.add_error(
                            path_entry_src.clone(),
                            format!("Broken symlink: {}", path_entry_src.display()),
                        );
                        continue;
                    }
                }
            }
        }

        // Dereferenced links resolve to their target kind here.
        if path_entry_src.is_dir() {
            if let Err(message) =
                validate_destination_path_safety(&path_entry_dst, &spec_cp_ctx.path_dir_dst)
            {
                spec_cp_ctx
                    .builder_cp_report
                    .add_error(path_entry_dst, message);
                continue;
            }
            if let Err(e) = fs::create_dir_all(&path_entry_dst) {
                spec_cp_ctx
                    .builder_cp_report
                    .add_error(path_entry_dst, e.to_string());
                continue;
            }
            spec_cp_ctx.builder_cp_report.add_copied();
            walk_directory(&path_entry_src, &path_entry_dst, spec_cp_ctx);
        } else if path_entry_src.is_file() {
            spec_cp_ctx.l_tasks_file_copy.push(SpecCopyTaskFile {
                path_file_src: path_entry_src,
                path_file_dst: path_entry_dst,
            });
        } else {
            spec_cp_ctx
                .builder_cp_report
                .add_warning(format!("Special file skipped: {}", path_entry_src.display()));
            spec_cp_ctx.builder_cp_report.add_skipped();
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
