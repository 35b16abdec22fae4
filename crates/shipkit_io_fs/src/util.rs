use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::report::ReportCopyBuilder;
use crate::spec::EnumCopySymlinkStrategy;

////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

/// Resolve symlinks where the path exists; fall back to an absolute form.
fn _normalize_path(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| _absolutize_path(path))
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// Reject destinations that would be written through a symlink.
///
/// Every existing component between `path_dir_dst_root` and `path_dst_item`
/// (the item itself included) must not be a symbolic link.
pub(crate) fn validate_destination_path_safety(
    path_dst_item: &Path,
    path_dir_dst_root: &Path,
) -> Result<(), String> {
    let path_root_abs = _absolutize_path(path_dir_dst_root);
    let path_item_abs = _absolutize_path(path_dst_item);

    let path_rel = path_item_abs.strip_prefix(&path_root_abs).map_err(|_| {
        format!(
            "Unsafe destination path escapes destination root: {} (root={})",
            path_dst_item.display(),
            path_dir_dst_root.display()
        )
    })?;

    let mut path_cursor = path_root_abs;
    for part_rel in path_rel.components() {
        path_cursor.push(part_rel.as_os_str());
        match fs::symlink_metadata(&path_cursor) {
            Ok(meta_cursor) if meta_cursor.file_type().is_symlink() => {
                return Err(format!(
                    "Unsafe destination path traverses symlink component: {}",
                    path_cursor.display()
                ));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(format!(
                    "Failed to inspect destination path component {} ({e})",
                    path_cursor.display()
                ));
            }
        }
    }
    Ok(())
}

/// Remove whatever lives at `path`: a directory tree, a file, or a link.
pub(crate) fn remove_existing(path: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region LinksAndMetadata

pub(crate) fn should_error_broken_symlink(
    path_symlink: &Path,
    rule_symlink: EnumCopySymlinkStrategy,
) -> bool {
    rule_symlink == EnumCopySymlinkStrategy::Dereference && !path_symlink.exists()
}

pub(crate) fn create_symbolic_link(
    path_src: &Path,
    path_dst: &Path,
    builder_cp_report: &mut ReportCopyBuilder,
) {
    let res_link = fs::read_link(path_src).and_then(|target| _symlink(path_src, &target, path_dst));
    match res_link {
        Ok(()) => builder_cp_report.add_copied(),
        Err(e) => builder_cp_report.add_error(path_dst.to_path_buf(), e.to_string()),
    }
}

#[cfg(unix)]
fn _symlink(_path_src: &Path, target: &Path, path_dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, path_dst)
}

#[cfg(windows)]
fn _symlink(path_src: &Path, target: &Path, path_dst: &Path) -> io::Result<()> {
    use std::os::windows::fs::{symlink_dir, symlink_file};
    if path_src.is_dir() {
        symlink_dir(target, path_dst)
    } else {
        symlink_file(target, path_dst)
    }
}

#[cfg(not(any(unix, windows)))]
fn _symlink(_path_src: &Path, _target: &Path, _path_dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Symbolic links are unsupported on this platform",
    ))
}

/// Copy bytes onto a fresh inode at `path_file_dst`.
///
/// An existing destination file or link is unlinked first, so a read-only
/// copy from an earlier run never blocks the write.
pub(crate) fn copy_file_bytes(
    path_file_src: &Path,
    path_file_dst: &Path,
    if_preserve_metadata: bool,
) -> io::Result<()> {
    match fs::symlink_metadata(path_file_dst) {
        Ok(meta_dst) if !meta_dst.file_type().is_dir() => fs::remove_file(path_file_dst)?,
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::copy(path_file_src, path_file_dst)?;
    if if_preserve_metadata {
        apply_metadata(path_file_src, path_file_dst)?;
    }
    Ok(())
}

fn apply_metadata(path_file_src: &Path, path_file_dst: &Path) -> io::Result<()> {
    use filetime::{FileTime, set_file_times};

    let stat_src = fs::metadata(path_file_src)?;
    fs::set_permissions(path_file_dst, stat_src.permissions())?;
    set_file_times(
        path_file_dst,
        FileTime::from_last_access_time(&stat_src),
        FileTime::from_last_modification_time(&stat_src),
    )?;

    #[cfg(target_os = "linux")]
    copy_xattrs_linux(path_file_src, path_file_dst);
    Ok(())
}

/// Best effort: filesystems without xattr support are not an error.
#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let Ok(iter_xattr_names) = xattr::list(path_file_src) else {
        return;
    };
    for name in iter_xattr_names {
        if let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() {
            let _ = xattr::set(path_file_dst, &name, &raw_value);
        }
    }
}

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
