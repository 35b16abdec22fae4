//! Copy report models and mutable report builder.

use std::fmt;
use std::path::PathBuf;

use crate::spec::SpecCopyError;

/// Aggregate counters and diagnostics for one `copy_tree` run.
#[derive(Debug, Default, Clone)]
pub struct ReportCopy {
    /// Total scanned directory/file entries.
    pub cnt_scanned: u64,
    /// Number of entries (files, directories, links) created at destination.
    pub cnt_copied: u64,
    /// Number of entries skipped by strategy.
    pub cnt_skipped: u64,
    /// Number of pre-existing destination roots removed before copying.
    pub cnt_removed: u64,
    /// Non-fatal warnings collected during traversal/copy.
    pub warnings: Vec<String>,
    /// Per-entry failures.
    pub errors: Vec<SpecCopyError>,
}

impl ReportCopy {
    /// Number of collected hard errors.
    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// First collected error, if any.
    pub fn first_error(&self) -> Option<&SpecCopyError> {
        self.errors.first()
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} scanned={} copied={} skipped={} removed={} errors={} warnings={}",
            self.cnt_scanned,
            self.cnt_copied,
            self.cnt_skipped,
            self.cnt_removed,
            self.error_count(),
            self.warning_count()
        )
    }
}

impl fmt::Display for ReportCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[COPY]"))
    }
}

/// Mutable accumulator for copy statistics.
#[derive(Debug, Default, Clone)]
pub struct ReportCopyBuilder {
    cnt_scanned: u64,
    cnt_copied: u64,
    cnt_skipped: u64,
    cnt_removed: u64,
    warnings: Vec<String>,
    errors: Vec<SpecCopyError>,
}

impl ReportCopyBuilder {
    pub fn add_scanned(&mut self) {
        self.cnt_scanned += 1;
    }

    pub fn add_copied(&mut self) {
        self.cnt_copied += 1;
    }

    pub fn add_skipped(&mut self) {
        self.cnt_skipped += 1;
    }

    pub fn add_removed(&mut self) {
        self.cnt_removed += 1;
    }

    pub fn add_warning(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    /// Add one path-scoped error.
    pub fn add_error(&mut self, path: PathBuf, exception: String) {
        tracing::debug!(path = %path.display(), "copy error: {exception}");
        self.errors.push(SpecCopyError { path, exception });
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportCopy {
        ReportCopy {
            cnt_scanned: self.cnt_scanned,
            cnt_copied: self.cnt_copied,
            cnt_skipped: self.cnt_skipped,
            cnt_removed: self.cnt_removed,
            warnings: self.warnings,
            errors: self.errors,
        }
    }
}
