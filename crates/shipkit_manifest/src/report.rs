//! Integrity and assembly report models.

use std::fmt;
use std::path::PathBuf;

use shipkit_io_fs::ReportCopy;

/// Existence of one entry's resolved source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecIntegrityEntry {
    /// Entry source as declared.
    pub source: PathBuf,
    /// Resolved source path that was checked.
    pub path: PathBuf,
    pub if_exists: bool,
}

/// Result of [`crate::State::check_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportIntegrity {
    pub name: String,
    pub entries: Vec<SpecIntegrityEntry>,
}

impl ReportIntegrity {
    /// A state is broken when at least one entry source is missing.
    pub fn is_broken(&self) -> bool {
        self.entries.iter().any(|e| !e.if_exists)
    }

    pub fn missing(&self) -> impl Iterator<Item = &SpecIntegrityEntry> {
        self.entries.iter().filter(|e| !e.if_exists)
    }

    pub fn cnt_found(&self) -> usize {
        self.entries.iter().filter(|e| e.if_exists).count()
    }

    pub fn cnt_missing(&self) -> usize {
        self.entries.len() - self.cnt_found()
    }

    pub fn format(&self, prefix: &str) -> String {
        format!(
            "{prefix} state={} found={} missing={} broken={}",
            self.name,
            self.cnt_found(),
            self.cnt_missing(),
            self.is_broken()
        )
    }
}

impl fmt::Display for ReportIntegrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[INTEGRITY]"))
    }
}

/// Aggregate counters for one state assembly.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReportAssemble {
    pub name: String,
    /// Single files copied.
    pub cnt_files: u64,
    /// Directory trees copied.
    pub cnt_trees: u64,
    /// Existing destination trees removed before copying.
    pub cnt_replaced: u64,
    /// Entries whose destination parent had to be created.
    pub cnt_dirs_created: u64,
    /// Entries written inside copied trees.
    pub cnt_tree_entries: u64,
    /// Non-fatal warnings raised by tree copies.
    pub warnings: Vec<String>,
}

impl ReportAssemble {
    /// Number of destination artifacts (files plus trees).
    pub fn cnt_artifacts(&self) -> u64 {
        self.cnt_files + self.cnt_trees
    }

    pub fn format(&self, prefix: &str) -> String {
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
}

impl fmt::Display for ReportAssemble {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[ASSEMBLE]"))
    }
}

/// Mutable accumulator for [`ReportAssemble`].
#[derive(Debug, Default, Clone)]
pub struct ReportAssembleBuilder {
    report: ReportAssemble,
}

impl ReportAssembleBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            report: ReportAssemble {
                name: name.to_string(),
                ..ReportAssemble::default()
            },
        }
    }

    pub fn add_file(&mut self) {
        self.report.cnt_files += 1;
    }

    pub fn add_dir_created(&mut self) {
        self.report.cnt_dirs_created += 1;
    }

    /// Fold one successful tree copy into the totals.
    pub fn add_tree(&mut self, report_copy: ReportCopy) {
        self.report.cnt_trees += 1;
        self.report.cnt_replaced += report_copy.cnt_removed;
        self.report.cnt_tree_entries += report_copy.cnt_copied;
        self.report.warnings.extend(report_copy.warnings);
    }

    pub fn build(self) -> ReportAssemble {
        self.report
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use shipkit_io_fs::ReportCopy;

    use super::{ReportAssembleBuilder, ReportIntegrity, SpecIntegrityEntry};

    fn entry(source: &str, if_exists: bool) -> SpecIntegrityEntry {
        SpecIntegrityEntry {
            source: PathBuf::from(source),
            path: PathBuf::from("/src/state").join(source),
            if_exists,
        }
    }

    #[test]
    fn integrity_report_is_broken_iff_any_missing() {
        let report = ReportIntegrity {
            name: "state".to_string(),
            entries: vec![entry("a", true), entry("b", true)],
        };
        assert!(!report.is_broken());
        assert_eq!(
            report.to_string(),
            "[INTEGRITY] state=state found=2 missing=0 broken=false"
        );

        let report = ReportIntegrity {
            name: "state".to_string(),
            entries: vec![entry("a", true), entry("b", false)],
        };
        assert!(report.is_broken());
        assert_eq!(report.cnt_missing(), 1);
        assert_eq!(
            report.missing().map(|e| e.source.clone()).collect::<Vec<_>>(),
            vec![PathBuf::from("b")]
        );
    }

    #[test]
    fn assemble_builder_folds_tree_reports() {
        let mut builder = ReportAssembleBuilder::new("s");
        builder.add_file();
        builder.add_dir_created();
        builder.add_tree(ReportCopy {
            cnt_copied: 4,
            cnt_removed: 1,
            warnings: vec!["w".to_string()],
            ..ReportCopy::default()
        });

        let report = builder.build();
        assert_eq!(report.cnt_artifacts(), 2);
        assert_eq!(report.cnt_replaced, 1);
        assert_eq!(report.cnt_tree_entries, 4);
        assert_eq!(
            report.to_string(),
            "[ASSEMBLE] state=s files=1 trees=1 replaced=1 dirs_created=1 tree_entries=4"
        );
    }
}
