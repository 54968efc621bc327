//! Validation report types for structured error reporting.
//!
//! A report keeps structural completeness (directories, image/label
//! pairing) apart from content correctness (line-level issues) so the
//! caller can decide which of them should fail a run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::SplitName;

/// The result of validating every split of a dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetValidationReport {
    pub root: PathBuf,
    /// Number of classes the dataset was validated against.
    pub nc: usize,
    pub splits: Vec<SplitReport>,
}

impl DatasetValidationReport {
    pub fn unusable_splits(&self) -> usize {
        self.splits.iter().filter(|s| !s.is_usable()).count()
    }

    pub fn error_count(&self) -> usize {
        self.splits.iter().map(SplitReport::error_count).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.splits.iter().map(SplitReport::warning_count).sum()
    }

    /// Every split is usable.
    pub fn is_usable(&self) -> bool {
        self.unusable_splits() == 0
    }

    /// Usable and free of error-level issues.
    pub fn is_ok_strict(&self) -> bool {
        self.is_usable() && self.error_count() == 0
    }

    pub fn split(&self, name: SplitName) -> Option<&SplitReport> {
        self.splits.iter().find(|s| s.split == name)
    }
}

impl fmt::Display for DatasetValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Dataset {} ({} class(es))",
            self.root.display(),
            self.nc
        )?;
        for split in &self.splits {
            writeln!(f)?;
            write!(f, "{}", split)?;
        }
        writeln!(f)?;
        if self.is_usable() && self.error_count() == 0 && self.warning_count() == 0 {
            writeln!(f, "Validation passed: no issues found")
        } else {
            writeln!(
                f,
                "Validation completed: {} unusable split(s), {} error(s), {} warning(s)",
                self.unusable_splits(),
                self.error_count(),
                self.warning_count()
            )
        }
    }
}

/// Findings for one split.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SplitReport {
    pub split: SplitName,
    pub images_dir_missing: bool,
    pub labels_dir_missing: bool,
    pub image_count: usize,
    pub label_count: usize,
    /// Image base names with no label file.
    pub missing_labels: BTreeSet<String>,
    /// Label base names with no image file.
    pub missing_images: BTreeSet<String>,
    /// Line-level issues keyed by label file name.
    pub line_issues: BTreeMap<String, Vec<LineIssue>>,
    /// Files that could not be read at all, including broken directory
    /// entries such as dangling symlinks.
    pub file_errors: BTreeMap<String, String>,
    /// Samples per class ID, over lines without errors.
    pub class_counts: BTreeMap<usize, usize>,
    pub zero_sample_classes: Vec<String>,
    /// Label files with no records.
    pub empty_label_files: BTreeSet<String>,
}

impl SplitReport {
    pub fn new(split: SplitName) -> Self {
        Self {
            split,
            images_dir_missing: false,
            labels_dir_missing: false,
            image_count: 0,
            label_count: 0,
            missing_labels: BTreeSet::new(),
            missing_images: BTreeSet::new(),
            line_issues: BTreeMap::new(),
            file_errors: BTreeMap::new(),
            class_counts: BTreeMap::new(),
            zero_sample_classes: Vec::new(),
            empty_label_files: BTreeSet::new(),
        }
    }

    /// The images directory exists and, for `train`, holds at least one image.
    ///
    /// Line-level issues never make a split unusable.
    pub fn is_usable(&self) -> bool {
        if self.images_dir_missing {
            return false;
        }
        self.split != SplitName::Train || self.image_count > 0
    }

    fn issues(&self) -> impl Iterator<Item = &LineIssue> {
        self.line_issues.values().flatten()
    }

    /// Error-level line issues plus unreadable files.
    pub fn error_count(&self) -> usize {
        self.issues()
            .filter(|i| i.code.severity() == Severity::Error)
            .count()
            + self.file_errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.issues()
            .filter(|i| i.code.severity() == Severity::Warning)
            .count()
    }

    pub fn count(&self, code: LineIssueCode) -> usize {
        self.issues().filter(|i| i.code == code).count()
    }

    /// Total samples over all classes.
    pub fn sample_count(&self) -> usize {
        self.class_counts.values().sum()
    }
}

impl fmt::Display for SplitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Split '{}': {} image(s), {} label file(s), {} sample(s)",
            self.split,
            self.image_count,
            self.label_count,
            self.sample_count()
        )?;
        if self.images_dir_missing {
            writeln!(f, "  images directory is missing")?;
        }
        if self.labels_dir_missing {
            writeln!(f, "  labels directory is missing")?;
        }
        write_names(f, "Missing labels", &self.missing_labels)?;
        write_names(f, "Missing images", &self.missing_images)?;
        write_names(f, "Empty label files", &self.empty_label_files)?;

        if !self.file_errors.is_empty() {
            writeln!(f, "  Unreadable files ({}):", self.file_errors.len())?;
            for (file, message) in &self.file_errors {
                writeln!(f, "    {}: {}", file, message)?;
            }
        }

        let issues: usize = self.line_issues.values().map(Vec::len).sum();
        if issues > 0 {
            writeln!(f, "  Line issues ({}):", issues)?;
            for (file, file_issues) in &self.line_issues {
                for issue in file_issues {
                    writeln!(f, "    {}:{}", file, issue)?;
                }
            }
        }

        if !self.class_counts.is_empty() {
            let counts: Vec<String> = self
                .class_counts
                .iter()
                .map(|(id, count)| format!("{id}={count}"))
                .collect();
            writeln!(f, "  Class counts: {}", counts.join(" "))?;
        }
        if !self.zero_sample_classes.is_empty() {
            writeln!(
                f,
                "  Classes without samples: {}",
                self.zero_sample_classes.join(", ")
            )?;
        }

        let status = if self.is_usable() { "usable" } else { "UNUSABLE" };
        writeln!(f, "  Status: {}", status)
    }
}

fn write_names(f: &mut fmt::Formatter<'_>, title: &str, names: &BTreeSet<String>) -> fmt::Result {
    if names.is_empty() {
        return Ok(());
    }
    let listed: Vec<&str> = names.iter().map(String::as_str).collect();
    writeln!(f, "  {} ({}): {}", title, names.len(), listed.join(", "))
}

/// One problem on one line of a label file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LineIssue {
    /// 1-based line number.
    pub line: usize,
    pub code: LineIssueCode,
    pub message: String,
}

impl LineIssue {
    pub fn new(line: usize, code: LineIssueCode, message: impl Into<String>) -> Self {
        Self {
            line,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for LineIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.code.severity() {
            Severity::Error => "ERROR",
            Severity::Warning => "WARN ",
        };
        write!(
            f,
            "{} [{}] {}: {}",
            self.line,
            severity,
            self.code.as_str(),
            self.message
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

/// Stable codes for line-level findings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineIssueCode {
    /// Line does not split into exactly five tokens.
    FieldCountMismatch,
    /// Class ID or a coordinate is not a number.
    NumericParseError,
    /// Class ID outside `[0, nc)`.
    ClassIdOutOfRange,
    /// A coordinate outside `[0, 1]`.
    CoordinateOutOfRange,
    /// Width or height is exactly zero.
    ZeroSizeBox,
}

impl LineIssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineIssueCode::FieldCountMismatch => "FIELD_COUNT_MISMATCH",
            LineIssueCode::NumericParseError => "NUMERIC_PARSE_ERROR",
            LineIssueCode::ClassIdOutOfRange => "CLASS_ID_OUT_OF_RANGE",
            LineIssueCode::CoordinateOutOfRange => "COORDINATE_OUT_OF_RANGE",
            LineIssueCode::ZeroSizeBox => "ZERO_SIZE_BOX",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            LineIssueCode::ZeroSizeBox => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
