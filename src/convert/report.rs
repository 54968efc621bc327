//! Conversion report types for tracking skipped shapes and policy notes.
//!
//! Every shape a converter declines to emit becomes a named, countable
//! issue here instead of an error, so a batch run can summarize totals.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// A report generated by one batch conversion.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ConversionReport {
    /// Source format name.
    pub source: String,
    /// Input files looked at.
    pub files_seen: usize,
    /// Label files written.
    pub files_written: usize,
    /// Shapes found across all readable inputs.
    pub shapes_seen: usize,
    /// Records written across all label files.
    pub records_written: usize,
    /// Skips, file failures and policy notes, in the order they occurred.
    pub issues: Vec<ConversionIssue>,
}

impl ConversionReport {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn add(&mut self, issue: ConversionIssue) {
        self.issues.push(issue);
    }

    /// Number of issues with the given code.
    pub fn count(&self, code: ConversionIssueCode) -> usize {
        self.issues.iter().filter(|i| i.code == code).count()
    }

    /// Issue totals grouped by code.
    pub fn counts_by_code(&self) -> BTreeMap<ConversionIssueCode, usize> {
        let mut counts = BTreeMap::new();
        for issue in &self.issues {
            *counts.entry(issue.code).or_insert(0) += 1;
        }
        counts
    }

    /// Count of shapes that were dropped.
    pub fn skipped_shapes(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning && i.code.is_shape_skip())
            .count()
    }

    /// Count of input files that could not be converted at all.
    pub fn failed_files(&self) -> usize {
        self.count(ConversionIssueCode::FileFailed)
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Warning)
            .count()
    }

    pub fn info_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|i| i.severity == ConversionSeverity::Info)
            .count()
    }
}

impl fmt::Display for ConversionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Converted {} ({} file(s) read, {} label file(s) written)",
            self.source, self.files_seen, self.files_written
        )?;
        writeln!(
            f,
            "  {} shape(s) in, {} record(s) out, {} skipped, {} file(s) failed",
            self.shapes_seen,
            self.records_written,
            self.skipped_shapes(),
            self.failed_files()
        )?;

        let counts = self.counts_by_code();
        if !counts.is_empty() {
            writeln!(f)?;
            writeln!(f, "Totals by reason:")?;
            for (code, count) in &counts {
                writeln!(f, "  {:<20} {}", code.as_str(), count)?;
            }
        }

        let warnings = self.warning_count();
        if warnings > 0 {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", warnings)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Warning)
            {
                writeln!(f, "  - {}", issue)?;
            }
        }

        let infos = self.info_count();
        if infos > 0 {
            writeln!(f)?;
            writeln!(f, "Notes ({}):", infos)?;
            for issue in self
                .issues
                .iter()
                .filter(|i| i.severity == ConversionSeverity::Info)
            {
                writeln!(f, "  - {}", issue.message)?;
            }
        }

        Ok(())
    }
}

/// A single skip, failure or note.
#[derive(Clone, Debug, Serialize)]
pub struct ConversionIssue {
    pub severity: ConversionSeverity,
    pub code: ConversionIssueCode,
    pub message: String,
    /// The input file (and shape index, if any) the issue refers to.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub context: String,
}

impl ConversionIssue {
    pub fn warning(
        code: ConversionIssueCode,
        message: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            severity: ConversionSeverity::Warning,
            code,
            message: message.into(),
            context: context.into(),
        }
    }

    pub fn info(code: ConversionIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: ConversionSeverity::Info,
            code,
            message: message.into(),
            context: String::new(),
        }
    }
}

impl fmt::Display for ConversionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.context.is_empty() {
            write!(f, "[{}] {}", self.code.as_str(), self.message)
        } else {
            write!(f, "[{}] {}: {}", self.code.as_str(), self.context, self.message)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionSeverity {
    /// Something in the input was dropped.
    Warning,
    /// A policy note; nothing was dropped.
    Info,
}

/// Stable issue codes for programmatic consumption.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionIssueCode {
    // Shape skips
    /// Class label is not in the registry.
    UnknownClass,
    /// Shape kind other than rectangle or polygon.
    UnsupportedShape,
    /// Shape has no points.
    EmptyShape,
    /// COCO category ID is 0 and cannot be made 0-based.
    InvalidCategoryId,
    /// Resolved class ID is not below the class count.
    ClassIdOutOfRange,
    /// Zero or negative width/height after normalization, or non-finite values.
    DegenerateBox,
    /// Normalized values fall outside `[0, 1]`.
    OutOfBounds,
    /// COCO annotation refers to an image ID that is not listed.
    MissingImage,
    /// Detection entry does not have exactly six fields.
    MalformedLine,
    /// Detection entry has a field that is not a number.
    InvalidNumber,

    // File-level
    /// The whole input file was skipped (unreadable, bad JSON, no image size).
    FileFailed,
    /// Two COCO images map to the same output label file; the later one is skipped.
    DuplicateStem,

    // Policy notes
    /// Polygons were reduced to their enclosing boxes.
    PolygonCollapsed,
    /// Class IDs were derived from labels in first-seen order.
    ClassesDerived,
}

impl ConversionIssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversionIssueCode::UnknownClass => "unknown_class",
            ConversionIssueCode::UnsupportedShape => "unsupported_shape",
            ConversionIssueCode::EmptyShape => "empty_shape",
            ConversionIssueCode::InvalidCategoryId => "invalid_category_id",
            ConversionIssueCode::ClassIdOutOfRange => "class_id_out_of_range",
            ConversionIssueCode::DegenerateBox => "degenerate_box",
            ConversionIssueCode::OutOfBounds => "out_of_bounds",
            ConversionIssueCode::MissingImage => "missing_image",
            ConversionIssueCode::MalformedLine => "malformed_line",
            ConversionIssueCode::InvalidNumber => "invalid_number",
            ConversionIssueCode::FileFailed => "file_failed",
            ConversionIssueCode::DuplicateStem => "duplicate_stem",
            ConversionIssueCode::PolygonCollapsed => "polygon_collapsed",
            ConversionIssueCode::ClassesDerived => "classes_derived",
        }
    }

    /// True for codes that stand for one dropped shape.
    pub fn is_shape_skip(&self) -> bool {
        !matches!(
            self,
            ConversionIssueCode::FileFailed
                | ConversionIssueCode::DuplicateStem
                | ConversionIssueCode::PolygonCollapsed
                | ConversionIssueCode::ClassesDerived
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_no_skips() {
        let report = ConversionReport::new("labelme");
        assert_eq!(report.skipped_shapes(), 0);
        assert_eq!(report.failed_files(), 0);
        assert!(report.counts_by_code().is_empty());
    }

    #[test]
    fn skips_are_counted_by_code() {
        let mut report = ConversionReport::new("detections");
        report.add(ConversionIssue::warning(
            ConversionIssueCode::UnknownClass,
            "unknown class 'cat'",
            "a.txt",
        ));
        report.add(ConversionIssue::warning(
            ConversionIssueCode::UnknownClass,
            "unknown class 'dog'",
            "b.txt",
        ));
        report.add(ConversionIssue::warning(
            ConversionIssueCode::FileFailed,
            "no image",
            "c.txt",
        ));

        assert_eq!(report.count(ConversionIssueCode::UnknownClass), 2);
        assert_eq!(report.skipped_shapes(), 2);
        assert_eq!(report.failed_files(), 1);
        assert_eq!(report.warning_count(), 3);
    }

    #[test]
    fn notes_are_not_skips() {
        let mut report = ConversionReport::new("labelme");
        report.add(ConversionIssue::info(
            ConversionIssueCode::PolygonCollapsed,
            "3 polygon(s) reduced to boxes",
        ));
        assert_eq!(report.skipped_shapes(), 0);
        assert_eq!(report.info_count(), 1);
        assert!(report.to_string().contains("Notes (1):"));
    }

    #[test]
    fn report_serializes_to_json() {
        let mut report = ConversionReport::new("coco");
        report.add(ConversionIssue::warning(
            ConversionIssueCode::InvalidCategoryId,
            "category_id 0",
            "annotation 4",
        ));

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"source\":\"coco\""));
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(json.contains("\"code\":\"invalid_category_id\""));
    }
}
