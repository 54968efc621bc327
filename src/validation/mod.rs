//! Structural and content validation of a dataset split.
//!
//! Validation never stops early: every file and every line is checked and
//! all findings accumulate into the report.

mod report;

pub use report::{
    DatasetValidationReport, LineIssue, LineIssueCode, Severity, SplitReport,
};

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};

use crate::dataset::{base_name, DatasetLayout, DatasetSplit, SkippedEntry};
use crate::record::{parse_label_line, LabelLine, LabelLineError};
use crate::registry::ClassRegistry;

const COORD_NAMES: [&str; 4] = ["center_x", "center_y", "width", "height"];

/// Validate every split of a dataset.
pub fn validate_dataset(layout: &DatasetLayout, registry: &ClassRegistry) -> DatasetValidationReport {
    let splits = layout
        .splits()
        .iter()
        .map(|split| validate_split(split, registry))
        .collect();

    DatasetValidationReport {
        root: layout.root().to_path_buf(),
        nc: registry.len(),
        splits,
    }
}

/// Validate one split.
pub fn validate_split(split: &DatasetSplit, registry: &ClassRegistry) -> SplitReport {
    let mut report = SplitReport::new(split.name);
    for id in 0..registry.len() {
        report.class_counts.insert(id, 0);
    }

    let image_stems = if split.images_dir.is_dir() {
        match split.image_files() {
            Ok(listing) => {
                record_skipped(&listing.skipped, &mut report);
                report.image_count = listing.len();
                listing.files.iter().map(|p| base_name(p)).collect()
            }
            Err(err) => {
                warn!("{}", err);
                report.images_dir_missing = true;
                BTreeSet::new()
            }
        }
    } else {
        report.images_dir_missing = true;
        BTreeSet::new()
    };

    let label_files = if split.labels_dir.is_dir() {
        match split.label_files() {
            Ok(listing) => {
                record_skipped(&listing.skipped, &mut report);
                listing.files
            }
            Err(err) => {
                warn!("{}", err);
                Vec::new()
            }
        }
    } else {
        report.labels_dir_missing = true;
        Vec::new()
    };
    report.label_count = label_files.len();

    let label_stems: BTreeSet<String> = label_files.iter().map(|p| base_name(p)).collect();
    report.missing_labels = image_stems.difference(&label_stems).cloned().collect();
    report.missing_images = label_stems.difference(&image_stems).cloned().collect();

    for label_path in &label_files {
        validate_label_file(label_path, registry, &mut report);
    }

    report.zero_sample_classes = report
        .class_counts
        .iter()
        .filter(|(_, count)| **count == 0)
        .filter_map(|(id, _)| registry.name_of(*id).map(str::to_string))
        .collect();

    info!(
        "Validated split '{}': {} image(s), {} label file(s), {} error(s)",
        split.name,
        report.image_count,
        report.label_count,
        report.error_count()
    );
    report
}

fn record_skipped(skipped: &[SkippedEntry], report: &mut SplitReport) {
    for entry in skipped {
        warn!("Cannot read {}: {}", entry.path.display(), entry.message);
        report
            .file_errors
            .insert(entry.file_name(), entry.message.clone());
    }
}

fn validate_label_file(path: &Path, registry: &ClassRegistry, report: &mut SplitReport) {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!("Cannot read {}: {}", path.display(), err);
            report.file_errors.insert(file_name, err.to_string());
            return;
        }
    };

    let mut issues = Vec::new();
    let mut records = 0usize;
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        match parse_label_line(line) {
            Ok(None) => {}
            Ok(Some(parsed)) => {
                records += 1;
                let before = issues.len();
                check_line(&parsed, line_no, registry, &mut issues);
                let has_error = issues[before..]
                    .iter()
                    .any(|i: &LineIssue| i.code.severity() == Severity::Error);
                if !has_error {
                    // Range-checked above, so the cast is lossless.
                    *report
                        .class_counts
                        .entry(parsed.class_id as usize)
                        .or_insert(0) += 1;
                }
            }
            Err(err) => {
                records += 1;
                let code = match err {
                    LabelLineError::FieldCount { .. } => LineIssueCode::FieldCountMismatch,
                    LabelLineError::Numeric { .. } => LineIssueCode::NumericParseError,
                };
                issues.push(LineIssue::new(line_no, code, err.to_string()));
            }
        }
    }

    if records == 0 {
        report.empty_label_files.insert(base_name(path));
    }
    if !issues.is_empty() {
        debug!("{}: {} issue(s)", path.display(), issues.len());
        report.line_issues.insert(file_name, issues);
    }
}

/// Range checks on a syntactically valid line.
///
/// Class and coordinate checks are independent, so one line can carry both.
pub fn check_line(
    line: &LabelLine,
    line_no: usize,
    registry: &ClassRegistry,
    issues: &mut Vec<LineIssue>,
) {
    let nc = registry.len();
    if line.class_id < 0 || line.class_id as u64 >= nc as u64 {
        issues.push(LineIssue::new(
            line_no,
            LineIssueCode::ClassIdOutOfRange,
            format!("class {} not in [0, {})", line.class_id, nc),
        ));
    }

    let out_of_range: Vec<String> = line
        .coords()
        .iter()
        .zip(COORD_NAMES)
        .filter(|(value, _)| !(0.0..=1.0).contains(*value))
        .map(|(value, name)| format!("{name}={value}"))
        .collect();
    if !out_of_range.is_empty() {
        issues.push(LineIssue::new(
            line_no,
            LineIssueCode::CoordinateOutOfRange,
            format!("outside [0, 1]: {}", out_of_range.join(", ")),
        ));
        return;
    }

    if line.w == 0.0 || line.h == 0.0 {
        issues.push(LineIssue::new(
            line_no,
            LineIssueCode::ZeroSizeBox,
            format!("box has zero size (width={}, height={})", line.w, line.h),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SplitName;

    fn registry(n: usize) -> ClassRegistry {
        ClassRegistry::from_names((0..n).map(|i| format!("c{i}"))).unwrap()
    }

    fn issues_for(text: &str, nc: usize) -> Vec<LineIssue> {
        let parsed = parse_label_line(text).unwrap().unwrap();
        let mut issues = Vec::new();
        check_line(&parsed, 1, &registry(nc), &mut issues);
        issues
    }

    #[test]
    fn class_and_coordinate_errors_on_one_line() {
        let issues = issues_for("5 1.2 0.5 0.3 0.2", 3);
        let codes: Vec<LineIssueCode> = issues.iter().map(|i| i.code).collect();
        assert_eq!(
            codes,
            vec![
                LineIssueCode::ClassIdOutOfRange,
                LineIssueCode::CoordinateOutOfRange
            ]
        );
        assert!(issues[1].message.contains("center_x=1.2"));
    }

    #[test]
    fn negative_class_is_out_of_range() {
        let issues = issues_for("-1 0.5 0.5 0.1 0.1", 3);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, LineIssueCode::ClassIdOutOfRange);
    }

    #[test]
    fn zero_size_is_a_warning() {
        let issues = issues_for("0 0.5 0.5 0 0.1", 1);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, LineIssueCode::ZeroSizeBox);
        assert_eq!(issues[0].code.severity(), Severity::Warning);
    }

    #[test]
    fn valid_line_has_no_issues() {
        assert!(issues_for("2 0 1 0.5 0.5", 3).is_empty());
    }

    fn write_split(root: &Path, images: &[&str], labels: &[(&str, &str)]) -> DatasetSplit {
        let layout = DatasetLayout::new(root);
        let split = layout.split(SplitName::Train);
        fs::create_dir_all(&split.images_dir).unwrap();
        fs::create_dir_all(&split.labels_dir).unwrap();
        for image in images {
            fs::write(split.images_dir.join(image), b"img").unwrap();
        }
        for (name, body) in labels {
            fs::write(split.labels_dir.join(name), body).unwrap();
        }
        split
    }

    #[test]
    fn pairing_and_line_issues_accumulate() {
        let temp = tempfile::tempdir().unwrap();
        let split = write_split(
            temp.path(),
            &["a.jpg", "b.png", "c.jpg"],
            &[
                ("a.txt", "0 0.5 0.5 0.1 0.1\n1 0.5 0.5 0.1\nx 0.5 0.5 0.1 0.1\n"),
                ("b.txt", "\n"),
                ("orphan.txt", "0 0.5 0.5 0.1 0.1\n"),
            ],
        );

        let report = validate_split(&split, &registry(2));
        assert!(report.is_usable());
        assert_eq!(report.image_count, 3);
        assert_eq!(report.label_count, 3);
        assert_eq!(report.missing_labels, ["c".to_string()].into_iter().collect());
        assert_eq!(report.missing_images, ["orphan".to_string()].into_iter().collect());
        assert_eq!(report.count(LineIssueCode::FieldCountMismatch), 1);
        assert_eq!(report.count(LineIssueCode::NumericParseError), 1);
        assert_eq!(report.line_issues["a.txt"][0].line, 2);
        assert_eq!(report.class_counts[&0], 2);
        assert_eq!(report.class_counts[&1], 0);
        assert_eq!(report.zero_sample_classes, vec!["c1".to_string()]);
        assert!(report.empty_label_files.contains("b"));
    }

    #[test]
    fn empty_train_split_is_unusable() {
        let temp = tempfile::tempdir().unwrap();
        let split = write_split(temp.path(), &[], &[]);
        let report = validate_split(&split, &registry(1));
        assert!(!report.is_usable());
    }

    #[test]
    fn missing_directories_are_flagged() {
        let temp = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(temp.path());
        let report = validate_split(&layout.split(SplitName::Valid), &registry(1));
        assert!(report.images_dir_missing);
        assert!(report.labels_dir_missing);
        assert!(!report.is_usable());
    }
}
