//! Detector output reports to YOLO label files.
//!
//! A report holds one or more detections per line, separated by commas:
//!
//! ```text
//! watermark 0.91 12 40 220 96, rabbits 0.77 300 150 420 310
//! ```
//!
//! Each detection is `class_name confidence x1 y1 x2 y2` in absolute
//! pixels. The confidence is dropped; the class is resolved by name.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use super::{convert_shapes, ConversionIssue, ConversionIssueCode, ConversionReport, SourceShape};
use crate::dataset::{
    base_name, find_image_by_stem, list_files, read_image_size, IMAGE_EXTENSIONS, LABEL_EXTENSION,
};
use crate::error::YoloprepError;
use crate::geometry::BBoxXYXY;
use crate::record::{write_label_file, LabelWriteMode};
use crate::registry::ClassRegistry;

const DETECTION_FIELDS: usize = 6;
const CONVERTED_SUFFIX: &str = "_converted";

/// Why one comma-separated detection entry was rejected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectionEntryError {
    FieldCount { found: usize, raw: String },
    Numeric { field: &'static str, raw: String },
}

impl DetectionEntryError {
    pub fn code(&self) -> ConversionIssueCode {
        match self {
            DetectionEntryError::FieldCount { .. } => ConversionIssueCode::MalformedLine,
            DetectionEntryError::Numeric { .. } => ConversionIssueCode::InvalidNumber,
        }
    }
}

impl fmt::Display for DetectionEntryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectionEntryError::FieldCount { found, raw } => write!(
                f,
                "expected {} fields, found {} in '{}'",
                DETECTION_FIELDS, found, raw
            ),
            DetectionEntryError::Numeric { field, raw } => write!(f, "invalid {} '{}'", field, raw),
        }
    }
}

const NUMERIC_FIELDS: [&str; 5] = ["confidence", "x1", "y1", "x2", "y2"];

/// Parse every detection entry on one report line.
///
/// Empty entries (blank lines, trailing commas) are ignored.
pub fn parse_detection_line(line: &str) -> Vec<Result<SourceShape, DetectionEntryError>> {
    line.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(parse_detection_entry)
        .collect()
}

fn parse_detection_entry(entry: &str) -> Result<SourceShape, DetectionEntryError> {
    let tokens: Vec<&str> = entry.split_whitespace().take(DETECTION_FIELDS + 1).collect();
    if tokens.len() != DETECTION_FIELDS {
        return Err(DetectionEntryError::FieldCount {
            found: entry.split_whitespace().count(),
            raw: entry.to_string(),
        });
    }

    let mut values = [0.0f64; 5];
    for (slot, (raw, field)) in values
        .iter_mut()
        .zip(tokens[1..].iter().zip(NUMERIC_FIELDS))
    {
        *slot = raw.parse().map_err(|_| DetectionEntryError::Numeric {
            field,
            raw: raw.to_string(),
        })?;
    }

    let [confidence, x1, y1, x2, y2] = values;
    Ok(SourceShape::Detection {
        class_name: tokens[0].to_string(),
        confidence,
        bbox: BBoxXYXY::from_xyxy(x1, y1, x2, y2),
    })
}

/// Convert one report file against its image and write the label file.
///
/// Returns the number of records written.
pub fn convert_detections_file(
    report_path: &Path,
    image_path: &Path,
    output_path: &Path,
    registry: &ClassRegistry,
    mode: LabelWriteMode,
    report: &mut ConversionReport,
) -> Result<usize, YoloprepError> {
    let size = read_image_size(image_path)?;
    let text = fs::read_to_string(report_path)?;

    let mut shapes = Vec::new();
    for (line_no, line) in text.lines().enumerate() {
        for parsed in parse_detection_line(line) {
            match parsed {
                Ok(shape) => shapes.push(shape),
                Err(err) => {
                    report.shapes_seen += 1;
                    report.add(ConversionIssue::warning(
                        err.code(),
                        err.to_string(),
                        format!("{}:{}", report_path.display(), line_no + 1),
                    ));
                }
            }
        }
    }

    let context = report_path.display().to_string();
    let records = convert_shapes(&shapes, size, registry, report, &context);
    write_label_file(output_path, &records, mode)?;
    Ok(records.len())
}

/// Options for [`convert_detections_dir`].
#[derive(Clone, Debug)]
pub struct DetectionOptions {
    /// Directory searched for `<stem>.<image ext>`.
    pub images_dir: PathBuf,
    /// `None` (or the input directory itself) writes `<stem>_converted.txt`
    /// beside each report.
    pub output_dir: Option<PathBuf>,
    pub mode: LabelWriteMode,
}

/// Convert every `.txt` report directly inside `input_dir`.
pub fn convert_detections_dir(
    input_dir: &Path,
    registry: &ClassRegistry,
    opts: &DetectionOptions,
) -> Result<ConversionReport, YoloprepError> {
    let in_place = match &opts.output_dir {
        None => true,
        Some(out) => same_dir(out, input_dir),
    };
    let output_dir = opts.output_dir.as_deref().unwrap_or(input_dir);

    let listing = list_files(input_dir, &[LABEL_EXTENSION])?;
    let reports = listing.files;
    let mut report = ConversionReport::new("detections");
    for entry in listing.skipped {
        warn!("Skipping {}: {}", entry.path.display(), entry.message);
        report.add(ConversionIssue::warning(
            ConversionIssueCode::FileFailed,
            entry.message,
            entry.path.display().to_string(),
        ));
    }
    info!(
        "Converting {} detection report(s) from {}",
        reports.len(),
        input_dir.display()
    );

    for report_path in &reports {
        let stem = base_name(report_path);
        if in_place && stem.ends_with(CONVERTED_SUFFIX) {
            continue;
        }
        report.files_seen += 1;

        let Some(image_path) = find_image_by_stem(&opts.images_dir, &stem) else {
            let err = YoloprepError::ImageNotFound {
                path: report_path.clone(),
                tried: format!(
                    "{}/{}.{{{}}}",
                    opts.images_dir.display(),
                    stem,
                    IMAGE_EXTENSIONS.join(",")
                ),
            };
            warn!("Skipping {}: {}", report_path.display(), err);
            report.add(ConversionIssue::warning(
                ConversionIssueCode::FileFailed,
                err.to_string(),
                report_path.display().to_string(),
            ));
            continue;
        };

        let output_name = if in_place {
            format!("{stem}{CONVERTED_SUFFIX}.{LABEL_EXTENSION}")
        } else {
            format!("{stem}.{LABEL_EXTENSION}")
        };
        let output_path = output_dir.join(output_name);

        match convert_detections_file(
            report_path,
            &image_path,
            &output_path,
            registry,
            opts.mode,
            &mut report,
        ) {
            Ok(written) => {
                report.files_written += 1;
                report.records_written += written;
            }
            Err(err) => {
                warn!("Skipping {}: {}", report_path.display(), err);
                report.add(ConversionIssue::warning(
                    ConversionIssueCode::FileFailed,
                    err.to_string(),
                    report_path.display().to_string(),
                ));
            }
        }
    }

    Ok(report)
}

fn same_dir(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
