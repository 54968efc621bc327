//! YOLO label records and the label text line format.
//!
//! A label file holds one detection per line:
//!
//! ```text
//! <class_id> <center_x> <center_y> <width> <height>
//! ```
//!
//! Coordinates are normalized to the image size. Values are written at
//! full `f64` precision; nothing is rounded before it hits the file.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::YoloprepError;
use crate::geometry::{CxCyWh, Normalized};

/// Number of whitespace-separated tokens in a detection line.
pub const FIELD_COUNT: usize = 5;

/// One normalized detection: a class ID and a center box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnnotationRecord {
    pub class_id: usize,
    pub bbox: CxCyWh<Normalized>,
}

impl AnnotationRecord {
    pub fn new(class_id: usize, bbox: CxCyWh<Normalized>) -> Self {
        Self { class_id, bbox }
    }

    /// The five-field text form, without a trailing newline.
    pub fn to_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AnnotationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.class_id,
            format_float(self.bbox.cx),
            format_float(self.bbox.cy),
            format_float(self.bbox.w),
            format_float(self.bbox.h)
        )
    }
}

/// Shortest round-trip decimal form, always with a fractional part
/// (`1` renders as `1.0`).
pub fn format_float(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}

/// How a label file is opened for writing.
///
/// Batch converters that own a whole image's detections use `Overwrite`;
/// converters that may be called repeatedly for one image use `Append`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum LabelWriteMode {
    /// Truncate any existing file.
    Overwrite,
    /// Add lines after any existing content.
    Append,
}

/// Write records to a label file, one per line, each with a trailing newline.
///
/// Parent directories are created. An empty record slice still creates
/// (or, in `Overwrite` mode, empties) the file.
pub fn write_label_file(
    path: &Path,
    records: &[AnnotationRecord],
    mode: LabelWriteMode,
) -> Result<(), YoloprepError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.create(true);
    match mode {
        LabelWriteMode::Overwrite => options.write(true).truncate(true),
        LabelWriteMode::Append => options.append(true),
    };

    let file = options.open(path)?;
    let mut writer = BufWriter::new(file);
    for record in records {
        writeln!(writer, "{}", record)?;
    }
    writer.flush()?;
    Ok(())
}

/// A syntactically valid label line. Ranges are not checked here.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelLine {
    /// Signed so that `-1` is a range problem rather than a parse problem.
    pub class_id: i64,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl LabelLine {
    pub fn coords(&self) -> [f64; 4] {
        [self.cx, self.cy, self.w, self.h]
    }
}

/// Why a non-blank label line could not be read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LabelLineError {
    /// The line did not split into exactly five tokens.
    FieldCount { found: usize },
    /// A token is not a number of the expected kind.
    Numeric { field: &'static str, raw: String },
}

impl fmt::Display for LabelLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelLineError::FieldCount { found } => {
                write!(f, "expected {} fields, found {}", FIELD_COUNT, found)
            }
            LabelLineError::Numeric { field, raw } => {
                write!(f, "invalid {} '{}'", field, raw)
            }
        }
    }
}

const COORD_FIELDS: [&str; 4] = ["center_x", "center_y", "width", "height"];

/// Parse one label line. Blank lines yield `Ok(None)`.
pub fn parse_label_line(line: &str) -> Result<Option<LabelLine>, LabelLineError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    // Cap the token count so a pathological line cannot allocate without bound.
    let tokens: Vec<&str> = trimmed.split_whitespace().take(FIELD_COUNT + 1).collect();
    if tokens.len() != FIELD_COUNT {
        let found = if tokens.len() > FIELD_COUNT {
            trimmed.split_whitespace().count()
        } else {
            tokens.len()
        };
        return Err(LabelLineError::FieldCount { found });
    }

    let class_id = tokens[0]
        .parse::<i64>()
        .map_err(|_| LabelLineError::Numeric {
            field: "class_id",
            raw: tokens[0].to_string(),
        })?;

    let mut coords = [0.0f64; 4];
    for (slot, (raw, field)) in coords
        .iter_mut()
        .zip(tokens[1..].iter().zip(COORD_FIELDS))
    {
        *slot = raw.parse::<f64>().map_err(|_| LabelLineError::Numeric {
            field,
            raw: raw.to_string(),
        })?;
    }

    Ok(Some(LabelLine {
        class_id,
        cx: coords[0],
        cy: coords[1],
        w: coords[2],
        h: coords[3],
    }))
}
