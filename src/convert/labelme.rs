//! LabelMe JSON (polygon / rectangle point lists) to YOLO label files.
//!
//! Each `<name>.json` produces `<name>.txt`, written in overwrite mode
//! because one LabelMe file owns every shape of its image.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Deserialize;

use super::{convert_shapes, ConversionIssue, ConversionIssueCode, ConversionReport};
use super::{ShapeKind, SourceShape};
use crate::dataset::{
    companion_image_candidates, find_companion_image, list_files_recursive, read_image_size,
    LABELME_EXTENSION, LABEL_EXTENSION,
};
use crate::error::YoloprepError;
use crate::geometry::ImageSize;
use crate::record::{write_label_file, LabelWriteMode};
use crate::registry::ClassRegistry;

/// The subset of a LabelMe annotation file used for conversion.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelmeFile {
    #[serde(default)]
    pub shapes: Vec<LabelmeShape>,
    #[serde(default)]
    pub image_width: Option<u32>,
    #[serde(default)]
    pub image_height: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LabelmeShape {
    pub label: String,
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
    #[serde(default)]
    pub shape_type: Option<String>,
}

impl LabelmeFile {
    /// Embedded image size, if both dimensions are present and non-zero.
    pub fn embedded_size(&self) -> Option<ImageSize> {
        ImageSize::new(self.image_width?, self.image_height?)
    }

    pub fn source_shapes(&self) -> Vec<SourceShape> {
        self.shapes
            .iter()
            .map(|shape| SourceShape::Points {
                label: shape.label.clone(),
                kind: ShapeKind::parse(shape.shape_type.as_deref()),
                points: shape.points.clone(),
            })
            .collect()
    }
}

/// Parse LabelMe JSON from raw bytes.
pub fn from_labelme_slice(bytes: &[u8]) -> Result<LabelmeFile, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Fuzz-only entrypoint: parse, then convert every shape against a
/// registry derived from the document's own labels.
#[cfg(feature = "fuzzing")]
pub fn fuzz_convert_labelme_slice(bytes: &[u8]) -> Result<usize, YoloprepError> {
    let labelme = from_labelme_slice(bytes).map_err(|source| YoloprepError::LabelmeJsonParse {
        path: PathBuf::from("<fuzz>"),
        source,
    })?;
    let Some(size) = labelme.embedded_size().or_else(|| ImageSize::new(640, 480)) else {
        return Ok(0);
    };
    let registry =
        ClassRegistry::derive_first_seen(labelme.shapes.iter().map(|s| s.label.as_str()))?;
    let mut report = ConversionReport::new("<fuzz>");
    let records = convert_shapes(&labelme.source_shapes(), size, &registry, &mut report, "<fuzz>");
    Ok(records.len())
}

pub fn read_labelme_json(path: &Path) -> Result<LabelmeFile, YoloprepError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| YoloprepError::LabelmeJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Image size for a LabelMe file: embedded dimensions first, then the
/// companion image's header.
pub fn resolve_image_size(
    labelme: &LabelmeFile,
    json_path: &Path,
) -> Result<ImageSize, YoloprepError> {
    if let Some(size) = labelme.embedded_size() {
        return Ok(size);
    }

    match find_companion_image(json_path) {
        Some(image) => {
            debug!(
                "{}: no embedded size, reading {}",
                json_path.display(),
                image.display()
            );
            read_image_size(&image)
        }
        None => Err(YoloprepError::ImageNotFound {
            path: json_path.to_path_buf(),
            tried: companion_image_candidates(json_path)
                .iter()
                .map(|c| c.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        }),
    }
}

/// Convert one LabelMe file and write its label file.
///
/// Returns the number of records written. Shape-level skips go into
/// `report`; file-level problems are returned as `Err`.
pub fn convert_labelme_file(
    json_path: &Path,
    output_path: &Path,
    registry: &ClassRegistry,
    report: &mut ConversionReport,
) -> Result<usize, YoloprepError> {
    convert_one(json_path, output_path, registry, report).map(|(written, _)| written)
}

// Returns (records written, polygon shapes seen).
fn convert_one(
    json_path: &Path,
    output_path: &Path,
    registry: &ClassRegistry,
    report: &mut ConversionReport,
) -> Result<(usize, usize), YoloprepError> {
    let labelme = read_labelme_json(json_path)?;
    let size = resolve_image_size(&labelme, json_path)?;
    let shapes = labelme.source_shapes();
    let polygons = shapes
        .iter()
        .filter(|s| matches!(s, SourceShape::Points { kind: ShapeKind::Polygon, .. }))
        .count();

    let context = json_path.display().to_string();
    let records = convert_shapes(&shapes, size, registry, report, &context);
    write_label_file(output_path, &records, LabelWriteMode::Overwrite)?;
    Ok((records.len(), polygons))
}

/// Options for [`convert_labelme_dir`].
#[derive(Clone, Debug, Default)]
pub struct LabelmeOptions {
    /// Where label files go. `None` writes each `.txt` beside its `.json`.
    pub output_dir: Option<PathBuf>,
    /// Explicit class list. `None` derives one from the labels.
    pub registry: Option<ClassRegistry>,
}

/// Convert every `.json` file below `input_dir`.
///
/// Files are visited in sorted order. Without an explicit registry, one is
/// derived from all labels first (first-seen order over the sorted files)
/// and returned alongside the report so the caller can persist it.
pub fn convert_labelme_dir(
    input_dir: &Path,
    opts: &LabelmeOptions,
) -> Result<(ConversionReport, ClassRegistry), YoloprepError> {
    let listing = list_files_recursive(input_dir, &[LABELME_EXTENSION])?;
    let json_files = listing.files;
    let mut report = ConversionReport::new("labelme");
    for entry in listing.skipped {
        warn!("Skipping {}: {}", entry.path.display(), entry.message);
        report.add(ConversionIssue::warning(
            ConversionIssueCode::FileFailed,
            entry.message,
            entry.path.display().to_string(),
        ));
    }
    info!(
        "Converting {} LabelMe file(s) from {}",
        json_files.len(),
        input_dir.display()
    );

    let registry = match &opts.registry {
        Some(registry) => registry.clone(),
        None => {
            let registry = derive_registry(&json_files)?;
            report.add(ConversionIssue::info(
                ConversionIssueCode::ClassesDerived,
                format!(
                    "derived {} class(es) in first-seen order: {}",
                    registry.len(),
                    registry.names().join(", ")
                ),
            ));
            registry
        }
    };

    let mut polygons = 0usize;
    for json_path in &json_files {
        report.files_seen += 1;
        let output_path = output_path_for(json_path, input_dir, opts.output_dir.as_deref());

        match convert_one(json_path, &output_path, &registry, &mut report) {
            Ok((written, file_polygons)) => {
                report.files_written += 1;
                report.records_written += written;
                polygons += file_polygons;
            }
            Err(err) => {
                warn!("Skipping {}: {}", json_path.display(), err);
                report.add(ConversionIssue::warning(
                    ConversionIssueCode::FileFailed,
                    err.to_string(),
                    json_path.display().to_string(),
                ));
            }
        }
    }

    if polygons > 0 {
        report.add(ConversionIssue::info(
            ConversionIssueCode::PolygonCollapsed,
            format!(
                "{} polygon shape(s) were reduced to their enclosing boxes; segmentation detail is not kept",
                polygons
            ),
        ));
    }

    Ok((report, registry))
}

fn output_path_for(json_path: &Path, input_dir: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(out) => {
            let relative = json_path
                .strip_prefix(input_dir)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(json_path.file_name().unwrap_or_default()));
            out.join(relative).with_extension(LABEL_EXTENSION)
        }
        None => json_path.with_extension(LABEL_EXTENSION),
    }
}

fn derive_registry(json_files: &[PathBuf]) -> Result<ClassRegistry, YoloprepError> {
    let mut labels = Vec::new();
    for json_path in json_files {
        match read_labelme_json(json_path) {
            Ok(labelme) => labels.extend(
                labelme
                    .shapes
                    .into_iter()
                    .filter(|s| {
                        !matches!(
                            ShapeKind::parse(s.shape_type.as_deref()),
                            ShapeKind::Unsupported(_)
                        )
                    })
                    .map(|s| s.label),
            ),
            // Reported by the conversion pass.
            Err(err) => debug!("class derivation skipped {}: {}", json_path.display(), err),
        }
    }
    ClassRegistry::derive_first_seen(labels)
}
