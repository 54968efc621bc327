//! COCO JSON to YOLO label files.
//!
//! COCO boxes are `[x, y, width, height]` in pixels with a top-left origin
//! and 1-based category IDs. Output class IDs are `category_id - 1`.
//!
//! Annotations are grouped per image and every listed image gets exactly
//! one label file, written in overwrite mode (an image without
//! annotations gets an empty file).

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use log::{info, warn};
use serde::Deserialize;

use super::{convert_shapes, ConversionIssue, ConversionIssueCode, ConversionReport, SourceShape};
use crate::dataset::LABEL_EXTENSION;
use crate::error::YoloprepError;
use crate::geometry::ImageSize;
use crate::record::{write_label_file, AnnotationRecord, LabelWriteMode};
use crate::registry::{ClassRegistry, MAX_CLASS_ID};

/// The parts of a COCO dataset file used for conversion.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CocoFile {
    #[serde(default)]
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CocoAnnotation {
    #[serde(default)]
    pub id: Option<u64>,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: [f64; 4],
}

/// Parse COCO JSON from raw bytes.
pub fn from_coco_slice(bytes: &[u8]) -> Result<CocoFile, serde_json::Error> {
    serde_json::from_slice(bytes)
}

pub fn read_coco_json(path: &Path) -> Result<CocoFile, YoloprepError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    serde_json::from_reader(reader).map_err(|source| YoloprepError::CocoJsonParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Class registry from the COCO `categories` list.
///
/// Category `id` lands at class `id - 1`. Category 0 has no 0-based slot
/// and is ignored; gaps in the ID range are filled with `class_<n>`. A
/// class ID above [`MAX_CLASS_ID`] is a configuration error.
pub fn registry_from_coco(coco: &CocoFile) -> Result<ClassRegistry, YoloprepError> {
    let mut by_class: BTreeMap<usize, &str> = BTreeMap::new();
    for category in &coco.categories {
        match category.id.checked_sub(1) {
            Some(class_id) if class_id > MAX_CLASS_ID as u64 => {
                return Err(YoloprepError::ClassIdTooLarge {
                    origin: format!("COCO category '{}' (id {})", category.name, category.id),
                    id: class_id,
                    max: MAX_CLASS_ID,
                });
            }
            Some(class_id) => {
                by_class.insert(class_id as usize, category.name.as_str());
            }
            None => warn!(
                "Ignoring COCO category '{}' with id 0 (no 0-based class slot)",
                category.name
            ),
        }
    }

    let Some((&max_id, _)) = by_class.last_key_value() else {
        return Err(YoloprepError::NoClasses);
    };
    let names: Vec<String> = (0..=max_id)
        .map(|id| match by_class.get(&id) {
            Some(name) => (*name).to_string(),
            None => format!("class_{id}"),
        })
        .collect();
    ClassRegistry::from_names(names)
}

/// Read a COCO file's categories and write them as `data.yaml`.
pub fn extract_classes(coco_path: &Path, output: &Path) -> Result<ClassRegistry, YoloprepError> {
    let coco = read_coco_json(coco_path)?;
    let registry = registry_from_coco(&coco)?;
    registry.write_data_yaml(output)?;
    info!(
        "Wrote {} class(es) from {} to {}",
        registry.len(),
        coco_path.display(),
        output.display()
    );
    Ok(registry)
}

/// Records per output label file, keyed by path relative to the output
/// directory and in path order.
///
/// An image's label path mirrors its `file_name`, subdirectories included,
/// with the extension replaced by `.txt`. When two images map to the same
/// label path the first one listed wins and the other is reported as
/// `duplicate_stem`.
pub fn convert_coco_records(
    coco: &CocoFile,
    registry: &ClassRegistry,
    report: &mut ConversionReport,
) -> BTreeMap<PathBuf, Vec<AnnotationRecord>> {
    let mut shapes_by_image: BTreeMap<u64, Vec<SourceShape>> = coco
        .images
        .iter()
        .map(|image| (image.id, Vec::new()))
        .collect();

    for (index, ann) in coco.annotations.iter().enumerate() {
        let Some(shapes) = shapes_by_image.get_mut(&ann.image_id) else {
            report.shapes_seen += 1;
            report.add(ConversionIssue::warning(
                ConversionIssueCode::MissingImage,
                format!("image_id {} is not listed in 'images'", ann.image_id),
                annotation_context(ann, index),
            ));
            continue;
        };
        shapes.push(SourceShape::CocoBox {
            category_id: ann.category_id,
            bbox: ann.bbox,
        });
    }

    let mut by_label: BTreeMap<PathBuf, Vec<AnnotationRecord>> = BTreeMap::new();
    let mut owners: BTreeMap<PathBuf, &str> = BTreeMap::new();
    for image in &coco.images {
        let shapes = shapes_by_image.remove(&image.id).unwrap_or_default();
        let context = format!("image {} ({})", image.id, image.file_name);

        let Some(label_path) = label_path_for(&image.file_name) else {
            report.shapes_seen += shapes.len();
            report.add(ConversionIssue::warning(
                ConversionIssueCode::FileFailed,
                format!(
                    "file_name has no usable path; {} annotation(s) dropped",
                    shapes.len()
                ),
                context,
            ));
            continue;
        };
        if let Some(owner) = owners.get(&label_path) {
            report.shapes_seen += shapes.len();
            report.add(ConversionIssue::warning(
                ConversionIssueCode::DuplicateStem,
                format!(
                    "{} is already written for '{}'; {} annotation(s) dropped",
                    label_path.display(),
                    owner,
                    shapes.len()
                ),
                context,
            ));
            continue;
        }

        let Some(size) = ImageSize::new(image.width, image.height) else {
            report.shapes_seen += shapes.len();
            report.add(ConversionIssue::warning(
                ConversionIssueCode::FileFailed,
                format!(
                    "invalid dimensions {}x{}; {} annotation(s) dropped",
                    image.width,
                    image.height,
                    shapes.len()
                ),
                context,
            ));
            continue;
        };

        let records = convert_shapes(&shapes, size, registry, report, &context);
        owners.insert(label_path.clone(), image.file_name.as_str());
        by_label.insert(label_path, records);
    }
    by_label
}

// Only plain components are kept, so a `file_name` cannot climb out of
// the output directory.
fn label_path_for(file_name: &str) -> Option<PathBuf> {
    let relative: PathBuf = Path::new(file_name)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    relative.file_stem()?;
    Some(relative.with_extension(LABEL_EXTENSION))
}

fn annotation_context(ann: &CocoAnnotation, index: usize) -> String {
    match ann.id {
        Some(id) => format!("annotation {id}"),
        None => format!("annotation #{index}"),
    }
}

/// Convert a COCO file into one label file per image under `output_dir`.
///
/// Without an explicit registry, the COCO categories define the classes.
pub fn convert_coco(
    coco_path: &Path,
    output_dir: &Path,
    registry: Option<&ClassRegistry>,
) -> Result<(ConversionReport, ClassRegistry), YoloprepError> {
    let coco = read_coco_json(coco_path)?;
    let registry = match registry {
        Some(registry) => registry.clone(),
        None => registry_from_coco(&coco)?,
    };

    let mut report = ConversionReport::new("coco");
    report.files_seen = coco.images.len();
    info!(
        "Converting {} annotation(s) over {} image(s) from {}",
        coco.annotations.len(),
        coco.images.len(),
        coco_path.display()
    );

    for (label_path, records) in convert_coco_records(&coco, &registry, &mut report) {
        let path = output_dir.join(label_path);
        match write_label_file(&path, &records, LabelWriteMode::Overwrite) {
            Ok(()) => {
                report.files_written += 1;
                report.records_written += records.len();
            }
            Err(err) => {
                warn!("Failed to write {}: {}", path.display(), err);
                report.add(ConversionIssue::warning(
                    ConversionIssueCode::FileFailed,
                    err.to_string(),
                    path.display().to_string(),
                ));
            }
        }
    }

    Ok((report, registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SAMPLE: &str = r#"{
        "images": [
            {"id": 1, "file_name": "img1.jpg", "width": 100, "height": 50},
            {"id": 2, "file_name": "nested/img2.png", "width": 200, "height": 200},
            {"id": 3, "file_name": "empty.jpg", "width": 10, "height": 10}
        ],
        "annotations": [
            {"id": 10, "image_id": 1, "category_id": 2, "bbox": [20, 20, 10, 10]},
            {"id": 11, "image_id": 1, "category_id": 1, "bbox": [0, 0, 50, 50]},
            {"id": 12, "image_id": 2, "category_id": 0, "bbox": [0, 0, 5, 5]},
            {"id": 13, "image_id": 9, "category_id": 1, "bbox": [0, 0, 5, 5]}
        ],
        "categories": [
            {"id": 0, "name": "animals"},
            {"id": 1, "name": "cat"},
            {"id": 2, "name": "dog"}
        ]
    }"#;

    #[test]
    fn registry_skips_category_zero() {
        let coco = from_coco_slice(SAMPLE.as_bytes()).unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        assert_eq!(registry.names(), &["cat".to_string(), "dog".to_string()]);
    }

    #[test]
    fn registry_fills_gaps() {
        let coco = from_coco_slice(
            br#"{"categories": [{"id": 3, "name": "c"}, {"id": 1, "name": "a"}]}"#,
        )
        .unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        assert_eq!(registry.names(), &["a", "class_1", "c"]);
    }

    #[test]
    fn registry_rejects_huge_category_id() {
        let coco = from_coco_slice(
            br#"{"categories": [{"id": 1, "name": "a"}, {"id": 1000000000000, "name": "x"}]}"#,
        )
        .unwrap();
        let err = registry_from_coco(&coco).unwrap_err();
        assert!(matches!(
            err,
            YoloprepError::ClassIdTooLarge { id: 999_999_999_999, max: MAX_CLASS_ID, .. }
        ));
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn registry_accepts_the_largest_allowed_id() {
        let id = MAX_CLASS_ID + 1;
        let json = format!(r#"{{"categories": [{{"id": {id}, "name": "last"}}]}}"#);
        let coco = from_coco_slice(json.as_bytes()).unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        assert_eq!(registry.len(), MAX_CLASS_ID + 1);
        assert_eq!(registry.name_of(MAX_CLASS_ID), Some("last"));
    }

    #[test]
    fn registry_without_categories_fails() {
        let coco = CocoFile::default();
        assert!(matches!(
            registry_from_coco(&coco),
            Err(YoloprepError::NoClasses)
        ));
    }

    #[test]
    fn records_group_per_image_and_report_skips() {
        let coco = from_coco_slice(SAMPLE.as_bytes()).unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        let mut report = ConversionReport::new("coco");
        let records = convert_coco_records(&coco, &registry, &mut report);

        let img1 = &records[Path::new("img1.txt")];
        assert_eq!(img1.len(), 2);
        assert_eq!(img1[0].class_id, 1);
        assert_eq!(img1[0].bbox.cx, 0.25);
        assert_eq!(img1[0].bbox.cy, 0.5);
        assert_eq!(img1[0].bbox.w, 0.1);
        assert_eq!(img1[0].bbox.h, 0.2);

        assert!(records[Path::new("nested/img2.txt")].is_empty());
        assert!(records[Path::new("empty.txt")].is_empty());
        assert_eq!(report.shapes_seen, 4);
        assert_eq!(report.count(ConversionIssueCode::InvalidCategoryId), 1);
        assert_eq!(report.count(ConversionIssueCode::MissingImage), 1);
    }

    #[test]
    fn convert_writes_one_file_per_image() {
        let temp = tempfile::tempdir().unwrap();
        let coco_path = temp.path().join("annotations.json");
        fs::write(&coco_path, SAMPLE).unwrap();
        let out = temp.path().join("labels");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("img1.txt"), "stale\n").unwrap();

        let (report, registry) = convert_coco(&coco_path, &out, None).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(report.files_written, 3);
        assert_eq!(report.records_written, 2);
        assert_eq!(
            fs::read_to_string(out.join("img1.txt")).unwrap(),
            "1 0.25 0.5 0.1 0.2\n0 0.25 0.5 0.5 1.0\n"
        );
        assert_eq!(fs::read_to_string(out.join("empty.txt")).unwrap(), "");
        assert_eq!(fs::read_to_string(out.join("nested/img2.txt")).unwrap(), "");
    }

    #[test]
    fn same_stem_in_different_dirs_stays_separate() {
        let coco = from_coco_slice(
            br#"{
                "images": [
                    {"id": 1, "file_name": "a/001.jpg", "width": 10, "height": 10},
                    {"id": 2, "file_name": "b/001.jpg", "width": 10, "height": 10}
                ],
                "annotations": [
                    {"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 5, 5]},
                    {"id": 2, "image_id": 2, "category_id": 1, "bbox": [5, 5, 5, 5]}
                ],
                "categories": [{"id": 1, "name": "cat"}]
            }"#,
        )
        .unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        let mut report = ConversionReport::new("coco");
        let records = convert_coco_records(&coco, &registry, &mut report);

        let keys: Vec<&Path> = records.keys().map(PathBuf::as_path).collect();
        assert_eq!(keys, vec![Path::new("a/001.txt"), Path::new("b/001.txt")]);
        assert_eq!(records[Path::new("a/001.txt")].len(), 1);
        assert_eq!(records[Path::new("b/001.txt")].len(), 1);
        assert!(report.issues.is_empty());
    }

    #[test]
    fn colliding_label_paths_keep_the_first_image() {
        let coco = from_coco_slice(
            br#"{
                "images": [
                    {"id": 1, "file_name": "001.jpg", "width": 10, "height": 10},
                    {"id": 2, "file_name": "001.png", "width": 10, "height": 10},
                    {"id": 3, "file_name": "../escape/002.jpg", "width": 10, "height": 10}
                ],
                "annotations": [
                    {"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 5, 5]},
                    {"id": 2, "image_id": 2, "category_id": 1, "bbox": [5, 5, 5, 5]}
                ],
                "categories": [{"id": 1, "name": "cat"}]
            }"#,
        )
        .unwrap();
        let registry = registry_from_coco(&coco).unwrap();
        let mut report = ConversionReport::new("coco");
        let records = convert_coco_records(&coco, &registry, &mut report);

        assert_eq!(records.len(), 2);
        assert_eq!(records[Path::new("001.txt")][0].bbox.cx, 0.25);
        assert!(records.contains_key(Path::new("escape/002.txt")));
        assert_eq!(report.count(ConversionIssueCode::DuplicateStem), 1);
        assert_eq!(report.shapes_seen, 2);
        assert_eq!(report.skipped_shapes(), 0);
    }

    #[test]
    fn extract_classes_writes_data_yaml() {
        let temp = tempfile::tempdir().unwrap();
        let coco_path = temp.path().join("annotations.json");
        fs::write(&coco_path, SAMPLE).unwrap();
        let yaml = temp.path().join("data.yaml");

        extract_classes(&coco_path, &yaml).unwrap();
        assert_eq!(
            fs::read_to_string(&yaml).unwrap(),
            "nc: 2\nnames: ['cat', 'dog']\n"
        );
    }
}
