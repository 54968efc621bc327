//! Format converters: raw source shapes in, normalized label records out.
//!
//! Each source format (LabelMe polygons, COCO boxes, detection reports)
//! parses its input into [`SourceShape`] values and hands them to
//! [`convert_shapes`] together with the image size and the class
//! registry. Shapes that cannot become a valid record are skipped and the
//! skip is recorded in the [`ConversionReport`].

pub mod coco;
pub mod detections;
pub mod labelme;
pub mod relabel;
mod report;

pub use report::{ConversionIssue, ConversionIssueCode, ConversionReport, ConversionSeverity};

use std::fmt;

use log::debug;

use crate::geometry::{BBoxXYXY, CxCyWh, ImageSize, Normalized, Pixel};
use crate::record::AnnotationRecord;
use crate::registry::ClassRegistry;

/// Declared kind of a point-list shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Polygon,
    /// Any other kind (circle, line, point, ...). Always skipped.
    Unsupported(String),
}

impl ShapeKind {
    /// A missing kind is treated as a polygon.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => ShapeKind::Polygon,
            Some(kind) if kind.eq_ignore_ascii_case("rectangle") => ShapeKind::Rectangle,
            Some(kind) if kind.eq_ignore_ascii_case("polygon") => ShapeKind::Polygon,
            Some(other) => ShapeKind::Unsupported(other.to_string()),
        }
    }
}

/// One annotation as it appears in a source format, before normalization.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceShape {
    /// Point list in pixels with a class label (LabelMe).
    Points {
        label: String,
        kind: ShapeKind,
        points: Vec<(f64, f64)>,
    },
    /// COCO `[x, y, w, h]` pixel box with a 1-based category ID.
    CocoBox { category_id: u64, bbox: [f64; 4] },
    /// Detector output: class name, confidence, two-corner pixel box.
    Detection {
        class_name: String,
        confidence: f64,
        bbox: BBoxXYXY<Pixel>,
    },
}

/// Why a shape was not converted.
#[derive(Clone, Debug, PartialEq)]
pub enum SkipReason {
    UnknownClass(String),
    UnsupportedShape(String),
    EmptyShape,
    InvalidCategoryId(u64),
    ClassIdOutOfRange { class_id: usize, nc: usize },
    DegenerateBox,
    OutOfBounds,
}

impl SkipReason {
    pub fn code(&self) -> ConversionIssueCode {
        match self {
            SkipReason::UnknownClass(_) => ConversionIssueCode::UnknownClass,
            SkipReason::UnsupportedShape(_) => ConversionIssueCode::UnsupportedShape,
            SkipReason::EmptyShape => ConversionIssueCode::EmptyShape,
            SkipReason::InvalidCategoryId(_) => ConversionIssueCode::InvalidCategoryId,
            SkipReason::ClassIdOutOfRange { .. } => ConversionIssueCode::ClassIdOutOfRange,
            SkipReason::DegenerateBox => ConversionIssueCode::DegenerateBox,
            SkipReason::OutOfBounds => ConversionIssueCode::OutOfBounds,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UnknownClass(label) => {
                write!(f, "class '{}' is not in the class list", label)
            }
            SkipReason::UnsupportedShape(kind) => write!(f, "unsupported shape type '{}'", kind),
            SkipReason::EmptyShape => write!(f, "shape has no points"),
            SkipReason::InvalidCategoryId(id) => {
                write!(f, "category_id {} cannot be shifted to a 0-based class", id)
            }
            SkipReason::ClassIdOutOfRange { class_id, nc } => {
                write!(f, "class {} is out of range for {} class(es)", class_id, nc)
            }
            SkipReason::DegenerateBox => write!(f, "box has zero or negative size"),
            SkipReason::OutOfBounds => write!(f, "box extends outside the image"),
        }
    }
}

/// Convert one shape to a record, or say why not.
pub fn convert_shape(
    shape: &SourceShape,
    size: ImageSize,
    registry: &ClassRegistry,
) -> Result<AnnotationRecord, SkipReason> {
    let (class_id, bbox) = match shape {
        SourceShape::Points {
            label,
            kind,
            points,
        } => {
            if let ShapeKind::Unsupported(raw) = kind {
                return Err(SkipReason::UnsupportedShape(raw.clone()));
            }
            let class_id = registry
                .id_of(label)
                .ok_or_else(|| SkipReason::UnknownClass(label.clone()))?;
            let corners = BBoxXYXY::<Pixel>::enclosing(points.iter().copied())
                .ok_or(SkipReason::EmptyShape)?;
            (class_id, corners.to_normalized_cxcywh(size))
        }
        SourceShape::CocoBox { category_id, bbox } => {
            let class_id = category_id
                .checked_sub(1)
                .ok_or(SkipReason::InvalidCategoryId(*category_id))? as usize;
            if !registry.contains_id(class_id) {
                return Err(SkipReason::ClassIdOutOfRange {
                    class_id,
                    nc: registry.len(),
                });
            }
            let [x, y, w, h] = *bbox;
            (class_id, CxCyWh::from_top_left_pixels(x, y, w, h, size))
        }
        SourceShape::Detection {
            class_name, bbox, ..
        } => {
            let class_id = registry
                .id_of(class_name)
                .ok_or_else(|| SkipReason::UnknownClass(class_name.clone()))?;
            (class_id, bbox.to_normalized_cxcywh(size))
        }
    };

    check_normalized(&bbox)?;
    Ok(AnnotationRecord::new(class_id, bbox))
}

fn check_normalized(bbox: &CxCyWh<Normalized>) -> Result<(), SkipReason> {
    // NaN fails `has_area`, so non-finite input lands here as degenerate.
    if !bbox.has_area() {
        return Err(SkipReason::DegenerateBox);
    }
    if !bbox.is_within_unit() {
        return Err(SkipReason::OutOfBounds);
    }
    Ok(())
}

/// Convert every shape of one image, recording skips in `report`.
///
/// `context` names the input (usually its file path) in skip messages.
/// Output order follows input order.
pub fn convert_shapes(
    shapes: &[SourceShape],
    size: ImageSize,
    registry: &ClassRegistry,
    report: &mut ConversionReport,
    context: &str,
) -> Vec<AnnotationRecord> {
    report.shapes_seen += shapes.len();

    let mut records = Vec::with_capacity(shapes.len());
    for (index, shape) in shapes.iter().enumerate() {
        match convert_shape(shape, size, registry) {
            Ok(record) => records.push(record),
            Err(reason) => {
                debug!("{} shape {}: skipped, {}", context, index, reason);
                report.add(ConversionIssue::warning(
                    reason.code(),
                    reason.to_string(),
                    format!("{} (shape {})", context, index),
                ));
            }
        }
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ClassRegistry {
        ClassRegistry::from_names(["sock", "shoe"]).unwrap()
    }

    fn size(w: u32, h: u32) -> ImageSize {
        ImageSize::new(w, h).unwrap()
    }

    fn points(label: &str, kind: ShapeKind, pts: &[(f64, f64)]) -> SourceShape {
        SourceShape::Points {
            label: label.to_string(),
            kind,
            points: pts.to_vec(),
        }
    }

    #[test]
    fn polygon_square_becomes_center_box() {
        let shape = points(
            "sock",
            ShapeKind::Polygon,
            &[(10.0, 10.0), (50.0, 10.0), (50.0, 40.0), (10.0, 40.0)],
        );
        let record = convert_shape(&shape, size(100, 100), &registry()).unwrap();
        assert_eq!(record.to_line(), "0 0.3 0.25 0.4 0.3");
    }

    #[test]
    fn rectangle_and_polygon_share_the_enclosing_box() {
        let rect = points("Shoe", ShapeKind::Rectangle, &[(50.0, 40.0), (10.0, 10.0)]);
        let poly = points(
            "shoe",
            ShapeKind::Polygon,
            &[(10.0, 25.0), (30.0, 10.0), (50.0, 25.0), (30.0, 40.0)],
        );
        let a = convert_shape(&rect, size(100, 100), &registry()).unwrap();
        let b = convert_shape(&poly, size(100, 100), &registry()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.class_id, 1);
    }

    #[test]
    fn coco_box_shifts_category() {
        let shape = SourceShape::CocoBox {
            category_id: 2,
            bbox: [20.0, 20.0, 10.0, 10.0],
        };
        let record = convert_shape(&shape, size(100, 50), &registry()).unwrap();
        assert_eq!(record.class_id, 1);
        assert_eq!(record.bbox.cx, 0.25);
        assert_eq!(record.bbox.cy, 0.5);
        assert_eq!(record.bbox.w, 0.1);
        assert_eq!(record.bbox.h, 0.2);
    }

    #[test]
    fn coco_category_zero_is_skipped() {
        let shape = SourceShape::CocoBox {
            category_id: 0,
            bbox: [1.0, 1.0, 5.0, 5.0],
        };
        assert_eq!(
            convert_shape(&shape, size(10, 10), &registry()),
            Err(SkipReason::InvalidCategoryId(0))
        );
    }

    #[test]
    fn coco_category_past_registry_is_skipped() {
        let shape = SourceShape::CocoBox {
            category_id: 3,
            bbox: [1.0, 1.0, 5.0, 5.0],
        };
        assert_eq!(
            convert_shape(&shape, size(10, 10), &registry()),
            Err(SkipReason::ClassIdOutOfRange { class_id: 2, nc: 2 })
        );
    }

    #[test]
    fn detection_drops_confidence() {
        let shape = SourceShape::Detection {
            class_name: "SOCK".to_string(),
            confidence: 0.87,
            bbox: BBoxXYXY::from_xyxy(0.0, 0.0, 50.0, 25.0),
        };
        let record = convert_shape(&shape, size(100, 100), &registry()).unwrap();
        assert_eq!(record.to_line(), "0 0.25 0.125 0.5 0.25");
    }

    #[test]
    fn skip_reasons() {
        let reg = registry();
        let s = size(100, 100);

        let unknown = points("hat", ShapeKind::Polygon, &[(1.0, 1.0), (5.0, 5.0)]);
        assert!(matches!(
            convert_shape(&unknown, s, &reg),
            Err(SkipReason::UnknownClass(_))
        ));

        let circle = points(
            "sock",
            ShapeKind::Unsupported("circle".into()),
            &[(1.0, 1.0), (5.0, 5.0)],
        );
        assert!(matches!(
            convert_shape(&circle, s, &reg),
            Err(SkipReason::UnsupportedShape(_))
        ));

        let empty = points("sock", ShapeKind::Polygon, &[]);
        assert_eq!(convert_shape(&empty, s, &reg), Err(SkipReason::EmptyShape));

        let flat = points("sock", ShapeKind::Polygon, &[(1.0, 5.0), (9.0, 5.0)]);
        assert_eq!(convert_shape(&flat, s, &reg), Err(SkipReason::DegenerateBox));

        let outside = points("sock", ShapeKind::Rectangle, &[(90.0, 10.0), (120.0, 20.0)]);
        assert_eq!(convert_shape(&outside, s, &reg), Err(SkipReason::OutOfBounds));

        let nan = points("sock", ShapeKind::Rectangle, &[(f64::NAN, 10.0), (20.0, 20.0)]);
        assert!(convert_shape(&nan, s, &reg).is_err());
    }

    #[test]
    fn batch_records_each_skip() {
        let shapes = vec![
            points("sock", ShapeKind::Polygon, &[(1.0, 1.0), (5.0, 5.0)]),
            points("hat", ShapeKind::Polygon, &[(1.0, 1.0), (5.0, 5.0)]),
            points("shoe", ShapeKind::Polygon, &[(1.0, 1.0), (1.0, 5.0)]),
        ];
        let mut report = ConversionReport::new("test");
        let records = convert_shapes(&shapes, size(10, 10), &registry(), &mut report, "img.json");

        assert_eq!(records.len(), 1);
        assert_eq!(report.shapes_seen, 3);
        assert_eq!(report.count(ConversionIssueCode::UnknownClass), 1);
        assert_eq!(report.count(ConversionIssueCode::DegenerateBox), 1);
        assert!(report.issues[0].context.contains("img.json (shape 1)"));
    }

    #[test]
    fn shape_kind_parsing() {
        assert_eq!(ShapeKind::parse(None), ShapeKind::Polygon);
        assert_eq!(ShapeKind::parse(Some("rectangle")), ShapeKind::Rectangle);
        assert_eq!(
            ShapeKind::parse(Some("circle")),
            ShapeKind::Unsupported("circle".into())
        );
    }
}
