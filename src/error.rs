use std::path::PathBuf;
use thiserror::Error;

use crate::integrity::IntegrityReport;
use crate::validation::DatasetValidationReport;

/// The main error type for yoloprep operations.
#[derive(Debug, Error)]
pub enum YoloprepError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read class config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse class config {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Class config {path} lists no classes; add at least one name under 'names'")]
    EmptyClassList { path: PathBuf },

    #[error("Class config {path} declares nc: {nc} but lists {names} name(s)")]
    ClassCountMismatch {
        path: PathBuf,
        nc: usize,
        names: usize,
    },

    #[error("Class name '{name}' appears more than once (names are matched case-insensitively)")]
    DuplicateClassName { name: String },

    #[error("Class ID {id} from {origin} is above the supported maximum of {max}")]
    ClassIdTooLarge { origin: String, id: u64, max: usize },

    #[error("Class list is empty; supply --classes or annotations with at least one label")]
    NoClasses,

    #[error("Failed to parse LabelMe JSON {path}: {source}")]
    LabelmeJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse COCO JSON {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write JSON {path}: {source}")]
    JsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Invalid image dimensions {width}x{height} for {path}")]
    InvalidImageDimensions {
        path: PathBuf,
        width: u64,
        height: u64,
    },

    #[error("No companion image found for {path} (tried {tried})")]
    ImageNotFound { path: PathBuf, tried: String },

    #[error("Invalid dataset layout at {path}: {message}")]
    LayoutInvalid { path: PathBuf, message: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Validation failed: {unusable} unusable split(s), {error_count} error(s)")]
    ValidationFailed {
        unusable: usize,
        error_count: usize,
        report: Box<DatasetValidationReport>,
    },

    #[error("Found {groups} duplicate group(s) and {leaked} image name(s) shared across splits")]
    DuplicatesFound {
        groups: usize,
        leaked: usize,
        report: Box<IntegrityReport>,
    },

    #[error("Failed to serialize report: {0}")]
    ReportSerialize(#[source] serde_json::Error),
}
