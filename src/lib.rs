//! Yoloprep: dataset preparation for YOLO-style object detection.
//!
//! Yoloprep converts source annotations (LabelMe polygons, COCO boxes,
//! detector reports) into normalized YOLO label files, validates the
//! `dataset/{train,valid}/{images,labels}` layout, and audits label and
//! image content for duplicates and cross-split leakage.
//!
//! # Modules
//!
//! - [`registry`]: Class name <-> ID mapping loaded from `data.yaml`
//! - [`geometry`]: Pixel / normalized box types
//! - [`record`]: The five-field label line format
//! - [`convert`]: Format converters and conversion reports
//! - [`dataset`]: On-disk layout, file discovery and split creation
//! - [`validation`]: Structural and content validation of splits
//! - [`integrity`]: Content fingerprints and duplicate detection
//! - [`error`]: Error types for yoloprep operations

pub mod convert;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod integrity;
pub mod record;
pub mod registry;
pub mod validation;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

pub use error::YoloprepError;

use convert::detections::DetectionOptions;
use convert::labelme::LabelmeOptions;
use dataset::{DatasetLayout, SplitOptions};
use integrity::IntegrityOptions;
use record::LabelWriteMode;
use registry::ClassRegistry;

/// The yoloprep CLI application.
#[derive(Parser)]
#[command(name = "yoloprep")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Convert LabelMe JSON files to YOLO label files.
    ConvertLabelme(ConvertLabelmeArgs),
    /// Convert a COCO JSON file to one YOLO label file per image.
    ConvertCoco(ConvertCocoArgs),
    /// Convert detector output reports to YOLO label files.
    ConvertDetections(ConvertDetectionsArgs),
    /// Write the class list of a COCO file as data.yaml.
    Classes(ClassesArgs),
    /// Validate image/label pairing and label content of a dataset.
    Validate(ValidateArgs),
    /// Find duplicate label/image content and cross-split leakage.
    Dedup(DedupArgs),
    /// Move a random fraction of train images into the valid split.
    Split(SplitArgs),
    /// Copy the originals of a curated image subset, matched by base name.
    CopyMatching(CopyMatchingArgs),
    /// Prefix the labels in LabelMe JSON files.
    Relabel(RelabelArgs),
}

/// Report output format.
#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct ConvertLabelmeArgs {
    /// Directory searched recursively for LabelMe .json files.
    json_dir: PathBuf,

    /// Class list (data.yaml or one name per line). Derived from labels if omitted.
    #[arg(long)]
    classes: Option<PathBuf>,

    /// Output directory for label files (default: beside each .json).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write the class list that was used as data.yaml.
    #[arg(long)]
    classes_out: Option<PathBuf>,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ConvertCocoArgs {
    /// COCO annotation file.
    coco_json: PathBuf,

    /// Output directory for label files.
    #[arg(long)]
    output_dir: PathBuf,

    /// Class list overriding the COCO categories.
    #[arg(long)]
    classes: Option<PathBuf>,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ConvertDetectionsArgs {
    /// Directory of detection report .txt files.
    detections_dir: PathBuf,

    /// Directory holding the images the reports refer to.
    #[arg(long)]
    images: PathBuf,

    /// Output directory (default: <name>_converted.txt beside each report).
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Class list (data.yaml or one name per line).
    #[arg(long)]
    classes: PathBuf,

    /// How existing label files are treated.
    #[arg(long, value_enum, default_value_t = LabelWriteMode::Append)]
    mode: LabelWriteMode,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct ClassesArgs {
    /// COCO annotation file.
    coco_json: PathBuf,

    /// Where to write the class list.
    #[arg(long, default_value = "classes.yaml")]
    output: PathBuf,
}

#[derive(clap::Args)]
struct ValidateArgs {
    /// Dataset root.
    #[arg(long, default_value = "dataset")]
    root: PathBuf,

    /// Class list (default: <root>/data.yaml).
    #[arg(long)]
    classes: Option<PathBuf>,

    /// Also fail on line-level errors, not only on unusable splits.
    #[arg(long)]
    strict: bool,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct DedupArgs {
    /// Dataset root.
    #[arg(long, default_value = "dataset")]
    root: PathBuf,

    /// Also fingerprint image files.
    #[arg(long)]
    images: bool,

    /// Exit non-zero when duplicates or cross-split names are found.
    #[arg(long)]
    fail_on_duplicates: bool,

    /// Report output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct SplitArgs {
    /// Dataset root.
    #[arg(long, default_value = "dataset")]
    root: PathBuf,

    /// Fraction of train images to move, between 0 and 1.
    #[arg(long, default_value_t = 0.2)]
    ratio: f64,

    /// Random seed for the selection.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(clap::Args)]
struct CopyMatchingArgs {
    /// Directory with the curated (possibly resized or annotated) images.
    #[arg(long)]
    curated: PathBuf,

    /// Directory with the full-quality originals.
    #[arg(long)]
    originals: PathBuf,

    /// Where the matching originals are copied.
    #[arg(long)]
    output_dir: PathBuf,
}

#[derive(clap::Args)]
struct RelabelArgs {
    /// Directory searched recursively for LabelMe .json files.
    dir: PathBuf,

    /// Text prepended to each label.
    #[arg(long)]
    prefix: String,

    /// Labels left untouched (comma-separated).
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
}

/// Run the yoloprep CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), YoloprepError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::ConvertLabelme(args)) => run_convert_labelme(args),
        Some(Commands::ConvertCoco(args)) => run_convert_coco(args),
        Some(Commands::ConvertDetections(args)) => run_convert_detections(args),
        Some(Commands::Classes(args)) => run_classes(args),
        Some(Commands::Validate(args)) => run_validate(args),
        Some(Commands::Dedup(args)) => run_dedup(args),
        Some(Commands::Split(args)) => run_split(args),
        Some(Commands::CopyMatching(args)) => run_copy_matching(args),
        Some(Commands::Relabel(args)) => run_relabel(args),
        None => {
            println!("yoloprep {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Dataset preparation for YOLO-style object detection.");
            println!();
            println!("Run 'yoloprep --help' for usage information.");
            Ok(())
        }
    }
}

fn emit<T: Serialize + fmt::Display>(report: &T, output: OutputFormat) -> Result<(), YoloprepError> {
    match output {
        OutputFormat::Text => print!("{}", report),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(report).map_err(YoloprepError::ReportSerialize)?;
            println!("{}", json);
        }
    }
    Ok(())
}

fn load_registry(path: Option<&Path>) -> Result<Option<ClassRegistry>, YoloprepError> {
    path.map(ClassRegistry::load).transpose()
}

fn run_convert_labelme(args: ConvertLabelmeArgs) -> Result<(), YoloprepError> {
    let opts = LabelmeOptions {
        output_dir: args.output_dir,
        registry: load_registry(args.classes.as_deref())?,
    };
    let (report, registry) = convert::labelme::convert_labelme_dir(&args.json_dir, &opts)?;
    if let Some(path) = &args.classes_out {
        registry.write_data_yaml(path)?;
    }
    emit(&report, args.output)
}

fn run_convert_coco(args: ConvertCocoArgs) -> Result<(), YoloprepError> {
    let registry = load_registry(args.classes.as_deref())?;
    let (report, _) =
        convert::coco::convert_coco(&args.coco_json, &args.output_dir, registry.as_ref())?;
    emit(&report, args.output)
}

fn run_convert_detections(args: ConvertDetectionsArgs) -> Result<(), YoloprepError> {
    let registry = ClassRegistry::load(&args.classes)?;
    let opts = DetectionOptions {
        images_dir: args.images,
        output_dir: args.output_dir,
        mode: args.mode,
    };
    let report = convert::detections::convert_detections_dir(&args.detections_dir, &registry, &opts)?;
    emit(&report, args.output)
}

fn run_classes(args: ClassesArgs) -> Result<(), YoloprepError> {
    let registry = convert::coco::extract_classes(&args.coco_json, &args.output)?;
    println!(
        "Wrote {} class(es) to {}: {}",
        registry.len(),
        args.output.display(),
        registry.names().join(", ")
    );
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), YoloprepError> {
    let layout = DatasetLayout::new(&args.root);
    let classes = args.classes.unwrap_or_else(|| layout.data_yaml());
    let registry = ClassRegistry::load(&classes)?;

    let report = validation::validate_dataset(&layout, &registry);
    emit(&report, args.output)?;

    let unusable = report.unusable_splits();
    let error_count = report.error_count();
    if unusable > 0 || (args.strict && error_count > 0) {
        Err(YoloprepError::ValidationFailed {
            unusable,
            error_count,
            report: Box::new(report),
        })
    } else {
        Ok(())
    }
}

fn run_dedup(args: DedupArgs) -> Result<(), YoloprepError> {
    let layout = DatasetLayout::new(&args.root);
    if !layout.root().is_dir() {
        return Err(YoloprepError::LayoutInvalid {
            path: layout.root().to_path_buf(),
            message: "dataset root does not exist".to_string(),
        });
    }

    let report = integrity::check_dataset(&layout, IntegrityOptions { images: args.images });
    emit(&report, args.output)?;

    if args.fail_on_duplicates && !report.is_clean() {
        Err(YoloprepError::DuplicatesFound {
            groups: report.duplicate_group_count(),
            leaked: report.cross_split_names.len(),
            report: Box::new(report),
        })
    } else {
        Ok(())
    }
}

fn run_split(args: SplitArgs) -> Result<(), YoloprepError> {
    let layout = DatasetLayout::new(&args.root);
    let opts = SplitOptions {
        ratio: args.ratio,
        seed: args.seed,
    };
    let summary = dataset::create_validation_split(&layout, &opts)?;
    print!("{}", summary);
    Ok(())
}

fn run_copy_matching(args: CopyMatchingArgs) -> Result<(), YoloprepError> {
    let summary =
        dataset::copy_matching_images(&args.curated, &args.originals, &args.output_dir)?;
    print!("{}", summary);
    Ok(())
}

fn run_relabel(args: RelabelArgs) -> Result<(), YoloprepError> {
    let exclude: BTreeSet<String> = args
        .exclude
        .into_iter()
        .map(|label| label.trim().to_string())
        .filter(|label| !label.is_empty())
        .collect();
    let summary = convert::relabel::relabel_dir(&args.dir, &args.prefix, &exclude)?;
    print!("{}", summary);
    Ok(())
}
