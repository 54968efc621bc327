//! On-disk dataset layout.
//!
//! ```text
//! dataset/
//!   data.yaml
//!   train/images/*.{jpg,jpeg,png,bmp}
//!   train/labels/*.txt
//!   valid/images/*.{jpg,jpeg,png,bmp}
//!   valid/labels/*.txt
//! ```
//!
//! Every listing in this module is sorted by path so that anything derived
//! from enumeration order is reproducible across platforms.

mod matching;
mod split;

pub use matching::{copy_matching_images, MatchFailure, MatchSummary};
pub use split::{create_validation_split, SplitFailure, SplitOptions, SplitSummary};

use std::fmt;
use std::path::{Component, Path, PathBuf};

use log::debug;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::YoloprepError;
use crate::geometry::ImageSize;

/// Image extensions recognised everywhere, in lookup-preference order.
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];
pub const LABEL_EXTENSION: &str = "txt";
pub const LABELME_EXTENSION: &str = "json";

const IMAGES_SEGMENT: &str = "images";
const LABELS_SEGMENT: &str = "labels";

/// A named partition of the dataset.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SplitName {
    Train,
    Valid,
}

impl SplitName {
    pub const ALL: [SplitName; 2] = [SplitName::Train, SplitName::Valid];

    pub fn as_str(&self) -> &'static str {
        match self {
            SplitName::Train => "train",
            SplitName::Valid => "valid",
        }
    }
}

impl fmt::Display for SplitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The dataset root and the paths derived from it.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/data.yaml`
    pub fn data_yaml(&self) -> PathBuf {
        self.root.join("data.yaml")
    }

    pub fn split(&self, name: SplitName) -> DatasetSplit {
        let base = self.root.join(name.as_str());
        DatasetSplit::new(name, base.join(IMAGES_SEGMENT), base.join(LABELS_SEGMENT))
    }

    pub fn splits(&self) -> Vec<DatasetSplit> {
        SplitName::ALL.iter().map(|name| self.split(*name)).collect()
    }
}

/// One split's parallel image and label directories.
#[derive(Clone, Debug, Serialize)]
pub struct DatasetSplit {
    pub name: SplitName,
    pub images_dir: PathBuf,
    pub labels_dir: PathBuf,
}

impl DatasetSplit {
    pub fn new(name: SplitName, images_dir: PathBuf, labels_dir: PathBuf) -> Self {
        Self {
            name,
            images_dir,
            labels_dir,
        }
    }

    /// Image files directly inside `images_dir`, sorted.
    pub fn image_files(&self) -> Result<FileListing, YoloprepError> {
        list_files(&self.images_dir, &IMAGE_EXTENSIONS)
    }

    /// Label files directly inside `labels_dir`, sorted.
    pub fn label_files(&self) -> Result<FileListing, YoloprepError> {
        list_files(&self.labels_dir, &[LABEL_EXTENSION])
    }
}

/// Files found by a directory walk, plus the entries it could not read.
///
/// Only a failure on the directory itself is a hard error. Broken entries
/// below it (dangling symlinks, unreadable subdirectories) end up in
/// `skipped` and the walk carries on.
#[derive(Clone, Debug, Default)]
pub struct FileListing {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<SkippedEntry>,
}

impl FileListing {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// A directory entry that could not be stat'ed or followed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub message: String,
}

impl SkippedEntry {
    /// File name of the entry, for reports keyed by name.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Files with one of `extensions` directly inside `dir`, sorted by path.
pub fn list_files(dir: &Path, extensions: &[&str]) -> Result<FileListing, YoloprepError> {
    walk_files(dir, extensions, Some(1))
}

/// Files with one of `extensions` anywhere below `dir`, sorted by path.
pub fn list_files_recursive(
    dir: &Path,
    extensions: &[&str],
) -> Result<FileListing, YoloprepError> {
    walk_files(dir, extensions, None)
}

fn walk_files(
    dir: &Path,
    extensions: &[&str],
    max_depth: Option<usize>,
) -> Result<FileListing, YoloprepError> {
    let mut walker = WalkDir::new(dir).follow_links(true).sort_by_file_name();
    if let Some(depth) = max_depth {
        walker = walker.max_depth(depth);
    }

    let mut listing = FileListing::default();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                return Err(YoloprepError::LayoutInvalid {
                    path: dir.to_path_buf(),
                    message: format!("failed while traversing directory: {err}"),
                });
            }
            Err(err) => {
                let path = err.path().unwrap_or(dir).to_path_buf();
                // A flat listing only cares about entries that would have matched.
                if max_depth.is_none() || has_extension(&path, extensions) {
                    debug!("Skipping unreadable entry {}: {}", path.display(), err);
                    listing.skipped.push(SkippedEntry {
                        path,
                        message: err.to_string(),
                    });
                }
                continue;
            }
        };

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            listing.files.push(entry.into_path());
        }
    }

    listing.files.sort();
    listing.skipped.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(listing)
}

pub fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// File name without its extension.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read pixel dimensions from an image header.
pub fn read_image_size(path: &Path) -> Result<ImageSize, YoloprepError> {
    let size = imagesize::size(path).map_err(|source| YoloprepError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;

    let invalid = || YoloprepError::InvalidImageDimensions {
        path: path.to_path_buf(),
        width: size.width as u64,
        height: size.height as u64,
    };

    let width = u32::try_from(size.width).map_err(|_| invalid())?;
    let height = u32::try_from(size.height).map_err(|_| invalid())?;
    ImageSize::new(width, height).ok_or_else(invalid)
}

/// Image in `dir` whose base name is `stem`.
///
/// Lowercase `<stem>.<ext>` names are tried first in [`IMAGE_EXTENSIONS`]
/// order. Failing that, `dir` is scanned for a case-insensitive extension
/// match such as `<stem>.JPG`.
pub fn find_image_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    if let Some(found) = IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|candidate| candidate.is_file())
    {
        return Some(found);
    }

    let listing = list_files(dir, &IMAGE_EXTENSIONS).ok()?;
    listing
        .files
        .into_iter()
        .filter(|path| path.file_stem().is_some_and(|s| s.to_string_lossy() == stem))
        .min_by_key(|path| extension_rank(path))
}

pub(crate) fn extension_rank(path: &Path) -> usize {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .position(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(IMAGE_EXTENSIONS.len())
}

/// Candidate image paths for an annotation file.
///
/// The nearest ancestor directory named `labels` is swapped for `images`
/// and the extension for each entry of [`IMAGE_EXTENSIONS`]. Without a
/// `labels` segment the candidates sit next to the annotation file.
pub fn companion_image_candidates(annotation_path: &Path) -> Vec<PathBuf> {
    let swapped = swap_labels_segment(annotation_path);
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| swapped.with_extension(ext))
        .collect()
}

/// The image an annotation file describes, if one exists.
///
/// Looks in the directory of [`companion_image_candidates`] and matches
/// extensions case-insensitively.
pub fn find_companion_image(annotation_path: &Path) -> Option<PathBuf> {
    let swapped = swap_labels_segment(annotation_path);
    let stem = swapped.file_stem()?.to_string_lossy().into_owned();
    let dir = match swapped.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    find_image_by_stem(dir, &stem)
}

fn swap_labels_segment(path: &Path) -> PathBuf {
    let components: Vec<Component<'_>> = path.components().collect();
    // The file name itself is never swapped, only a directory.
    let dir_count = components.len().saturating_sub(1);
    let swap_at = components[..dir_count]
        .iter()
        .rposition(|c| c.as_os_str() == LABELS_SEGMENT);

    let Some(swap_at) = swap_at else {
        return path.to_path_buf();
    };

    components
        .iter()
        .enumerate()
        .map(|(idx, component)| {
            if idx == swap_at {
                Path::new(IMAGES_SEGMENT).as_os_str()
            } else {
                component.as_os_str()
            }
        })
        .collect()
}
