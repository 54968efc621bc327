//! Recover full-quality originals for a hand-curated image subset.
//!
//! Curated copies are often resized, recompressed or drawn over, so they
//! are matched to originals by base name rather than by content.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;

use super::{base_name, extension_rank, list_files, IMAGE_EXTENSIONS};
use crate::error::YoloprepError;

/// What a copy-matching run did.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MatchSummary {
    pub curated_images: usize,
    pub copied: usize,
    /// Curated base names with no original.
    pub unmatched: Vec<String>,
    pub failed: Vec<MatchFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchFailure {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for MatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Copied {} original(s) for {} curated image(s)",
            self.copied, self.curated_images
        )?;
        if !self.unmatched.is_empty() {
            writeln!(
                f,
                "No original ({}): {}",
                self.unmatched.len(),
                self.unmatched.join(", ")
            )?;
        }
        if !self.failed.is_empty() {
            writeln!(f, "Failed ({}):", self.failed.len())?;
            for failure in &self.failed {
                writeln!(f, "  - {}: {}", failure.path.display(), failure.message)?;
            }
        }
        Ok(())
    }
}

/// Copy each original in `originals_dir` whose base name matches an image
/// in `curated_dir` into `output_dir`, keeping the original's file name.
///
/// Extensions may differ between the two sides (`a.png` curated, `a.JPG`
/// original). When several originals share a base name, the
/// [`IMAGE_EXTENSIONS`] order decides which one is copied.
pub fn copy_matching_images(
    curated_dir: &Path,
    originals_dir: &Path,
    output_dir: &Path,
) -> Result<MatchSummary, YoloprepError> {
    let curated = list_files(curated_dir, &IMAGE_EXTENSIONS)?;
    let originals = list_files(originals_dir, &IMAGE_EXTENSIONS)?;
    let by_stem = index_by_stem(originals.files);

    let mut summary = MatchSummary {
        curated_images: curated.len(),
        ..Default::default()
    };
    for entry in curated.skipped.into_iter().chain(originals.skipped) {
        warn!("Skipping {}: {}", entry.path.display(), entry.message);
        summary.failed.push(MatchFailure {
            path: entry.path,
            message: entry.message,
        });
    }

    fs::create_dir_all(output_dir)?;
    info!(
        "Matching {} curated image(s) against {}",
        summary.curated_images,
        originals_dir.display()
    );

    for image in &curated.files {
        let stem = base_name(image);
        let Some(original) = by_stem.get(&stem) else {
            warn!("No original for {}", image.display());
            summary.unmatched.push(stem);
            continue;
        };
        let Some(file_name) = original.file_name() else {
            continue;
        };

        match fs::copy(original, output_dir.join(file_name)) {
            Ok(_) => summary.copied += 1,
            Err(err) => {
                warn!("Cannot copy {}: {}", original.display(), err);
                summary.failed.push(MatchFailure {
                    path: original.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    Ok(summary)
}

fn index_by_stem(files: Vec<PathBuf>) -> BTreeMap<String, PathBuf> {
    let mut by_stem: BTreeMap<String, PathBuf> = BTreeMap::new();
    for path in files {
        let stem = base_name(&path);
        match by_stem.get(&stem) {
            Some(kept) if extension_rank(kept) <= extension_rank(&path) => {}
            _ => {
                by_stem.insert(stem, path);
            }
        }
    }
    by_stem
}
