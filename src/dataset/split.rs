//! Carve a validation split out of the training split.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use super::{base_name, DatasetLayout, SplitName, LABELME_EXTENSION, LABEL_EXTENSION};
use crate::error::YoloprepError;

/// Options for [`create_validation_split`].
#[derive(Clone, Debug)]
pub struct SplitOptions {
    /// Fraction of training images to move, in `(0, 1)`.
    pub ratio: f64,
    pub seed: u64,
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            ratio: 0.2,
            seed: 42,
        }
    }
}

/// What a split run moved.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SplitSummary {
    pub total_images: usize,
    pub moved_images: usize,
    pub moved_labels: usize,
    pub moved_annotations: usize,
    /// Images left in place because the destination already existed.
    pub conflicts: Vec<PathBuf>,
    /// Files that could not be moved. The run carries on past each one.
    pub failures: Vec<SplitFailure>,
    pub train_images_after: usize,
    pub valid_images_after: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct SplitFailure {
    pub path: PathBuf,
    pub message: String,
}

impl SplitFailure {
    fn new(path: &Path, err: &YoloprepError) -> Self {
        warn!("Cannot move {}: {}", path.display(), err);
        Self {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for SplitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Moved {} of {} training image(s) to valid ({} label(s), {} LabelMe file(s))",
            self.moved_images, self.total_images, self.moved_labels, self.moved_annotations
        )?;
        writeln!(
            f,
            "  train: {} image(s), valid: {} image(s)",
            self.train_images_after, self.valid_images_after
        )?;
        for conflict in &self.conflicts {
            writeln!(f, "  kept in train (already in valid): {}", conflict.display())?;
        }
        if !self.failures.is_empty() {
            writeln!(f, "Failed ({}):", self.failures.len())?;
            for failure in &self.failures {
                writeln!(f, "  - {}: {}", failure.path.display(), failure.message)?;
            }
        }
        Ok(())
    }
}

/// Move `floor(n * ratio)` randomly chosen training images to `valid`,
/// together with their `.txt` label and `.json` LabelMe source if present.
///
/// Candidates are sorted before a seeded shuffle, so the same dataset and
/// seed always select the same images.
pub fn create_validation_split(
    layout: &DatasetLayout,
    opts: &SplitOptions,
) -> Result<SplitSummary, YoloprepError> {
    if !(opts.ratio > 0.0 && opts.ratio < 1.0) {
        return Err(YoloprepError::InvalidArgument(format!(
            "split ratio must be between 0 and 1 (exclusive), got {}",
            opts.ratio
        )));
    }

    let train = layout.split(SplitName::Train);
    let valid = layout.split(SplitName::Valid);
    if !train.images_dir.is_dir() {
        return Err(YoloprepError::LayoutInvalid {
            path: train.images_dir,
            message: "missing training images directory".to_string(),
        });
    }

    let listing = train.image_files()?;
    for entry in &listing.skipped {
        warn!("Cannot read {}: {}", entry.path.display(), entry.message);
    }
    let mut images = listing.files;
    let total_images = images.len();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    images.shuffle(&mut rng);

    let val_size = (total_images as f64 * opts.ratio).floor() as usize;
    info!(
        "Moving {} of {} training image(s) to {}",
        val_size,
        total_images,
        valid.images_dir.display()
    );

    fs::create_dir_all(&valid.images_dir)?;
    fs::create_dir_all(&valid.labels_dir)?;

    let mut summary = SplitSummary {
        total_images,
        ..Default::default()
    };

    for image in images.iter().take(val_size) {
        let Some(file_name) = image.file_name() else {
            continue;
        };
        let image_dest = valid.images_dir.join(file_name);
        if image_dest.exists() {
            warn!("{} already exists; leaving {} in train", image_dest.display(), image.display());
            summary.conflicts.push(image.clone());
            continue;
        }
        if let Err(err) = move_file(image, &image_dest) {
            summary.failures.push(SplitFailure::new(image, &err));
            continue;
        }
        summary.moved_images += 1;

        let stem = base_name(image);
        match move_companion(&train.labels_dir, &valid.labels_dir, &stem, LABEL_EXTENSION) {
            Ok(moved) => summary.moved_labels += usize::from(moved),
            Err(failure) => summary.failures.push(failure),
        }
        match move_companion(&train.labels_dir, &valid.labels_dir, &stem, LABELME_EXTENSION) {
            Ok(moved) => summary.moved_annotations += usize::from(moved),
            Err(failure) => summary.failures.push(failure),
        }
    }

    summary.train_images_after = train.image_files()?.len();
    summary.valid_images_after = valid.image_files()?.len();
    Ok(summary)
}

fn move_companion(
    from_dir: &Path,
    to_dir: &Path,
    stem: &str,
    extension: &str,
) -> Result<bool, SplitFailure> {
    let source = from_dir.join(format!("{stem}.{extension}"));
    if !source.is_file() {
        return Ok(false);
    }
    move_file(&source, &to_dir.join(format!("{stem}.{extension}")))
        .map_err(|err| SplitFailure::new(&source, &err))?;
    Ok(true)
}

// `rename` cannot cross filesystems; fall back to copy + remove.
fn move_file(from: &Path, to: &Path) -> Result<(), YoloprepError> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to)?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path, count: usize) {
        let images = root.join("train/images");
        let labels = root.join("train/labels");
        fs::create_dir_all(&images).unwrap();
        fs::create_dir_all(&labels).unwrap();
        for i in 0..count {
            fs::write(images.join(format!("img_{i:02}.jpg")), b"jpg").unwrap();
            fs::write(labels.join(format!("img_{i:02}.txt")), "0 0.5 0.5 0.1 0.1\n").unwrap();
        }
        fs::write(labels.join("img_00.json"), "{}").unwrap();
    }

    #[test]
    fn moves_a_fifth_with_labels() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 10);
        let layout = DatasetLayout::new(temp.path());

        let summary = create_validation_split(&layout, &SplitOptions::default()).unwrap();
        assert_eq!(summary.total_images, 10);
        assert_eq!(summary.moved_images, 2);
        assert_eq!(summary.moved_labels, 2);
        assert_eq!(summary.train_images_after, 8);
        assert_eq!(summary.valid_images_after, 2);

        for image in layout.split(SplitName::Valid).image_files().unwrap().files {
            let stem = base_name(&image);
            assert!(temp.path().join(format!("valid/labels/{stem}.txt")).is_file());
            assert!(!temp.path().join(format!("train/labels/{stem}.txt")).exists());
        }
    }

    #[test]
    fn same_seed_same_selection() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        populate(a.path(), 12);
        populate(b.path(), 12);

        let opts = SplitOptions {
            ratio: 0.25,
            seed: 7,
        };
        create_validation_split(&DatasetLayout::new(a.path()), &opts).unwrap();
        create_validation_split(&DatasetLayout::new(b.path()), &opts).unwrap();

        let names = |root: &Path| -> Vec<String> {
            DatasetLayout::new(root)
                .split(SplitName::Valid)
                .image_files()
                .unwrap()
                .files
                .iter()
                .map(|p| base_name(p))
                .collect()
        };
        assert_eq!(names(a.path()), names(b.path()));
        assert_eq!(names(a.path()).len(), 3);
    }

    #[test]
    fn blocked_label_is_recorded_and_the_run_continues() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 10);
        // A directory squatting on every label destination makes each label move fail.
        for i in 0..10 {
            fs::create_dir_all(temp.path().join(format!("valid/labels/img_{i:02}.txt"))).unwrap();
        }
        let layout = DatasetLayout::new(temp.path());

        let summary = create_validation_split(&layout, &SplitOptions::default()).unwrap();
        assert_eq!(summary.moved_images, 2);
        assert_eq!(summary.moved_labels, 0);
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.valid_images_after, 2);
        for failure in &summary.failures {
            assert!(failure.path.starts_with(temp.path().join("train/labels")));
            assert!(failure.path.is_file());
        }
        assert!(summary.to_string().contains("Failed (2):"));
    }

    #[test]
    fn rejects_out_of_range_ratio() {
        let temp = tempfile::tempdir().unwrap();
        populate(temp.path(), 3);
        let opts = SplitOptions {
            ratio: 1.0,
            seed: 42,
        };
        let err = create_validation_split(&DatasetLayout::new(temp.path()), &opts).unwrap_err();
        assert!(matches!(err, YoloprepError::InvalidArgument(_)));
    }
}
