//! Content fingerprints, duplicate detection and cross-split leakage.
//!
//! Files are grouped by the SHA-256 of their raw bytes. A duplicate label
//! group is then cross-checked against the companion images of its
//! members to tell accidental copies from diverging annotations.

mod report;

pub use report::{
    CompanionVerdict, DuplicateImageGroup, DuplicateLabelGroup, IntegrityReport,
    IntegrityWarning, LabelMember,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::dataset::{
    base_name, companion_image_candidates, find_companion_image, DatasetLayout, SkippedEntry,
    SplitName,
};
use crate::error::YoloprepError;

/// Read size for fingerprinting; memory use stays flat for large files.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Lines of shared content kept in a duplicate group's preview.
pub const PREVIEW_LINES: usize = 3;

/// Hex SHA-256 of a file's bytes.
pub fn fingerprint_file(path: &Path) -> Result<String, YoloprepError> {
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Files grouped by fingerprint, plus the files that could not be read.
#[derive(Clone, Debug, Default)]
pub struct FingerprintIndex {
    pub groups: BTreeMap<String, Vec<PathBuf>>,
    pub unreadable: Vec<IntegrityWarning>,
}

impl FingerprintIndex {
    /// Groups with more than one member, in fingerprint order.
    pub fn duplicates(&self) -> impl Iterator<Item = (&String, &Vec<PathBuf>)> {
        self.groups.iter().filter(|(_, members)| members.len() > 1)
    }
}

/// Fingerprint every path. Members of each group keep the input order.
pub fn group_by_fingerprint(paths: &[PathBuf]) -> FingerprintIndex {
    let mut index = FingerprintIndex::default();
    for path in paths {
        match fingerprint_file(path) {
            Ok(fingerprint) => index
                .groups
                .entry(fingerprint)
                .or_default()
                .push(path.clone()),
            Err(err) => {
                warn!("Cannot fingerprint {}: {}", path.display(), err);
                index.unreadable.push(IntegrityWarning {
                    path: path.clone(),
                    message: format!("unreadable: {err}"),
                });
            }
        }
    }
    index
}

/// Duplicate label groups with companion-image verdicts.
///
/// `layout`, when given, tags each member with its split.
pub fn find_duplicate_labels(
    label_paths: &[PathBuf],
    layout: Option<&DatasetLayout>,
) -> (Vec<DuplicateLabelGroup>, Vec<IntegrityWarning>) {
    let index = group_by_fingerprint(label_paths);
    let mut warnings = index.unreadable.clone();
    let mut groups = Vec::new();

    for (fingerprint, paths) in index.duplicates() {
        let mut members = Vec::with_capacity(paths.len());
        let mut images = Vec::new();
        for path in paths {
            let image = find_companion_image(path);
            match &image {
                Some(image) => images.push(image.clone()),
                None => warnings.push(IntegrityWarning {
                    path: path.clone(),
                    message: format!(
                        "no companion image (tried {})",
                        companion_image_candidates(path)
                            .iter()
                            .map(|c| c.display().to_string())
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                }),
            }
            members.push(LabelMember {
                path: path.clone(),
                split: layout.and_then(|l| split_of(l, path)),
                image,
            });
        }

        let image_index = group_by_fingerprint(&images);
        warnings.extend(image_index.unreadable);
        let image_groups: Vec<Vec<PathBuf>> = image_index.groups.into_values().collect();
        let resolved: usize = image_groups.iter().map(Vec::len).sum();
        let verdict = match image_groups.len() {
            1 if resolved >= 2 => CompanionVerdict::FullyRedundant,
            n if n > 1 => CompanionVerdict::ImagesDiffer,
            _ => CompanionVerdict::Inconclusive,
        };

        let spans_splits = spans_splits(members.iter().filter_map(|m| m.split));
        debug!(
            "duplicate label group {} ({} files): {:?}",
            fingerprint,
            members.len(),
            verdict
        );
        groups.push(DuplicateLabelGroup {
            fingerprint: fingerprint.clone(),
            preview: preview(&paths[0]),
            members,
            verdict,
            image_groups,
            spans_splits,
        });
    }

    (groups, warnings)
}

/// Duplicate image groups.
pub fn find_duplicate_images(
    image_paths: &[PathBuf],
    layout: Option<&DatasetLayout>,
) -> (Vec<DuplicateImageGroup>, Vec<IntegrityWarning>) {
    let index = group_by_fingerprint(image_paths);
    let groups = index
        .duplicates()
        .map(|(fingerprint, members)| DuplicateImageGroup {
            fingerprint: fingerprint.clone(),
            members: members.clone(),
            spans_splits: layout
                .map(|l| spans_splits(members.iter().filter_map(|m| split_of(l, m))))
                .unwrap_or(false),
        })
        .collect();
    (groups, index.unreadable)
}

/// Image base names that occur in more than one split.
pub fn cross_split_names(layout: &DatasetLayout) -> BTreeSet<String> {
    let mut seen: BTreeMap<String, BTreeSet<SplitName>> = BTreeMap::new();
    for split in layout.splits() {
        if !split.images_dir.is_dir() {
            continue;
        }
        let images = split.image_files().unwrap_or_default();
        for image in images.files {
            seen.entry(base_name(&image)).or_default().insert(split.name);
        }
    }
    seen.into_iter()
        .filter(|(_, splits)| splits.len() > 1)
        .map(|(name, _)| name)
        .collect()
}

/// Options for [`check_dataset`].
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegrityOptions {
    /// Also fingerprint image files and report duplicate images.
    pub images: bool,
}

/// Run every integrity check over a dataset.
pub fn check_dataset(layout: &DatasetLayout, opts: IntegrityOptions) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    let mut labels = Vec::new();
    let mut images = Vec::new();
    for split in layout.splits() {
        if split.labels_dir.is_dir() {
            match split.label_files() {
                Ok(listing) => {
                    report.warnings.extend(skipped_warnings(listing.skipped));
                    labels.extend(listing.files);
                }
                Err(err) => report.warnings.push(IntegrityWarning {
                    path: split.labels_dir.clone(),
                    message: err.to_string(),
                }),
            }
        }
        if opts.images && split.images_dir.is_dir() {
            match split.image_files() {
                Ok(listing) => {
                    report.warnings.extend(skipped_warnings(listing.skipped));
                    images.extend(listing.files);
                }
                Err(err) => report.warnings.push(IntegrityWarning {
                    path: split.images_dir.clone(),
                    message: err.to_string(),
                }),
            }
        }
    }

    report.label_files = labels.len();
    let (label_groups, label_warnings) = find_duplicate_labels(&labels, Some(layout));
    report.duplicate_labels = label_groups;
    report.warnings.extend(label_warnings);

    if opts.images {
        report.image_files = Some(images.len());
        let (image_groups, image_warnings) = find_duplicate_images(&images, Some(layout));
        report.duplicate_images = image_groups;
        report.warnings.extend(image_warnings);
    }

    report.cross_split_names = cross_split_names(layout);

    info!(
        "Integrity check: {} label file(s), {} duplicate label group(s), {} cross-split name(s)",
        report.label_files,
        report.duplicate_labels.len(),
        report.cross_split_names.len()
    );
    report
}

fn skipped_warnings(skipped: Vec<SkippedEntry>) -> impl Iterator<Item = IntegrityWarning> {
    skipped.into_iter().map(|entry| {
        warn!("Cannot read {}: {}", entry.path.display(), entry.message);
        IntegrityWarning {
            path: entry.path,
            message: format!("unreadable: {}", entry.message),
        }
    })
}

fn split_of(layout: &DatasetLayout, path: &Path) -> Option<SplitName> {
    layout.splits().into_iter().find_map(|split| {
        (path.starts_with(&split.labels_dir) || path.starts_with(&split.images_dir))
            .then_some(split.name)
    })
}

fn spans_splits(splits: impl Iterator<Item = SplitName>) -> bool {
    splits.collect::<BTreeSet<_>>().len() > 1
}

fn preview(path: &Path) -> Vec<String> {
    let Ok(bytes) = std::fs::read(path) else {
        return Vec::new();
    };
    String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(PREVIEW_LINES)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn fingerprint_matches_known_digest() {
        assert_eq!(
            fingerprint_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn file_and_bytes_fingerprints_agree_across_chunks() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        fs::write(&path, &data).unwrap();
        assert_eq!(fingerprint_file(&path).unwrap(), fingerprint_bytes(&data));
    }

    #[test]
    fn grouping_collects_identical_files() {
        let temp = tempfile::tempdir().unwrap();
        let a = temp.path().join("a.txt");
        let b = temp.path().join("b.txt");
        let c = temp.path().join("c.txt");
        fs::write(&a, "0 0.5 0.5 0.1 0.1\n").unwrap();
        fs::write(&b, "0 0.5 0.5 0.1 0.1\n").unwrap();
        fs::write(&c, "1 0.5 0.5 0.1 0.1\n").unwrap();
        let missing = temp.path().join("missing.txt");

        let index = group_by_fingerprint(&[a.clone(), b.clone(), c, missing]);
        let dups: Vec<_> = index.duplicates().collect();
        assert_eq!(dups.len(), 1);
        assert_eq!(dups[0].1, &vec![a, b]);
        assert_eq!(index.unreadable.len(), 1);
    }

    fn pair(root: &Path, split: &str, stem: &str, label: &str, image: &[u8]) {
        let labels = root.join(split).join("labels");
        let images = root.join(split).join("images");
        fs::create_dir_all(&labels).unwrap();
        fs::create_dir_all(&images).unwrap();
        fs::write(labels.join(format!("{stem}.txt")), label).unwrap();
        fs::write(images.join(format!("{stem}.jpg")), image).unwrap();
    }

    #[test]
    fn identical_pairs_are_fully_redundant() {
        let temp = tempfile::tempdir().unwrap();
        pair(temp.path(), "train", "a", "0 0.5 0.5 0.2 0.2\n", b"same");
        pair(temp.path(), "train", "b", "0 0.5 0.5 0.2 0.2\n", b"same");

        let report = check_dataset(&DatasetLayout::new(temp.path()), IntegrityOptions::default());
        assert_eq!(report.duplicate_labels.len(), 1);
        let group = &report.duplicate_labels[0];
        assert_eq!(group.verdict, CompanionVerdict::FullyRedundant);
        assert_eq!(group.preview, vec!["0 0.5 0.5 0.2 0.2".to_string()]);
        assert!(!group.spans_splits);
    }

    #[test]
    fn diverging_images_are_listed() {
        let temp = tempfile::tempdir().unwrap();
        pair(temp.path(), "train", "a", "0 0.5 0.5 0.2 0.2\n", b"one");
        pair(temp.path(), "valid", "b", "0 0.5 0.5 0.2 0.2\n", b"two");

        let report = check_dataset(&DatasetLayout::new(temp.path()), IntegrityOptions::default());
        let group = &report.duplicate_labels[0];
        assert_eq!(group.verdict, CompanionVerdict::ImagesDiffer);
        assert_eq!(group.image_groups.len(), 2);
        assert!(group.spans_splits);
    }

    #[test]
    fn missing_companion_is_a_warning() {
        let temp = tempfile::tempdir().unwrap();
        pair(temp.path(), "train", "a", "0 0.5 0.5 0.2 0.2\n", b"img");
        let labels = temp.path().join("train/labels");
        fs::write(labels.join("orphan.txt"), "0 0.5 0.5 0.2 0.2\n").unwrap();

        let report = check_dataset(&DatasetLayout::new(temp.path()), IntegrityOptions::default());
        let group = &report.duplicate_labels[0];
        assert_eq!(group.verdict, CompanionVerdict::Inconclusive);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].message.contains("no companion image"));
    }

    #[test]
    fn cross_split_names_and_image_duplicates() {
        let temp = tempfile::tempdir().unwrap();
        pair(temp.path(), "train", "shared", "0 0.1 0.1 0.1 0.1\n", b"x");
        pair(temp.path(), "valid", "shared", "1 0.2 0.2 0.2 0.2\n", b"x");

        let report = check_dataset(
            &DatasetLayout::new(temp.path()),
            IntegrityOptions { images: true },
        );
        assert!(report.duplicate_labels.is_empty());
        assert_eq!(
            report.cross_split_names,
            ["shared".to_string()].into_iter().collect()
        );
        assert_eq!(report.image_files, Some(2));
        assert_eq!(report.duplicate_images.len(), 1);
        assert!(report.duplicate_images[0].spans_splits);
        assert!(!report.is_clean());
    }
}
