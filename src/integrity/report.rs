//! Integrity report types.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::dataset::SplitName;

/// Everything an integrity run found.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub label_files: usize,
    pub duplicate_labels: Vec<DuplicateLabelGroup>,
    /// Number of images fingerprinted; `None` when image scanning was off.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_files: Option<usize>,
    pub duplicate_images: Vec<DuplicateImageGroup>,
    /// Image base names present in more than one split.
    pub cross_split_names: BTreeSet<String>,
    pub warnings: Vec<IntegrityWarning>,
}

impl IntegrityReport {
    /// True when no duplicate group of any kind and no cross-split name was found.
    pub fn is_clean(&self) -> bool {
        self.duplicate_labels.is_empty()
            && self.duplicate_images.is_empty()
            && self.cross_split_names.is_empty()
    }

    pub fn duplicate_group_count(&self) -> usize {
        self.duplicate_labels.len() + self.duplicate_images.len()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checked {} label file(s)", self.label_files)?;
        if let Some(images) = self.image_files {
            write!(f, " and {} image(s)", images)?;
        }
        writeln!(f)?;

        if self.duplicate_labels.is_empty() {
            writeln!(f, "No duplicate label files")?;
        } else {
            writeln!(f)?;
            writeln!(f, "Duplicate label groups ({}):", self.duplicate_labels.len())?;
            for (idx, group) in self.duplicate_labels.iter().enumerate() {
                write!(f, "  [{}] {}", idx + 1, group)?;
            }
        }

        if !self.duplicate_images.is_empty() {
            writeln!(f)?;
            writeln!(f, "Duplicate image groups ({}):", self.duplicate_images.len())?;
            for (idx, group) in self.duplicate_images.iter().enumerate() {
                writeln!(
                    f,
                    "  [{}] {} ({} files{})",
                    idx + 1,
                    short(&group.fingerprint),
                    group.members.len(),
                    if group.spans_splits { ", spans splits" } else { "" }
                )?;
                for member in &group.members {
                    writeln!(f, "      {}", member.display())?;
                }
            }
        }

        if !self.cross_split_names.is_empty() {
            writeln!(f)?;
            let names: Vec<&str> = self.cross_split_names.iter().map(String::as_str).collect();
            writeln!(
                f,
                "Images in more than one split ({}): {}",
                names.len(),
                names.join(", ")
            )?;
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Warnings ({}):", self.warnings.len())?;
            for warning in &self.warnings {
                writeln!(f, "  - {}", warning)?;
            }
        }
        Ok(())
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// Label files with byte-identical content.
#[derive(Clone, Debug, Serialize)]
pub struct DuplicateLabelGroup {
    /// Hex SHA-256 of the shared content.
    pub fingerprint: String,
    pub members: Vec<LabelMember>,
    /// First lines of the shared content.
    pub preview: Vec<String>,
    pub verdict: CompanionVerdict,
    /// Companion images grouped by their own fingerprint.
    pub image_groups: Vec<Vec<PathBuf>>,
    pub spans_splits: bool,
}

impl fmt::Display for DuplicateLabelGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({} files, {}{})",
            short(&self.fingerprint),
            self.members.len(),
            self.verdict.describe(),
            if self.spans_splits { ", spans splits" } else { "" }
        )?;
        for member in &self.members {
            match &member.image {
                Some(image) => writeln!(
                    f,
                    "      {} -> {}",
                    member.path.display(),
                    image.display()
                )?,
                None => writeln!(f, "      {} -> (no image)", member.path.display())?,
            }
        }
        if self.verdict == CompanionVerdict::ImagesDiffer {
            for (idx, group) in self.image_groups.iter().enumerate() {
                let paths: Vec<String> = group.iter().map(|p| p.display().to_string()).collect();
                writeln!(f, "      image group {}: {}", idx + 1, paths.join(", "))?;
            }
        }
        for line in &self.preview {
            writeln!(f, "      | {}", line)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct LabelMember {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub split: Option<SplitName>,
    /// Resolved companion image, if one exists.
    pub image: Option<PathBuf>,
}

/// What the companion images say about a duplicate label group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanionVerdict {
    /// All resolved companion images are identical too.
    FullyRedundant,
    /// Companion images fall into more than one content group.
    ImagesDiffer,
    /// Fewer than two companion images could be resolved.
    Inconclusive,
}

impl CompanionVerdict {
    pub fn describe(&self) -> &'static str {
        match self {
            CompanionVerdict::FullyRedundant => "label and image duplicated",
            CompanionVerdict::ImagesDiffer => "label duplicated but image content differs",
            CompanionVerdict::Inconclusive => "images could not be compared",
        }
    }
}

/// Image files with byte-identical content.
#[derive(Clone, Debug, Serialize)]
pub struct DuplicateImageGroup {
    pub fingerprint: String,
    pub members: Vec<PathBuf>,
    pub spans_splits: bool,
}

/// A non-fatal problem found while checking.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for IntegrityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}
