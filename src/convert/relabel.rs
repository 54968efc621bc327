//! Bulk rename of LabelMe class labels by prefixing.
//!
//! Every string-valued `label` key at any depth of a LabelMe JSON document
//! gets the prefix, unless the label is in the exclusion set. Files are
//! written back pretty-printed with four-space indentation.

use std::collections::BTreeSet;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;

use crate::dataset::{list_files_recursive, LABELME_EXTENSION};
use crate::error::YoloprepError;

const LABEL_KEY: &str = "label";

/// Totals for one relabel run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RelabelSummary {
    pub files_seen: usize,
    /// Files with at least one label changed (and therefore rewritten).
    pub files_modified: usize,
    pub labels_modified: usize,
    pub labels_excluded: usize,
    pub failed: Vec<RelabelFailure>,
}

impl fmt::Display for RelabelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Relabelled {} label(s) in {} of {} file(s); {} excluded",
            self.labels_modified, self.files_modified, self.files_seen, self.labels_excluded
        )?;
        if !self.failed.is_empty() {
            writeln!(f, "Failed ({}):", self.failed.len())?;
            for failure in &self.failed {
                writeln!(f, "  - {}: {}", failure.path.display(), failure.message)?;
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RelabelFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
struct LabelCounts {
    modified: usize,
    excluded: usize,
}

/// Prefix the labels of every `.json` file below `dir`.
pub fn relabel_dir(
    dir: &Path,
    prefix: &str,
    exclude: &BTreeSet<String>,
) -> Result<RelabelSummary, YoloprepError> {
    if prefix.is_empty() {
        return Err(YoloprepError::InvalidArgument(
            "relabel prefix must not be empty".to_string(),
        ));
    }
    if !dir.is_dir() {
        return Err(YoloprepError::LayoutInvalid {
            path: dir.to_path_buf(),
            message: "not a directory".to_string(),
        });
    }

    let listing = list_files_recursive(dir, &[LABELME_EXTENSION])?;
    let mut summary = RelabelSummary::default();
    for entry in listing.skipped {
        warn!("Skipping {}: {}", entry.path.display(), entry.message);
        summary.failed.push(RelabelFailure {
            path: entry.path,
            message: entry.message,
        });
    }
    for path in listing.files {
        summary.files_seen += 1;
        match relabel_file(&path, prefix, exclude) {
            Ok(counts) => {
                if counts.modified > 0 {
                    summary.files_modified += 1;
                }
                summary.labels_modified += counts.modified;
                summary.labels_excluded += counts.excluded;
            }
            Err(err) => {
                warn!("Skipping {}: {}", path.display(), err);
                summary.failed.push(RelabelFailure {
                    path,
                    message: err.to_string(),
                });
            }
        }
    }

    info!(
        "Relabelled {} label(s) in {} file(s), {} excluded",
        summary.labels_modified, summary.files_modified, summary.labels_excluded
    );
    Ok(summary)
}

fn relabel_file(
    path: &Path,
    prefix: &str,
    exclude: &BTreeSet<String>,
) -> Result<LabelCounts, YoloprepError> {
    let reader = BufReader::new(File::open(path)?);
    let mut doc: Value =
        serde_json::from_reader(reader).map_err(|source| YoloprepError::LabelmeJsonParse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut counts = LabelCounts::default();
    prefix_labels(&mut doc, prefix, exclude, &mut counts);
    if counts.modified > 0 {
        write_pretty(path, &doc)?;
    }
    Ok(counts)
}

fn prefix_labels(
    value: &mut Value,
    prefix: &str,
    exclude: &BTreeSet<String>,
    counts: &mut LabelCounts,
) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                match child {
                    Value::String(label) if key == LABEL_KEY => {
                        if exclude.contains(label.as_str()) {
                            counts.excluded += 1;
                        } else {
                            label.insert_str(0, prefix);
                            counts.modified += 1;
                        }
                    }
                    _ => prefix_labels(child, prefix, exclude, counts),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                prefix_labels(item, prefix, exclude, counts);
            }
        }
        _ => {}
    }
}

fn write_pretty(path: &Path, doc: &Value) -> Result<(), YoloprepError> {
    replace_via_tmp(path, |writer| {
        let formatter = PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        doc.serialize(&mut serializer)
            .map_err(|source| YoloprepError::JsonWrite {
                path: path.to_path_buf(),
                source,
            })
    })
}

/// Write to `<path>.tmp`, then rename over `path`.
///
/// On any failure the temporary file is removed and `path` is untouched.
fn replace_via_tmp<F>(path: &Path, write: F) -> Result<(), YoloprepError>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<(), YoloprepError>,
{
    let tmp = path.with_extension("json.tmp");
    let result = File::create(&tmp)
        .map_err(YoloprepError::from)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(YoloprepError::from));

    if result.is_err() && tmp.exists() {
        if let Err(err) = fs::remove_file(&tmp) {
            warn!("Cannot remove {}: {}", tmp.display(), err);
        }
    }
    result
}
