//! Class registry: the ordered list of class names and its inverse lookup.
//!
//! A registry is built once per run and handed by reference to every
//! converter and validator call. Class IDs are the indices into the name
//! list; lookups by name are case-insensitive.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::YoloprepError;

/// Highest class ID accepted from a config or a COCO category list.
///
/// Class IDs are dense indices, so a sparse ID costs one placeholder name
/// per missing slot below it.
pub const MAX_CLASS_ID: usize = 65_535;

/// Immutable name <-> ID mapping for one dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassRegistry {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl ClassRegistry {
    /// Build a registry from names listed in ID order.
    ///
    /// Fails on an empty list or when two names collide after case-folding.
    pub fn from_names<I, S>(names: I) -> Result<Self, YoloprepError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(YoloprepError::NoClasses);
        }

        let mut lookup = HashMap::with_capacity(names.len());
        for (id, name) in names.iter().enumerate() {
            if lookup.insert(fold(name), id).is_some() {
                return Err(YoloprepError::DuplicateClassName { name: name.clone() });
            }
        }

        Ok(Self { names, lookup })
    }

    /// Derive a registry from labels in the order they are first seen.
    ///
    /// Labels are case-folded, so `Sock` and `sock` share one ID. The
    /// resulting IDs are only stable if the caller feeds labels in a stable
    /// order (sorted files, file-internal order).
    pub fn derive_first_seen<I, S>(labels: I) -> Result<Self, YoloprepError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashMap::new();
        for label in labels {
            let folded = fold(label.as_ref());
            if !seen.contains_key(&folded) {
                seen.insert(folded.clone(), names.len());
                names.push(folded);
            }
        }
        Self::from_names(names)
    }

    /// Load a registry from a config file.
    ///
    /// `.yaml` / `.yml` files are read as an Ultralytics `data.yaml`
    /// (`nc` + `names`); anything else is read as one class name per line.
    pub fn load(path: &Path) -> Result<Self, YoloprepError> {
        let is_yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);

        if is_yaml {
            Self::from_data_yaml(path)
        } else {
            Self::from_classes_txt(path)
        }
    }

    /// Read `names` (and optionally `nc`) from a `data.yaml`.
    pub fn from_data_yaml(path: &Path) -> Result<Self, YoloprepError> {
        let data = read_config(path)?;
        let parsed: DataYaml =
            serde_yaml::from_str(&data).map_err(|source| YoloprepError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;

        let names = match parsed.names {
            DataYamlNames::Sequence(names) => names,
            DataYamlNames::Mapping(mapping) => names_from_mapping(path, mapping)?,
        };

        if names.is_empty() {
            return Err(YoloprepError::EmptyClassList {
                path: path.to_path_buf(),
            });
        }
        if let Some(nc) = parsed.nc {
            if nc != names.len() {
                return Err(YoloprepError::ClassCountMismatch {
                    path: path.to_path_buf(),
                    nc,
                    names: names.len(),
                });
            }
        }

        Self::from_names(names)
    }

    /// Read a plain list of class names, one per line. Blank lines are ignored.
    pub fn from_classes_txt(path: &Path) -> Result<Self, YoloprepError> {
        let data = read_config(path)?;
        let names: Vec<String> = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() {
            return Err(YoloprepError::EmptyClassList {
                path: path.to_path_buf(),
            });
        }
        Self::from_names(names)
    }

    /// Number of classes (`nc`).
    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false for a constructed registry; present for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Class names in ID order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// ID for a name, matched case-insensitively.
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.lookup.get(&fold(name)).copied()
    }

    /// Name for an ID, if the ID is in `[0, nc)`.
    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    #[inline]
    pub fn contains_id(&self, id: usize) -> bool {
        id < self.names.len()
    }

    /// Render as an Ultralytics-style `data.yaml` body.
    pub fn to_data_yaml(&self) -> String {
        let quoted: Vec<String> = self.names.iter().map(|n| yaml_single_quoted(n)).collect();
        format!("nc: {}\nnames: [{}]\n", self.names.len(), quoted.join(", "))
    }

    /// Write [`Self::to_data_yaml`] to `path`, creating parent directories.
    pub fn write_data_yaml(&self, path: &Path) -> Result<(), YoloprepError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_data_yaml())?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    #[serde(default)]
    nc: Option<usize>,
    #[serde(default = "empty_names")]
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

fn empty_names() -> DataYamlNames {
    DataYamlNames::Sequence(Vec::new())
}

// Gaps in an index mapping get placeholder names so IDs stay contiguous.
fn names_from_mapping(
    path: &Path,
    mapping: BTreeMap<usize, String>,
) -> Result<Vec<String>, YoloprepError> {
    let Some(max_index) = mapping.keys().next_back().copied() else {
        return Ok(Vec::new());
    };
    if max_index > MAX_CLASS_ID {
        return Err(YoloprepError::ClassIdTooLarge {
            origin: path.display().to_string(),
            id: max_index as u64,
            max: MAX_CLASS_ID,
        });
    }

    let mut names = vec![String::new(); max_index + 1];
    for (index, name) in mapping {
        names[index] = name;
    }
    for (index, name) in names.iter_mut().enumerate() {
        if name.trim().is_empty() {
            *name = format!("class_{}", index);
        }
    }
    Ok(names)
}

fn read_config(path: &Path) -> Result<String, YoloprepError> {
    fs::read_to_string(path).map_err(|source| YoloprepError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })
}

fn fold(name: &str) -> String {
    name.trim().to_lowercase()
}

fn yaml_single_quoted(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}
