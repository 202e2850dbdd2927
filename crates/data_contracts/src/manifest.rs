use crate::{ContractError, ContractResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subset {
    Training,
    Validation,
    Test,
}

impl Subset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subset::Training => "training",
            Subset::Validation => "validation",
            Subset::Test => "test",
        }
    }
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub subset: Subset,
    pub annotations: Annotations,
}

/// Dataset manifest: the class list plus every sample keyed by its identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub labels: Vec<String>,
    pub database: BTreeMap<String, ManifestEntry>,
}

impl DatasetManifest {
    pub fn load(path: &Path) -> ContractResult<Self> {
        let raw = fs::read(path).map_err(|source| ContractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&raw).map_err(|source| ContractError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> ContractResult<()> {
        let json = serde_json::to_vec(self).map_err(|source| ContractError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(|source| ContractError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Entries of one subset, in key order.
    pub fn entries(&self, subset: Subset) -> impl Iterator<Item = (&String, &ManifestEntry)> {
        self.database
            .iter()
            .filter(move |(_, entry)| entry.subset == subset)
    }

    pub fn count(&self, subset: Subset) -> usize {
        self.entries(subset).count()
    }

    pub fn validate(&self) -> ContractResult<()> {
        for (key, entry) in &self.database {
            if self.label_index(&entry.annotations.label).is_none() {
                return Err(ContractError::UnknownLabel {
                    key: key.clone(),
                    label: entry.annotations.label.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Accumulates per-subset sample lists into a single manifest.
///
/// A key may belong to exactly one subset; adding it a second time is rejected.
#[derive(Debug, Default)]
pub struct ManifestBuilder {
    manifest: DatasetManifest,
}

impl ManifestBuilder {
    pub fn new(labels: Vec<String>) -> Self {
        Self {
            manifest: DatasetManifest {
                labels,
                database: BTreeMap::new(),
            },
        }
    }

    pub fn insert(&mut self, key: &str, label: &str, subset: Subset) -> ContractResult<()> {
        if let Some(existing) = self.manifest.database.get(key) {
            return Err(ContractError::DuplicateSample {
                key: key.to_string(),
                existing: existing.subset,
                requested: subset,
            });
        }
        self.manifest.database.insert(
            key.to_string(),
            ManifestEntry {
                subset,
                annotations: Annotations {
                    label: label.to_string(),
                },
            },
        );
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.manifest.database.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.database.is_empty()
    }

    pub fn finish(self) -> ContractResult<DatasetManifest> {
        self.manifest.validate()?;
        Ok(self.manifest)
    }
}
