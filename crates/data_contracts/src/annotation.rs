//! Annotation CSV rows and per-animal channel statistics.

use crate::{ContractError, ContractResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// One row of the annotation CSV (`Label`, `Location`, `MeanID`, extra columns ignored).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "Label")]
    pub label: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "MeanID")]
    pub mean_id: String,
}

impl AnnotationRecord {
    /// Animal identifier: the `MeanID` prefix before the first `:`.
    pub fn animal(&self) -> &str {
        self.mean_id.split(':').next().unwrap_or(&self.mean_id)
    }

    /// Sample list line in `Label/Location` form.
    pub fn list_line(&self) -> String {
        format!("{}/{}", self.label, self.location)
    }
}

pub fn load_annotation_records(path: &Path) -> ContractResult<Vec<AnnotationRecord>> {
    let csv_err = |source| ContractError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(csv_err)?;
    let mut records = Vec::new();
    for row in reader.deserialize() {
        records.push(row.map_err(csv_err)?);
    }
    Ok(records)
}

/// Location -> MeanID lookup used to pick per-sample normalization.
pub fn mean_id_lookup(records: &[AnnotationRecord]) -> BTreeMap<String, String> {
    records
        .iter()
        .map(|r| (r.location.clone(), r.mean_id.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelStats {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for ChannelStats {
    fn default() -> Self {
        Self {
            mean: [0.0; 3],
            std: [1.0; 3],
        }
    }
}

/// Load the mean file: a header row, then `id, m0, m1, m2, s0, s1, s2` per line.
pub fn load_mean_file(path: &Path) -> ContractResult<BTreeMap<String, ChannelStats>> {
    let csv_err = |source| ContractError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let mut stats = BTreeMap::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let malformed = |msg: String| ContractError::MalformedRow {
            path: path.to_path_buf(),
            row: row + 1,
            msg,
        };
        if record.len() < 7 {
            return Err(malformed(format!(
                "expected 7 columns, found {}",
                record.len()
            )));
        }
        let mut values = [0.0f32; 6];
        for (slot, field) in values.iter_mut().zip(record.iter().skip(1)) {
            *slot = field
                .parse()
                .map_err(|e| malformed(format!("bad number {field:?}: {e}")))?;
        }
        if values[3..].iter().any(|s| *s <= 0.0) {
            return Err(malformed("std must be positive".to_string()));
        }
        stats.insert(
            record[0].to_string(),
            ChannelStats {
                mean: [values[0], values[1], values[2]],
                std: [values[3], values[4], values[5]],
            },
        );
    }
    Ok(stats)
}
