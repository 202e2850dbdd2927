//! Running averages, accuracy, confusion matrix, and per-sample confidences.

use anyhow::Context;
use burn::tensor::backend::Backend;
use burn::tensor::{ElementConversion, Tensor};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Running weighted mean of a per-batch value.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageMeter {
    pub val: f64,
    pub sum: f64,
    pub count: usize,
    pub avg: f64,
}

impl AverageMeter {
    pub fn update(&mut self, val: f64, n: usize) {
        self.val = val;
        self.sum += val * n as f64;
        self.count += n;
        self.avg = if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        };
    }
}

/// Copy a logits tensor `[N, K]` to the host as row-major `f32`.
pub fn logits_to_host<B: Backend>(logits: Tensor<B, 2>) -> anyhow::Result<Vec<Vec<f32>>> {
    let [_, k] = logits.dims();
    let flat = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow::anyhow!("reading logits: {e:?}"))?;
    Ok(flat.chunks(k.max(1)).map(|row| row.to_vec()).collect())
}

/// Scalar value of a single-element loss tensor.
pub fn scalar<B: Backend>(loss: Tensor<B, 1>) -> f64 {
    loss.into_scalar().elem::<f64>()
}

/// Index of the largest entry; the first one on ties.
pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

/// Fail when a target does not fit the model's `n_classes` outputs.
pub fn check_targets(targets: &[usize], n_classes: usize) -> anyhow::Result<()> {
    if let Some(&bad) = targets.iter().find(|&&t| t >= n_classes) {
        anyhow::bail!("label index {bad} is out of range for {n_classes} classes");
    }
    Ok(())
}

/// Fraction of rows whose argmax equals the target.
pub fn accuracy(rows: &[Vec<f32>], targets: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    let correct = rows
        .iter()
        .zip(targets)
        .filter(|(row, t)| argmax(row) == **t)
        .count();
    correct as f64 / rows.len() as f64
}

/// Counts indexed `[true][predicted]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionMatrix {
    counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(n_classes: usize) -> Self {
        Self {
            counts: vec![vec![0; n_classes]; n_classes],
        }
    }

    pub fn n_classes(&self) -> usize {
        self.counts.len()
    }

    /// Record one prediction. Classes outside the matrix are an error.
    pub fn add(&mut self, truth: usize, predicted: usize) -> anyhow::Result<()> {
        let n_classes = self.n_classes();
        let cell = self
            .counts
            .get_mut(truth)
            .and_then(|row| row.get_mut(predicted))
            .with_context(|| {
                format!("class pair ({truth}, {predicted}) outside a {n_classes}-class confusion matrix")
            })?;
        *cell += 1;
        Ok(())
    }

    pub fn add_batch(&mut self, rows: &[Vec<f32>], targets: &[usize]) -> anyhow::Result<()> {
        for (row, &t) in rows.iter().zip(targets) {
            self.add(t, argmax(row))?;
        }
        Ok(())
    }

    pub fn get(&self, truth: usize, predicted: usize) -> Option<u64> {
        self.counts.get(truth)?.get(predicted).copied()
    }

    pub fn row_sums(&self) -> Vec<u64> {
        self.counts.iter().map(|row| row.iter().sum()).collect()
    }

    pub fn total(&self) -> u64 {
        self.row_sums().iter().sum()
    }

    /// Comma-separated table with a leading index column: `,0,1,..` then `i,c_i0,c_i1,..`.
    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut header = vec![String::new()];
        header.extend((0..self.n_classes()).map(|c| c.to_string()));
        wtr.write_record(&header)?;
        for (i, row) in self.counts.iter().enumerate() {
            let mut record = vec![i.to_string()];
            record.extend(row.iter().map(|c| c.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Raw output vector per sample identifier, in identifier order.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceTable {
    rows: BTreeMap<String, Vec<f32>>,
}

impl ConfidenceTable {
    pub fn insert(&mut self, id: impl Into<String>, outputs: Vec<f32>) {
        self.rows.insert(id.into(), outputs);
    }

    pub fn extend(&mut self, ids: &[String], rows: &[Vec<f32>]) {
        for (id, row) in ids.iter().zip(rows) {
            self.insert(id.clone(), row.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&[f32]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    /// One row per sample: identifier, then its raw outputs. Columns are `,0,1,..`.
    pub fn write_csv(&self, path: &Path) -> anyhow::Result<()> {
        let width = self.rows.values().map(Vec::len).max().unwrap_or(0);
        let mut wtr = csv::WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("creating {}", path.display()))?;
        let mut header = vec![String::new()];
        header.extend((0..width).map(|c| c.to_string()));
        wtr.write_record(&header)?;
        for (id, outputs) in &self.rows {
            let mut record = vec![id.clone()];
            record.extend(outputs.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Write both validation artifacts into `dir`.
pub fn write_validation_artifacts(
    dir: &Path,
    epoch: usize,
    confusion: &ConfusionMatrix,
    confidences: &ConfidenceTable,
) -> anyhow::Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    confusion.write_csv(&dir.join(format!("ConfusionMatrix_{epoch}.csv")))?;
    confidences.write_csv(&dir.join("ConfidenceMatrix.csv"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meter_weights_by_count() {
        let mut m = AverageMeter::default();
        m.update(1.0, 1);
        m.update(4.0, 3);
        assert_eq!(m.count, 4);
        assert!((m.avg - 13.0 / 4.0).abs() < 1e-12);
        assert_eq!(m.val, 4.0);
    }

    #[test]
    fn argmax_takes_first_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), 1);
        assert_eq!(argmax(&[]), 0);
    }

    #[test]
    fn accuracy_counts_matches() {
        let rows = vec![vec![0.9, 0.1], vec![0.2, 0.8], vec![0.6, 0.4]];
        assert!((accuracy(&rows, &[0, 1, 1]) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn confusion_rejects_out_of_range_classes() {
        let mut cm = ConfusionMatrix::new(2);
        assert!(cm.add(2, 0).is_err());
        assert!(cm.add(0, 2).is_err());
        assert_eq!(cm.total(), 0);
        assert_eq!(cm.get(1, 1), Some(0));
        assert_eq!(cm.get(2, 0), None);
        assert!(check_targets(&[0, 1], 2).is_ok());
        assert!(check_targets(&[0, 2], 2).is_err());
    }

    #[test]
    fn confusion_csv_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cm = ConfusionMatrix::new(2);
        cm.add(0, 0).unwrap();
        cm.add(0, 1).unwrap();
        cm.add(1, 1).unwrap();
        let path = tmp.path().join("cm.csv");
        cm.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, ",0,1\n0,1,1\n1,0,1\n");
    }
}
