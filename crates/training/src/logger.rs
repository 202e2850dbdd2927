//! Tab-separated run tables (`train.log`, `train_batch.log`, `val.log`, `test.log`).

use anyhow::Context;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

pub const EPOCH_HEADER: [&str; 7] = [
    "epoch",
    "loss",
    "train_label_acc",
    "train_domain_acc",
    "test_label_acc",
    "test_domain_acc",
    "lr",
];

pub const BATCH_HEADER: [&str; 9] = [
    "epoch",
    "batch",
    "iter",
    "loss",
    "train_label_acc",
    "train_domain_acc",
    "test_label_acc",
    "test_domain_acc",
    "lr",
];

pub const EVAL_HEADER: [&str; 3] = ["epoch", "loss", "acc"];

#[derive(Debug, Clone, Serialize)]
pub struct EpochRow {
    pub epoch: usize,
    pub loss: f64,
    pub train_label_acc: f64,
    pub train_domain_acc: f64,
    pub test_label_acc: f64,
    pub test_domain_acc: f64,
    pub lr: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub epoch: usize,
    /// 1-based batch index within the epoch.
    pub batch: usize,
    /// Global iteration counter across epochs.
    pub iter: usize,
    pub loss: f64,
    pub train_label_acc: f64,
    pub train_domain_acc: f64,
    pub test_label_acc: f64,
    pub test_domain_acc: f64,
    pub lr: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalRow {
    pub epoch: usize,
    pub loss: f64,
    pub acc: f64,
}

/// A fixed-header, tab-separated table flushed after every row.
pub struct TableLogger<R> {
    path: PathBuf,
    writer: csv::Writer<File>,
    _row: PhantomData<R>,
}

impl<R: Serialize> TableLogger<R> {
    /// Open `path`. New runs truncate and write `header`; resumed runs append to an existing file.
    pub fn open(path: &Path, header: &[&str], resume: bool) -> anyhow::Result<Self> {
        let append = resume && path.exists();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .with_context(|| format!("opening log {}", path.display()))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .from_writer(file);
        if !append {
            writer.write_record(header)?;
            writer.flush()?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            _row: PhantomData,
        })
    }

    pub fn log(&mut self, row: &R) -> anyhow::Result<()> {
        self.writer
            .serialize(row)
            .with_context(|| format!("writing log {}", self.path.display()))?;
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// The four tables of one run.
pub struct RunLogs {
    pub train: TableLogger<EpochRow>,
    pub train_batch: TableLogger<BatchRow>,
    pub val: TableLogger<EvalRow>,
    pub test: TableLogger<EvalRow>,
}

impl RunLogs {
    pub fn open(result_path: &Path, resume: bool) -> anyhow::Result<Self> {
        Ok(Self {
            train: TableLogger::open(&result_path.join("train.log"), &EPOCH_HEADER, resume)?,
            train_batch: TableLogger::open(
                &result_path.join("train_batch.log"),
                &BATCH_HEADER,
                resume,
            )?,
            val: TableLogger::open(&result_path.join("val.log"), &EVAL_HEADER, resume)?,
            test: TableLogger::open(&result_path.join("test.log"), &EVAL_HEADER, resume)?,
        })
    }
}
