use anyhow::Context;
use clap::Parser;
use clip_dataset::{split_by_animal, write_split, SplitConfig, DEFAULT_ANIMALS, DEFAULT_LABELS};
use data_contracts::load_annotation_records;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "split_by_animal",
    about = "Hold out animals as the test domain and write train/val/test lists plus a manifest"
)]
struct Args {
    /// Annotation CSV with Label, Location, and MeanID columns.
    #[arg(long)]
    annotation_file: PathBuf,
    /// Directory the split folder is created under.
    #[arg(long)]
    master_dir: PathBuf,
    /// Candidate animals (comma-separated).
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_ANIMALS.map(String::from))]
    animals: Vec<String>,
    /// Class labels in manifest order (comma-separated).
    #[arg(long, value_delimiter = ',', default_values_t = DEFAULT_LABELS.map(String::from))]
    labels: Vec<String>,
    /// Animals kept for training/validation.
    #[arg(long, default_value_t = 3)]
    n_training: usize,
    /// Probability that a training-animal clip goes to training rather than validation.
    #[arg(long, default_value_t = 0.8)]
    split_ratio: f32,
    #[arg(long)]
    seed: Option<u64>,
    /// Manifest file name inside the split folder.
    #[arg(long, default_value = "annotation.json")]
    manifest_name: String,
    /// Data folder to symlink into the split folder.
    #[arg(long)]
    data_folder: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing("info");
    let args = Args::parse();
    let records = load_annotation_records(&args.annotation_file)
        .with_context(|| format!("reading {}", args.annotation_file.display()))?;
    let cfg = SplitConfig {
        animals: args.animals,
        n_training: args.n_training,
        split_ratio: args.split_ratio,
        seed: args.seed,
    };
    let split = split_by_animal(&records, &cfg)?;
    println!(
        "training animals: {} (train={}, val={}, test={})",
        split.training_animals.join(", "),
        split.train.len(),
        split.val.len(),
        split.test.len()
    );
    match write_split(
        &split,
        &args.master_dir,
        &args.labels,
        &args.manifest_name,
        args.data_folder.as_deref(),
    )? {
        Some(dir) => println!("Wrote split to {}", dir.display()),
        None => println!("Split {} already exists; nothing written", split.dir_name()),
    }
    Ok(())
}
