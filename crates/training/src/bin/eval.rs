use anyhow::Context;
use clap::Parser;
use cli_support::RuntimeArgs;
use clip_dataset::{ClipLoader, ClipLoaderConfig, ClipTransform};
use data_contracts::{DatasetManifest, Subset};
use std::path::PathBuf;
use training::metrics::write_validation_artifacts;
use training::{
    check_label_range, evaluate, load_model, normalization_from_files, validate_backend_choice,
    DannModel, DannModelConfig, TrainBackend,
};

fn parse_subset(s: &str) -> Result<Subset, String> {
    match s {
        "training" | "train" => Ok(Subset::Training),
        "validation" | "val" => Ok(Subset::Validation),
        "test" => Ok(Subset::Test),
        other => Err(format!("unknown subset {other:?} (training, validation, test)")),
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "eval",
    about = "Evaluate a saved checkpoint on one manifest subset (confusion + confidence CSVs)"
)]
struct Args {
    /// Checkpoint directory (`save_<epoch>`).
    #[arg(long)]
    checkpoint: PathBuf,
    /// Dataset manifest (JSON).
    #[arg(long)]
    annotation_path: PathBuf,
    /// Directory of clip frame folders laid out as `<label>/<key>/`.
    #[arg(long)]
    video_path: PathBuf,
    /// Subset to evaluate.
    #[arg(long, value_parser = parse_subset, default_value = "validation")]
    subset: Subset,
    /// Output directory for the CSVs (defaults to the checkpoint directory).
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    annotation_file: Option<PathBuf>,
    #[arg(long)]
    mean_file: Option<PathBuf>,
    #[arg(long, default_value_t = 10)]
    n_classes: usize,
    #[arg(long, default_value_t = 112)]
    sample_size: u32,
    #[arg(long, default_value_t = 16)]
    sample_duration: usize,
    #[arg(long, default_value_t = 1.0)]
    norm_value: f32,
    #[arg(long, default_value_t = 8)]
    batch_size: usize,
    /// Must match the trained model.
    #[arg(long, default_value_t = 32)]
    features: usize,
    #[arg(long, default_value_t = 64)]
    hidden: usize,
    #[command(flatten)]
    runtime: RuntimeArgs,
}

fn main() -> anyhow::Result<()> {
    cli_support::init_tracing("info");
    let args = Args::parse();
    validate_backend_choice(args.runtime.backend)?;
    args.runtime.apply();

    let device = <TrainBackend as burn::tensor::backend::Backend>::Device::default();
    let config = DannModelConfig {
        n_classes: args.n_classes,
        in_channels: 3,
        features: args.features,
        hidden: args.hidden,
    };
    let model: DannModel<TrainBackend> = load_model::<TrainBackend, _>(
        &args.checkpoint,
        config.init(&device),
        &device,
    )?;

    let manifest = DatasetManifest::load(&args.annotation_path)?;
    check_label_range(&manifest, args.n_classes)?;
    let normalization =
        normalization_from_files(args.annotation_file.as_deref(), args.mean_file.as_deref())?;
    let mut loader = ClipLoader::from_manifest(
        &manifest,
        args.subset,
        &args.video_path,
        &normalization,
        ClipTransform::evaluation(args.sample_size, args.sample_duration, args.norm_value),
        ClipLoaderConfig {
            batch_size: args.batch_size.max(1),
            ..Default::default()
        },
    )
    .with_context(|| format!("indexing {} clips", args.subset))?;

    let outcome = evaluate::<TrainBackend, _, _>(&model, &mut loader, 0, args.n_classes, &device)?;
    if loader.skipped() > 0 {
        println!("Skipped {} unreadable clips", loader.skipped());
    }
    let output = args.output.unwrap_or_else(|| args.checkpoint.clone());
    write_validation_artifacts(&output, 0, &outcome.confusion, &outcome.confidences)?;

    println!(
        "Eval complete: subset={} clips={} loss={:.4} acc={:.3} (per-class counts {:?})",
        args.subset,
        outcome.samples,
        outcome.loss,
        outcome.acc,
        outcome.confusion.row_sums()
    );
    println!("Wrote matrices to {}", output.display());
    Ok(())
}
