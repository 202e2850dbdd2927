//! Epoch driver: train, validate, schedule, checkpoint, test.

use crate::checkpoint::{load_checkpoint, save_checkpoint};
use crate::epoch::{test_epoch, train_epoch, val_epoch, EpochPlan, TrainEpochStats};
use crate::logger::RunLogs;
use crate::options::{validate_backend_choice, TrainArgs};
use crate::schedule::PlateauScheduler;
use crate::TrainBackend;
use anyhow::Context;
use burn::backend::Autodiff;
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use clip_dataset::{ClipLoader, ClipLoaderConfig, ClipSource, ClipTransform, Normalization};
use data_contracts::{load_annotation_records, load_mean_file, mean_id_lookup, DatasetManifest, Subset};
use models::{AdversarialClassifier, DannModel};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// The three clip sources of a run. The test source doubles as the unlabeled target domain.
pub struct DataSources<S> {
    pub train: Option<S>,
    pub val: Option<S>,
    pub test: Option<S>,
}

/// What happened in one epoch.
#[derive(Debug, Clone, Default)]
pub struct EpochReport {
    pub epoch: usize,
    /// Learning rate used for this epoch's updates.
    pub lr: f64,
    pub train: Option<TrainEpochStats>,
    pub val_loss: Option<f64>,
    pub val_acc: Option<f64>,
    pub test_loss: Option<f64>,
    pub test_acc: Option<f64>,
    pub checkpoint: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct FitReport {
    pub epochs: Vec<EpochReport>,
    pub final_lr: f64,
}

impl FitReport {
    pub fn epoch(&self, epoch: usize) -> Option<&EpochReport> {
        self.epochs.iter().find(|r| r.epoch == epoch)
    }
}

/// Run epochs `begin_epoch..=n_epochs` on already-built sources.
///
/// `opts` must be resolved. When `opts.resume_path` is set, model, optimizer, and scheduler
/// are restored from that checkpoint and the run continues at the epoch it recorded.
pub fn fit<B, M, S>(
    opts: &TrainArgs,
    model: M,
    sources: &mut DataSources<S>,
    device: &B::Device,
) -> anyhow::Result<(M, FitReport)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + AdversarialClassifier<B>,
    M::InnerModule: AdversarialClassifier<B::InnerBackend>,
    S: ClipSource,
{
    let mut model = model;
    let mut optim = opts.sgd_config().init::<B, M>();
    let mut scheduler = PlateauScheduler::new(opts.learning_rate, opts.lr_patience, opts.lr_factor);
    let mut begin_epoch = opts.begin_epoch.max(1);

    if let Some(dir) = &opts.resume_path {
        let (loaded_model, loaded_optim, state) = load_checkpoint::<B, M, _>(dir, model, optim, device)
            .with_context(|| format!("resuming from {}", dir.display()))?;
        model = loaded_model;
        optim = loaded_optim;
        begin_epoch = state.epoch;
        scheduler = state.scheduler;
        info!(
            "resumed {} from {} at epoch {begin_epoch} (lr {:.3e})",
            state.arch,
            dir.display(),
            scheduler.lr()
        );
    }
    let mut logs = RunLogs::open(&opts.result_path, opts.resume_path.is_some())?;

    if !opts.no_train {
        let train_len = sources.train.as_ref().map(|s| s.num_samples()).unwrap_or(0);
        let test_len = sources.test.as_ref().map(|s| s.num_samples()).unwrap_or(0);
        if train_len == 0 {
            anyhow::bail!("training requested but the training source is empty");
        }
        if test_len == 0 {
            anyhow::bail!("domain adaptation needs test-domain clips but the test source is empty");
        }
    }
    let run_val = !opts.no_val
        && match sources.val.as_ref() {
            Some(val) if val.num_samples() > 0 => true,
            _ => {
                warn!("validation source is empty; skipping validation");
                false
            }
        };

    let mut report = FitReport::default();
    for epoch in begin_epoch..=opts.n_epochs {
        let mut epoch_report = EpochReport {
            epoch,
            lr: scheduler.lr(),
            ..Default::default()
        };

        if !opts.no_train {
            if let (Some(train), Some(test)) = (sources.train.as_mut(), sources.test.as_mut()) {
                let plan = EpochPlan {
                    epoch,
                    n_epochs: opts.n_epochs,
                    lr: scheduler.lr(),
                };
                let (trained, stats) = train_epoch::<B, M, _, _, _>(
                    plan,
                    model,
                    &mut optim,
                    train,
                    test,
                    &mut logs.train,
                    &mut logs.train_batch,
                    device,
                )?;
                model = trained;
                epoch_report.train = Some(stats);
            }
        }

        if run_val {
            if let Some(val) = sources.val.as_mut() {
                let eval_model = model.valid();
                let outcome = val_epoch::<B::InnerBackend, _, _>(
                    epoch,
                    &eval_model,
                    val,
                    opts.n_classes,
                    &opts.result_path,
                    &mut logs.val,
                    device,
                )?;
                epoch_report.val_loss = Some(outcome.loss);
                epoch_report.val_acc = Some(outcome.acc);
            }
        }

        if !opts.no_train {
            if let Some(val_loss) = epoch_report.val_loss {
                scheduler.step(val_loss);
            }
            if opts.checkpoint > 0 && epoch % opts.checkpoint == 0 {
                let dir = save_checkpoint::<B, M, _>(
                    &opts.result_path,
                    epoch,
                    &model,
                    &optim,
                    &scheduler,
                )?;
                info!("saved checkpoint {}", dir.display());
                epoch_report.checkpoint = Some(dir);
            }
        }

        if !opts.no_test {
            if let Some(test) = sources.test.as_mut() {
                let eval_model = model.valid();
                let outcome = test_epoch::<B::InnerBackend, _, _>(
                    epoch,
                    &eval_model,
                    test,
                    opts.n_classes,
                    &mut logs.test,
                    device,
                )?;
                epoch_report.test_loss = Some(outcome.loss);
                epoch_report.test_acc = Some(outcome.acc);
            }
        }

        report.epochs.push(epoch_report);
    }
    report.final_lr = scheduler.lr();
    Ok((model, report))
}

/// Per-sample normalization from the annotation and mean files, if both are configured.
pub fn load_normalization(opts: &TrainArgs) -> anyhow::Result<Normalization> {
    normalization_from_files(opts.annotation_file.as_deref(), opts.mean_file.as_deref())
}

/// Normalization table from an annotation CSV and a mean file; both or neither must be set.
pub fn normalization_from_files(
    annotation_file: Option<&Path>,
    mean_file: Option<&Path>,
) -> anyhow::Result<Normalization> {
    match (annotation_file, mean_file) {
        (Some(annotation_file), Some(mean_file)) => {
            let records = load_annotation_records(annotation_file)?;
            let stats = load_mean_file(mean_file)?;
            info!(
                "normalizing with {} mean ids for {} annotated clips",
                stats.len(),
                records.len()
            );
            Ok(Normalization::new(mean_id_lookup(&records), stats))
        }
        (None, None) => Ok(Normalization::default()),
        _ => anyhow::bail!("--annotation-file and --mean-file must be given together"),
    }
}

/// Every sample's label index must fit the `n_classes` model outputs.
pub fn check_label_range(manifest: &DatasetManifest, n_classes: usize) -> anyhow::Result<()> {
    for (key, entry) in &manifest.database {
        let label = &entry.annotations.label;
        if let Some(index) = manifest.label_index(label) {
            if index >= n_classes {
                anyhow::bail!(
                    "sample {key} has label {label} (index {index}) but n_classes is {n_classes}"
                );
            }
        }
    }
    if manifest.labels.len() < n_classes {
        warn!(
            "manifest lists {} labels but n_classes is {n_classes}",
            manifest.labels.len()
        );
    }
    Ok(())
}

/// Build the disk-backed train/val/test loaders described by `opts`.
pub fn build_sources(opts: &TrainArgs) -> anyhow::Result<DataSources<ClipLoader>> {
    let manifest = DatasetManifest::load(&opts.annotation_path)
        .with_context(|| format!("loading manifest {}", opts.annotation_path.display()))?;
    manifest.validate()?;
    check_label_range(&manifest, opts.n_classes)?;
    let normalization = load_normalization(opts)?;
    let train_transform = ClipTransform::training(
        opts.sample_size,
        opts.sample_duration,
        opts.crop_jitter,
        opts.norm_value,
    );
    let eval_transform =
        ClipTransform::evaluation(opts.sample_size, opts.sample_duration, opts.norm_value);
    let loader = |subset: Subset, transform: ClipTransform, shuffle: bool| {
        let cfg = ClipLoaderConfig {
            batch_size: opts.batch_size,
            shuffle,
            seed: opts.manual_seed,
            drop_last: false,
        };
        ClipLoader::from_manifest(
            &manifest,
            subset,
            &opts.video_path,
            &normalization,
            transform,
            cfg,
        )
        .with_context(|| format!("indexing {subset} clips under {}", opts.video_path.display()))
    };

    let train = if opts.no_train {
        None
    } else {
        info!("training transform: {}", train_transform.describe());
        Some(loader(Subset::Training, train_transform, true)?)
    };
    let val = if opts.no_val {
        None
    } else {
        Some(loader(Subset::Validation, eval_transform.clone(), false)?)
    };
    let test = if opts.no_train && opts.no_test {
        None
    } else {
        Some(loader(Subset::Test, eval_transform, false)?)
    };
    for (name, source) in [("train", &train), ("val", &val), ("test", &test)] {
        if let Some(source) = source {
            info!(
                "{name}: {} clips in {} batches",
                source.num_samples(),
                source.num_batches()
            );
        }
    }
    Ok(DataSources { train, val, test })
}

/// Full `train` entrypoint on the compiled backend.
pub fn run_training(args: TrainArgs) -> anyhow::Result<FitReport> {
    validate_backend_choice(args.backend())?;
    let opts = args.resolve()?;
    let opts_path = opts.save_json()?;
    info!("options written to {}", opts_path.display());
    opts.runtime.apply();

    type ADBackend = Autodiff<TrainBackend>;
    let device = <ADBackend as Backend>::Device::default();
    ADBackend::seed(opts.manual_seed);

    let mut sources = build_sources(&opts)?;
    let model: DannModel<ADBackend> = opts.model_config().init(&device);
    info!("model {} with {} classes", opts.arch, opts.n_classes);
    let (_model, report) = fit::<ADBackend, _, _>(&opts, model, &mut sources, &device)?;
    info!("finished at lr {:.3e}", report.final_lr);
    Ok(report)
}
