//! One pass over the data: adversarial training, validation, and test.

use crate::logger::{BatchRow, EpochRow, EvalRow, TableLogger};
use crate::metrics::{
    accuracy, check_targets, logits_to_host, scalar, write_validation_artifacts, AverageMeter,
    ConfidenceTable, ConfusionMatrix,
};
use crate::schedule::alpha_ramp;
use anyhow::Context;
use burn::module::AutodiffModule;
use burn::nn::loss::CrossEntropyLossConfig;
use burn::optim::{GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{Int, Tensor};
use clip_dataset::{ClipBatch, ClipSource};
use models::AdversarialClassifier;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Averages over one training epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrainEpochStats {
    pub loss: f64,
    pub train_label_acc: f64,
    pub train_domain_acc: f64,
    pub test_label_acc: f64,
    pub test_domain_acc: f64,
    pub batches: usize,
}

#[derive(Debug, Default)]
struct TrainMeters {
    batch_time: AverageMeter,
    data_time: AverageMeter,
    loss: AverageMeter,
    train_label_acc: AverageMeter,
    train_domain_acc: AverageMeter,
    test_label_acc: AverageMeter,
    test_domain_acc: AverageMeter,
}

/// Position of the epoch within the whole run.
#[derive(Debug, Clone, Copy)]
pub struct EpochPlan {
    /// 1-based epoch number.
    pub epoch: usize,
    pub n_epochs: usize,
    pub lr: f64,
}

/// Next test-domain batch; the source restarts when exhausted.
fn next_cycled<B: Backend, S: ClipSource>(
    source: &mut S,
    epoch: usize,
    device: &B::Device,
) -> anyhow::Result<ClipBatch<B>> {
    if let Some(batch) = source.next_batch::<B>(device)? {
        return Ok(batch);
    }
    source.begin_epoch(epoch);
    source
        .next_batch::<B>(device)?
        .context("test-domain source yields no batches")
}

/// Train for one epoch on `train` while adapting the domain head against `test`.
///
/// Per batch the loss is the label loss on the training batch plus the domain losses of
/// the training batch (target 0) and the next test batch (target 1). The domain head sits
/// behind a gradient reversal weighted by [`alpha_ramp`].
#[allow(clippy::too_many_arguments)]
pub fn train_epoch<B, M, O, S, T>(
    plan: EpochPlan,
    mut model: M,
    optim: &mut O,
    train: &mut S,
    test: &mut T,
    epoch_log: &mut TableLogger<EpochRow>,
    batch_log: &mut TableLogger<BatchRow>,
    device: &B::Device,
) -> anyhow::Result<(M, TrainEpochStats)>
where
    B: AutodiffBackend,
    M: AutodiffModule<B> + AdversarialClassifier<B>,
    O: Optimizer<M, B>,
    S: ClipSource,
    T: ClipSource,
{
    let EpochPlan {
        epoch,
        n_epochs,
        lr,
    } = plan;
    info!("train at epoch {epoch}");
    train.begin_epoch(epoch);
    test.begin_epoch(epoch);
    let len_train = train.num_batches();
    let ce = CrossEntropyLossConfig::new().init(device);
    let mut meters = TrainMeters::default();

    let mut i = 0usize;
    let mut end_time = Instant::now();
    while let Some(batch) = train.next_batch::<B>(device)? {
        let test_batch = next_cycled::<B, T>(test, epoch, device)?;
        meters.data_time.update(end_time.elapsed().as_secs_f64(), 1);

        let alpha = alpha_ramp(i, epoch, n_epochs, len_train);
        let n = batch.len();
        let m = test_batch.len();

        let out = model.forward_adversarial(batch.clips, alpha);
        let [_, n_classes] = out.labels.dims();
        check_targets(&batch.label_ids, n_classes)?;
        let label_loss = ce.forward(out.labels.clone(), batch.labels);
        let domain_loss = ce.forward(
            out.domains.clone(),
            Tensor::<B, 1, Int>::zeros([n], device),
        );

        let test_out = model.forward_adversarial(test_batch.clips, alpha);
        let test_domain_loss = ce.forward(
            test_out.domains.clone(),
            Tensor::<B, 1, Int>::ones([m], device),
        );

        let loss = label_loss + domain_loss + test_domain_loss;
        let loss_value = scalar(loss.clone().detach());

        let train_label_acc = accuracy(&logits_to_host(out.labels.detach())?, &batch.label_ids);
        let train_domain_acc = accuracy(&logits_to_host(out.domains.detach())?, &vec![0; n]);
        let test_label_acc = accuracy(
            &logits_to_host(test_out.labels.detach())?,
            &test_batch.label_ids,
        );
        let test_domain_acc = accuracy(&logits_to_host(test_out.domains.detach())?, &vec![1; m]);

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optim.step(lr, model, grads);

        meters.loss.update(loss_value, n);
        meters.train_label_acc.update(train_label_acc, n);
        meters.train_domain_acc.update(train_domain_acc, n);
        meters.test_label_acc.update(test_label_acc, m);
        meters.test_domain_acc.update(test_domain_acc, m);
        meters.batch_time.update(end_time.elapsed().as_secs_f64(), 1);
        end_time = Instant::now();

        batch_log.log(&BatchRow {
            epoch,
            batch: i + 1,
            iter: epoch.saturating_sub(1) * len_train + (i + 1),
            loss: meters.loss.val,
            train_label_acc: meters.train_label_acc.val,
            train_domain_acc: meters.train_domain_acc.val,
            test_label_acc: meters.test_label_acc.val,
            test_domain_acc: meters.test_domain_acc.val,
            lr,
        })?;
        info!(
            "Epoch: [{epoch}][{}/{len_train}]\tTime {:.3} ({:.3})\tData {:.3} ({:.3})\tLoss {:.4} ({:.4})\tAcc {:.3} ({:.3})\tDomain {:.3}/{:.3}\talpha {alpha:.3}",
            i + 1,
            meters.batch_time.val,
            meters.batch_time.avg,
            meters.data_time.val,
            meters.data_time.avg,
            meters.loss.val,
            meters.loss.avg,
            meters.train_label_acc.val,
            meters.train_label_acc.avg,
            meters.train_domain_acc.val,
            meters.test_domain_acc.val,
        );
        i += 1;
    }

    let stats = TrainEpochStats {
        loss: meters.loss.avg,
        train_label_acc: meters.train_label_acc.avg,
        train_domain_acc: meters.train_domain_acc.avg,
        test_label_acc: meters.test_label_acc.avg,
        test_domain_acc: meters.test_domain_acc.avg,
        batches: i,
    };
    epoch_log.log(&EpochRow {
        epoch,
        loss: stats.loss,
        train_label_acc: stats.train_label_acc,
        train_domain_acc: stats.train_domain_acc,
        test_label_acc: stats.test_label_acc,
        test_domain_acc: stats.test_domain_acc,
        lr,
    })?;
    Ok((model, stats))
}

/// Loss, accuracy, confusion matrix, and raw outputs of one evaluation pass.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub loss: f64,
    pub acc: f64,
    pub samples: usize,
    pub confusion: ConfusionMatrix,
    pub confidences: ConfidenceTable,
}

/// Label-only pass over `source` without gradients.
pub fn evaluate<B, M, S>(
    model: &M,
    source: &mut S,
    epoch: usize,
    n_classes: usize,
    device: &B::Device,
) -> anyhow::Result<EvalOutcome>
where
    B: Backend,
    M: AdversarialClassifier<B>,
    S: ClipSource,
{
    source.begin_epoch(epoch);
    let ce = CrossEntropyLossConfig::new().init(device);
    let mut loss_meter = AverageMeter::default();
    let mut acc_meter = AverageMeter::default();
    let mut confusion = ConfusionMatrix::new(n_classes);
    let mut confidences = ConfidenceTable::default();

    while let Some(batch) = source.next_batch::<B>(device)? {
        let n = batch.len();
        check_targets(&batch.label_ids, n_classes)?;
        let logits = model.forward_labels(batch.clips);
        let loss = scalar(ce.forward(logits.clone(), batch.labels));
        let rows = logits_to_host(logits)?;
        loss_meter.update(loss, n);
        acc_meter.update(accuracy(&rows, &batch.label_ids), n);
        confusion.add_batch(&rows, &batch.label_ids)?;
        confidences.extend(&batch.ids, &rows);
    }

    Ok(EvalOutcome {
        loss: loss_meter.avg,
        acc: acc_meter.avg,
        samples: loss_meter.count,
        confusion,
        confidences,
    })
}

/// Validation: evaluate, write the confusion and confidence CSVs, log to `val.log`.
pub fn val_epoch<B, M, S>(
    epoch: usize,
    model: &M,
    source: &mut S,
    n_classes: usize,
    result_path: &Path,
    log: &mut TableLogger<EvalRow>,
    device: &B::Device,
) -> anyhow::Result<EvalOutcome>
where
    B: Backend,
    M: AdversarialClassifier<B>,
    S: ClipSource,
{
    info!("validation at epoch {epoch}");
    let outcome = evaluate(model, source, epoch, n_classes, device)?;
    write_validation_artifacts(result_path, epoch, &outcome.confusion, &outcome.confidences)?;
    log.log(&EvalRow {
        epoch,
        loss: outcome.loss,
        acc: outcome.acc,
    })?;
    info!(
        "Validation epoch {epoch}: loss {:.4} acc {:.3} ({} clips)",
        outcome.loss, outcome.acc, outcome.samples
    );
    Ok(outcome)
}

/// Test pass: evaluate and log to `test.log`.
pub fn test_epoch<B, M, S>(
    epoch: usize,
    model: &M,
    source: &mut S,
    n_classes: usize,
    log: &mut TableLogger<EvalRow>,
    device: &B::Device,
) -> anyhow::Result<EvalOutcome>
where
    B: Backend,
    M: AdversarialClassifier<B>,
    S: ClipSource,
{
    info!("test at epoch {epoch}");
    let outcome = evaluate(model, source, epoch, n_classes, device)?;
    log.log(&EvalRow {
        epoch,
        loss: outcome.loss,
        acc: outcome.acc,
    })?;
    info!(
        "Test epoch {epoch}: loss {:.4} acc {:.3} ({} clips)",
        outcome.loss, outcome.acc, outcome.samples
    );
    Ok(outcome)
}
