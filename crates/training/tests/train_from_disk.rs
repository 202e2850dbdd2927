use burn::backend::ndarray::NdArray;
use clap::Parser;
use clip_dataset::{ClipLoader, ClipSource};
use data_contracts::{ManifestBuilder, Subset};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use training::{build_sources, run_training, TrainArgs};

fn write_dataset(root: &Path) -> anyhow::Result<()> {
    let video = root.join("jpg");
    let mut builder = ManifestBuilder::new(vec!["c".into(), "f".into()]);
    let clips = [
        ("tr_0", "c", Subset::Training),
        ("tr_1", "f", Subset::Training),
        ("tr_2", "c", Subset::Training),
        ("tr_3", "f", Subset::Training),
        ("va_0", "c", Subset::Validation),
        ("va_1", "f", Subset::Validation),
        ("te_0", "c", Subset::Test),
        ("te_1", "f", Subset::Test),
        ("te_2", "c", Subset::Test),
    ];
    for (i, (key, label, subset)) in clips.iter().enumerate() {
        write_clip(&video, label, key, (i * 25) as u8)?;
        builder.insert(key, label, *subset)?;
    }
    builder.finish()?.save(&root.join("split.json"))?;
    Ok(())
}

fn write_clip(root: &Path, label: &str, key: &str, shade: u8) -> anyhow::Result<()> {
    let dir = root.join(label).join(key);
    fs::create_dir_all(&dir)?;
    for i in 0..3u8 {
        let img = RgbImage::from_fn(12, 10, |x, _y| Rgb([shade, i * 20, x as u8 * 10]));
        img.save(dir.join(format!("image_{:05}.png", i + 1)))?;
    }
    Ok(())
}

#[test]
fn train_binary_flow_on_frame_directories() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_dataset(tmp.path())?;

    let args = TrainArgs::parse_from([
        "train",
        "--root-path",
        tmp.path().to_str().unwrap(),
        "--video-path",
        "jpg",
        "--annotation-path",
        "split.json",
        "--result-path",
        "results",
        "--n-classes",
        "2",
        "--sample-size",
        "8",
        "--sample-duration",
        "2",
        "--norm-value",
        "255",
        "--batch-size",
        "2",
        "--n-epochs",
        "1",
        "--checkpoint",
        "1",
        "--features",
        "4",
        "--hidden",
        "8",
        "--n-threads",
        "0",
    ]);
    let report = run_training(args)?;
    assert_eq!(report.epochs.len(), 1);
    assert_eq!(report.epochs[0].train.map(|s| s.batches), Some(2));

    let results = tmp.path().join("results");
    for file in [
        "opts.json",
        "train.log",
        "train_batch.log",
        "val.log",
        "test.log",
        "ConfusionMatrix_1.csv",
        "ConfidenceMatrix.csv",
        "save_1/model.bin",
        "save_1/optim.bin",
        "save_1/state.json",
    ] {
        assert!(results.join(file).is_file(), "{file} missing");
    }
    let opts: serde_json::Value = serde_json::from_str(&fs::read_to_string(results.join("opts.json"))?)?;
    assert_eq!(opts["arch"], "dann-conv-4");
    let confidences = fs::read_to_string(results.join("ConfidenceMatrix.csv"))?;
    assert!(confidences.lines().any(|l| l.contains("va_1")));
    Ok(())
}

fn test_order(source: &mut ClipLoader, epoch: usize) -> anyhow::Result<Vec<String>> {
    let device = Default::default();
    source.begin_epoch(epoch);
    let mut ids = Vec::new();
    while let Some(batch) = source.next_batch::<NdArray<f32>>(&device)? {
        ids.extend(batch.ids);
    }
    Ok(ids)
}

#[test]
fn test_subset_keeps_manifest_order_every_epoch() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_dataset(tmp.path())?;
    let args = TrainArgs::parse_from([
        "train",
        "--root-path",
        tmp.path().to_str().unwrap(),
        "--video-path",
        "jpg",
        "--annotation-path",
        "split.json",
        "--result-path",
        "results",
        "--n-classes",
        "2",
        "--sample-size",
        "8",
        "--sample-duration",
        "2",
        "--batch-size",
        "2",
    ])
    .resolve()?;
    let sources = build_sources(&args)?;
    let mut test = sources.test.expect("test source");
    let first = test_order(&mut test, 1)?;
    assert_eq!(first.len(), 3);
    for (id, key) in first.iter().zip(["te_0", "te_1", "te_2"]) {
        assert!(id.ends_with(key), "{first:?}");
    }
    assert_eq!(test_order(&mut test, 2)?, first);
    Ok(())
}

#[test]
fn n_classes_smaller_than_used_labels_fails_before_training() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    write_dataset(tmp.path())?;
    let args = TrainArgs::parse_from([
        "train",
        "--root-path",
        tmp.path().to_str().unwrap(),
        "--video-path",
        "jpg",
        "--annotation-path",
        "split.json",
        "--n-classes",
        "1",
    ])
    .resolve()?;
    assert!(build_sources(&args).is_err());
    Ok(())
}
