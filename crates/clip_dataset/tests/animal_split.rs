use clip_dataset::{lists_to_manifest, split_by_animal, write_split, SplitConfig, DEFAULT_LABELS};
use data_contracts::{AnnotationRecord, DatasetManifest, Subset};
use std::collections::BTreeSet;

fn records() -> Vec<AnnotationRecord> {
    let animals = ["MC16_2", "MC6_5", "TI2_4", "TI3_3", "CV10_3"];
    let labels = ["c", "f", "p"];
    (0..60)
        .map(|i| AnnotationRecord {
            label: labels[i % labels.len()].to_string(),
            location: format!("clip_{i:03}"),
            mean_id: format!("{}:{:04}", animals[i % animals.len()], i),
        })
        .collect()
}

fn labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|s| s.to_string()).collect()
}

#[test]
fn held_out_animals_land_only_in_test() -> anyhow::Result<()> {
    let records = records();
    let cfg = SplitConfig {
        animals: ["MC16_2", "MC6_5", "TI2_4", "TI3_3", "CV10_3"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        n_training: 2,
        split_ratio: 0.75,
        seed: Some(11),
    };
    let split = split_by_animal(&records, &cfg)?;
    assert_eq!(split.training_animals.len(), 2);
    assert_eq!(split.train.len() + split.val.len() + split.test.len(), records.len());

    let manifest = split.to_manifest(&labels())?;
    let all_keys: BTreeSet<_> = records.iter().map(|r| r.location.clone()).collect();
    let manifest_keys: BTreeSet<_> = manifest.database.keys().cloned().collect();
    assert_eq!(all_keys, manifest_keys);

    for record in &records {
        let subset = manifest.database[&record.location].subset;
        let trained = split.training_animals.iter().any(|a| a == record.animal());
        if trained {
            assert_ne!(subset, Subset::Test, "{} should not be test", record.location);
        } else {
            assert_eq!(subset, Subset::Test, "{} should be test", record.location);
        }
    }
    Ok(())
}

#[test]
fn same_seed_gives_same_split() -> anyhow::Result<()> {
    let records = records();
    let cfg = SplitConfig {
        seed: Some(3),
        ..Default::default()
    };
    let a = split_by_animal(&records, &cfg)?;
    let b = split_by_animal(&records, &cfg)?;
    assert_eq!(a.training_animals, b.training_animals);
    assert_eq!(a.train, b.train);
    assert_eq!(a.val, b.val);
    Ok(())
}

#[test]
fn rejects_more_training_animals_than_candidates() {
    let cfg = SplitConfig {
        n_training: 8,
        ..Default::default()
    };
    assert!(split_by_animal(&records(), &cfg).is_err());
}

#[test]
fn overlapping_lists_are_rejected() {
    let train = vec!["c/clip_1".to_string()];
    let test = vec!["f/clip_1".to_string()];
    let res = lists_to_manifest(
        &labels(),
        &[(Subset::Training, train.as_slice()), (Subset::Test, test.as_slice())],
    );
    assert!(res.is_err());
}

#[test]
fn write_split_creates_lists_and_manifest_once() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = SplitConfig {
        seed: Some(5),
        ..Default::default()
    };
    let records = vec![AnnotationRecord {
        label: "c".into(),
        location: "clip_x".into(),
        mean_id: "CV10_3:1".into(),
    }];
    let split = split_by_animal(&records, &cfg)?;
    let dir = write_split(&split, tmp.path(), &labels(), "cichlids.json", None)?
        .expect("fresh split directory");
    assert!(dir.join("train_list.csv").exists());
    assert!(dir.join("val_list.csv").exists());
    assert!(dir.join("test_list.csv").exists());
    let manifest = DatasetManifest::load(&dir.join("cichlids.json"))?;
    assert_eq!(manifest.labels.len(), 10);
    assert_eq!(manifest.database.len(), 1);

    assert!(write_split(&split, tmp.path(), &labels(), "cichlids.json", None)?.is_none());
    Ok(())
}
