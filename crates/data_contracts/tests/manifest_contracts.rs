use data_contracts::{
    load_annotation_records, load_mean_file, mean_id_lookup, ContractError, DatasetManifest,
    ManifestBuilder, Subset,
};
use std::fs;

fn labels() -> Vec<String> {
    ["c", "f", "p"].iter().map(|s| s.to_string()).collect()
}

#[test]
fn builder_rejects_sample_in_two_subsets() {
    let mut builder = ManifestBuilder::new(labels());
    builder.insert("clip_a", "c", Subset::Training).unwrap();
    let err = builder.insert("clip_a", "c", Subset::Test).unwrap_err();
    match err {
        ContractError::DuplicateSample {
            existing,
            requested,
            ..
        } => {
            assert_eq!(existing, Subset::Training);
            assert_eq!(requested, Subset::Test);
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn builder_rejects_unknown_label() {
    let mut builder = ManifestBuilder::new(labels());
    builder.insert("clip_a", "zz", Subset::Validation).unwrap();
    assert!(matches!(
        builder.finish(),
        Err(ContractError::UnknownLabel { .. })
    ));
}

#[test]
fn manifest_json_uses_lowercase_subsets() {
    let mut builder = ManifestBuilder::new(labels());
    builder.insert("clip_a", "f", Subset::Training).unwrap();
    builder.insert("clip_b", "p", Subset::Test).unwrap();
    let manifest = builder.finish().unwrap();

    let json = serde_json::to_value(&manifest).unwrap();
    assert_eq!(json["labels"][1], "f");
    assert_eq!(json["database"]["clip_a"]["subset"], "training");
    assert_eq!(json["database"]["clip_b"]["annotations"]["label"], "p");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifest.json");
    manifest.save(&path).unwrap();
    let loaded = DatasetManifest::load(&path).unwrap();
    assert_eq!(loaded.count(Subset::Training), 1);
    assert_eq!(loaded.count(Subset::Validation), 0);
    assert_eq!(loaded.label_index("p"), Some(2));
}

#[test]
fn annotation_rows_expose_animal_and_list_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("annotations.csv");
    fs::write(
        &path,
        "Location,Label,MeanID,Notes\nvid_001,c,MC16_2:0001,x\nvid_002, f ,TI2_4:0007,\n",
    )
    .unwrap();
    let records = load_annotation_records(&path).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].animal(), "MC16_2");
    assert_eq!(records[1].label, "f");
    assert_eq!(records[1].list_line(), "f/vid_002");
    let lookup = mean_id_lookup(&records);
    assert_eq!(lookup["vid_002"], "TI2_4:0007");
}

#[test]
fn mean_file_parses_stats_and_rejects_short_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("means.csv");
    fs::write(
        &path,
        "id,m0,m1,m2,s0,s1,s2\nMC16_2:0001,100,110,120,30,31,32\n",
    )
    .unwrap();
    let stats = load_mean_file(&path).unwrap();
    let s = stats["MC16_2:0001"];
    assert_eq!(s.mean, [100.0, 110.0, 120.0]);
    assert_eq!(s.std, [30.0, 31.0, 32.0]);

    fs::write(&path, "id,m0,m1,m2,s0,s1,s2\nbad,1,2\n").unwrap();
    assert!(matches!(
        load_mean_file(&path),
        Err(ContractError::MalformedRow { row: 1, .. })
    ));
}
