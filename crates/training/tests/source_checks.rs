use data_contracts::{ManifestBuilder, Subset};
use std::fs;
use training::{check_label_range, normalization_from_files};

#[test]
fn label_range_follows_n_classes() -> anyhow::Result<()> {
    let mut builder = ManifestBuilder::new(vec!["c".into(), "f".into(), "p".into()]);
    builder.insert("vid_a", "c", Subset::Training)?;
    builder.insert("vid_b", "p", Subset::Validation)?;
    let manifest = builder.finish()?;

    assert!(check_label_range(&manifest, 3).is_ok());
    // unused trailing classes are fine, used ones are not
    let err = check_label_range(&manifest, 2).unwrap_err();
    assert!(err.to_string().contains("vid_b"), "{err:#}");
    Ok(())
}

#[test]
fn normalization_needs_both_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let annotation = tmp.path().join("annotation.csv");
    fs::write(&annotation, "Label,Location,MeanID\nc,vid_a,cow1:day1\n")?;
    let means = tmp.path().join("means.csv");
    fs::write(&means, "id,m0,m1,m2,s0,s1,s2\ncow1:day1,1,2,3,4,5,6\n")?;

    assert!(normalization_from_files(Some(annotation.as_path()), None).is_err());
    assert!(normalization_from_files(None, Some(means.as_path())).is_err());
    assert!(normalization_from_files(None, None)?.is_empty());

    let norm = normalization_from_files(Some(annotation.as_path()), Some(means.as_path()))?;
    let stats = norm.stats_for("vid_a")?;
    assert_eq!(stats.mean, [1.0, 2.0, 3.0]);
    assert_eq!(stats.std, [4.0, 5.0, 6.0]);
    Ok(())
}
