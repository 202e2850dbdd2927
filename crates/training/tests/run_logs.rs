use std::fs;
use training::logger::{EPOCH_HEADER, EVAL_HEADER};
use training::{EpochRow, EvalRow, RunLogs, TableLogger};

#[test]
fn new_runs_truncate_and_write_headers() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("val.log");
    fs::write(&path, "stale\n")?;
    let mut log = TableLogger::<EvalRow>::open(&path, &EVAL_HEADER, false)?;
    log.log(&EvalRow {
        epoch: 1,
        loss: 0.5,
        acc: 0.25,
    })?;
    let text = fs::read_to_string(&path)?;
    assert_eq!(text, "epoch\tloss\tacc\n1\t0.5\t0.25\n");
    Ok(())
}

#[test]
fn resumed_runs_append_without_header() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("train.log");
    let row = |epoch| EpochRow {
        epoch,
        loss: 1.0,
        train_label_acc: 0.5,
        train_domain_acc: 0.5,
        test_label_acc: 0.0,
        test_domain_acc: 1.0,
        lr: 0.1,
    };
    {
        let mut log = TableLogger::<EpochRow>::open(&path, &EPOCH_HEADER, false)?;
        log.log(&row(1))?;
    }
    {
        let mut log = TableLogger::<EpochRow>::open(&path, &EPOCH_HEADER, true)?;
        log.log(&row(2))?;
    }
    let text = fs::read_to_string(&path)?;
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(
        lines[0],
        "epoch\tloss\ttrain_label_acc\ttrain_domain_acc\ttest_label_acc\ttest_domain_acc\tlr"
    );
    assert!(lines[2].starts_with("2\t"));
    Ok(())
}

#[test]
fn run_logs_create_all_four_tables() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let logs = RunLogs::open(tmp.path(), false)?;
    for name in ["train.log", "train_batch.log", "val.log", "test.log"] {
        assert!(tmp.path().join(name).is_file(), "{name} missing");
    }
    assert_eq!(logs.val.path(), tmp.path().join("val.log"));
    let batch_header = fs::read_to_string(tmp.path().join("train_batch.log"))?;
    assert!(batch_header.starts_with("epoch\tbatch\titer\tloss\t"));
    Ok(())
}
