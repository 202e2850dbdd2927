use training::{alpha_ramp, PlateauScheduler};

#[test]
fn alpha_ramp_is_monotone_within_each_epoch_and_bounded() {
    let n_epochs = 5;
    let len_train = 7;
    for epoch in 1..=n_epochs {
        let alphas: Vec<f64> = (0..len_train)
            .map(|i| alpha_ramp(i, epoch, n_epochs, len_train))
            .collect();
        for pair in alphas.windows(2) {
            assert!(pair[1] >= pair[0], "epoch {epoch}: {alphas:?}");
        }
        for a in &alphas {
            assert!((0.0..1.0).contains(a), "alpha {a} out of range");
        }
    }
    // later epochs keep growing
    assert!(alpha_ramp(0, 2, n_epochs, len_train) > alpha_ramp(0, 1, n_epochs, len_train));
}

#[test]
fn plateau_waits_for_patience_before_reducing() {
    let mut s = PlateauScheduler::new(0.1, 2, 0.1);
    assert_eq!(s.step(1.0), 0.1);
    assert_eq!(s.step(0.5), 0.1);
    // three epochs without a relative improvement of 1e-4
    assert_eq!(s.step(0.49999), 0.1);
    assert_eq!(s.step(0.6), 0.1);
    let lr = s.step(0.5);
    assert!((lr - 0.01).abs() < 1e-12, "lr {lr}");
    assert_eq!(s.num_bad_epochs(), 0);
    assert_eq!(s.best(), Some(0.5));
}

#[test]
fn plateau_state_survives_json() {
    let mut s = PlateauScheduler::new(0.1, 1, 0.5);
    s.step(2.0);
    s.step(3.0);
    let json = serde_json::to_string(&s).unwrap();
    let mut restored: PlateauScheduler = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, s);
    assert_eq!(restored.step(3.0), s.step(3.0));
}
