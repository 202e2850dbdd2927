use burn::backend::{ndarray::NdArray, Autodiff};
use burn::tensor::{Distribution, Tensor, TensorData};
use models::prelude::*;

type B = NdArray<f32>;
type AD = Autodiff<NdArray<f32>>;

fn tiny_config() -> DannModelConfig {
    DannModelConfig {
        n_classes: 4,
        in_channels: 3,
        features: 8,
        hidden: 6,
    }
}

#[test]
fn forward_shapes() {
    let device = Default::default();
    let model = tiny_config().init::<B>(&device);
    let clips = Tensor::<B, 5>::random([2, 3, 3, 8, 8], Distribution::Default, &device);
    let out = model.forward_adversarial(clips.clone(), 0.3);
    assert_eq!(out.labels.dims(), [2, 4]);
    assert_eq!(out.domains.dims(), [2, DOMAIN_CLASSES]);
    assert_eq!(model.forward_labels(clips).dims(), [2, 4]);
    assert_eq!(model.arch(), "dann-conv-8");
    assert_eq!(tiny_config().arch(), model.arch());
}

#[test]
fn label_logits_do_not_depend_on_alpha() {
    let device = Default::default();
    let model = tiny_config().init::<B>(&device);
    let clips = Tensor::<B, 5>::random([1, 3, 2, 6, 6], Distribution::Default, &device);
    let a = model.forward_adversarial(clips.clone(), 0.0).labels;
    let b = model.forward_adversarial(clips, 0.9).labels;
    let a = a.into_data().to_vec::<f32>().unwrap();
    let b = b.into_data().to_vec::<f32>().unwrap();
    for (x, y) in a.iter().zip(b.iter()) {
        assert!((x - y).abs() < 1e-6);
    }
}

#[test]
fn reverse_gradient_is_identity_forward_and_negated_backward() {
    let device = Default::default();
    let x = Tensor::<AD, 1>::from_data(TensorData::new(vec![1.0f32, -2.0, 3.5], [3]), &device)
        .require_grad();
    let y = reverse_gradient(x.clone(), 0.25);
    let values = y.clone().into_data().to_vec::<f32>().unwrap();
    assert!((values[0] - 1.0).abs() < 1e-6);
    assert!((values[1] + 2.0).abs() < 1e-6);
    assert!((values[2] - 3.5).abs() < 1e-6);

    let grads = y.sum().backward();
    let grad = x.grad(&grads).expect("gradient for x");
    for g in grad.into_data().to_vec::<f32>().unwrap() {
        assert!((g + 0.25).abs() < 1e-6);
    }
}
