//! Burn models for domain-adversarial clip classification.
//!
//! `DannModel` shares one feature extractor between a label head and a domain head.
//! The domain head sits behind a gradient-reversal layer: its loss is minimized by the
//! head itself while the extractor receives the negated gradient, scaled by `alpha`.
//!
//! Models are exposed to the training loop through [`AdversarialClassifier`], so the
//! loop never depends on a concrete architecture.

use burn::module::Module;
use burn::nn;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::PaddingConfig2d;
use burn::tensor::activation::relu;
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

/// Domain head output width: training domain (0) vs test domain (1).
pub const DOMAIN_CLASSES: usize = 2;

/// Logits from one adversarial forward pass.
#[derive(Debug, Clone)]
pub struct AdversarialOutput<B: Backend> {
    /// Class logits, shape `[N, n_classes]`.
    pub labels: Tensor<B, 2>,
    /// Domain logits, shape `[N, 2]`.
    pub domains: Tensor<B, 2>,
}

/// Contract between the training loop and a domain-adversarial model.
pub trait AdversarialClassifier<B: Backend> {
    /// Forward clips `[N, C, T, H, W]`; `alpha` scales the reversed gradient.
    fn forward_adversarial(&self, clips: Tensor<B, 5>, alpha: f64) -> AdversarialOutput<B>;
    /// Label logits only (evaluation).
    fn forward_labels(&self, clips: Tensor<B, 5>) -> Tensor<B, 2>;
    /// Architecture tag persisted in checkpoints.
    fn arch(&self) -> String;
}

/// Identity on the forward pass; multiplies the incoming gradient by `-alpha` on backward.
pub fn reverse_gradient<B: Backend, const D: usize>(x: Tensor<B, D>, alpha: f64) -> Tensor<B, D> {
    let passthrough = x.clone().detach().mul_scalar(1.0 + alpha);
    x.mul_scalar(-alpha) + passthrough
}

#[derive(Debug, Clone)]
pub struct DannModelConfig {
    pub n_classes: usize,
    pub in_channels: usize,
    /// Width of the shared feature vector.
    pub features: usize,
    /// Hidden width of both heads.
    pub hidden: usize,
}

impl Default for DannModelConfig {
    fn default() -> Self {
        Self {
            n_classes: 10,
            in_channels: 3,
            features: 32,
            hidden: 64,
        }
    }
}

impl DannModelConfig {
    pub fn arch(&self) -> String {
        arch_tag(self.features)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> DannModel<B> {
        DannModel::new(self.clone(), device)
    }
}

fn arch_tag(features: usize) -> String {
    format!("dann-conv-{features}")
}

#[derive(Debug, Module)]
pub struct DannModel<B: Backend> {
    conv1: Conv2d<B>,
    conv2: Conv2d<B>,
    pool: AdaptiveAvgPool2d,
    label_hidden: nn::Linear<B>,
    label_out: nn::Linear<B>,
    domain_hidden: nn::Linear<B>,
    domain_out: nn::Linear<B>,
    features: usize,
}

impl<B: Backend> DannModel<B> {
    pub fn new(cfg: DannModelConfig, device: &B::Device) -> Self {
        let stem_width = (cfg.features / 2).max(1);
        let conv1 = Conv2dConfig::new([cfg.in_channels, stem_width], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let conv2 = Conv2dConfig::new([stem_width, cfg.features], [3, 3])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init(device);
        let pool = AdaptiveAvgPool2dConfig::new([1, 1]).init();
        let label_hidden = nn::LinearConfig::new(cfg.features, cfg.hidden).init(device);
        let label_out = nn::LinearConfig::new(cfg.hidden, cfg.n_classes.max(1)).init(device);
        let domain_hidden = nn::LinearConfig::new(cfg.features, cfg.hidden).init(device);
        let domain_out = nn::LinearConfig::new(cfg.hidden, DOMAIN_CLASSES).init(device);
        Self {
            conv1,
            conv2,
            pool,
            label_hidden,
            label_out,
            domain_hidden,
            domain_out,
            features: cfg.features,
        }
    }

    /// Shared extractor: per-frame convolutions, spatial pooling, then a temporal mean.
    /// `[N, C, T, H, W]` -> `[N, features]`.
    pub fn extract_features(&self, clips: Tensor<B, 5>) -> Tensor<B, 2> {
        let [n, c, t, h, w] = clips.dims();
        let frames = clips.swap_dims(1, 2).reshape([n * t, c, h, w]);
        let x = relu(self.conv1.forward(frames));
        let x = relu(self.conv2.forward(x));
        let x = self.pool.forward(x).reshape([n, t, self.features]);
        x.mean_dim(1).reshape([n, self.features])
    }

    fn label_head(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.label_out.forward(relu(self.label_hidden.forward(features)))
    }

    fn domain_head(&self, features: Tensor<B, 2>) -> Tensor<B, 2> {
        self.domain_out
            .forward(relu(self.domain_hidden.forward(features)))
    }
}

impl<B: Backend> AdversarialClassifier<B> for DannModel<B> {
    fn forward_adversarial(&self, clips: Tensor<B, 5>, alpha: f64) -> AdversarialOutput<B> {
        let features = self.extract_features(clips);
        let labels = self.label_head(features.clone());
        let domains = self.domain_head(reverse_gradient(features, alpha));
        AdversarialOutput { labels, domains }
    }

    fn forward_labels(&self, clips: Tensor<B, 5>) -> Tensor<B, 2> {
        self.label_head(self.extract_features(clips))
    }

    fn arch(&self) -> String {
        arch_tag(self.features)
    }
}

pub mod prelude {
    pub use super::{
        reverse_gradient, AdversarialClassifier, AdversarialOutput, DannModel, DannModelConfig,
        DOMAIN_CLASSES,
    };
}
