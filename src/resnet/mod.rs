//! CIFAR-style residual networks (He et al., 2015).
//!
//! ```text
//! (N, 3, H, W) ─ conv3x3 ─ BN ─ ReLU ─ layer1 ─ layer2 ─ layer3 ─ layer4
//!              ─ global avg pool ─ flatten ─ linear ─ (N, num_classes)
//! ```
//!
//! The stem keeps the input resolution (3x3, stride 1), as suits 32x32
//! images. Stages 2..4 halve it in their first block.
//!
//! # References
//!
//! - He, K., Zhang, X., Ren, S., & Sun, J. (2016). Deep residual learning
//!   for image recognition. CVPR.

mod block;
mod config;
mod stage;

pub use block::{BasicBlock, Block, BlockSite, Bottleneck, Shortcut};
pub use config::{BlockKind, ResNetConfig, ResNetDepth, StageSpec};
pub use stage::{build_stages, Stage};

use crate::diagnostics::{FeatureObserver, NoopObserver};
use crate::error::{ResNetError, Result};
use crate::nn::{
    BatchNorm2d, Flatten, GlobalAvgPool2d, Linear, Module, ReLU, SeedStream, Sequential,
};
use crate::tensor::Tensor;

/// A residual network classifier.
///
/// # Example
///
/// ```
/// use resnet_sparsity::nn::Module;
/// use resnet_sparsity::{BlockKind, ResNet, ResNetConfig, Tensor};
///
/// let config = ResNetConfig::custom(BlockKind::Basic, [1, 1, 1, 1])
///     .with_widths(4, [4, 4, 8, 8])
///     .with_seed(0);
/// let net = ResNet::new(config).unwrap();
///
/// let logits = net.forward(&Tensor::zeros(&[2, 3, 8, 8])).unwrap();
/// assert_eq!(logits.shape(), &[2, 10]);
/// ```
#[derive(Debug)]
pub struct ResNet {
    config: ResNetConfig,
    stem: Sequential,
    stages: Vec<Stage>,
    pool: GlobalAvgPool2d,
    flatten: Flatten,
    linear: Linear,
}

impl ResNet {
    /// Build a network from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::InvalidConfig`] if any count, width or stride
    /// is zero.
    pub fn new(config: ResNetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    /// A named depth with `num_classes` outputs.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::InvalidConfig`] if `num_classes` is zero.
    pub fn from_depth(depth: ResNetDepth, num_classes: usize) -> Result<Self> {
        Self::new(ResNetConfig::for_depth(depth).with_num_classes(num_classes))
    }

    /// ResNet-18 for 10 classes.
    #[must_use]
    pub fn resnet18() -> Self {
        Self::build(ResNetConfig::for_depth(ResNetDepth::ResNet18))
    }

    /// ResNet-34 for 10 classes.
    #[must_use]
    pub fn resnet34() -> Self {
        Self::build(ResNetConfig::for_depth(ResNetDepth::ResNet34))
    }

    /// ResNet-50 for 10 classes.
    #[must_use]
    pub fn resnet50() -> Self {
        Self::build(ResNetConfig::for_depth(ResNetDepth::ResNet50))
    }

    /// ResNet-101 for 10 classes.
    #[must_use]
    pub fn resnet101() -> Self {
        Self::build(ResNetConfig::for_depth(ResNetDepth::ResNet101))
    }

    /// ResNet-152 for 10 classes.
    #[must_use]
    pub fn resnet152() -> Self {
        Self::build(ResNetConfig::for_depth(ResNetDepth::ResNet152))
    }

    // `config` must already be valid.
    fn build(config: ResNetConfig) -> Self {
        let mut seeds = SeedStream::new(config.seed);

        let stem = Sequential::new()
            .add(block::conv3x3(
                config.in_channels,
                config.stem_width,
                1,
                &mut seeds,
            ))
            .add(BatchNorm2d::new(config.stem_width))
            .add(ReLU::new());

        let (stages, feature_channels) = build_stages(
            config.block,
            &config.stage_specs(),
            config.stem_width,
            &mut seeds,
        );
        let linear = Linear::with_seed(feature_channels, config.num_classes, seeds.next_seed());

        tracing::debug!(
            block = ?config.block,
            num_blocks = ?config.num_blocks,
            feature_channels,
            num_classes = config.num_classes,
            "built resnet"
        );

        Self {
            config,
            stem,
            stages,
            pool: GlobalAvgPool2d::new(),
            flatten: Flatten::new(),
            linear,
        }
    }

    /// The configuration the network was built from.
    #[must_use]
    pub fn config(&self) -> &ResNetConfig {
        &self.config
    }

    /// The four stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Total number of residual blocks.
    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.stages.iter().map(|s| s.blocks().len()).sum()
    }

    /// Block variant used throughout.
    #[must_use]
    pub fn block_kind(&self) -> BlockKind {
        self.config.block
    }

    /// Number of output logits.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    /// Forward pass reporting intermediate feature maps to `observer`.
    ///
    /// Returns logits of shape `(N, num_classes)`.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if `input` is not
    /// `(N, in_channels, H, W)` with `H, W >= 1`, and propagates observer
    /// failures such as [`ResNetError::Io`].
    pub fn forward_with(
        &self,
        input: &Tensor,
        observer: &mut dyn FeatureObserver,
    ) -> Result<Tensor> {
        self.check_input(input)?;

        let mut x = self.stem.forward(input)?;
        for stage in &self.stages {
            x = stage.forward_with(&x, observer)?;
            tracing::debug!(stage = stage.index(), shape = ?x.shape(), "stage output");
        }

        let pooled = self.flatten.forward(&self.pool.forward(&x)?)?;
        self.linear.forward(&pooled)
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        let (_, channels, height, width) = input.dims4("ResNet")?;
        if channels != self.config.in_channels || height == 0 || width == 0 {
            return Err(ResNetError::shape_mismatch(
                "ResNet",
                format!("(N, {}, H >= 1, W >= 1)", self.config.in_channels),
                format!("{:?}", input.shape()),
            ));
        }
        Ok(())
    }
}

impl Module for ResNet {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_with(input, &mut NoopObserver)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.stem.parameters();
        for stage in &self.stages {
            params.extend(stage.parameters());
        }
        params.extend(self.linear.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.stem.parameters_mut();
        for stage in &mut self.stages {
            params.extend(stage.parameters_mut());
        }
        params.extend(self.linear.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.stem.train();
        self.stages.iter_mut().for_each(Module::train);
    }

    fn eval(&mut self) {
        self.stem.eval();
        self.stages.iter_mut().for_each(Module::eval);
    }

    fn training(&self) -> bool {
        self.stem.training()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ProbePoint;

    fn narrow(block: BlockKind, num_blocks: [usize; 4]) -> ResNetConfig {
        ResNetConfig::custom(block, num_blocks)
            .with_widths(4, [4, 4, 8, 8])
            .with_seed(3)
    }

    #[derive(Default)]
    struct Recorder(Vec<ProbePoint>);

    impl FeatureObserver for Recorder {
        fn observe(&mut self, point: ProbePoint, _tensor: &Tensor) -> Result<()> {
            self.0.push(point);
            Ok(())
        }
    }

    #[test]
    fn test_resnet18_layout() {
        let net = ResNet::resnet18();
        assert_eq!(net.num_blocks(), 8);
        assert_eq!(net.block_kind(), BlockKind::Basic);

        let strides: Vec<Vec<usize>> = net
            .stages()
            .iter()
            .map(|s| s.blocks().iter().map(Block::stride).collect())
            .collect();
        assert_eq!(strides, vec![vec![1, 1], vec![2, 1], vec![2, 1], vec![2, 1]]);
    }

    #[test]
    fn test_named_depth_block_counts() {
        let counts: Vec<usize> = ResNetDepth::ALL
            .iter()
            .map(|d| d.num_blocks().iter().sum())
            .collect();
        assert_eq!(counts, vec![8, 16, 16, 33, 50]);
    }

    #[test]
    fn test_forward_shape_basic() {
        let net = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1]).with_num_classes(7)).unwrap();
        let y = net.forward(&Tensor::ones(&[3, 3, 8, 8])).unwrap();
        assert_eq!(y.shape(), &[3, 7]);
    }

    #[test]
    fn test_forward_shape_bottleneck() {
        let net = ResNet::new(narrow(BlockKind::Bottleneck, [1, 2, 1, 1])).unwrap();
        assert_eq!(net.config().feature_channels(), 32);
        let y = net.forward(&Tensor::ones(&[1, 3, 5, 7])).unwrap();
        assert_eq!(y.shape(), &[1, 10]);
    }

    #[test]
    fn test_single_pixel_input() {
        let net = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1])).unwrap();
        let y = net.forward(&Tensor::ones(&[2, 3, 1, 1])).unwrap();
        assert_eq!(y.shape(), &[2, 10]);
    }

    #[test]
    fn test_wrong_channels_rejected() {
        let net = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1])).unwrap();
        let err = net.forward(&Tensor::ones(&[1, 1, 8, 8])).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch { op: "ResNet", .. }));

        let err = net.forward(&Tensor::ones(&[3, 8, 8])).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch { .. }));

        let err = net.forward(&Tensor::ones(&[1, 3, 0, 8])).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = ResNet::from_depth(ResNetDepth::ResNet18, 0).unwrap_err();
        assert!(matches!(err, ResNetError::InvalidConfig { .. }));

        let err = ResNet::new(narrow(BlockKind::Basic, [1, 0, 1, 1])).unwrap_err();
        assert!(matches!(err, ResNetError::InvalidConfig { .. }));
    }

    #[test]
    fn test_probe_points_in_order() {
        let net = ResNet::new(narrow(BlockKind::Basic, [2, 1, 1, 1])).unwrap();
        let mut rec = Recorder::default();
        net.forward_with(&Tensor::ones(&[1, 3, 4, 4]), &mut rec).unwrap();

        let names: Vec<String> = rec.0.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            [
                "layer1.0.relu1",
                "layer1.0",
                "layer1.1.relu1",
                "layer1.1",
                "layer1",
                "layer2.0.relu1",
                "layer2.0",
                "layer2",
                "layer3.0.relu1",
                "layer3.0",
                "layer3",
                "layer4.0.relu1",
                "layer4.0",
                "layer4",
            ]
        );
    }

    #[test]
    fn test_bottleneck_reports_stage_outputs_only() {
        let net = ResNet::new(narrow(BlockKind::Bottleneck, [1, 1, 1, 1])).unwrap();
        let mut rec = Recorder::default();
        net.forward_with(&Tensor::ones(&[1, 3, 4, 4]), &mut rec).unwrap();
        assert!(rec.0.iter().all(|p| !p.is_block()));
        assert_eq!(rec.0.len(), 4);
    }

    #[test]
    fn test_observer_does_not_change_output() {
        let net = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1])).unwrap();
        let x = Tensor::from_fn(&[2, 3, 6, 6], |i| ((i % 13) as f32 - 6.0) / 3.0);
        let plain = net.forward(&x).unwrap();
        let observed = net.forward_with(&x, &mut Recorder::default()).unwrap();
        assert_eq!(plain, observed);
    }

    #[test]
    fn test_seeded_networks_agree() {
        let a = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1])).unwrap();
        let b = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1])).unwrap();
        let x = Tensor::from_fn(&[1, 3, 4, 4], |i| i as f32 / 48.0);
        assert_eq!(a.forward(&x).unwrap(), b.forward(&x).unwrap());
    }

    #[test]
    fn test_parameter_count() {
        let net = ResNet::new(narrow(BlockKind::Basic, [1, 1, 1, 1]).with_num_classes(2)).unwrap();
        // stem 3*4*9 + 2*4
        let stem = 108 + 8;
        // layer1: 4->4 identity, two convs 4*4*9 + two BNs
        let layer1 = 2 * 144 + 2 * 8;
        // layer2: 4->4 stride 2, projection 4*4 + BN
        let layer2 = 2 * 144 + 2 * 8 + 16 + 8;
        // layer3: 4->8 stride 2: 4*8*9 + 8*8*9 + 2*16 + projection 32 + 16
        let layer3 = 288 + 576 + 32 + 32 + 16;
        // layer4: 8->8 stride 2
        let layer4 = 2 * 576 + 2 * 16 + 64 + 16;
        let head = 8 * 2 + 2;
        assert_eq!(
            net.num_parameters(),
            stem + layer1 + layer2 + layer3 + layer4 + head
        );
    }
}
