//! Residual blocks (He et al., 2015).
//!
//! Both variants compute `relu(path(x) + shortcut(x))`. The shortcut is the
//! identity unless the block changes resolution (`stride != 1`) or channel
//! count (`in_channels != expansion * planes`), in which case it is a 1x1
//! strided convolution followed by batch normalization.

use super::config::BlockKind;
use crate::diagnostics::{FeatureObserver, NoopObserver, ProbePoint};
use crate::error::Result;
use crate::nn::{BatchNorm2d, Conv2d, Module, SeedStream, Sequential};
use crate::tensor::Tensor;

/// 3x3 convolution with padding 1 and no bias.
pub(crate) fn conv3x3(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    seeds: &mut SeedStream,
) -> Conv2d {
    Conv2d::with_options(in_channels, out_channels, 3, stride, 1, false, seeds.next_seed())
}

/// 1x1 convolution with no bias.
pub(crate) fn conv1x1(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
    seeds: &mut SeedStream,
) -> Conv2d {
    Conv2d::with_options(in_channels, out_channels, 1, stride, 0, false, seeds.next_seed())
}

/// Position of a block inside the network, used to name probe points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockSite {
    /// Stage number (1-based)
    pub stage: usize,
    /// Block index within the stage
    pub block: usize,
}

impl BlockSite {
    fn activation(self) -> ProbePoint {
        ProbePoint::BlockActivation {
            stage: self.stage,
            block: self.block,
        }
    }

    fn output(self) -> ProbePoint {
        ProbePoint::BlockOutput {
            stage: self.stage,
            block: self.block,
        }
    }
}

/// Skip connection of a residual block.
#[derive(Debug)]
pub enum Shortcut {
    /// Input passed through unchanged.
    Identity,
    /// 1x1 strided convolution + batch normalization.
    Projection(Sequential),
}

impl Shortcut {
    /// Shortcut for a block with the given geometry.
    fn for_block(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        seeds: &mut SeedStream,
    ) -> Self {
        if stride != 1 || in_channels != out_channels {
            Self::Projection(
                Sequential::new()
                    .add(conv1x1(in_channels, out_channels, stride, seeds))
                    .add(BatchNorm2d::new(out_channels)),
            )
        } else {
            Self::Identity
        }
    }

    /// Whether the shortcut is a learned projection.
    #[must_use]
    pub fn is_projection(&self) -> bool {
        matches!(self, Self::Projection(_))
    }
}

impl Module for Shortcut {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        match self {
            Self::Identity => Ok(input.clone()),
            Self::Projection(projection) => projection.forward(input),
        }
    }

    fn parameters(&self) -> Vec<&Tensor> {
        match self {
            Self::Identity => Vec::new(),
            Self::Projection(projection) => projection.parameters(),
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match self {
            Self::Identity => Vec::new(),
            Self::Projection(projection) => projection.parameters_mut(),
        }
    }

    fn train(&mut self) {
        if let Self::Projection(projection) = self {
            projection.train();
        }
    }

    fn eval(&mut self) {
        if let Self::Projection(projection) = self {
            projection.eval();
        }
    }
}

/// Basic residual block: two 3x3 convolutions, expansion 1.
///
/// ```text
/// x ─ conv3x3(stride) ─ BN ─ ReLU ─ conv3x3 ─ BN ─(+)─ ReLU
///  └──────────────── shortcut ──────────────────┘
/// ```
///
/// Probe points: after the first ReLU and after the final ReLU.
#[derive(Debug)]
pub struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    shortcut: Shortcut,
    stride: usize,
}

impl BasicBlock {
    /// Expansion factor for this block type.
    pub const EXPANSION: usize = 1;

    /// Create a block mapping `in_channels` to `planes` channels.
    #[must_use]
    pub fn new(in_channels: usize, planes: usize, stride: usize, seeds: &mut SeedStream) -> Self {
        Self {
            conv1: conv3x3(in_channels, planes, stride, seeds),
            bn1: BatchNorm2d::new(planes),
            conv2: conv3x3(planes, planes, 1, seeds),
            bn2: BatchNorm2d::new(planes),
            shortcut: Shortcut::for_block(in_channels, planes * Self::EXPANSION, stride, seeds),
            stride,
        }
    }

    /// The skip connection.
    #[must_use]
    pub fn shortcut(&self) -> &Shortcut {
        &self.shortcut
    }

    /// Forward pass reporting to `observer` at `site`.
    ///
    /// # Errors
    ///
    /// Fails on a shape mismatch or an observer error.
    pub fn forward_with(
        &self,
        input: &Tensor,
        site: BlockSite,
        observer: &mut dyn FeatureObserver,
    ) -> Result<Tensor> {
        let out = self.bn1.forward(&self.conv1.forward(input)?)?.relu();
        observer.observe(site.activation(), &out)?;

        let out = self.bn2.forward(&self.conv2.forward(&out)?)?;
        let out = out.add(&self.shortcut.forward(input)?)?.relu();
        observer.observe(site.output(), &out)?;

        Ok(out)
    }
}

impl Module for BasicBlock {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.forward_with(input, BlockSite::default(), &mut NoopObserver)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.conv1.parameters();
        params.extend(self.bn1.parameters());
        params.extend(self.conv2.parameters());
        params.extend(self.bn2.parameters());
        params.extend(self.shortcut.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.bn1.parameters_mut());
        params.extend(self.conv2.parameters_mut());
        params.extend(self.bn2.parameters_mut());
        params.extend(self.shortcut.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.bn1.train();
        self.bn2.train();
        self.shortcut.train();
    }

    fn eval(&mut self) {
        self.bn1.eval();
        self.bn2.eval();
        self.shortcut.eval();
    }

    fn training(&self) -> bool {
        self.bn1.training()
    }
}

/// Bottleneck residual block: 1x1 reduce, 3x3, 1x1 expand, expansion 4.
///
/// ```text
/// x ─ conv1x1 ─ BN ─ ReLU ─ conv3x3(stride) ─ BN ─ ReLU ─ conv1x1 ─ BN ─(+)─ ReLU
///  └──────────────────────────── shortcut ────────────────────────────┘
/// ```
///
/// Emits no probe points.
#[derive(Debug)]
pub struct Bottleneck {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    conv3: Conv2d,
    bn3: BatchNorm2d,
    shortcut: Shortcut,
    stride: usize,
}

impl Bottleneck {
    /// Expansion factor for this block type.
    pub const EXPANSION: usize = 4;

    /// Create a block mapping `in_channels` to `4 * planes` channels.
    #[must_use]
    pub fn new(in_channels: usize, planes: usize, stride: usize, seeds: &mut SeedStream) -> Self {
        let out_channels = planes * Self::EXPANSION;
        Self {
            conv1: conv1x1(in_channels, planes, 1, seeds),
            bn1: BatchNorm2d::new(planes),
            conv2: conv3x3(planes, planes, stride, seeds),
            bn2: BatchNorm2d::new(planes),
            conv3: conv1x1(planes, out_channels, 1, seeds),
            bn3: BatchNorm2d::new(out_channels),
            shortcut: Shortcut::for_block(in_channels, out_channels, stride, seeds),
            stride,
        }
    }

    /// The skip connection.
    #[must_use]
    pub fn shortcut(&self) -> &Shortcut {
        &self.shortcut
    }
}

impl Module for Bottleneck {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let out = self.bn1.forward(&self.conv1.forward(input)?)?.relu();
        let out = self.bn2.forward(&self.conv2.forward(&out)?)?.relu();
        let out = self.bn3.forward(&self.conv3.forward(&out)?)?;
        Ok(out.add(&self.shortcut.forward(input)?)?.relu())
    }

    fn parameters(&self) -> Vec<&Tensor> {
        let mut params = self.conv1.parameters();
        params.extend(self.bn1.parameters());
        params.extend(self.conv2.parameters());
        params.extend(self.bn2.parameters());
        params.extend(self.conv3.parameters());
        params.extend(self.bn3.parameters());
        params.extend(self.shortcut.parameters());
        params
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut params = self.conv1.parameters_mut();
        params.extend(self.bn1.parameters_mut());
        params.extend(self.conv2.parameters_mut());
        params.extend(self.bn2.parameters_mut());
        params.extend(self.conv3.parameters_mut());
        params.extend(self.bn3.parameters_mut());
        params.extend(self.shortcut.parameters_mut());
        params
    }

    fn train(&mut self) {
        self.bn1.train();
        self.bn2.train();
        self.bn3.train();
        self.shortcut.train();
    }

    fn eval(&mut self) {
        self.bn1.eval();
        self.bn2.eval();
        self.bn3.eval();
        self.shortcut.eval();
    }

    fn training(&self) -> bool {
        self.bn1.training()
    }
}

/// A residual block of either kind.
#[derive(Debug)]
pub enum Block {
    /// See [`BasicBlock`].
    Basic(BasicBlock),
    /// See [`Bottleneck`].
    Bottleneck(Bottleneck),
}

impl Block {
    /// Create a block of `kind`.
    #[must_use]
    pub fn new(
        kind: BlockKind,
        in_channels: usize,
        planes: usize,
        stride: usize,
        seeds: &mut SeedStream,
    ) -> Self {
        match kind {
            BlockKind::Basic => Self::Basic(BasicBlock::new(in_channels, planes, stride, seeds)),
            BlockKind::Bottleneck => {
                Self::Bottleneck(Bottleneck::new(in_channels, planes, stride, seeds))
            }
        }
    }

    /// Block variant.
    #[must_use]
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Basic(_) => BlockKind::Basic,
            Self::Bottleneck(_) => BlockKind::Bottleneck,
        }
    }

    /// Stride of the block (applied by its first spatial convolution).
    #[must_use]
    pub fn stride(&self) -> usize {
        match self {
            Self::Basic(b) => b.stride,
            Self::Bottleneck(b) => b.stride,
        }
    }

    /// The skip connection.
    #[must_use]
    pub fn shortcut(&self) -> &Shortcut {
        match self {
            Self::Basic(b) => b.shortcut(),
            Self::Bottleneck(b) => b.shortcut(),
        }
    }

    /// Forward pass reporting to `observer` at `site`.
    ///
    /// # Errors
    ///
    /// Fails on a shape mismatch or an observer error.
    pub fn forward_with(
        &self,
        input: &Tensor,
        site: BlockSite,
        observer: &mut dyn FeatureObserver,
    ) -> Result<Tensor> {
        match self {
            Self::Basic(b) => b.forward_with(input, site, observer),
            Self::Bottleneck(b) => b.forward(input),
        }
    }

    fn inner(&self) -> &dyn Module {
        match self {
            Self::Basic(b) => b,
            Self::Bottleneck(b) => b,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Module {
        match self {
            Self::Basic(b) => b,
            Self::Bottleneck(b) => b,
        }
    }
}

impl Module for Block {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.inner().forward(input)
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.inner().parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.inner_mut().parameters_mut()
    }

    fn train(&mut self) {
        self.inner_mut().train();
    }

    fn eval(&mut self) {
        self.inner_mut().eval();
    }

    fn training(&self) -> bool {
        self.inner().training()
    }
}

#[cfg(test)]
#[path = "tests_block_contract.rs"]
mod tests_block_contract;
