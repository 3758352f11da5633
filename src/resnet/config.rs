//! Network configuration: block kinds, named depths and stage layout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ResNetError, Result};

/// Residual block variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    /// Two 3x3 convolutions, expansion 1.
    Basic,
    /// 1x1 reduce, 3x3, 1x1 expand, expansion 4.
    Bottleneck,
}

impl BlockKind {
    /// Multiplier from a block's nominal width to its output channels.
    #[must_use]
    pub const fn expansion(self) -> usize {
        match self {
            Self::Basic => 1,
            Self::Bottleneck => 4,
        }
    }
}

/// The five reference depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResNetDepth {
    /// Basic blocks, [2, 2, 2, 2]
    ResNet18,
    /// Basic blocks, [3, 4, 6, 3]
    ResNet34,
    /// Bottleneck blocks, [3, 4, 6, 3]
    ResNet50,
    /// Bottleneck blocks, [3, 4, 23, 3]
    ResNet101,
    /// Bottleneck blocks, [3, 8, 36, 3]
    ResNet152,
}

impl ResNetDepth {
    /// Every named depth, shallowest first.
    pub const ALL: [Self; 5] = [
        Self::ResNet18,
        Self::ResNet34,
        Self::ResNet50,
        Self::ResNet101,
        Self::ResNet152,
    ];

    /// Nominal layer count.
    #[must_use]
    pub const fn layers(self) -> usize {
        match self {
            Self::ResNet18 => 18,
            Self::ResNet34 => 34,
            Self::ResNet50 => 50,
            Self::ResNet101 => 101,
            Self::ResNet152 => 152,
        }
    }

    /// Block variant used by every stage.
    #[must_use]
    pub const fn block_kind(self) -> BlockKind {
        match self {
            Self::ResNet18 | Self::ResNet34 => BlockKind::Basic,
            _ => BlockKind::Bottleneck,
        }
    }

    /// Blocks per stage.
    #[must_use]
    pub const fn num_blocks(self) -> [usize; 4] {
        match self {
            Self::ResNet18 => [2, 2, 2, 2],
            Self::ResNet34 | Self::ResNet50 => [3, 4, 6, 3],
            Self::ResNet101 => [3, 4, 23, 3],
            Self::ResNet152 => [3, 8, 36, 3],
        }
    }

    /// Published `ImageNet` weights for the torchvision variant of this
    /// depth. Reference data only; nothing in the crate fetches it.
    #[must_use]
    pub const fn pretrained_url(self) -> &'static str {
        match self {
            Self::ResNet18 => "https://download.pytorch.org/models/resnet18-5c106cde.pth",
            Self::ResNet34 => "https://download.pytorch.org/models/resnet34-333f7ec4.pth",
            Self::ResNet50 => "https://download.pytorch.org/models/resnet50-19c8e357.pth",
            Self::ResNet101 => "https://download.pytorch.org/models/resnet101-5d3b4d8f.pth",
            Self::ResNet152 => "https://download.pytorch.org/models/resnet152-b121ed2d.pth",
        }
    }
}

impl fmt::Display for ResNetDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "resnet{}", self.layers())
    }
}

impl FromStr for ResNetDepth {
    type Err = ResNetError;

    /// Accepts `resnet50`, `ResNet50` or `50`.
    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let digits = lower.strip_prefix("resnet").unwrap_or(lower.as_str());
        Self::ALL
            .into_iter()
            .find(|depth| digits.parse::<usize>().ok() == Some(depth.layers()))
            .ok_or_else(|| ResNetError::invalid_config("depth", s, "one of 18, 34, 50, 101, 152"))
    }
}

/// Layout of one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSpec {
    /// Nominal width (planes) of every block in the stage
    pub width: usize,
    /// Number of blocks
    pub blocks: usize,
    /// Stride of the first block
    pub stride: usize,
}

/// Full network configuration.
///
/// # Example
///
/// ```
/// use resnet_sparsity::{BlockKind, ResNetConfig, ResNetDepth};
///
/// let config = ResNetConfig::for_depth(ResNetDepth::ResNet50)
///     .with_num_classes(100)
///     .with_seed(7);
/// assert_eq!(config.block, BlockKind::Bottleneck);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResNetConfig {
    /// Block variant
    pub block: BlockKind,
    /// Blocks per stage
    pub num_blocks: [usize; 4],
    /// Nominal width per stage
    pub stage_widths: [usize; 4],
    /// First-block stride per stage
    pub stage_strides: [usize; 4],
    /// Output channels of the stem convolution
    pub stem_width: usize,
    /// Channels of the input image
    pub in_channels: usize,
    /// Number of output logits
    pub num_classes: usize,
    /// Base seed for deterministic initialization
    pub seed: Option<u64>,
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self::for_depth(ResNetDepth::ResNet18)
    }
}

impl ResNetConfig {
    /// Configuration of a named depth with 10 classes.
    #[must_use]
    pub fn for_depth(depth: ResNetDepth) -> Self {
        Self::custom(depth.block_kind(), depth.num_blocks())
    }

    /// Configuration with arbitrary block counts and reference widths.
    #[must_use]
    pub fn custom(block: BlockKind, num_blocks: [usize; 4]) -> Self {
        Self {
            block,
            num_blocks,
            stage_widths: [64, 128, 256, 512],
            stage_strides: [1, 2, 2, 2],
            stem_width: 64,
            in_channels: 3,
            num_classes: 10,
            seed: None,
        }
    }

    /// Set the number of classes.
    #[must_use]
    pub fn with_num_classes(mut self, num_classes: usize) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Set the initialization seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set stage widths and stem width together.
    #[must_use]
    pub fn with_widths(mut self, stem_width: usize, stage_widths: [usize; 4]) -> Self {
        self.stem_width = stem_width;
        self.stage_widths = stage_widths;
        self
    }

    /// Channels entering the classifier.
    #[must_use]
    pub fn feature_channels(&self) -> usize {
        self.stage_widths[3] * self.block.expansion()
    }

    /// Stage layouts in order.
    #[must_use]
    pub fn stage_specs(&self) -> [StageSpec; 4] {
        std::array::from_fn(|i| StageSpec {
            width: self.stage_widths[i],
            blocks: self.num_blocks[i],
            stride: self.stage_strides[i],
        })
    }

    /// Check every field is in range.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        let positive = |param: String, value: usize| {
            if value == 0 {
                Err(ResNetError::invalid_config(param, value, ">= 1"))
            } else {
                Ok(())
            }
        };

        positive("num_classes".into(), self.num_classes)?;
        positive("in_channels".into(), self.in_channels)?;
        positive("stem_width".into(), self.stem_width)?;
        for i in 0..4 {
            positive(format!("num_blocks[{i}]"), self.num_blocks[i])?;
            positive(format!("stage_widths[{i}]"), self.stage_widths[i])?;
            positive(format!("stage_strides[{i}]"), self.stage_strides[i])?;
        }
        Ok(())
    }

    /// Parse a configuration from JSON; missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Fails on malformed JSON or an invalid configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Fails only if serialization itself fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
