//! Residual networks for CIFAR-style images, with feature-map sparsity
//! diagnostics.
//!
//! The network is a classic ResNet (basic or bottleneck blocks, four
//! stages) running inference on plain `f32` tensors. During a forward pass
//! it reports intermediate feature maps to a [`FeatureObserver`]; the
//! bundled observers print per-channel non-zero statistics and append
//! zero/non-zero grids of selected channels to a log file.
//!
//! # Quick Start
//!
//! ```
//! use resnet_sparsity::nn::Module;
//! use resnet_sparsity::{
//!     BlockKind, Diagnostics, DiagnosticsConfig, ResNet, ResNetConfig, Tensor,
//! };
//!
//! let config = ResNetConfig::custom(BlockKind::Basic, [1, 1, 1, 1])
//!     .with_widths(4, [4, 4, 8, 8])
//!     .with_seed(42);
//! let net = ResNet::new(config).unwrap();
//! let image = Tensor::ones(&[1, 3, 8, 8]);
//!
//! // Plain inference
//! let logits = net.forward(&image).unwrap();
//! assert_eq!(logits.shape(), &[1, 10]);
//!
//! // Inference with per-block sparsity summaries captured in memory
//! let diag_config = DiagnosticsConfig::default().with_feature_dumps(false);
//! let mut diagnostics = Diagnostics::with_writer(&diag_config, Vec::new());
//! net.forward_with(&image, &mut diagnostics).unwrap();
//!
//! let summary = String::from_utf8(diagnostics.into_writer().unwrap()).unwrap();
//! assert!(summary.contains("layer-wise non-zeros"));
//! ```
//!
//! # Modules
//!
//! - [`tensor`]: Dense `f32` tensors
//! - [`nn`]: Layers (convolution, batch norm, linear, containers)
//! - [`resnet`]: Residual blocks, stages and the network
//! - [`diagnostics`]: Probe points, observers and sparsity reports
//! - [`error`]: Error type

pub mod diagnostics;
pub mod error;
pub mod nn;
pub mod resnet;
pub mod tensor;

pub use diagnostics::{
    Diagnostics, DiagnosticsConfig, FeatureMapDumper, FeatureObserver, NoopObserver, ProbePoint,
    SparsityCounter, SparsityReport,
};
pub use error::{ResNetError, Result};
pub use resnet::{BlockKind, ResNet, ResNetConfig, ResNetDepth};
pub use tensor::Tensor;
