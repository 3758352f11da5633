//! Neural network building blocks.
//!
//! Organized around the [`Module`] trait, following the `PyTorch` API
//! described in Paszke et al. (2019):
//!
//! - **Layers**: [`Conv2d`], [`Linear`], [`Flatten`]
//! - **Pooling**: [`GlobalAvgPool2d`]
//! - **Normalization**: [`BatchNorm2d`]
//! - **Activations**: [`ReLU`]
//! - **Containers**: [`Sequential`]
//!
//! Forward passes are fallible: a layer handed a tensor of the wrong shape
//! returns [`ResNetError::ShapeMismatch`](crate::error::ResNetError) rather
//! than panicking.
//!
//! # References
//!
//! - Paszke, A., et al. (2019). `PyTorch`: An imperative style, high-performance
//!   deep learning library. `NeurIPS`.
//! - He, K., et al. (2015). Delving deep into rectifiers. ICCV.

mod activation;
mod container;
mod conv;
pub mod init;
mod linear;
mod module;
mod normalization;

pub use activation::ReLU;
pub use container::Sequential;
pub use conv::{Conv2d, Flatten, GlobalAvgPool2d};
pub use init::{kaiming_uniform, uniform, xavier_uniform, SeedStream};
pub use linear::Linear;
pub use module::Module;
pub use normalization::BatchNorm2d;
