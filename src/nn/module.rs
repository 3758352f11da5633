//! The [`Module`] trait shared by every layer.

use crate::error::Result;
use crate::tensor::Tensor;

/// A layer (or composition of layers) with a forward pass.
///
/// `forward` takes `&self`: running a module never changes it. Parameters
/// are exposed so callers can count or overwrite them.
pub trait Module {
    /// Compute the output for `input`.
    ///
    /// # Errors
    ///
    /// Returns an error if `input` does not have the shape the module
    /// expects.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// All parameter tensors of the module.
    fn parameters(&self) -> Vec<&Tensor> {
        Vec::new()
    }

    /// Mutable access to all parameter tensors.
    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        Vec::new()
    }

    /// Total number of scalar parameters.
    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Switch to training mode (batch statistics in normalization layers).
    fn train(&mut self) {}

    /// Switch to evaluation mode (running statistics in normalization layers).
    fn eval(&mut self) {}

    /// Whether the module is in training mode.
    fn training(&self) -> bool {
        true
    }
}
