//! Activation function modules.
//!
//! These modules wrap activation functions for use in [`Sequential`]
//! containers. For the functional form, call [`Tensor::relu`] directly.
//!
//! [`Sequential`]: super::Sequential
//!
//! # References
//!
//! - Nair, V., & Hinton, G. E. (2010). Rectified linear units improve restricted
//!   Boltzmann machines. ICML.

use super::module::Module;
use crate::error::Result;
use crate::tensor::Tensor;

/// Rectified Linear Unit activation: ReLU(x) = max(0, x)
///
/// # Shape
///
/// - Input: `(*)` any shape
/// - Output: `(*)` same shape as input
#[derive(Debug, Clone, Copy, Default)]
pub struct ReLU;

impl ReLU {
    /// Create a new ReLU activation.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for ReLU {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        Ok(input.relu())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_non_negative() {
        let input = Tensor::new(&[-3.0, -1.0, 0.0, 1.0, 5.0], &[5]);
        let output = ReLU::new().forward(&input).unwrap();

        for (i, &v) in output.data().iter().enumerate() {
            assert!(v >= 0.0, "ReLU output[{i}] = {v} < 0");
        }
    }

    #[test]
    fn test_relu_positive_identity() {
        let input = Tensor::new(&[0.5, 1.0, 2.5, 10.0], &[4]);
        let output = ReLU::new().forward(&input).unwrap();
        assert_eq!(output.data(), input.data());
    }

    #[test]
    fn test_relu_preserves_shape() {
        let input = Tensor::ones(&[2, 3, 4, 4]);
        let output = ReLU::new().forward(&input).unwrap();
        assert_eq!(output.shape(), &[2, 3, 4, 4]);
    }
}
