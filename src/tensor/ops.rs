//! Element-wise and reshaping operations.
//!
//! Binary operations require identical shapes and report a
//! [`ResNetError::ShapeMismatch`] otherwise; there is no broadcasting.

use super::Tensor;
use crate::error::{ResNetError, Result};

// ============================================================================
// Element-wise Operations
// ============================================================================

impl Tensor {
    /// Element-wise addition: z = self + other
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if the shapes differ.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        self.zip_with(other, "Tensor::add", |a, b| a + b)
    }

    /// Apply `f` to every element.
    #[must_use]
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        let data: Vec<f32> = self.data().iter().map(|&a| f(a)).collect();
        Tensor::from_vec(data, self.shape())
    }

    fn zip_with(
        &self,
        other: &Tensor,
        op: &'static str,
        f: impl Fn(f32, f32) -> f32,
    ) -> Result<Tensor> {
        if self.shape() != other.shape() {
            return Err(ResNetError::shape_mismatch(
                op,
                format!("{:?}", self.shape()),
                format!("{:?}", other.shape()),
            ));
        }

        let data: Vec<f32> = self
            .data()
            .iter()
            .zip(other.data().iter())
            .map(|(&a, &b)| f(a, b))
            .collect();

        Ok(Tensor::from_vec(data, self.shape()))
    }
}

// ============================================================================
// Activation Functions
// ============================================================================

impl Tensor {
    /// `ReLU` activation: z = max(0, self)
    #[must_use]
    pub fn relu(&self) -> Tensor {
        self.map(|a| a.max(0.0))
    }
}

// ============================================================================
// Shape Operations
// ============================================================================

impl Tensor {
    /// Reshape tensor to a new shape.
    ///
    /// The total number of elements must remain the same.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if the element counts differ.
    pub fn view(&self, new_shape: &[usize]) -> Result<Tensor> {
        let new_numel: usize = new_shape.iter().product();
        if self.numel() != new_numel {
            return Err(ResNetError::shape_mismatch(
                "Tensor::view",
                format!("{} elements", self.numel()),
                format!("{new_shape:?} ({new_numel} elements)"),
            ));
        }

        Ok(Tensor::new(self.data(), new_shape))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add() {
        let a = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        let b = Tensor::from_slice(&[4.0, 5.0, 6.0]);
        let c = a.add(&b).unwrap();
        assert_eq!(c.data(), &[5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = Tensor::zeros(&[1, 64, 8, 8]);
        let b = Tensor::zeros(&[1, 128, 8, 8]);
        let err = a.add(&b).unwrap_err();
        assert!(matches!(err, ResNetError::ShapeMismatch { op: "Tensor::add", .. }));
    }

    #[test]
    fn test_relu() {
        let x = Tensor::from_slice(&[-3.0, -0.5, 0.0, 0.5, 3.0]);
        assert_eq!(x.relu().data(), &[0.0, 0.0, 0.0, 0.5, 3.0]);
    }

    #[test]
    fn test_view() {
        let a = Tensor::new(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = a.view(&[3, 2]).unwrap();
        assert_eq!(b.shape(), &[3, 2]);
        assert_eq!(b.data(), a.data());
        assert!(a.view(&[4, 2]).is_err());
    }
}
