//! Dense `f32` tensors for inference.
//!
//! The network only ever moves values forward, so the tensor carries no
//! gradient bookkeeping: a shape and a row-major buffer. Operations return
//! new tensors.

mod ops;

use std::fmt;

use crate::error::{ResNetError, Result};

/// A dense, row-major tensor of `f32` values.
///
/// # Example
///
/// ```
/// use resnet_sparsity::Tensor;
///
/// let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]);
/// assert_eq!(t.shape(), &[1, 1, 2, 2]);
/// assert_eq!(t.numel(), 4);
/// ```
#[derive(Clone, PartialEq)]
pub struct Tensor {
    /// Underlying data storage
    data: Vec<f32>,

    /// Shape of the tensor
    shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor from a slice with the given shape.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the product of shape dimensions.
    #[must_use]
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        Self::from_vec(data.to_vec(), shape)
    }

    /// Create a tensor taking ownership of `data`.
    ///
    /// # Panics
    ///
    /// Panics if the data length doesn't match the product of shape dimensions.
    #[must_use]
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let expected_len: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_len,
            "Data length {} doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_len
        );

        Self {
            data,
            shape: shape.to_vec(),
        }
    }

    /// Create a tensor from a 1D slice (vector).
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self::new(data, &[data.len()])
    }

    /// Create a tensor filled with zeros.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::full(shape, 0.0)
    }

    /// Create a tensor filled with ones.
    #[must_use]
    pub fn ones(shape: &[usize]) -> Self {
        Self::full(shape, 1.0)
    }

    /// Create a tensor filled with `value`.
    #[must_use]
    pub fn full(shape: &[usize], value: f32) -> Self {
        let len: usize = shape.iter().product();
        Self::from_vec(vec![value; len], shape)
    }

    /// Create a tensor by evaluating `f` at every flat index.
    #[must_use]
    pub fn from_fn(shape: &[usize], f: impl FnMut(usize) -> f32) -> Self {
        let len: usize = shape.iter().product();
        Self::from_vec((0..len).map(f).collect(), shape)
    }

    /// Get the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get a reference to the underlying data.
    #[must_use]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Get a mutable reference to the underlying data.
    ///
    /// Only used to overwrite layer parameters; the forward pass never
    /// mutates activations.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the tensor and return its buffer.
    #[must_use]
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Interpret the tensor as `(N, C, H, W)`.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if the tensor is not 4-D.
    pub fn dims4(&self, op: &'static str) -> Result<(usize, usize, usize, usize)> {
        match *self.shape.as_slice() {
            [n, c, h, w] => Ok((n, c, h, w)),
            _ => Err(ResNetError::shape_mismatch(
                op,
                "4D input [N, C, H, W]",
                format!("{}D {:?}", self.ndim(), self.shape),
            )),
        }
    }

    /// Borrow the `H x W` plane of channel `c` in sample `n`.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if the tensor is not 4-D or the
    /// indices are out of range.
    pub fn plane(&self, n: usize, c: usize) -> Result<&[f32]> {
        let (batch, channels, h, w) = self.dims4("Tensor::plane")?;
        if n >= batch || c >= channels {
            return Err(ResNetError::shape_mismatch(
                "Tensor::plane",
                format!("sample < {batch} and channel < {channels}"),
                format!("sample {n}, channel {c}"),
            ));
        }
        let area = h * w;
        let start = (n * channels + c) * area;
        Ok(&self.data[start..start + area])
    }

    /// Borrow all channels of sample `n` as one contiguous slice.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if the tensor is not 4-D or `n`
    /// is out of range.
    pub fn sample(&self, n: usize) -> Result<&[f32]> {
        let (batch, channels, h, w) = self.dims4("Tensor::sample")?;
        if n >= batch {
            return Err(ResNetError::shape_mismatch(
                "Tensor::sample",
                format!("sample < {batch}"),
                format!("sample {n}"),
            ));
        }
        let len = channels * h * w;
        Ok(&self.data[n * len..(n + 1) * len])
    }

    /// Count elements that are not exactly zero.
    #[must_use]
    pub fn count_nonzero(&self) -> usize {
        count_nonzero(&self.data)
    }
}

/// Count elements of `values` that are not exactly zero.
#[must_use]
pub fn count_nonzero(values: &[f32]) -> usize {
    values.iter().filter(|&&v| v != 0.0).count()
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("numel", &self.numel())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_creation() {
        let t = Tensor::new(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(t.shape(), &[2, 2]);
        assert_eq!(t.numel(), 4);
        assert_eq!(t.ndim(), 2);
    }

    #[test]
    fn test_tensor_from_slice() {
        let t = Tensor::from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(t.shape(), &[3]);
        assert_eq!(t.numel(), 3);
    }

    #[test]
    fn test_tensor_zeros_ones() {
        let z = Tensor::zeros(&[2, 3]);
        assert!(z.data().iter().all(|&x| x == 0.0));

        let o = Tensor::ones(&[2, 3]);
        assert!(o.data().iter().all(|&x| x == 1.0));
    }

    #[test]
    #[should_panic(expected = "doesn't match shape")]
    fn test_new_panics_on_length_mismatch() {
        let _ = Tensor::new(&[1.0, 2.0, 3.0], &[2, 2]);
    }

    #[test]
    fn test_zero_sized_dimension() {
        let t = Tensor::zeros(&[1, 0, 4, 4]);
        assert_eq!(t.numel(), 0);
        assert_eq!(t.dims4("test").unwrap(), (1, 0, 4, 4));
    }

    #[test]
    fn test_dims4_rejects_3d() {
        let t = Tensor::zeros(&[3, 32, 32]);
        let err = t.dims4("Conv2d").unwrap_err();
        assert!(err.to_string().contains("4D input"));
    }

    #[test]
    fn test_plane_and_sample() {
        let t = Tensor::from_fn(&[2, 2, 2, 2], |i| i as f32);
        assert_eq!(t.plane(0, 1).unwrap(), &[4.0, 5.0, 6.0, 7.0]);
        assert_eq!(t.plane(1, 0).unwrap(), &[8.0, 9.0, 10.0, 11.0]);
        assert_eq!(t.sample(1).unwrap().len(), 8);
        assert!(t.plane(0, 2).is_err());
        assert!(t.sample(2).is_err());
    }

    #[test]
    fn test_count_nonzero() {
        let t = Tensor::from_slice(&[0.0, -0.0, 1.0, -2.0, 0.5]);
        assert_eq!(t.count_nonzero(), 3);
    }
}
