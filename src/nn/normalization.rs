//! Batch normalization over image feature maps.
//!
//! # References
//!
//! - Ioffe, S., & Szegedy, C. (2015). Batch normalization: Accelerating
//!   deep network training. ICML.

use super::init::{constant, zeros};
use super::module::Module;
use crate::error::{ResNetError, Result};
use crate::tensor::Tensor;

/// Batch Normalization for 4D inputs (Ioffe & Szegedy, 2015).
///
/// ```text
/// y = (x - E[x]) / sqrt(Var[x] + eps) * gamma + beta
/// ```
///
/// Statistics are taken per channel over `(N, H, W)`. In training mode the
/// current batch supplies them; in evaluation mode the running statistics
/// do. Running statistics are never updated here: the forward pass is
/// read-only.
///
/// # Shape
///
/// - Input: `(N, C, H, W)`
/// - Output: same as input
#[derive(Debug)]
pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,
    /// Learnable scale
    weight: Tensor,
    /// Learnable shift
    bias: Tensor,
    /// Running mean (not learnable)
    running_mean: Tensor,
    /// Running variance (not learnable)
    running_var: Tensor,
    /// Training mode
    training: bool,
}

impl BatchNorm2d {
    /// Create a new `BatchNorm2d` layer.
    ///
    /// # Arguments
    ///
    /// * `num_features` - Number of channels
    #[must_use]
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: 1e-5,
            weight: constant(&[num_features], 1.0),
            bias: zeros(&[num_features]),
            running_mean: zeros(&[num_features]),
            running_var: constant(&[num_features], 1.0),
            training: true,
        }
    }

    /// Set epsilon for numerical stability.
    #[must_use]
    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    /// Number of channels normalized.
    #[must_use]
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    fn channel_stats(&self, data: &[f32], batch_size: usize, area: usize, c: usize) -> (f32, f32) {
        if !self.training {
            return (self.running_mean.data()[c], self.running_var.data()[c]);
        }

        let count = batch_size * area;
        if count == 0 {
            return (0.0, 1.0);
        }

        let planes = || {
            (0..batch_size).flat_map(move |n| {
                let start = (n * self.num_features + c) * area;
                data[start..start + area].iter().copied()
            })
        };

        let mean = planes().sum::<f32>() / count as f32;
        // Biased variance, as used for normalization in training mode
        let var = planes().map(|x| (x - mean).powi(2)).sum::<f32>() / count as f32;
        (mean, var)
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (batch_size, channels, h, w) = input.dims4("BatchNorm2d")?;

        if channels != self.num_features {
            return Err(ResNetError::shape_mismatch(
                "BatchNorm2d",
                format!("{} channels", self.num_features),
                format!("{channels} in {:?}", input.shape()),
            ));
        }

        let area = h * w;
        let input_data = input.data();
        let mut output_data = vec![0.0; input_data.len()];

        for c in 0..channels {
            let (mean, var) = self.channel_stats(input_data, batch_size, area, c);
            let scale = self.weight.data()[c] / (var + self.eps).sqrt();
            let shift = self.bias.data()[c] - mean * scale;

            for n in 0..batch_size {
                let start = (n * channels + c) * area;
                for (out, &x) in output_data[start..start + area]
                    .iter_mut()
                    .zip(&input_data[start..start + area])
                {
                    *out = x * scale + shift;
                }
            }
        }

        Ok(Tensor::from_vec(output_data, input.shape()))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        vec![&self.weight, &self.bias]
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        vec![&mut self.weight, &mut self.bias]
    }

    fn train(&mut self) {
        self.training = true;
    }

    fn eval(&mut self) {
        self.training = false;
    }

    fn training(&self) -> bool {
        self.training
    }
}
