//! Fully connected (linear) layer.
//!
//! Implements the transformation y = xW^T + b.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.

use super::init::{xavier_uniform, zeros};
use super::module::Module;
use crate::error::{ResNetError, Result};
use crate::tensor::Tensor;

/// Fully connected layer: y = xW^T + b
///
/// Weight initialization follows Xavier/Glorot (Glorot & Bengio, 2010).
///
/// # Shape
///
/// - Input: `(N, in_features)`
/// - Output: `(N, out_features)`
///
/// # Example
///
/// ```
/// use resnet_sparsity::nn::{Linear, Module};
/// use resnet_sparsity::Tensor;
///
/// let layer = Linear::new(20, 10);
/// let output = layer.forward(&Tensor::ones(&[4, 20])).unwrap();
/// assert_eq!(output.shape(), &[4, 10]);
/// ```
pub struct Linear {
    /// Weight matrix, shape: [out_features, in_features]
    weight: Tensor,

    /// Bias vector, shape: [out_features], or None if bias=false
    bias: Option<Tensor>,

    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a new Linear layer with Xavier initialization.
    #[must_use]
    pub fn new(in_features: usize, out_features: usize) -> Self {
        Self::with_seed(in_features, out_features, None)
    }

    /// Create a Linear layer with a specific random seed.
    #[must_use]
    pub fn with_seed(in_features: usize, out_features: usize, seed: Option<u64>) -> Self {
        let weight = xavier_uniform(
            &[out_features, in_features],
            in_features,
            out_features,
            seed,
        );

        Self {
            weight,
            bias: Some(zeros(&[out_features])),
            in_features,
            out_features,
        }
    }

    /// Get the input feature dimension.
    #[must_use]
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Get the output feature dimension.
    #[must_use]
    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Set weight tensor from external data.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] unless `weight` is
    /// `[out_features, in_features]`.
    pub fn set_weight(&mut self, weight: Tensor) -> Result<()> {
        if weight.shape() != [self.out_features, self.in_features] {
            return Err(ResNetError::shape_mismatch(
                "Linear::set_weight",
                format!("[{}, {}]", self.out_features, self.in_features),
                format!("{:?}", weight.shape()),
            ));
        }
        self.weight = weight;
        Ok(())
    }

    /// Set bias tensor from external data.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] unless `bias` is `[out_features]`.
    pub fn set_bias(&mut self, bias: Tensor) -> Result<()> {
        if bias.shape() != [self.out_features] {
            return Err(ResNetError::shape_mismatch(
                "Linear::set_bias",
                format!("[{}]", self.out_features),
                format!("{:?}", bias.shape()),
            ));
        }
        self.bias = Some(bias);
        Ok(())
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        // y = x @ W^T + b
        let (batch_size, in_features) = match *input.shape() {
            [n, f] => (n, f),
            _ => {
                return Err(ResNetError::shape_mismatch(
                    "Linear",
                    format!("2D input [N, {}]", self.in_features),
                    format!("{:?}", input.shape()),
                ))
            }
        };

        if in_features != self.in_features {
            return Err(ResNetError::shape_mismatch(
                "Linear",
                format!("{} input features", self.in_features),
                format!("{in_features}"),
            ));
        }

        let x = input.data();
        let w = self.weight.data();
        let mut output = Vec::with_capacity(batch_size * self.out_features);

        for n in 0..batch_size {
            let row = &x[n * in_features..(n + 1) * in_features];
            for o in 0..self.out_features {
                let w_row = &w[o * in_features..(o + 1) * in_features];
                let dot: f32 = row.iter().zip(w_row).map(|(a, b)| a * b).sum();
                let bias = self.bias.as_ref().map_or(0.0, |b| b.data()[o]);
                output.push(dot + bias);
            }
        }

        Ok(Tensor::from_vec(output, &[batch_size, self.out_features]))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        match &self.bias {
            Some(b) => vec![&self.weight, b],
            None => vec![&self.weight],
        }
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        match &mut self.bias {
            Some(b) => vec![&mut self.weight, b],
            None => vec![&mut self.weight],
        }
    }
}

impl std::fmt::Debug for Linear {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Linear")
            .field("in_features", &self.in_features)
            .field("out_features", &self.out_features)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}
