//! Convolution and pooling layers.
//!
//! Implements 2D convolution following the `PyTorch` API, plus the global
//! average pooling and flattening used in front of a classifier head.
//!
//! # References
//!
//! - `LeCun`, Y., et al. (1998). Gradient-based learning applied to document
//!   recognition. Proceedings of the IEEE.
//! - He, K., et al. (2015). Delving deep into rectifiers: Surpassing
//!   human-level performance on `ImageNet` classification. ICCV.

use super::init::{kaiming_uniform, zeros};
use super::module::Module;
use crate::error::{ResNetError, Result};
use crate::tensor::Tensor;

/// 2D Convolution layer with a square kernel.
///
/// # Shape
///
/// - Input: `(N, C_in, H, W)`
/// - Output: `(N, C_out, H_out, W_out)` where
///   `H_out = (H + 2*padding - kernel_size) / stride + 1`
///
/// # Example
///
/// ```
/// use resnet_sparsity::nn::{Conv2d, Module};
/// use resnet_sparsity::Tensor;
///
/// let conv = Conv2d::with_options(3, 8, 3, 1, 1, false, Some(0));
/// let y = conv.forward(&Tensor::ones(&[2, 3, 8, 8])).unwrap();
/// assert_eq!(y.shape(), &[2, 8, 8, 8]);
/// ```
pub struct Conv2d {
    /// Weight tensor, shape: [`out_channels`, `in_channels`, k, k]
    weight: Tensor,
    /// Bias tensor, shape: [`out_channels`], or None
    bias: Option<Tensor>,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    /// Create a Conv2d layer with stride 1, no padding and a bias.
    #[must_use]
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self::with_options(in_channels, out_channels, kernel_size, 1, 0, true, None)
    }

    /// Create Conv2d with custom options.
    ///
    /// # Arguments
    ///
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `kernel_size` - Side of the square kernel
    /// * `stride` - Stride in both spatial dimensions
    /// * `padding` - Zero padding added on every side
    /// * `bias` - If true, adds a bias (zero-initialized)
    /// * `seed` - Optional seed for the Kaiming-uniform weights
    #[must_use]
    pub fn with_options(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
        padding: usize,
        bias: bool,
        seed: Option<u64>,
    ) -> Self {
        let fan_in = in_channels * kernel_size * kernel_size;
        let weight = kaiming_uniform(
            &[out_channels, in_channels, kernel_size, kernel_size],
            fan_in,
            seed,
        );

        Self {
            weight,
            bias: bias.then(|| zeros(&[out_channels])),
            in_channels,
            out_channels,
            kernel_size,
            stride,
            padding,
        }
    }

    /// Number of input channels.
    #[must_use]
    pub fn in_channels(&self) -> usize {
        self.in_channels
    }

    /// Number of output channels.
    #[must_use]
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    /// Side of the square kernel.
    #[must_use]
    pub fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    /// Spatial stride.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Zero padding per side.
    #[must_use]
    pub fn padding(&self) -> usize {
        self.padding
    }

    /// Weight tensor.
    #[must_use]
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Replace the weight tensor.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`] if `weight` has a different shape.
    pub fn set_weight(&mut self, weight: Tensor) -> Result<()> {
        if weight.shape() != self.weight.shape() {
            return Err(ResNetError::shape_mismatch(
                "Conv2d::set_weight",
                format!("{:?}", self.weight.shape()),
                format!("{:?}", weight.shape()),
            ));
        }
        self.weight = weight;
        Ok(())
    }

    fn output_size(&self, input: usize) -> Option<usize> {
        let padded = input + 2 * self.padding;
        (padded >= self.kernel_size && self.stride > 0)
            .then(|| (padded - self.kernel_size) / self.stride + 1)
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (batch_size, in_channels, in_h, in_w) = input.dims4("Conv2d")?;

        if in_channels != self.in_channels {
            return Err(ResNetError::shape_mismatch(
                "Conv2d",
                format!("{} input channels", self.in_channels),
                format!("{in_channels} in {:?}", input.shape()),
            ));
        }

        let (Some(out_h), Some(out_w)) = (self.output_size(in_h), self.output_size(in_w)) else {
            return Err(ResNetError::shape_mismatch(
                "Conv2d",
                format!(
                    "spatial size >= {} with padding {}",
                    self.kernel_size, self.padding
                ),
                format!("{in_h}x{in_w}"),
            ));
        };

        let k = self.kernel_size;
        let (stride, pad) = (self.stride, self.padding);
        let in_area = in_h * in_w;
        let out_area = out_h * out_w;
        let mut output = vec![0.0; batch_size * self.out_channels * out_area];

        let input_data = input.data();
        let weight_data = self.weight.data();

        for n in 0..batch_size {
            let sample = &input_data[n * in_channels * in_area..(n + 1) * in_channels * in_area];
            for oc in 0..self.out_channels {
                let out_start = (n * self.out_channels + oc) * out_area;
                let out_plane = &mut output[out_start..out_start + out_area];

                if let Some(ref bias) = self.bias {
                    out_plane.fill(bias.data()[oc]);
                }

                for ic in 0..in_channels {
                    let in_plane = &sample[ic * in_area..(ic + 1) * in_area];
                    let w_base = (oc * in_channels + ic) * k * k;

                    for kh in 0..k {
                        for kw in 0..k {
                            let w = weight_data[w_base + kh * k + kw];
                            if w == 0.0 {
                                continue;
                            }

                            for oh in 0..out_h {
                                // Handle padding
                                let ih = oh * stride + kh;
                                if ih < pad || ih >= in_h + pad {
                                    continue;
                                }
                                let in_row = &in_plane[(ih - pad) * in_w..(ih - pad + 1) * in_w];
                                let out_row = &mut out_plane[oh * out_w..(oh + 1) * out_w];

                                for (ow, out) in out_row.iter_mut().enumerate() {
                                    let iw = ow * stride + kw;
                                    if iw >= pad && iw < in_w + pad {
                                        *out += w * in_row[iw - pad];
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(Tensor::from_vec(
            output,
            &[batch_size, self.out_channels, out_h, out_w],
        ))
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

impl std::fmt::Debug for Conv2d {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conv2d")
            .field("in_channels", &self.in_channels)
            .field("out_channels", &self.out_channels)
            .field("kernel_size", &self.kernel_size)
            .field("stride", &self.stride)
            .field("padding", &self.padding)
            .field("bias", &self.bias.is_some())
            .finish_non_exhaustive()
    }
}

/// Global Average Pooling 2D.
///
/// Averages every channel plane down to a single value.
///
/// # Shape
///
/// - Input: `(N, C, H, W)`
/// - Output: `(N, C, 1, 1)`
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalAvgPool2d;

impl GlobalAvgPool2d {
    /// Create a new `GlobalAvgPool2d` layer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Module for GlobalAvgPool2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let (batch_size, channels, h, w) = input.dims4("GlobalAvgPool2d")?;
        let area = h * w;
        if area == 0 {
            return Err(ResNetError::shape_mismatch(
                "GlobalAvgPool2d",
                "non-empty spatial plane",
                format!("{h}x{w}"),
            ));
        }

        let output: Vec<f32> = input
            .data()
            .chunks_exact(area)
            .map(|plane| plane.iter().sum::<f32>() / area as f32)
            .collect();

        Ok(Tensor::from_vec(output, &[batch_size, channels, 1, 1]))
    }
}

/// Flatten layer.
///
/// Flattens every dimension from `start_dim` onwards.
///
/// # Shape
///
/// - Input: `(N, *dims)`
/// - Output: `(N, prod(dims))`
#[derive(Debug, Clone, Copy)]
pub struct Flatten {
    start_dim: usize,
}

impl Flatten {
    /// Flatten from dimension 1 onwards (preserving batch).
    #[must_use]
    pub fn new() -> Self {
        Self { start_dim: 1 }
    }
}

impl Default for Flatten {
    fn default() -> Self {
        Self::new()
    }
}

impl Module for Flatten {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let shape = input.shape();

        if shape.len() <= self.start_dim + 1 {
            return Ok(input.clone());
        }

        let mut new_shape: Vec<usize> = shape[..self.start_dim].to_vec();
        new_shape.push(shape[self.start_dim..].iter().product());

        input.view(&new_shape)
    }
}
