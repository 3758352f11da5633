//! Weight initialization functions.
//!
//! - Xavier/Glorot (Glorot & Bengio, 2010) for the linear classifier
//! - Kaiming/He (He et al., 2015) for convolutions followed by `ReLU`
//!
//! Every initializer takes an optional seed. [`SeedStream`] hands out one
//! derived seed per layer so a whole network is reproducible from a single
//! `u64`.
//!
//! # References
//!
//! - Glorot, X., & Bengio, Y. (2010). Understanding the difficulty of training
//!   deep feedforward neural networks. AISTATS.
//! - He, K., et al. (2015). Delving deep into rectifiers: Surpassing human-level
//!   performance on `ImageNet` classification. ICCV.

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Xavier uniform initialization (Glorot & Bengio, 2010).
///
/// Samples from U(-a, a) where a = sqrt(6 / (`fan_in` + `fan_out`)).
#[must_use]
pub fn xavier_uniform(shape: &[usize], fan_in: usize, fan_out: usize, seed: Option<u64>) -> Tensor {
    let a = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
    uniform(shape, -a, a, seed)
}

/// Kaiming uniform initialization (He et al., 2015).
///
/// Samples from U(-bound, bound) where bound = sqrt(6 / `fan_in`).
#[must_use]
pub fn kaiming_uniform(shape: &[usize], fan_in: usize, seed: Option<u64>) -> Tensor {
    let bound = (6.0 / fan_in.max(1) as f32).sqrt();
    uniform(shape, -bound, bound, seed)
}

/// Uniform distribution initialization.
///
/// Samples from U(low, high).
#[must_use]
pub fn uniform(shape: &[usize], low: f32, high: f32, seed: Option<u64>) -> Tensor {
    let mut rng = rng_from(seed);
    Tensor::from_fn(shape, |_| rng.gen_range(low..high))
}

/// Constant initialization.
pub(crate) fn constant(shape: &[usize], value: f32) -> Tensor {
    Tensor::full(shape, value)
}

/// Zeros initialization.
pub(crate) fn zeros(shape: &[usize]) -> Tensor {
    constant(shape, 0.0)
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Deterministic per-layer seeds derived from one base seed.
///
/// With no base seed every call yields `None` (entropy-seeded layers).
#[derive(Debug, Clone)]
pub struct SeedStream {
    base: Option<u64>,
    counter: u64,
}

impl SeedStream {
    /// Create a stream rooted at `base`.
    #[must_use]
    pub fn new(base: Option<u64>) -> Self {
        Self { base, counter: 0 }
    }

    /// Next layer seed.
    pub fn next_seed(&mut self) -> Option<u64> {
        let base = self.base?;
        self.counter += 1;
        // SplitMix64 step keeps neighbouring layers decorrelated.
        let mut z = base.wrapping_add(self.counter.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        Some(z ^ (z >> 31))
    }
}
