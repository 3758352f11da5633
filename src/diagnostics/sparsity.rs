//! Per-channel non-zero statistics of a feature map.

use std::fmt::{self, Write as _};
use std::io::{self, Write};

use super::{FeatureObserver, ProbePoint};
use crate::error::Result;
use crate::tensor::{count_nonzero, Tensor};

/// Channels whose non-zero density is at most this (and above zero) are
/// "near-zero".
pub const NEAR_ZERO_THRESHOLD: f64 = 0.10;

/// Default number of channel densities printed per line.
pub const CHANNELS_PER_LINE: usize = 20;

/// Sparsity statistics of the first sample of a `(N, C, H, W)` tensor.
///
/// Ratios whose denominator is zero (no channels, an empty spatial plane or
/// an empty batch) are `None` and render as `undefined`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparsityReport {
    shape: Vec<usize>,
    densities: Vec<Option<f64>>,
    all_zero: usize,
    near_zero: usize,
    nonzero: usize,
    elements: usize,
}

impl SparsityReport {
    /// Compute the report for the first sample of `tensor`.
    ///
    /// # Errors
    ///
    /// Returns [`ResNetError::ShapeMismatch`](crate::error::ResNetError) if
    /// `tensor` is not 4-D.
    pub fn from_tensor(tensor: &Tensor) -> Result<Self> {
        let (batch, channels, h, w) = tensor.dims4("SparsityReport")?;
        let area = h * w;

        let first = if batch == 0 { &[][..] } else { tensor.sample(0)? };

        let densities: Vec<Option<f64>> = if first.is_empty() {
            vec![None; channels]
        } else {
            first
                .chunks_exact(area)
                .map(|plane| ratio(count_nonzero(plane), area))
                .collect()
        };

        let all_zero = densities.iter().filter(|d| **d == Some(0.0)).count();
        let near_zero = densities
            .iter()
            .flatten()
            .filter(|&&d| d > 0.0 && d <= NEAR_ZERO_THRESHOLD)
            .count();

        Ok(Self {
            shape: tensor.shape().to_vec(),
            densities,
            all_zero,
            near_zero,
            nonzero: count_nonzero(first),
            elements: first.len(),
        })
    }

    /// Shape of the inspected tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of channels.
    #[must_use]
    pub fn channels(&self) -> usize {
        self.densities.len()
    }

    /// Non-zero fraction of every channel plane.
    #[must_use]
    pub fn densities(&self) -> &[Option<f64>] {
        &self.densities
    }

    /// Number of channels with no non-zero element.
    #[must_use]
    pub fn all_zero_count(&self) -> usize {
        self.all_zero
    }

    /// Number of channels with density in `(0, 0.10]`.
    #[must_use]
    pub fn near_zero_count(&self) -> usize {
        self.near_zero
    }

    /// Fraction of channels that are all-zero.
    #[must_use]
    pub fn all_zero_ratio(&self) -> Option<f64> {
        ratio(self.all_zero, self.channels())
    }

    /// Fraction of channels that are near-zero.
    #[must_use]
    pub fn near_zero_ratio(&self) -> Option<f64> {
        ratio(self.near_zero, self.channels())
    }

    /// Non-zero fraction over the whole first sample.
    #[must_use]
    pub fn nonzero_ratio(&self) -> Option<f64> {
        ratio(self.nonzero, self.elements)
    }

    /// Whether any ratio of the report is undefined.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.nonzero_ratio().is_none() || self.all_zero_ratio().is_none()
    }

    /// Render the report with `per_line` channel densities per line.
    #[must_use]
    pub fn render(&self, per_line: usize) -> String {
        let per_line = per_line.max(1);
        let mut out = String::new();

        for (i, density) in self.densities.iter().enumerate() {
            match density {
                Some(d) => {
                    let _ = write!(out, "{d:.2}, ");
                }
                None => out.push_str("undefined, "),
            }
            if (i + 1) % per_line == 0 {
                out.push('\n');
            }
        }

        let channels = self.channels();
        let _ = writeln!(out, "{:?}", self.shape);
        let _ = writeln!(
            out,
            "\n(featuremap-wise all-zeros: {}/{}={}) ",
            self.all_zero,
            channels,
            Fixed4(self.all_zero_ratio())
        );
        let _ = writeln!(
            out,
            "(featuremap-wise 0.1 non-zeros: {}/{}={}) ",
            self.near_zero,
            channels,
            Fixed4(self.near_zero_ratio())
        );
        let _ = writeln!(
            out,
            "(layer-wise non-zeros: {})",
            Plain(self.nonzero_ratio())
        );
        out
    }
}

impl fmt::Display for SparsityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render(CHANNELS_PER_LINE))
    }
}

fn ratio(num: usize, den: usize) -> Option<f64> {
    (den != 0).then(|| num as f64 / den as f64)
}

struct Fixed4(Option<f64>);

impl fmt::Display for Fixed4 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.4}"),
            None => f.write_str("undefined"),
        }
    }
}

struct Plain(Option<f64>);

impl fmt::Display for Plain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => f.write_str("undefined"),
        }
    }
}

/// Observer writing a [`SparsityReport`] for every block-level probe point.
///
/// Stage-level probe points are ignored.
#[derive(Debug)]
pub struct SparsityCounter<W: Write = io::Stdout> {
    out: W,
    per_line: usize,
}

impl SparsityCounter<io::Stdout> {
    /// Counter printing to stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_writer(io::stdout())
    }
}

impl Default for SparsityCounter<io::Stdout> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> SparsityCounter<W> {
    /// Counter printing to `out`.
    #[must_use]
    pub fn with_writer(out: W) -> Self {
        Self {
            out,
            per_line: CHANNELS_PER_LINE,
        }
    }

    /// Set how many channel densities are printed per line.
    #[must_use]
    pub fn with_channels_per_line(mut self, per_line: usize) -> Self {
        self.per_line = per_line;
        self
    }

    /// Compute and write the report for `tensor`.
    ///
    /// # Errors
    ///
    /// Fails if `tensor` is not 4-D or the writer fails.
    pub fn count(&mut self, tensor: &Tensor) -> Result<SparsityReport> {
        let report = SparsityReport::from_tensor(tensor)?;
        if report.is_degenerate() {
            tracing::warn!(shape = ?report.shape(), "sparsity ratios undefined for empty feature map");
        }
        self.out.write_all(report.render(self.per_line).as_bytes())?;
        self.out.flush()?;
        Ok(report)
    }

    /// Borrow the underlying writer.
    #[must_use]
    pub fn get_ref(&self) -> &W {
        &self.out
    }

    /// Consume the counter and return the writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FeatureObserver for SparsityCounter<W> {
    fn observe(&mut self, point: ProbePoint, tensor: &Tensor) -> Result<()> {
        if point.is_block() {
            tracing::trace!(%point, "counting sparsity");
            self.count(tensor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests_sparsity_contract.rs"]
mod tests_sparsity_contract;
