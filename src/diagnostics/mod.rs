//! Feature-map sparsity diagnostics.
//!
//! The network calls a [`FeatureObserver`] at fixed [`ProbePoint`]s during
//! a forward pass. Observers only read the tensor they are shown; they
//! cannot change what flows to the next layer.
//!
//! Two observers reproduce the classic sparsity instrumentation:
//!
//! - [`SparsityCounter`] writes a per-channel non-zero summary after every
//!   basic block (to stdout unless redirected).
//! - [`FeatureMapDumper`] appends zero/non-zero grids of selected channels of
//!   one stage's output to a log file (`feat.txt` by default).
//!
//! [`Diagnostics`] bundles both, driven by a [`DiagnosticsConfig`].
//!
//! The forward pass borrows the observer mutably, so exactly one writer
//! exists per pass and output never interleaves.

mod feature_dump;
mod sparsity;

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tensor::Tensor;

pub use feature_dump::{
    classify_percent, select_channels, ChannelDump, DensityBand, FeatureMapDumper,
    DEFAULT_FEATURE_LOG,
};
pub use sparsity::{SparsityCounter, SparsityReport, CHANNELS_PER_LINE, NEAR_ZERO_THRESHOLD};

/// A location in the forward pass where observers are invoked.
///
/// Stages are numbered from 1 (`layer1`..`layer4`), blocks within a stage
/// from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbePoint {
    /// After the first conv/norm/ReLU of a basic block.
    BlockActivation {
        /// Stage number (1-based)
        stage: usize,
        /// Block index within the stage
        block: usize,
    },
    /// After the final ReLU of a basic block.
    BlockOutput {
        /// Stage number (1-based)
        stage: usize,
        /// Block index within the stage
        block: usize,
    },
    /// After the last block of a stage.
    StageOutput {
        /// Stage number (1-based)
        stage: usize,
    },
}

impl ProbePoint {
    /// Stage the probe point belongs to.
    #[must_use]
    pub fn stage(&self) -> usize {
        match *self {
            Self::BlockActivation { stage, .. }
            | Self::BlockOutput { stage, .. }
            | Self::StageOutput { stage } => stage,
        }
    }

    /// Whether the point lies inside a residual block.
    #[must_use]
    pub fn is_block(&self) -> bool {
        !matches!(self, Self::StageOutput { .. })
    }
}

impl fmt::Display for ProbePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockActivation { stage, block } => write!(f, "layer{stage}.{block}.relu1"),
            Self::BlockOutput { stage, block } => write!(f, "layer{stage}.{block}"),
            Self::StageOutput { stage } => write!(f, "layer{stage}"),
        }
    }
}

/// Receives intermediate tensors during a forward pass.
pub trait FeatureObserver {
    /// Inspect `tensor` at `point`.
    ///
    /// # Errors
    ///
    /// An error aborts the forward pass that invoked the observer.
    fn observe(&mut self, point: ProbePoint, tensor: &Tensor) -> Result<()>;
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FeatureObserver for NoopObserver {
    fn observe(&mut self, _point: ProbePoint, _tensor: &Tensor) -> Result<()> {
        Ok(())
    }
}

/// Settings for the bundled [`Diagnostics`] observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Write per-block sparsity summaries.
    pub count_sparsity: bool,
    /// Append feature-map grids of `dump_stage` to `feature_log`.
    pub dump_feature_maps: bool,
    /// Log file for feature-map grids.
    pub feature_log: PathBuf,
    /// Stage whose output is dumped (1-based).
    pub dump_stage: usize,
    /// Channel densities printed per line in summaries.
    pub channels_per_line: usize,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            count_sparsity: true,
            dump_feature_maps: true,
            feature_log: PathBuf::from(DEFAULT_FEATURE_LOG),
            dump_stage: 1,
            channels_per_line: CHANNELS_PER_LINE,
        }
    }
}

impl DiagnosticsConfig {
    /// Set the feature-map log path.
    #[must_use]
    pub fn with_feature_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.feature_log = path.into();
        self
    }

    /// Set the stage whose output is dumped.
    #[must_use]
    pub fn with_dump_stage(mut self, stage: usize) -> Self {
        self.dump_stage = stage;
        self
    }

    /// Enable or disable per-block summaries.
    #[must_use]
    pub fn with_sparsity_counts(mut self, enabled: bool) -> Self {
        self.count_sparsity = enabled;
        self
    }

    /// Enable or disable feature-map dumps.
    #[must_use]
    pub fn with_feature_dumps(mut self, enabled: bool) -> Self {
        self.dump_feature_maps = enabled;
        self
    }
}

/// The sparsity counter and feature-map dumper behind one observer.
#[derive(Debug)]
pub struct Diagnostics<W: Write = io::Stdout> {
    counter: Option<SparsityCounter<W>>,
    dumper: Option<FeatureMapDumper>,
}

impl Diagnostics<io::Stdout> {
    /// Build diagnostics that print summaries to stdout.
    #[must_use]
    pub fn from_config(config: &DiagnosticsConfig) -> Self {
        Self::with_writer(config, io::stdout())
    }
}

impl<W: Write> Diagnostics<W> {
    /// Build diagnostics that print summaries to `out`.
    #[must_use]
    pub fn with_writer(config: &DiagnosticsConfig, out: W) -> Self {
        let counter = config
            .count_sparsity
            .then(|| SparsityCounter::with_writer(out).with_channels_per_line(config.channels_per_line));
        let dumper = config
            .dump_feature_maps
            .then(|| FeatureMapDumper::new(&config.feature_log).with_stage(config.dump_stage));
        Self { counter, dumper }
    }

    /// The summary writer, if counting is enabled.
    #[must_use]
    pub fn counter(&self) -> Option<&SparsityCounter<W>> {
        self.counter.as_ref()
    }

    /// The feature-map dumper, if enabled.
    #[must_use]
    pub fn dumper(&self) -> Option<&FeatureMapDumper> {
        self.dumper.as_ref()
    }

    /// Consume the bundle and return the summary writer.
    #[must_use]
    pub fn into_writer(self) -> Option<W> {
        self.counter.map(SparsityCounter::into_inner)
    }
}

impl<W: Write> FeatureObserver for Diagnostics<W> {
    fn observe(&mut self, point: ProbePoint, tensor: &Tensor) -> Result<()> {
        if let Some(counter) = &mut self.counter {
            counter.observe(point, tensor)?;
        }
        if let Some(dumper) = &mut self.dumper {
            dumper.observe(point, tensor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_point_names() {
        let act = ProbePoint::BlockActivation { stage: 1, block: 0 };
        let out = ProbePoint::BlockOutput { stage: 2, block: 1 };
        let stage = ProbePoint::StageOutput { stage: 3 };

        assert_eq!(act.to_string(), "layer1.0.relu1");
        assert_eq!(out.to_string(), "layer2.1");
        assert_eq!(stage.to_string(), "layer3");

        assert!(act.is_block() && out.is_block() && !stage.is_block());
        assert_eq!(out.stage(), 2);
    }

    #[test]
    fn test_diagnostics_config_serde_defaults() {
        let config: DiagnosticsConfig =
            serde_json::from_str(r#"{"dump_stage": 2}"#).expect("valid json");
        assert_eq!(config.dump_stage, 2);
        assert_eq!(config.feature_log, PathBuf::from("feat.txt"));
        assert_eq!(config.channels_per_line, 20);
        assert!(config.count_sparsity && config.dump_feature_maps);
    }

    #[test]
    fn test_diagnostics_respects_toggles() {
        let config = DiagnosticsConfig::default()
            .with_sparsity_counts(false)
            .with_feature_dumps(false);
        let mut diag = Diagnostics::with_writer(&config, Vec::new());
        assert!(diag.counter().is_none() && diag.dumper().is_none());

        let t = Tensor::ones(&[1, 2, 2, 2]);
        diag.observe(ProbePoint::StageOutput { stage: 1 }, &t)
            .expect("no-op");
        assert!(diag.into_writer().is_none());
    }

    #[test]
    fn test_diagnostics_counts_blocks_only() {
        let config = DiagnosticsConfig::default().with_feature_dumps(false);
        let mut diag = Diagnostics::with_writer(&config, Vec::new());
        let t = Tensor::ones(&[1, 2, 2, 2]);

        diag.observe(ProbePoint::StageOutput { stage: 1 }, &t)
            .expect("stage point");
        diag.observe(ProbePoint::BlockOutput { stage: 1, block: 0 }, &t)
            .expect("block point");

        let text = String::from_utf8(diag.into_writer().expect("counter enabled"))
            .expect("utf8 output");
        assert_eq!(text.matches("layer-wise non-zeros").count(), 1);
    }
}
