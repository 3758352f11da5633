//! Zero/non-zero grids of selected feature-map channels, appended to a log.
//!
//! Record layout, one per selected channel:
//!
//! ```text
//! sparsity: 50/100: 7x4x4
//! 1, 0, 1, 0,
//! ...
//!
//!
//!
//! ```
//!
//! The header carries the integer non-zero percentage, the channel index and
//! the plane size. The log is opened in append mode and never truncated, so
//! records accumulate across passes and processes.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::{FeatureObserver, ProbePoint};
use crate::error::Result;
use crate::tensor::{count_nonzero, Tensor};

/// Default feature-map log file.
pub const DEFAULT_FEATURE_LOG: &str = "feat.txt";

/// Density bands that select a channel for dumping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DensityBand {
    /// Between 45% and 55% non-zero, exclusive.
    Balanced,
    /// Above 0% and below 10% non-zero.
    Sparse,
    /// Above 80% non-zero.
    Dense,
}

/// Band of an integer non-zero percentage, if any.
#[must_use]
pub fn classify_percent(percent: usize) -> Option<DensityBand> {
    match percent {
        46..=54 => Some(DensityBand::Balanced),
        1..=9 => Some(DensityBand::Sparse),
        p if p > 80 => Some(DensityBand::Dense),
        _ => None,
    }
}

/// One selected channel of the first sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDump {
    /// Channel index
    pub channel: usize,
    /// Non-zero percentage, `nonzero * 100 / (H * W)` rounded down
    pub percent: usize,
    /// Band that selected the channel
    pub band: DensityBand,
    /// Plane height
    pub height: usize,
    /// Plane width
    pub width: usize,
    /// Row-major non-zero mask
    pub mask: Vec<bool>,
}

impl ChannelDump {
    /// Render the record as appended to the log.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "sparsity: {}/100: {}x{}x{}\n",
            self.percent, self.channel, self.height, self.width
        );
        for row in self.mask.chunks(self.width.max(1)) {
            for &bit in row {
                out.push_str(if bit { "1, " } else { "0, " });
            }
            out.push('\n');
        }
        out.push_str("\n\n\n");
        out
    }
}

/// Select the channels of the first sample of `tensor` that fall in a
/// [`DensityBand`].
///
/// # Errors
///
/// Returns [`ResNetError::ShapeMismatch`](crate::error::ResNetError) if
/// `tensor` is not 4-D.
pub fn select_channels(tensor: &Tensor) -> Result<Vec<ChannelDump>> {
    let (batch, channels, height, width) = tensor.dims4("FeatureMapDumper")?;
    let area = height * width;
    if batch == 0 || area == 0 {
        return Ok(Vec::new());
    }

    let mut selected = Vec::new();
    for channel in 0..channels {
        let plane = tensor.plane(0, channel)?;
        let percent = count_nonzero(plane) * 100 / area;
        if let Some(band) = classify_percent(percent) {
            selected.push(ChannelDump {
                channel,
                percent,
                band,
                height,
                width,
                mask: plane.iter().map(|&v| v != 0.0).collect(),
            });
        }
    }
    Ok(selected)
}

/// Observer appending channel grids of one stage's output to a log file.
#[derive(Debug, Clone)]
pub struct FeatureMapDumper {
    path: PathBuf,
    stage: usize,
}

impl Default for FeatureMapDumper {
    fn default() -> Self {
        Self::new(DEFAULT_FEATURE_LOG)
    }
}

impl FeatureMapDumper {
    /// Dumper appending to `path`, reacting to stage 1.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stage: 1,
        }
    }

    /// React to the output of `stage` instead.
    #[must_use]
    pub fn with_stage(mut self, stage: usize) -> Self {
        self.stage = stage;
        self
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stage whose output is dumped.
    #[must_use]
    pub fn stage(&self) -> usize {
        self.stage
    }

    /// Append records for every selected channel of `tensor`.
    ///
    /// The file is only created when at least one channel is selected.
    /// Returns the number of records written.
    ///
    /// # Errors
    ///
    /// Fails if `tensor` is not 4-D or the log cannot be opened or written.
    pub fn dump(&self, tensor: &Tensor) -> Result<usize> {
        let selected = select_channels(tensor)?;
        if selected.is_empty() {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for record in &selected {
            file.write_all(record.render().as_bytes())?;
        }
        file.flush()?;

        tracing::debug!(
            path = %self.path.display(),
            records = selected.len(),
            "appended feature-map records"
        );
        Ok(selected.len())
    }
}

impl FeatureObserver for FeatureMapDumper {
    fn observe(&mut self, point: ProbePoint, tensor: &Tensor) -> Result<()> {
        if point == (ProbePoint::StageOutput { stage: self.stage }) {
            self.dump(tensor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResNetError;

    fn plane_with_nonzeros(side: usize, nonzeros: usize) -> Vec<f32> {
        (0..side * side)
            .map(|i| if i < nonzeros { 1.0 } else { 0.0 })
            .collect()
    }

    #[test]
    fn test_classify_percent_bands() {
        assert_eq!(classify_percent(50), Some(DensityBand::Balanced));
        assert_eq!(classify_percent(46), Some(DensityBand::Balanced));
        assert_eq!(classify_percent(54), Some(DensityBand::Balanced));
        assert_eq!(classify_percent(45), None);
        assert_eq!(classify_percent(55), None);

        assert_eq!(classify_percent(0), None);
        assert_eq!(classify_percent(1), Some(DensityBand::Sparse));
        assert_eq!(classify_percent(9), Some(DensityBand::Sparse));
        assert_eq!(classify_percent(10), None);

        assert_eq!(classify_percent(80), None);
        assert_eq!(classify_percent(81), Some(DensityBand::Dense));
        assert_eq!(classify_percent(100), Some(DensityBand::Dense));
    }

    #[test]
    fn test_half_dense_channel_is_selected() {
        // channel 0: 8/16 = 50%, channel 1: 5/16 = 31%
        let mut data = plane_with_nonzeros(4, 8);
        data.extend(plane_with_nonzeros(4, 5));
        let t = Tensor::new(&data, &[1, 2, 4, 4]);

        let selected = select_channels(&t).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].channel, 0);
        assert_eq!(selected[0].percent, 50);
        assert_eq!(selected[0].band, DensityBand::Balanced);
    }

    #[test]
    fn test_percent_rounds_down() {
        // 1/9 = 11.1% -> 11, not sparse; 8/9 = 88.8% -> 88, dense
        let mut data = plane_with_nonzeros(3, 1);
        data.extend(plane_with_nonzeros(3, 8));
        let t = Tensor::new(&data, &[1, 2, 3, 3]);
        let selected = select_channels(&t).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!((selected[0].channel, selected[0].percent), (1, 88));
    }

    #[test]
    fn test_empty_planes_select_nothing() {
        assert!(select_channels(&Tensor::zeros(&[1, 4, 0, 0])).unwrap().is_empty());
        assert!(select_channels(&Tensor::zeros(&[0, 4, 2, 2])).unwrap().is_empty());
    }

    #[test]
    fn test_render_record() {
        let record = ChannelDump {
            channel: 3,
            percent: 50,
            band: DensityBand::Balanced,
            height: 2,
            width: 2,
            mask: vec![true, false, false, true],
        };
        assert_eq!(
            record.render(),
            "sparsity: 50/100: 3x2x2\n1, 0, \n0, 1, \n\n\n\n"
        );
    }

    #[test]
    fn test_dump_appends() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("feat.txt");
        let dumper = FeatureMapDumper::new(&path);

        let t = Tensor::new(&plane_with_nonzeros(2, 2), &[1, 1, 2, 2]);
        assert_eq!(dumper.dump(&t).unwrap(), 1);
        assert_eq!(dumper.dump(&t).unwrap(), 1);

        let text = std::fs::read_to_string(&path).expect("log written");
        assert_eq!(text.matches("sparsity: 50/100: 0x2x2").count(), 2);
    }

    #[test]
    fn test_dump_skips_file_when_nothing_selected() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("feat.txt");
        let dumper = FeatureMapDumper::new(&path);

        assert_eq!(dumper.dump(&Tensor::zeros(&[1, 3, 4, 4])).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_dump_propagates_io_errors() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("missing").join("feat.txt");
        let dumper = FeatureMapDumper::new(&path);

        let err = dumper.dump(&Tensor::ones(&[1, 1, 2, 2])).unwrap_err();
        assert!(matches!(err, ResNetError::Io(_)));
    }

    #[test]
    fn test_observer_reacts_to_configured_stage_only() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("feat.txt");
        let mut dumper = FeatureMapDumper::new(&path).with_stage(2);
        let t = Tensor::ones(&[1, 1, 2, 2]);

        dumper
            .observe(ProbePoint::StageOutput { stage: 1 }, &t)
            .unwrap();
        dumper
            .observe(ProbePoint::BlockOutput { stage: 2, block: 0 }, &t)
            .unwrap();
        assert!(!path.exists());

        dumper
            .observe(ProbePoint::StageOutput { stage: 2 }, &t)
            .unwrap();
        assert!(path.exists());
    }
}
