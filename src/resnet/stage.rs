//! Stages: runs of residual blocks sharing a nominal width.

use std::iter;

use super::block::{Block, BlockSite};
use super::config::{BlockKind, StageSpec};
use crate::diagnostics::{FeatureObserver, ProbePoint};
use crate::error::Result;
use crate::nn::{Module, SeedStream};
use crate::tensor::Tensor;

/// A sequence of blocks; only the first may downsample.
#[derive(Debug)]
pub struct Stage {
    index: usize,
    width: usize,
    blocks: Vec<Block>,
}

impl Stage {
    /// Build stage `index` (1-based) from `spec`, fed with `in_channels`.
    ///
    /// Returns the stage and its output channel count, which feeds the
    /// next stage.
    #[must_use]
    pub fn build(
        kind: BlockKind,
        index: usize,
        spec: StageSpec,
        in_channels: usize,
        seeds: &mut SeedStream,
    ) -> (Self, usize) {
        let strides = iter::once(spec.stride).chain(iter::repeat(1)).take(spec.blocks);

        let mut channels = in_channels;
        let blocks = strides
            .map(|stride| {
                let block = Block::new(kind, channels, spec.width, stride, seeds);
                channels = spec.width * kind.expansion();
                block
            })
            .collect();

        let stage = Self {
            index,
            width: spec.width,
            blocks,
        };
        (stage, channels)
    }

    /// Stage number (1-based).
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Nominal width of the blocks.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Blocks in order.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Run every block, then report [`ProbePoint::StageOutput`].
    ///
    /// # Errors
    ///
    /// Fails on a shape mismatch or an observer error.
    pub fn forward_with(
        &self,
        input: &Tensor,
        observer: &mut dyn FeatureObserver,
    ) -> Result<Tensor> {
        let out = self
            .blocks
            .iter()
            .enumerate()
            .try_fold(input.clone(), |x, (i, block)| {
                let site = BlockSite {
                    stage: self.index,
                    block: i,
                };
                block.forward_with(&x, site, observer)
            })?;

        observer.observe(ProbePoint::StageOutput { stage: self.index }, &out)?;
        Ok(out)
    }
}

impl Module for Stage {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.blocks
            .iter()
            .try_fold(input.clone(), |x, block| block.forward(&x))
    }

    fn parameters(&self) -> Vec<&Tensor> {
        self.blocks.iter().flat_map(Module::parameters).collect()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        self.blocks
            .iter_mut()
            .flat_map(Module::parameters_mut)
            .collect()
    }

    fn train(&mut self) {
        self.blocks.iter_mut().for_each(Module::train);
    }

    fn eval(&mut self) {
        self.blocks.iter_mut().for_each(Module::eval);
    }

    fn training(&self) -> bool {
        self.blocks.first().map_or(true, Module::training)
    }
}

/// Build all stages in order, threading the channel count through.
///
/// Stages are numbered from 1. Returns the stages and the channel count of
/// the last stage's output.
#[must_use]
pub fn build_stages(
    kind: BlockKind,
    specs: &[StageSpec],
    in_channels: usize,
    seeds: &mut SeedStream,
) -> (Vec<Stage>, usize) {
    specs
        .iter()
        .enumerate()
        .fold((Vec::with_capacity(specs.len()), in_channels), |(mut stages, channels), (i, &spec)| {
            let (stage, out_channels) = Stage::build(kind, i + 1, spec, channels, seeds);
            stages.push(stage);
            (stages, out_channels)
        })
}
