// =========================================================================
// Residual block contract
//
//   - output = relu(path(x) + shortcut(x))
//   - shortcut is a projection iff stride != 1 or channels change
//   - basic blocks report two probe points, bottlenecks none
//   - output channels = expansion * planes, spatial = ceil(input / stride)
// =========================================================================

use super::*;
use crate::error::ResNetError;

#[derive(Default)]
struct Recorder(Vec<(ProbePoint, Vec<usize>)>);

impl FeatureObserver for Recorder {
    fn observe(&mut self, point: ProbePoint, tensor: &Tensor) -> Result<()> {
        self.0.push((point, tensor.shape().to_vec()));
        Ok(())
    }
}

fn seeds() -> SeedStream {
    SeedStream::new(Some(42))
}

fn zero_parameters(module: &mut dyn Module) {
    for param in module.parameters_mut() {
        param.data_mut().fill(0.0);
    }
}

fn mixed_input(shape: &[usize]) -> Tensor {
    Tensor::from_fn(shape, |i| (i as f32 * 0.37).sin())
}

#[test]
fn identity_block_with_zero_weights_is_relu() {
    let mut block = BasicBlock::new(4, 4, 1, &mut seeds());
    assert!(!block.shortcut().is_projection());
    zero_parameters(&mut block);

    let x = mixed_input(&[2, 4, 5, 5]);
    let y = block.forward(&x).unwrap();
    assert_eq!(y, x.relu());
}

#[test]
fn stride_or_width_change_gets_projection() {
    let strided = BasicBlock::new(4, 4, 2, &mut seeds());
    assert!(strided.shortcut().is_projection());

    let widened = BasicBlock::new(4, 8, 1, &mut seeds());
    assert!(widened.shortcut().is_projection());

    // 16 == 4 * 4, so a stride-1 bottleneck keeps the identity
    let expanded = Bottleneck::new(16, 4, 1, &mut seeds());
    assert!(!expanded.shortcut().is_projection());
    let reduced = Bottleneck::new(4, 4, 1, &mut seeds());
    assert!(reduced.shortcut().is_projection());
}

#[test]
fn projection_matches_block_output() {
    let block = Bottleneck::new(8, 4, 2, &mut seeds());
    let x = mixed_input(&[1, 8, 6, 6]);
    let shortcut = block.shortcut().forward(&x).unwrap();
    assert_eq!(shortcut.shape(), &[1, 16, 3, 3]);
}

#[test]
fn basic_block_shapes() {
    let block = BasicBlock::new(3, 6, 2, &mut seeds());
    let y = block.forward(&mixed_input(&[2, 3, 7, 7])).unwrap();
    assert_eq!(y.shape(), &[2, 6, 4, 4]);
    assert!(y.data().iter().all(|&v| v >= 0.0));
}

#[test]
fn bottleneck_shapes() {
    let block = Bottleneck::new(8, 2, 1, &mut seeds());
    let y = block.forward(&mixed_input(&[1, 8, 4, 4])).unwrap();
    assert_eq!(y.shape(), &[1, 8, 4, 4]);
}

#[test]
fn basic_block_reports_activation_then_output() {
    let block = Block::new(BlockKind::Basic, 2, 3, 2, &mut seeds());
    let mut rec = Recorder::default();
    let site = BlockSite { stage: 2, block: 0 };
    block
        .forward_with(&mixed_input(&[1, 2, 4, 4]), site, &mut rec)
        .unwrap();

    assert_eq!(
        rec.0,
        vec![
            (
                ProbePoint::BlockActivation { stage: 2, block: 0 },
                vec![1, 3, 2, 2]
            ),
            (
                ProbePoint::BlockOutput { stage: 2, block: 0 },
                vec![1, 3, 2, 2]
            ),
        ]
    );
}

#[test]
fn bottleneck_reports_nothing() {
    let block = Block::new(BlockKind::Bottleneck, 4, 1, 1, &mut seeds());
    let mut rec = Recorder::default();
    block
        .forward_with(&mixed_input(&[1, 4, 3, 3]), BlockSite::default(), &mut rec)
        .unwrap();
    assert!(rec.0.is_empty());
}

#[test]
fn block_enum_reports_geometry() {
    let block = Block::new(BlockKind::Bottleneck, 64, 32, 2, &mut seeds());
    assert_eq!(block.kind(), BlockKind::Bottleneck);
    assert_eq!(block.stride(), 2);
    assert!(block.shortcut().is_projection());
}

#[test]
fn wrong_input_channels_are_rejected() {
    let block = BasicBlock::new(4, 4, 1, &mut seeds());
    let err = block.forward(&mixed_input(&[1, 3, 4, 4])).unwrap_err();
    assert!(matches!(err, ResNetError::ShapeMismatch { .. }));
}

#[test]
fn seeded_blocks_are_reproducible() {
    let a = BasicBlock::new(2, 2, 1, &mut seeds());
    let b = BasicBlock::new(2, 2, 1, &mut seeds());
    let x = mixed_input(&[1, 2, 3, 3]);
    assert_eq!(a.forward(&x).unwrap(), b.forward(&x).unwrap());
}

#[test]
fn parameters_include_shortcut() {
    let identity = BasicBlock::new(4, 4, 1, &mut seeds());
    let projected = BasicBlock::new(4, 4, 2, &mut seeds());
    // conv1, bn1 (2), conv2, bn2 (2)
    assert_eq!(identity.parameters().len(), 6);
    // + conv1x1, bn (2)
    assert_eq!(projected.parameters().len(), 9);
}

#[test]
fn eval_mode_propagates() {
    let mut block = Block::new(BlockKind::Basic, 2, 2, 2, &mut seeds());
    assert!(block.training());
    block.eval();
    assert!(!block.training());
}
