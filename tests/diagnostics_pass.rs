//! Sparsity diagnostics driven through a full forward pass.

use resnet_sparsity::nn::Module;
use resnet_sparsity::{
    BlockKind, Diagnostics, DiagnosticsConfig, ResNet, ResNetConfig, ResNetError, Tensor,
};

fn narrow_net() -> ResNet {
    let config = ResNetConfig::custom(BlockKind::Basic, [2, 1, 1, 1])
        .with_widths(4, [4, 4, 8, 8])
        .with_num_classes(3)
        .with_seed(17);
    ResNet::new(config).expect("valid config")
}

/// Zero every weight matrix and kernel, set every vector parameter (batch
/// norm scale/shift, linear bias) to one. Every feature map is then a
/// positive constant.
fn saturate(net: &mut ResNet) {
    for param in net.parameters_mut() {
        let value = if param.ndim() == 1 { 1.0 } else { 0.0 };
        param.data_mut().fill(value);
    }
}

#[test]
fn test_counter_and_dumper_on_constant_network() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log = dir.path().join("feat.txt");

    let mut net = narrow_net();
    saturate(&mut net);

    let config = DiagnosticsConfig::default().with_feature_log(&log);
    let mut diagnostics = Diagnostics::with_writer(&config, Vec::new());
    let logits = net
        .forward_with(&Tensor::ones(&[1, 3, 4, 4]), &mut diagnostics)
        .expect("forward");
    assert_eq!(logits.data(), &[1.0, 1.0, 1.0]);

    // Five blocks, two summaries each, every map dense
    let summary = String::from_utf8(diagnostics.into_writer().expect("counter enabled"))
        .expect("utf8 summary");
    assert_eq!(summary.matches("(layer-wise non-zeros: 1)").count(), 10);
    assert_eq!(
        summary.matches("(featuremap-wise all-zeros: 0/4=0.0000)").count(),
        6
    );
    assert_eq!(
        summary.matches("(featuremap-wise all-zeros: 0/8=0.0000)").count(),
        4
    );

    // Stage 1 output only: four 4x4 channels at 100%
    let text = std::fs::read_to_string(&log).expect("feature log written");
    for channel in 0..4 {
        let header = format!("sparsity: 100/100: {channel}x4x4\n");
        assert_eq!(text.matches(&header).count(), 1, "{header}");
    }
    assert_eq!(text.matches("1, 1, 1, 1, \n").count(), 16);
    assert!(!text.contains("0, "));
}

#[test]
fn test_feature_log_accumulates_across_passes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log = dir.path().join("feat.txt");

    let mut net = narrow_net();
    saturate(&mut net);

    let config = DiagnosticsConfig::default()
        .with_feature_log(&log)
        .with_sparsity_counts(false);
    let x = Tensor::ones(&[2, 3, 4, 4]);
    for _ in 0..3 {
        let mut diagnostics = Diagnostics::with_writer(&config, Vec::new());
        net.forward_with(&x, &mut diagnostics).expect("forward");
    }

    let text = std::fs::read_to_string(&log).expect("feature log written");
    assert_eq!(text.matches("sparsity: ").count(), 12);
}

#[test]
fn test_dump_stage_is_configurable() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log = dir.path().join("stage3.txt");

    let mut net = narrow_net();
    saturate(&mut net);

    let config = DiagnosticsConfig::default()
        .with_feature_log(&log)
        .with_dump_stage(3)
        .with_sparsity_counts(false);
    let mut diagnostics = Diagnostics::with_writer(&config, Vec::new());
    net.forward_with(&Tensor::ones(&[1, 3, 8, 8]), &mut diagnostics)
        .expect("forward");

    // Stage 3 halves 8x8 twice and has eight channels
    let text = std::fs::read_to_string(&log).expect("feature log written");
    assert_eq!(text.matches("sparsity: 100/100: ").count(), 8);
    assert!(text.contains("7x2x2"));
}

#[test]
fn test_unwritable_log_fails_the_pass() {
    let dir = tempfile::tempdir().expect("temp dir");
    let log = dir.path().join("no_such_dir").join("feat.txt");

    let mut net = narrow_net();
    saturate(&mut net);

    let config = DiagnosticsConfig::default()
        .with_feature_log(&log)
        .with_sparsity_counts(false);
    let mut diagnostics = Diagnostics::with_writer(&config, Vec::new());
    let err = net
        .forward_with(&Tensor::ones(&[1, 3, 4, 4]), &mut diagnostics)
        .unwrap_err();
    assert!(matches!(err, ResNetError::Io(_)));
}

#[test]
fn test_diagnostics_do_not_change_logits() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = DiagnosticsConfig::default().with_feature_log(dir.path().join("feat.txt"));

    let net = narrow_net();
    let x = Tensor::from_fn(&[2, 3, 6, 6], |i| ((i * 7 % 23) as f32 - 11.0) / 11.0);

    let plain = net.forward(&x).expect("forward");
    let mut diagnostics = Diagnostics::with_writer(&config, Vec::new());
    let observed = net.forward_with(&x, &mut diagnostics).expect("forward");
    assert_eq!(plain, observed);

    let summary = String::from_utf8(diagnostics.into_writer().expect("counter enabled"))
        .expect("utf8 summary");
    assert_eq!(summary.matches("layer-wise non-zeros").count(), 10);
}
