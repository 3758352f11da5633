// =========================================================================
// Sparsity counter contract
//
//   - densities are per channel, first sample only, in [0, 1]
//   - "all-zero" means density == 0, "near-zero" means 0 < density <= 0.10
//   - empty channel sets / planes never divide by zero: ratios are None
//   - rendering wraps after `per_line` densities
// =========================================================================

use super::*;
use crate::diagnostics::ProbePoint;

fn two_plane_tensor(channels: usize, zero_channel: usize) -> Tensor {
    let area = 4;
    Tensor::from_fn(&[1, channels, 2, 2], |i| {
        if i / area == zero_channel {
            0.0
        } else {
            1.0
        }
    })
}

#[test]
fn one_all_zero_channel_among_n() {
    for n in 2..=8 {
        let report = SparsityReport::from_tensor(&two_plane_tensor(n, 0)).unwrap();
        assert_eq!(report.channels(), n);
        assert_eq!(report.all_zero_count(), 1);
        assert_eq!(report.near_zero_count(), 0);

        let all_zero = report.all_zero_ratio().unwrap();
        assert!((all_zero - 1.0 / n as f64).abs() < 1e-12, "n={n}: {all_zero}");
        assert_eq!(report.near_zero_ratio(), Some(0.0));
        assert_eq!(report.densities()[0], Some(0.0));
        assert_eq!(report.densities()[1], Some(1.0));
    }
}

#[test]
fn near_zero_boundary_is_inclusive() {
    // 10-element planes: 1 non-zero = exactly 0.10, 2 non-zero = 0.20
    let mut data = vec![0.0; 3 * 10];
    data[0] = 1.0; // channel 0: 0.1
    data[10] = 1.0; // channel 1: 0.2
    data[11] = 1.0;
    // channel 2: all zero
    let t = Tensor::new(&data, &[1, 3, 1, 10]);

    let report = SparsityReport::from_tensor(&t).unwrap();
    assert_eq!(report.near_zero_count(), 1);
    assert_eq!(report.all_zero_count(), 1);
    assert!((report.nonzero_ratio().unwrap() - 3.0 / 30.0).abs() < 1e-12);
}

#[test]
fn only_first_sample_is_counted() {
    // sample 0 all zero, sample 1 all ones
    let t = Tensor::from_fn(&[2, 2, 2, 2], |i| if i < 8 { 0.0 } else { 1.0 });
    let report = SparsityReport::from_tensor(&t).unwrap();
    assert_eq!(report.all_zero_count(), 2);
    assert_eq!(report.nonzero_ratio(), Some(0.0));
}

#[test]
fn zero_channels_report_undefined() {
    let report = SparsityReport::from_tensor(&Tensor::zeros(&[1, 0, 4, 4])).unwrap();
    assert_eq!(report.channels(), 0);
    assert_eq!(report.all_zero_ratio(), None);
    assert_eq!(report.near_zero_ratio(), None);
    assert_eq!(report.nonzero_ratio(), None);
    assert!(report.is_degenerate());

    let text = report.to_string();
    assert!(text.contains("all-zeros: 0/0=undefined"));
    assert!(text.contains("(layer-wise non-zeros: undefined)"));
}

#[test]
fn empty_planes_report_undefined() {
    let report = SparsityReport::from_tensor(&Tensor::zeros(&[1, 3, 0, 5])).unwrap();
    assert_eq!(report.densities(), &[None, None, None]);
    assert_eq!(report.all_zero_count(), 0);
    assert_eq!(report.all_zero_ratio(), Some(0.0));
    assert_eq!(report.nonzero_ratio(), None);
    assert!(report.to_string().starts_with("undefined, undefined, undefined, "));
}

#[test]
fn empty_batch_reports_undefined() {
    let report = SparsityReport::from_tensor(&Tensor::zeros(&[0, 2, 2, 2])).unwrap();
    assert_eq!(report.channels(), 2);
    assert!(report.is_degenerate());
}

#[test]
fn rejects_non_4d() {
    assert!(SparsityReport::from_tensor(&Tensor::zeros(&[2, 2])).is_err());
}

#[test]
fn render_matches_reference_layout() {
    let t = Tensor::new(&[0.0, 0.0, 1.0, 0.0], &[1, 2, 1, 2]);
    let report = SparsityReport::from_tensor(&t).unwrap();
    let expected = "0.00, 0.50, [1, 2, 1, 2]\n\
                    \n(featuremap-wise all-zeros: 1/2=0.5000) \n\
                    (featuremap-wise 0.1 non-zeros: 0/2=0.0000) \n\
                    (layer-wise non-zeros: 0.25)\n";
    assert_eq!(report.render(20), expected);
}

#[test]
fn render_wraps_every_per_line_channels() {
    let t = Tensor::ones(&[1, 25, 1, 1]);
    let report = SparsityReport::from_tensor(&t).unwrap();

    let text = report.render(CHANNELS_PER_LINE);
    let first_line = text.lines().next().unwrap();
    assert_eq!(first_line.matches("1.00,").count(), 20);

    let narrow = report.render(5);
    assert_eq!(narrow.lines().take(5).filter(|l| l.matches("1.00,").count() == 5).count(), 5);
}

#[test]
fn counter_ignores_stage_points() {
    let mut counter = SparsityCounter::with_writer(Vec::new());
    let t = Tensor::ones(&[1, 2, 2, 2]);

    counter
        .observe(ProbePoint::StageOutput { stage: 1 }, &t)
        .unwrap();
    assert!(counter.get_ref().is_empty());

    counter
        .observe(ProbePoint::BlockActivation { stage: 1, block: 0 }, &t)
        .unwrap();
    counter
        .observe(ProbePoint::BlockOutput { stage: 1, block: 0 }, &t)
        .unwrap();

    let text = String::from_utf8(counter.into_inner()).unwrap();
    assert_eq!(text.matches("(layer-wise non-zeros: 1)").count(), 2);
}

#[test]
fn counter_returns_report() {
    let mut counter = SparsityCounter::with_writer(Vec::new()).with_channels_per_line(1);
    let report = counter.count(&two_plane_tensor(3, 2)).unwrap();
    assert_eq!(report.all_zero_count(), 1);
    let text = String::from_utf8(counter.into_inner()).unwrap();
    assert!(text.starts_with("1.00, \n1.00, \n0.00, \n"));
}

mod sparsity_proptest {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn counts_are_bounded(
            channels in 0usize..12,
            side in 0usize..5,
            seed in any::<u64>(),
        ) {
            let mut state = seed | 1;
            let t = Tensor::from_fn(&[1, channels, side, side], |_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                if state % 3 == 0 { 0.0 } else { 1.0 }
            });

            let report = SparsityReport::from_tensor(&t).unwrap();
            prop_assert_eq!(report.channels(), channels);
            prop_assert!(report.all_zero_count() + report.near_zero_count() <= channels);
            for d in report.densities().iter().flatten() {
                prop_assert!((0.0..=1.0).contains(d));
            }
            if let Some(r) = report.nonzero_ratio() {
                prop_assert!((0.0..=1.0).contains(&r));
            }
            prop_assert!(!report.to_string().contains("NaN"));
        }
    }
}
