//! Integration test: window planning and leakage-free feature extraction

use chrono::{TimeZone, Utc};
use ndarray::Array1;
use stackcast::data::TimeSeries;
use stackcast::timeseries::{FeatureConfig, FeatureExtractor, WindowConfig, WindowIndexer};

fn series(len: usize) -> TimeSeries {
    let start = Utc.with_ymd_and_hms(2017, 12, 1, 0, 0, 0).unwrap();
    TimeSeries::hourly(start, len)
        .unwrap()
        .with_column("y", Array1::from_shape_fn(len, |i| (i as f64 * 0.3).sin() * 10.0 + 20.0))
        .unwrap()
        .with_column("temp", Array1::from_shape_fn(len, |i| i as f64))
        .unwrap()
}

#[test]
fn test_every_window_fits_its_era() {
    for (len, boundary, stride) in [(500, 400, 24), (1000, 700, 7), (300, 250, 1), (200, 200, 24)] {
        let config = WindowConfig::new(168, 24).with_stride(stride);
        let plan = WindowIndexer::new(config).unwrap().plan(len, boundary);

        for &s in &plan.train_starts {
            assert!(s >= 168);
            assert!(s + 24 <= boundary, "train window {} crosses boundary {}", s, boundary);
        }
        for &s in &plan.test_starts {
            assert!(s >= boundary && s >= 168);
            assert!(s + 24 <= len);
        }
        assert!(plan.train_starts.windows(2).all(|w| w[1] - w[0] == stride));
        assert!(plan.test_starts.windows(2).all(|w| w[1] - w[0] == stride));
    }
}

#[test]
fn test_short_series_has_no_test_windows() {
    let plan = WindowIndexer::new(WindowConfig::default()).unwrap().plan(410, 400);
    assert_eq!(plan.n_test(), 0);
    assert!(plan.n_train() > 0);
}

#[test]
fn test_future_target_values_do_not_leak() {
    let base = series(500);
    let covs = vec!["temp".to_string()];
    let extractor = FeatureExtractor::new(&base, "y", &covs, FeatureConfig::default()).unwrap();

    let (start, h) = (200, 5);
    let idx = start + h;
    let before = extractor.extract(start, h).unwrap();

    // Overwrite the target at and after the forecast index
    let mut perturbed_y = base.column("y").unwrap().clone();
    for v in perturbed_y.iter_mut().skip(idx) {
        *v = -1_000.0;
    }
    let mut perturbed = base.clone();
    perturbed.insert_column("y", perturbed_y).unwrap();
    let extractor = FeatureExtractor::new(&perturbed, "y", &covs, FeatureConfig::default()).unwrap();
    let after = extractor.extract(start, h).unwrap();

    assert_eq!(before, after);
    assert_eq!(extractor.targets(&[start], h)[0], -1_000.0);
}

#[test]
fn test_past_target_values_do_change_features() {
    let base = series(500);
    let covs = vec!["temp".to_string()];
    let extractor = FeatureExtractor::new(&base, "y", &covs, FeatureConfig::default()).unwrap();
    let before = extractor.extract(200, 0).unwrap();

    let mut y = base.column("y").unwrap().clone();
    y[199] += 50.0;
    let mut perturbed = base.clone();
    perturbed.insert_column("y", y).unwrap();
    let extractor = FeatureExtractor::new(&perturbed, "y", &covs, FeatureConfig::default()).unwrap();
    let after = extractor.extract(200, 0).unwrap();

    assert_ne!(before, after);
    // Last value is the final feature
    assert_eq!(after[after.len() - 1], before[before.len() - 1] + 50.0);
}

#[test]
fn test_degenerate_lookback_is_finite() {
    let s = series(48);
    let extractor = FeatureExtractor::new(&s, "y", &[], FeatureConfig::default()).unwrap();

    for idx in [0, 1, 2, 30] {
        let row = extractor.extract(idx, 0).unwrap();
        assert_eq!(row.len(), extractor.n_features());
        assert!(row.iter().all(|v| v.is_finite()), "non-finite feature at index {}", idx);
    }

    // No history at all: every rolling statistic and the last value are zero
    let first = extractor.extract(0, 0).unwrap();
    assert!(first.iter().skip(4).all(|&v| v == 0.0));
}

#[test]
fn test_feature_layout_matches_names() {
    let s = series(300);
    let covs = vec!["temp".to_string()];
    let config = FeatureConfig::default().with_rolling_windows(vec![6, 24, 168]);
    let extractor = FeatureExtractor::new(&s, "y", &covs, config).unwrap();

    let names = extractor.feature_names();
    assert_eq!(names.len(), extractor.n_features());
    assert_eq!(names.len(), 1 + 4 + 3 * 4 + 1);
    assert_eq!(names[0], "temp");
    assert_eq!(names[1], "hour");

    let x = extractor.matrix(&[168, 192], 3).unwrap();
    assert_eq!(x.dim(), (2, names.len()));
    assert_eq!(x[[0, 0]], 171.0);
    assert_eq!(x[[1, 0]], 195.0);
}
