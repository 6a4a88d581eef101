//! Integration test: files in, forecast records out

use chrono::{Duration, TimeZone, Utc};
use stackcast::data::{ExternalPredictions, SeriesLoader};
use stackcast::error::StackcastError;
use stackcast::forecast::{
    AuxiliarySource, CovariateSet, ForecastConfig, ForecastOutput, StackingForecaster,
    TargetConfig, TestBoundary,
};
use stackcast::training::BaseModelPool;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

const LEN: usize = 500;

fn write_series_csv(dir: &Path) -> PathBuf {
    let start = Utc.with_ymd_and_hms(2017, 12, 10, 0, 0, 0).unwrap();
    let mut csv = String::from("time,gen,gen_tso,temp,city\n");
    for i in 0..LEN {
        let t = start + Duration::hours(i as i64);
        let value = 20.0 + (i % 24) as f64;
        writeln!(
            csv,
            "{}+00:00,{},{},{},madrid",
            t.format("%Y-%m-%d %H:%M:%S"),
            value,
            value + 0.5,
            (i % 7) as f64
        )
        .unwrap();
    }
    let path = dir.join("series.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn write_aux_csv(dir: &Path, name: &str, n_windows: usize) -> PathBuf {
    let mut csv = String::from("window,horizon,patchtst_pred\n");
    for w in 0..n_windows {
        for h in 0..24 {
            writeln!(csv, "{},{},{}", w, h, 20.0 + h as f64).unwrap();
        }
    }
    let path = dir.join(name);
    fs::write(&path, csv).unwrap();
    path
}

fn target() -> TargetConfig {
    TargetConfig::new("gen", "gen", "gen_tso", CovariateSet::Custom { columns: vec!["temp".to_string()] })
}

fn config(targets: Vec<TargetConfig>) -> ForecastConfig {
    ForecastConfig::default()
        .with_targets(targets)
        .with_base_models(BaseModelPool::mean_only())
        .with_test_start(TestBoundary::Index(400))
}

#[test]
fn test_csv_loads_into_series() {
    let dir = tempdir().unwrap();
    let path = write_series_csv(dir.path());

    let series = SeriesLoader::new("time").load(&path).unwrap();
    assert_eq!(series.len(), LEN);
    assert!(series.has_column("gen"));
    assert!(!series.has_column("city"));
    assert_eq!(series.column("gen_tso").unwrap()[3], 23.5);
    assert_eq!(
        series.timestamp(0),
        Some(Utc.with_ymd_and_hms(2017, 12, 10, 0, 0, 0).unwrap())
    );
    series.ensure_contiguous().unwrap();
}

#[test]
fn test_missing_time_column_is_rejected() {
    let dir = tempdir().unwrap();
    let path = write_series_csv(dir.path());

    let err = SeriesLoader::new("timestamp").load(&path).unwrap_err();
    assert!(matches!(err, StackcastError::ConfigurationMismatch(_)));
}

#[test]
fn test_external_predictions_from_csv() {
    let dir = tempdir().unwrap();
    let path = write_aux_csv(dir.path(), "gen_train.csv", 2);

    let preds = ExternalPredictions::load_csv(&path, "patchtst_pred").unwrap();
    assert_eq!(preds.name(), "gen_train");
    assert_eq!(preds.len(), 48);
    assert_eq!(preds.get(1, 5).unwrap(), 25.0);
    assert!(preds.get(2, 0).is_err());
}

#[test]
fn test_run_with_auxiliary_files_writes_json() {
    let dir = tempdir().unwrap();
    let data = write_series_csv(dir.path());
    write_aux_csv(dir.path(), "gen_train.csv", 9);
    write_aux_csv(dir.path(), "gen_test.csv", 4);

    let with_aux = target().with_auxiliary(AuxiliarySource::new("gen_train.csv", "gen_test.csv"));
    let cfg = config(vec![with_aux]);

    // Round-trip the configuration through its JSON file form
    let cfg_path = dir.path().join("config.json");
    fs::write(&cfg_path, cfg.to_json_string().unwrap()).unwrap();
    let cfg = ForecastConfig::from_json_file(&cfg_path).unwrap();

    let series = SeriesLoader::new(cfg.time_column.as_str()).load(&data).unwrap();
    let forecaster = StackingForecaster::new(&series, cfg).unwrap();
    let outcomes = forecaster.run_all(Some(dir.path()));
    assert_eq!(outcomes.len(), 1);
    let output = outcomes.into_iter().next().unwrap().result.unwrap();

    let out_dir = dir.path().join("out");
    let written = output.write_json(&out_dir).unwrap();
    assert_eq!(written, out_dir.join("gen.json"));

    let read: ForecastOutput = serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(read, output);
    assert_eq!(read.forecasts.len(), 4 * 24);
    assert_eq!(read.forecasts[0].time, "2017-12-26 16:00");
    assert!(read.forecasts.windows(2).all(|w| w[0].time <= w[1].time));

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&written).unwrap()).unwrap();
    for key in ["target", "model", "metrics", "forecasts"] {
        assert!(value.get(key).is_some(), "missing key {}", key);
    }
    for key in ["mae", "rmse", "mape"] {
        assert!(value["metrics"].get(key).is_some(), "missing metric {}", key);
    }
}

#[test]
fn test_missing_auxiliary_file_fails_only_that_target() {
    let dir = tempdir().unwrap();
    let data = write_series_csv(dir.path());

    let mut broken = target().with_auxiliary(AuxiliarySource::new("nope_train.csv", "nope_test.csv"));
    broken.name = "gen_with_aux".to_string();
    let series = SeriesLoader::default().load(&data).unwrap();
    let forecaster = StackingForecaster::new(&series, config(vec![broken, target()])).unwrap();

    let outcomes = forecaster.run_all(Some(dir.path()));
    assert!(outcomes[0].result.is_err());
    assert!(outcomes[1].result.is_ok());
}

#[test]
fn test_shipped_patchtst_config_matches_energy_default() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("configs/energy_patchtst.json");
    let cfg = ForecastConfig::from_json_file(&path).unwrap();

    let mut expected = ForecastConfig::energy_default();
    for target in &mut expected.targets {
        target.auxiliary = match target.name.as_str() {
            "solar" => Some(AuxiliarySource::new(
                "patchtst_solar_train_predictions.csv",
                "patchtst_solar_predictions.csv",
            )),
            "price" => Some(AuxiliarySource::new(
                "patchtst_price_train_predictions.csv",
                "patchtst_price_predictions.csv",
            )),
            _ => None,
        };
    }
    assert_eq!(cfg, expected);
}
