//! Per-target forecast records and their JSON files

use super::engine::HorizonForecast;
use super::metrics::{r_squared, round_to, ForecastMetrics};
use crate::data::TimeSeries;
use crate::error::{Result, StackcastError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Timestamp layout in exported records (UTC)
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// File holding every target's importance report
pub const FEATURE_IMPORTANCE_FILE: &str = "feature_importance.json";

const IMPORTANCE_DECIMALS: u32 = 4;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRecord {
    pub time: String,
    pub actual: f64,
    pub predicted: f64,
}

/// Published result for one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastOutput {
    pub target: String,
    pub model: String,
    pub metrics: ForecastMetrics,
    pub forecasts: Vec<ForecastRecord>,
}

impl ForecastOutput {
    /// Metrics are computed on unrounded values, then every number is
    /// rounded to `decimals`. Records are ordered by forecast index.
    pub fn assemble(
        forecast: &HorizonForecast,
        model_label: &str,
        decimals: u32,
        series: &TimeSeries,
    ) -> Result<Self> {
        let metrics = ForecastMetrics::compute(&forecast.actuals, &forecast.predictions)?.rounded(decimals);

        let mut cells: Vec<(usize, usize, usize)> = forecast
            .test_starts
            .iter()
            .enumerate()
            .flat_map(|(w, &start)| (0..forecast.horizon()).map(move |h| (start + h, w, h)))
            .collect();
        cells.sort_by_key(|&(idx, _, _)| idx);

        let forecasts = cells
            .into_iter()
            .map(|(idx, w, h)| {
                let time = series.timestamp(idx).ok_or_else(|| {
                    StackcastError::DataError(format!("forecast index {} is outside the series", idx))
                })?;
                Ok(ForecastRecord {
                    time: time.format(TIME_FORMAT).to_string(),
                    actual: round_to(forecast.actuals[[w, h]], decimals),
                    predicted: round_to(forecast.predictions[[w, h]], decimals),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            target: forecast.target.clone(),
            model: model_label.to_string(),
            metrics,
            forecasts,
        })
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Write `<dir>/<target>.json`, creating `dir` if needed
    pub fn write_json(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.json", self.target));
        let json = self.to_json_string()?;
        fs::write(&path, &json)?;

        info!(
            target = %self.target,
            path = %path.display(),
            kb = json.len() / 1024,
            points = self.forecasts.len(),
            mae = self.metrics.mae,
            "forecast exported"
        );
        Ok(path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub importance: f64,
}

/// Test-era fit quality and the most important features of one target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub r2: f64,
    pub features: Vec<FeatureWeight>,
}

impl FeatureImportance {
    /// `None` when no base model reported importances. Features are sorted
    /// by descending importance and cut to `top_n`.
    pub fn from_forecast(forecast: &HorizonForecast, top_n: usize) -> Result<Option<Self>> {
        let Some(importances) = &forecast.feature_importances else {
            return Ok(None);
        };
        if importances.len() != forecast.feature_names.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("{} importances", forecast.feature_names.len()),
                actual: format!("{} importances", importances.len()),
            });
        }

        let mut features: Vec<FeatureWeight> = forecast
            .feature_names
            .iter()
            .zip(importances.iter())
            .map(|(name, &importance)| FeatureWeight {
                feature: name.clone(),
                importance,
            })
            .collect();
        features.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        features.truncate(top_n);
        for f in &mut features {
            f.importance = round_to(f.importance, IMPORTANCE_DECIMALS);
        }

        Ok(Some(Self {
            r2: round_to(r_squared(&forecast.actuals, &forecast.predictions)?, IMPORTANCE_DECIMALS),
            features,
        }))
    }
}

/// Write `<dir>/feature_importance.json`, one entry per target
pub fn write_feature_importance(
    dir: &Path,
    reports: &BTreeMap<String, FeatureImportance>,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(FEATURE_IMPORTANCE_FILE);
    fs::write(&path, serde_json::to_string_pretty(reports)?)?;
    info!(path = %path.display(), targets = reports.len(), "feature importance exported");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    fn forecast() -> (HorizonForecast, TimeSeries) {
        let start = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        let series = TimeSeries::hourly(start, 8).unwrap();
        let forecast = HorizonForecast {
            target: "solar".to_string(),
            test_starts: vec![2, 4],
            predictions: array![[1.04, 2.26], [3.0, 4.0]],
            actuals: array![[1.0, 2.0], [3.0, 5.0]],
            feature_names: vec!["temp".to_string(), "hour".to_string(), "target_last".to_string()],
            feature_importances: None,
        };
        (forecast, series)
    }

    #[test]
    fn test_assemble_orders_and_rounds() {
        let (forecast, series) = forecast();
        let out = ForecastOutput::assemble(&forecast, "Stacking Ensemble", 1, &series).unwrap();

        assert_eq!(out.target, "solar");
        assert_eq!(out.model, "Stacking Ensemble");
        assert_eq!(out.forecasts.len(), 4);
        assert_eq!(out.forecasts[0].time, "2018-01-01 02:00");
        assert_eq!(out.forecasts[3].time, "2018-01-01 05:00");
        assert_eq!(out.forecasts[0].predicted, 1.0);
        assert_eq!(out.forecasts[1].predicted, 2.3);
        // (0.04 + 0.26 + 0 + 1) / 4
        assert_eq!(out.metrics.mae, 0.3);
    }

    #[test]
    fn test_overlapping_windows_sorted_by_time() {
        let (mut forecast, series) = forecast();
        forecast.test_starts = vec![3, 2];
        let out = ForecastOutput::assemble(&forecast, "m", 2, &series).unwrap();
        let times: Vec<&str> = out.forecasts.iter().map(|r| r.time.as_str()).collect();
        assert_eq!(times, vec!["2018-01-01 02:00", "2018-01-01 03:00", "2018-01-01 03:00", "2018-01-01 04:00"]);
        // At 03:00 window 0 stays ahead of window 1
        assert_eq!(out.forecasts[1].actual, 1.0);
        assert_eq!(out.forecasts[2].actual, 5.0);
    }

    #[test]
    fn test_json_shape() {
        let (forecast, series) = forecast();
        let out = ForecastOutput::assemble(&forecast, "Stacking Ensemble", 1, &series).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out.to_json_string().unwrap()).unwrap();

        assert_eq!(value["target"], "solar");
        assert!(value["metrics"]["mape"].is_number());
        assert_eq!(value["forecasts"][0]["time"], "2018-01-01 02:00");
    }

    #[test]
    fn test_feature_importance_report() {
        let (mut forecast, _) = forecast();
        assert!(FeatureImportance::from_forecast(&forecast, 7).unwrap().is_none());

        forecast.feature_importances = Some(array![0.2, 0.123456, 0.676544]);
        let report = FeatureImportance::from_forecast(&forecast, 2).unwrap().unwrap();
        let names: Vec<&str> = report.features.iter().map(|f| f.feature.as_str()).collect();
        assert_eq!(names, vec!["target_last", "temp"]);
        assert_eq!(report.features[0].importance, 0.6765);
        assert!(report.r2 > 0.0 && report.r2 < 1.0);

        forecast.feature_importances = Some(array![1.0]);
        assert!(FeatureImportance::from_forecast(&forecast, 2).is_err());
    }

    #[test]
    fn test_feature_importance_file() {
        let (mut forecast, _) = forecast();
        forecast.feature_importances = Some(array![0.5, 0.25, 0.25]);
        let report = FeatureImportance::from_forecast(&forecast, 7).unwrap().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let reports = BTreeMap::from([("solar".to_string(), report.clone())]);
        let path = write_feature_importance(dir.path(), &reports).unwrap();
        assert_eq!(path, dir.path().join("feature_importance.json"));

        let read: BTreeMap<String, FeatureImportance> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read["solar"], report);
        assert_eq!(read["solar"].features.len(), 3);
    }
}
