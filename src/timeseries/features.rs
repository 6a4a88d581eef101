//! Per-(window, horizon step) feature extraction

use crate::data::TimeSeries;
use crate::error::{Result, StackcastError};
use chrono::{Datelike, Timelike};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Calendar features, in extraction order
pub const CALENDAR_FEATURES: [&str; 4] = ["hour", "month", "day_of_week", "is_weekend"];

/// Rolling statistics types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RollingStat {
    Mean,
    Std,
    Min,
    Max,
}

impl RollingStat {
    /// Statistics computed for every lookback window, in extraction order
    pub const ALL: [RollingStat; 4] = [
        RollingStat::Mean,
        RollingStat::Std,
        RollingStat::Min,
        RollingStat::Max,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RollingStat::Mean => "mean",
            RollingStat::Std => "std",
            RollingStat::Min => "min",
            RollingStat::Max => "max",
        }
    }

    /// Population statistic over a non-empty slice
    pub fn compute(&self, values: &[f64]) -> f64 {
        let n = values.len() as f64;
        match self {
            RollingStat::Mean => values.iter().sum::<f64>() / n,
            RollingStat::Std => {
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                variance.sqrt()
            }
            RollingStat::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            RollingStat::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

/// Configuration for target-history statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Lookback lengths, each summarised by every [`RollingStat`]
    pub rolling_windows: Vec<usize>,
    /// Append the most recent observed target value
    pub include_last_value: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            rolling_windows: vec![24, 168],
            include_last_value: true,
        }
    }
}

impl FeatureConfig {
    pub fn with_rolling_windows(mut self, windows: Vec<usize>) -> Self {
        self.rolling_windows = windows;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.rolling_windows.iter().any(|&w| w == 0) {
            return Err(StackcastError::ConfigurationMismatch(
                "rolling windows must be at least 1 step long".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builds fixed-length feature vectors for one target.
///
/// The vector at `(start, h)` describes index `start + h`:
/// covariates read at that index (they are forecasts known in advance),
/// calendar scalars of its timestamp, and statistics of the target strictly
/// before it. Short histories are summarised over whatever is available,
/// and an empty history counts as a single zero sample.
#[derive(Debug, Clone)]
pub struct FeatureExtractor<'a> {
    series: &'a TimeSeries,
    target: &'a Array1<f64>,
    covariate_names: Vec<String>,
    covariates: Vec<&'a Array1<f64>>,
    config: FeatureConfig,
}

impl<'a> FeatureExtractor<'a> {
    /// Resolve the target and covariate columns. Missing columns are a
    /// configuration mismatch.
    pub fn new(
        series: &'a TimeSeries,
        target_col: &str,
        covariate_cols: &[String],
        config: FeatureConfig,
    ) -> Result<Self> {
        config.validate()?;
        let target = series.column(target_col)?;
        let covariates = covariate_cols
            .iter()
            .map(|name| series.column(name))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            series,
            target,
            covariate_names: covariate_cols.to_vec(),
            covariates,
            config,
        })
    }

    pub fn n_features(&self) -> usize {
        self.covariates.len()
            + CALENDAR_FEATURES.len()
            + self.config.rolling_windows.len() * RollingStat::ALL.len()
            + usize::from(self.config.include_last_value)
    }

    /// Names in the same order as the extracted values
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = self.covariate_names.clone();
        names.extend(CALENDAR_FEATURES.iter().map(|s| s.to_string()));
        for window in &self.config.rolling_windows {
            for stat in RollingStat::ALL {
                names.push(format!("target_{}_{}", stat.name(), window));
            }
        }
        if self.config.include_last_value {
            names.push("target_last".to_string());
        }
        names
    }

    /// Feature vector for the window starting at `start`, horizon step `h`
    pub fn extract(&self, start: usize, h: usize) -> Result<Array1<f64>> {
        let idx = start + h;
        let timestamp = self.series.timestamp(idx).ok_or_else(|| {
            StackcastError::DataError(format!(
                "forecast index {} (window start {}, step {}) is outside the series of length {}",
                idx,
                start,
                h,
                self.series.len()
            ))
        })?;

        let mut row = Vec::with_capacity(self.n_features());
        row.extend(self.covariates.iter().map(|col| col[idx]));

        let weekday = timestamp.weekday().num_days_from_monday();
        row.push(timestamp.hour() as f64);
        row.push(timestamp.month() as f64);
        row.push(weekday as f64);
        row.push(if weekday >= 5 { 1.0 } else { 0.0 });

        // History strictly before idx
        let target = self.target.as_slice().ok_or_else(|| {
            StackcastError::ComputationError("target column is not contiguous".to_string())
        })?;
        let history = &target[..idx];

        for &window in &self.config.rolling_windows {
            let context = lookback(history, window);
            for stat in RollingStat::ALL {
                row.push(stat.compute(context));
            }
        }

        if self.config.include_last_value {
            row.push(history.last().copied().unwrap_or(0.0));
        }

        Ok(Array1::from_vec(row))
    }

    /// Stack feature vectors for many windows at one horizon step
    pub fn matrix(&self, starts: &[usize], h: usize) -> Result<Array2<f64>> {
        let n_features = self.n_features();
        let mut x = Array2::zeros((starts.len(), n_features));
        for (row, &start) in starts.iter().enumerate() {
            x.row_mut(row).assign(&self.extract(start, h)?);
        }
        Ok(x)
    }

    /// Target values at `start + h` for many windows
    pub fn targets(&self, starts: &[usize], h: usize) -> Array1<f64> {
        starts.iter().map(|&start| self.target[start + h]).collect()
    }
}

const ZERO_SAMPLE: [f64; 1] = [0.0];

/// The last `window` values of `history`, or a single zero sample when
/// there is no history at all.
fn lookback(history: &[f64], window: usize) -> &[f64] {
    if history.is_empty() {
        return &ZERO_SAMPLE;
    }
    let from = history.len().saturating_sub(window);
    &history[from..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ndarray::array;

    fn series() -> TimeSeries {
        // 2018-01-05 is a Friday
        let start = Utc.with_ymd_and_hms(2018, 1, 5, 20, 0, 0).unwrap();
        TimeSeries::hourly(start, 8)
            .unwrap()
            .with_column("load", array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
            .unwrap()
            .with_column("temp", array![10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0])
            .unwrap()
    }

    #[test]
    fn test_rolling_stats() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(RollingStat::Mean.compute(&values), 2.5);
        assert!((RollingStat::Std.compute(&values) - 1.118033988749895).abs() < 1e-12);
        assert_eq!(RollingStat::Min.compute(&values), 1.0);
        assert_eq!(RollingStat::Max.compute(&values), 4.0);
    }

    #[test]
    fn test_feature_layout() {
        let s = series();
        let config = FeatureConfig::default().with_rolling_windows(vec![2, 168]);
        let fx = FeatureExtractor::new(&s, "load", &["temp".to_string()], config).unwrap();

        let names = fx.feature_names();
        assert_eq!(names.len(), fx.n_features());
        assert_eq!(fx.n_features(), 1 + 4 + 8 + 1);

        // start 3, step 2 -> index 5, 2018-01-06 01:00 (Saturday)
        let v = fx.extract(3, 2).unwrap();
        assert_eq!(v.len(), fx.n_features());
        assert_eq!(v[0], 15.0);
        assert_eq!(&v.as_slice().unwrap()[1..5], &[1.0, 1.0, 5.0, 1.0]);
        // last 2 values before index 5: [4, 5]
        assert_eq!(v[5], 4.5);
        assert_eq!(v[7], 4.0);
        assert_eq!(v[8], 5.0);
        // all 5 values before index 5
        assert_eq!(v[9], 3.0);
        assert_eq!(v[13], 5.0);
    }

    #[test]
    fn test_empty_history_falls_back_to_zero() {
        let s = series();
        let fx = FeatureExtractor::new(&s, "load", &[], FeatureConfig::default()).unwrap();
        let v = fx.extract(0, 0).unwrap();

        assert!(v.iter().all(|x| x.is_finite()));
        assert!(v.iter().skip(CALENDAR_FEATURES.len()).all(|&x| x == 0.0));
    }

    #[test]
    fn test_missing_covariate() {
        let s = series();
        let err = FeatureExtractor::new(&s, "load", &["wind".to_string()], FeatureConfig::default())
            .unwrap_err();
        assert!(err.is_configuration_mismatch());
    }

    #[test]
    fn test_out_of_range_index() {
        let s = series();
        let fx = FeatureExtractor::new(&s, "load", &[], FeatureConfig::default()).unwrap();
        assert!(fx.extract(6, 2).is_err());
    }

    #[test]
    fn test_matrix_and_targets() {
        let s = series();
        let fx = FeatureExtractor::new(&s, "load", &["temp".to_string()], FeatureConfig::default()).unwrap();
        let x = fx.matrix(&[0, 2, 4], 1).unwrap();
        assert_eq!(x.dim(), (3, fx.n_features()));
        assert_eq!(x.column(0).to_vec(), vec![11.0, 13.0, 15.0]);
        assert_eq!(fx.targets(&[0, 2, 4], 1), array![2.0, 4.0, 6.0]);
    }
}
