//! Run and per-target configuration

use crate::data::{AuxiliaryForecast, DerivedColumn, ExternalPredictions, TimeSeries};
use crate::ensemble::StackingConfig;
use crate::error::{Result, StackcastError};
use crate::timeseries::{FeatureConfig, WindowConfig};
use crate::training::{BaseModelPool, CrossValidator};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const CITIES: [&str; 5] = ["madrid", "bilbao", "barcelona", "seville", "valencia"];

/// `<measure>_<city>` for every measure, city-major within a measure
fn per_city(measures: &[&str]) -> Vec<String> {
    measures
        .iter()
        .flat_map(|m| CITIES.iter().map(move |c| format!("{}_{}", m, c)))
        .collect()
}

/// Named, ordered list of exogenous covariate columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovariateSet {
    Solar,
    WindOnshore,
    Load,
    ResidualLoad,
    Price,
    Custom { columns: Vec<String> },
}

impl CovariateSet {
    pub fn columns(&self) -> Vec<String> {
        match self {
            CovariateSet::Solar => per_city(&["clouds_all", "temp", "temp_max", "humidity"]),
            CovariateSet::WindOnshore => {
                per_city(&["wind_speed", "wind_deg", "pressure", "temp", "humidity"])
            }
            CovariateSet::Load => {
                per_city(&["temp", "temp_max", "temp_min", "humidity", "pressure", "wind_speed"])
            }
            CovariateSet::ResidualLoad => {
                per_city(&["temp", "temp_max", "humidity", "pressure", "wind_speed", "clouds_all"])
            }
            CovariateSet::Price => {
                per_city(&["pressure", "temp", "temp_max", "temp_min", "humidity", "wind_speed"])
            }
            CovariateSet::Custom { columns } => columns.clone(),
        }
    }
}

/// First index of the test era
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestBoundary {
    Index(usize),
    /// First row whose timestamp is at or after the cutoff
    Timestamp(DateTime<Utc>),
}

/// Where to read auxiliary per-(window, step) predictions for a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuxiliarySource {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    #[serde(default = "default_aux_column")]
    pub value_column: String,
}

fn default_aux_column() -> String {
    "patchtst_pred".to_string()
}

impl AuxiliarySource {
    pub fn new(train_path: impl Into<PathBuf>, test_path: impl Into<PathBuf>) -> Self {
        Self {
            train_path: train_path.into(),
            test_path: test_path.into(),
            value_column: default_aux_column(),
        }
    }

    /// Relative paths resolve against `base`
    pub fn load(&self, base: Option<&Path>) -> Result<AuxiliaryForecast> {
        let resolve = |p: &PathBuf| match base {
            Some(dir) if p.is_relative() => dir.join(p),
            _ => p.clone(),
        };
        let train = ExternalPredictions::load_csv(&resolve(&self.train_path), &self.value_column)?;
        let test = ExternalPredictions::load_csv(&resolve(&self.test_path), &self.value_column)?;
        Ok(AuxiliaryForecast::new(train, test))
    }
}

/// One forecast target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub target_col: String,
    /// Externally supplied forecast blended as a meta-feature
    pub reference_col: String,
    pub covariates: CovariateSet,
    #[serde(default)]
    pub clip_min: Option<f64>,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default)]
    pub auxiliary: Option<AuxiliarySource>,
}

fn default_decimals() -> u32 {
    1
}

impl TargetConfig {
    pub fn new(
        name: impl Into<String>,
        target_col: impl Into<String>,
        reference_col: impl Into<String>,
        covariates: CovariateSet,
    ) -> Self {
        Self {
            name: name.into(),
            target_col: target_col.into(),
            reference_col: reference_col.into(),
            covariates,
            clip_min: None,
            decimals: default_decimals(),
            auxiliary: None,
        }
    }

    pub fn with_clip_min(mut self, clip_min: f64) -> Self {
        self.clip_min = Some(clip_min);
        self
    }

    pub fn with_decimals(mut self, decimals: u32) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn with_auxiliary(mut self, source: AuxiliarySource) -> Self {
        self.auxiliary = Some(source);
        self
    }

    pub fn covariate_columns(&self) -> Vec<String> {
        self.covariates.columns()
    }

    /// Every column this target reads, target first
    pub fn required_columns(&self) -> Vec<String> {
        let mut cols = vec![self.target_col.clone(), self.reference_col.clone()];
        cols.extend(self.covariate_columns());
        cols
    }

    /// Checks that need no data: name and rounding precision
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StackcastError::ConfigurationMismatch(
                "target name must not be empty".to_string(),
            ));
        }
        if self.decimals > 12 {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "target '{}': decimals must be at most 12, got {}",
                self.name, self.decimals
            )));
        }
        Ok(())
    }

    /// Check every required column against the loaded series
    pub fn validate_against(&self, series: &TimeSeries) -> Result<()> {
        for col in self.required_columns() {
            if !series.has_column(&col) {
                return Err(StackcastError::ConfigurationMismatch(format!(
                    "target '{}': column '{}' not found in input data",
                    self.name, col
                )));
            }
        }
        Ok(())
    }
}

/// Full run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub time_column: String,
    pub test_start: TestBoundary,
    pub windows: WindowConfig,
    pub features: FeatureConfig,
    pub n_folds: usize,
    pub meta_alpha: f64,
    /// Run horizon steps on the rayon pool
    pub parallel_horizons: bool,
    /// Log progress every this many completed steps; 0 logs only the last
    pub progress_every: usize,
    pub require_contiguous: bool,
    /// Model name written into exported records
    pub model_label: String,
    /// Applied in order before any target is processed
    pub derived_columns: Vec<DerivedColumn>,
    pub base_models: BaseModelPool,
    pub targets: Vec<TargetConfig>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            time_column: "time".to_string(),
            test_start: TestBoundary::Timestamp(energy_test_start()),
            windows: WindowConfig::default(),
            features: FeatureConfig::default(),
            n_folds: 5,
            meta_alpha: 1.0,
            parallel_horizons: false,
            progress_every: 6,
            require_contiguous: true,
            model_label: "Stacking Ensemble".to_string(),
            derived_columns: Vec::new(),
            base_models: BaseModelPool::default_energy(),
            targets: Vec::new(),
        }
    }
}

fn energy_test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl ForecastConfig {
    /// Solar, onshore wind, load, residual load and price with their
    /// day-ahead reference forecasts; the test era is 2018.
    ///
    /// No auxiliary sources are attached here. `configs/energy_patchtst.json`
    /// is the same setup with PatchTST predictions blended into solar and
    /// price; run it with `--aux-dir` pointing at the prediction CSVs.
    pub fn energy_default() -> Self {
        Self {
            derived_columns: vec![
                DerivedColumn::new("residual_load")
                    .plus("total load actual")
                    .minus("generation solar")
                    .minus("generation wind onshore"),
                DerivedColumn::new("residual_load_tso")
                    .plus("total load forecast")
                    .minus("forecast solar day ahead")
                    .minus("forecast wind onshore day ahead"),
            ],
            targets: vec![
                TargetConfig::new("solar", "generation solar", "forecast solar day ahead", CovariateSet::Solar)
                    .with_clip_min(0.0),
                TargetConfig::new(
                    "wind_onshore",
                    "generation wind onshore",
                    "forecast wind onshore day ahead",
                    CovariateSet::WindOnshore,
                )
                .with_clip_min(0.0),
                TargetConfig::new("load", "total load actual", "total load forecast", CovariateSet::Load),
                TargetConfig::new("residual_load", "residual_load", "residual_load_tso", CovariateSet::ResidualLoad),
                TargetConfig::new("price", "price actual", "price day ahead", CovariateSet::Price)
                    .with_decimals(2),
            ],
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_targets(mut self, targets: Vec<TargetConfig>) -> Self {
        self.targets = targets;
        self
    }

    pub fn with_base_models(mut self, pool: BaseModelPool) -> Self {
        self.base_models = pool;
        self
    }

    pub fn with_test_start(mut self, boundary: TestBoundary) -> Self {
        self.test_start = boundary;
        self
    }

    pub fn with_windows(mut self, windows: WindowConfig) -> Self {
        self.windows = windows;
        self
    }

    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_parallel_horizons(mut self, parallel: bool) -> Self {
        self.parallel_horizons = parallel;
        self
    }

    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Keep only the named targets, in the given order
    pub fn select_targets(&mut self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        let selected = names
            .iter()
            .map(|n| {
                self.target(n).cloned().ok_or_else(|| {
                    StackcastError::ConfigurationMismatch(format!("unknown target '{}'", n))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        self.targets = selected;
        Ok(())
    }

    pub fn stacking_config(&self, target: &TargetConfig) -> StackingConfig {
        StackingConfig::default()
            .with_n_folds(self.n_folds)
            .with_meta_alpha(self.meta_alpha)
            .with_clip_min(target.clip_min)
    }

    /// Internal consistency, independent of any data
    pub fn validate(&self) -> Result<()> {
        self.windows.validate()?;
        self.features.validate()?;
        self.base_models.validate()?;
        if self.n_folds < 2 {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "n_folds must be at least 2, got {}",
                self.n_folds
            )));
        }
        if !(self.meta_alpha >= 0.0) {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "meta_alpha must be non-negative, got {}",
                self.meta_alpha
            )));
        }

        let mut names = HashSet::new();
        for target in &self.targets {
            target.validate()?;
            if !names.insert(target.name.as_str()) {
                return Err(StackcastError::ConfigurationMismatch(format!(
                    "duplicate target '{}'",
                    target.name
                )));
            }
        }
        Ok(())
    }

    /// Add the derived columns to a freshly loaded series
    pub fn prepare_series(&self, series: &mut TimeSeries) -> Result<()> {
        for derived in &self.derived_columns {
            series.add_derived(derived)?;
        }
        Ok(())
    }

    /// Row index where the test era begins
    pub fn resolve_boundary(&self, series: &TimeSeries) -> Result<usize> {
        match &self.test_start {
            TestBoundary::Index(idx) if *idx <= series.len() => Ok(*idx),
            TestBoundary::Index(idx) => Err(StackcastError::ConfigurationMismatch(format!(
                "test start index {} is beyond the series length {}",
                idx,
                series.len()
            ))),
            TestBoundary::Timestamp(cutoff) => Ok(series.index_at_or_after(*cutoff)),
        }
    }

    /// Data-dependent checks shared by all targets: contiguity and the
    /// fold count against the number of training windows. Columns are
    /// checked per target by [`TargetConfig::validate_against`].
    pub fn validate_against(&self, series: &TimeSeries, n_train_windows: usize) -> Result<()> {
        if self.require_contiguous {
            series.ensure_contiguous()?;
        }
        CrossValidator::new(self.n_folds).validate(n_train_windows)
    }
}
