//! Walk-forward forecasting run
//!
//! - [`config`]: targets, covariate sets and run settings
//! - [`engine`]: the per-horizon-step stacking loop
//! - [`metrics`]: MAE, RMSE and floored MAPE
//! - [`export`]: per-target JSON records and the feature importance report

pub mod config;
pub mod engine;
pub mod export;
pub mod metrics;

pub use config::{AuxiliarySource, CovariateSet, ForecastConfig, TargetConfig, TestBoundary};
pub use engine::{HorizonForecast, StackingForecaster, TargetOutcome, TOP_FEATURES};
pub use export::{
    write_feature_importance, FeatureImportance, FeatureWeight, ForecastOutput, ForecastRecord,
    FEATURE_IMPORTANCE_FILE, TIME_FORMAT,
};
pub use metrics::{r_squared, round_to, ForecastMetrics, MAPE_DENOMINATOR_FLOOR};
