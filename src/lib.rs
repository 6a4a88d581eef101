//! Stackcast - walk-forward stacking forecasts for energy market targets
//!
//! For every target and every step of a multi-step horizon, stackcast fits a
//! fresh stacking ensemble on sliding-window features: gradient boosting,
//! ridge and random forest base models produce out-of-fold predictions that,
//! together with an operator's day-ahead forecast, train a ridge
//! meta-learner. Test-era predictions are scored and exported as JSON.
//!
//! # Modules
//!
//! - [`data`] - Time-indexed input table, loading, external predictions
//! - [`timeseries`] - Window planning and per-window feature extraction
//! - [`training`] - Base regressors and out-of-fold cross-validation
//! - [`ensemble`] - Stacking with a ridge meta-learner
//! - [`forecast`] - Run configuration, horizon loop, metrics, export
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Data and features
pub mod data;
pub mod timeseries;

// Models
pub mod training;
pub mod ensemble;

// Orchestration
pub mod forecast;

// Services
pub mod cli;

pub use error::{Result, StackcastError};

/// Prelude module for convenient imports
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, StackcastError};

    // Data
    pub use crate::data::{AuxiliaryForecast, DerivedColumn, ExternalPredictions, SeriesLoader, TimeSeries};

    // Windows and features
    pub use crate::timeseries::{FeatureConfig, FeatureExtractor, WindowConfig, WindowIndexer, WindowPlan};

    // Models
    pub use crate::training::{BaseModel, BaseModelPool, CrossValidator, Model, ModelSpec, RidgeRegression};

    // Ensemble
    pub use crate::ensemble::{StackingConfig, StackingRegressor};

    // Forecasting
    pub use crate::forecast::{
        CovariateSet, ForecastConfig, ForecastMetrics, ForecastOutput, HorizonForecast,
        StackingForecaster, TargetConfig, TestBoundary,
    };
}
