//! Stacking ensemble
//!
//! Out-of-fold base predictions, concatenated with externally supplied
//! forecasts, train a ridge meta-learner.

mod stacking;

pub use stacking::{meta_matrix, StackingConfig, StackingRegressor};
