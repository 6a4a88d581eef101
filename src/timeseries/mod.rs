//! Walk-forward window geometry and feature extraction
//!
//! - [`WindowIndexer`] decides which window starts are used for training
//!   and which for evaluation
//! - [`FeatureExtractor`] turns one (window, horizon step) pair into a
//!   fixed-length feature vector

mod features;
mod windows;

pub use features::{FeatureConfig, FeatureExtractor, RollingStat, CALENDAR_FEATURES};
pub use windows::{WindowConfig, WindowIndexer, WindowPlan};
