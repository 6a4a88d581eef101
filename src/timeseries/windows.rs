//! Window construction over the training and test eras

use crate::error::{Result, StackcastError};
use serde::{Deserialize, Serialize};

/// Geometry of context + forecast windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// History length assumed available before a window start (C)
    pub context_length: usize,
    /// Consecutive steps forecast per window (H)
    pub horizon: usize,
    /// Distance between consecutive window starts; `None` = horizon
    pub stride: Option<usize>,
    /// First training window start; `None` = context length
    pub train_origin: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            context_length: 168,
            horizon: 24,
            stride: None,
            train_origin: None,
        }
    }
}

impl WindowConfig {
    pub fn new(context_length: usize, horizon: usize) -> Self {
        Self {
            context_length,
            horizon,
            ..Default::default()
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn with_train_origin(mut self, origin: usize) -> Self {
        self.train_origin = Some(origin);
        self
    }

    pub fn stride(&self) -> usize {
        self.stride.unwrap_or(self.horizon)
    }

    pub fn train_origin(&self) -> usize {
        self.train_origin.unwrap_or(self.context_length)
    }

    pub fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            return Err(StackcastError::ConfigurationMismatch(
                "horizon must be at least 1".to_string(),
            ));
        }
        if self.stride() == 0 {
            return Err(StackcastError::ConfigurationMismatch(
                "window stride must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Window starts for both eras, as produced by [`WindowIndexer::plan`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub train_starts: Vec<usize>,
    pub test_starts: Vec<usize>,
    /// First index of the test era
    pub boundary: usize,
    pub horizon: usize,
    pub context_length: usize,
}

impl WindowPlan {
    pub fn n_train(&self) -> usize {
        self.train_starts.len()
    }

    pub fn n_test(&self) -> usize {
        self.test_starts.len()
    }
}

/// Partitions a series of known length into training and test windows.
///
/// Training windows satisfy `start + H <= boundary`. Test windows satisfy
/// `start >= boundary`, `start + H <= len` and `start >= C`. Windows that do
/// not fit are dropped, so either list may be empty.
#[derive(Debug, Clone, Default)]
pub struct WindowIndexer {
    config: WindowConfig,
}

impl WindowIndexer {
    pub fn new(config: WindowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn plan(&self, series_len: usize, boundary: usize) -> WindowPlan {
        let horizon = self.config.horizon;
        let stride = self.config.stride();
        let boundary = boundary.min(series_len);

        let train_starts = (self.config.train_origin()..)
            .step_by(stride)
            .take_while(|&start| start + horizon <= boundary)
            .collect();

        let test_starts = (boundary..)
            .step_by(stride)
            .take_while(|&start| start + horizon <= series_len)
            .filter(|&start| start >= self.config.context_length)
            .collect();

        WindowPlan {
            train_starts,
            test_starts,
            boundary,
            horizon,
            context_length: self.config.context_length,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let indexer = WindowIndexer::new(WindowConfig::default()).unwrap();
        let plan = indexer.plan(500, 400);

        assert_eq!(plan.train_starts, (168..=376).step_by(24).collect::<Vec<_>>());
        assert_eq!(plan.test_starts, vec![400, 424, 448, 472]);
    }

    #[test]
    fn test_windows_respect_boundaries() {
        let indexer = WindowIndexer::new(WindowConfig::new(10, 7).with_stride(3).with_train_origin(0)).unwrap();
        let plan = indexer.plan(103, 61);

        assert!(!plan.train_starts.is_empty());
        for &s in &plan.train_starts {
            assert!(s + 7 <= 61);
        }
        for &s in &plan.test_starts {
            assert!(s >= 61);
            assert!(s + 7 <= 103);
            assert!(s >= 10);
        }
        assert_eq!(plan.train_starts.first(), Some(&0));
    }

    #[test]
    fn test_short_eras_yield_empty_plans() {
        let indexer = WindowIndexer::new(WindowConfig::new(168, 24)).unwrap();
        let plan = indexer.plan(180, 170);
        assert!(plan.train_starts.is_empty());
        assert!(plan.test_starts.is_empty());
    }

    #[test]
    fn test_test_windows_need_full_context() {
        let indexer = WindowIndexer::new(WindowConfig::new(48, 24).with_train_origin(0)).unwrap();
        let plan = indexer.plan(200, 24);
        assert_eq!(plan.train_starts, vec![0]);
        assert_eq!(plan.test_starts.first(), Some(&48));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let err = WindowIndexer::new(WindowConfig::new(24, 0)).unwrap_err();
        assert!(err.is_configuration_mismatch());
    }
}
