//! Externally supplied model predictions blended into the meta-features

use crate::error::{Result, StackcastError};
use ndarray::Array1;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;

/// Column holding the window ordinal in prediction files
pub const WINDOW_COLUMN: &str = "window";
/// Column holding the horizon step in prediction files
pub const HORIZON_COLUMN: &str = "horizon";

/// Predictions of a separately trained model for one era, keyed by
/// (window ordinal within the era, horizon step).
#[derive(Debug, Clone, Default)]
pub struct ExternalPredictions {
    name: String,
    values: HashMap<(usize, usize), f64>,
}

impl ExternalPredictions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn insert(&mut self, window: usize, step: usize, value: f64) {
        self.values.insert((window, step), value);
    }

    /// Build from a dense `windows x horizon` grid of values
    pub fn from_grid(name: impl Into<String>, grid: &ndarray::Array2<f64>) -> Self {
        let mut preds = Self::new(name);
        for ((window, step), &value) in grid.indexed_iter() {
            preds.insert(window, step, value);
        }
        preds
    }

    /// Read a CSV with `window`, `horizon` and `value_column` columns
    pub fn load_csv(path: &Path, value_column: &str) -> Result<Self> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(value_column)
            .to_string();
        Self::from_dataframe(name, &df, value_column)
    }

    pub fn from_dataframe(name: impl Into<String>, df: &DataFrame, value_column: &str) -> Result<Self> {
        let name = name.into();
        let lookup = |col: &str| {
            df.column(col).map_err(|_| {
                StackcastError::ConfigurationMismatch(format!(
                    "external predictions '{}' have no '{}' column",
                    name, col
                ))
            })
        };

        let windows = lookup(WINDOW_COLUMN)?.cast(&DataType::Int64)?;
        let steps = lookup(HORIZON_COLUMN)?.cast(&DataType::Int64)?;
        let values = lookup(value_column)?.cast(&DataType::Float64)?;

        let mut preds = Self::new(name.clone());
        for (row, ((window, step), value)) in windows
            .i64()?
            .into_iter()
            .zip(steps.i64()?.into_iter())
            .zip(values.f64()?.into_iter())
            .enumerate()
        {
            match (window, step, value) {
                (Some(w), Some(h), Some(v)) if w >= 0 && h >= 0 => {
                    preds.insert(w as usize, h as usize, v);
                }
                _ => {
                    return Err(StackcastError::DataError(format!(
                        "external predictions '{}' have an invalid row {}",
                        name, row
                    )))
                }
            }
        }
        Ok(preds)
    }

    pub fn get(&self, window: usize, step: usize) -> Result<f64> {
        self.values.get(&(window, step)).copied().ok_or_else(|| {
            StackcastError::ExternalPredictionMisalignment {
                source_name: self.name.clone(),
                window,
                step,
            }
        })
    }

    /// Values for windows `0..n_windows` at one horizon step
    pub fn column(&self, step: usize, n_windows: usize) -> Result<Array1<f64>> {
        (0..n_windows)
            .map(|w| self.get(w, step))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }

    /// Check that every (window, step) key needed by a run is present
    pub fn ensure_covers(&self, n_windows: usize, horizon: usize) -> Result<()> {
        for step in 0..horizon {
            for window in 0..n_windows {
                self.get(window, step)?;
            }
        }
        Ok(())
    }
}

/// Auxiliary predictions for both eras of one target
#[derive(Debug, Clone)]
pub struct AuxiliaryForecast {
    pub train: ExternalPredictions,
    pub test: ExternalPredictions,
}

impl AuxiliaryForecast {
    pub fn new(train: ExternalPredictions, test: ExternalPredictions) -> Self {
        Self { train, test }
    }

    pub fn ensure_covers(&self, n_train: usize, n_test: usize, horizon: usize) -> Result<()> {
        self.train.ensure_covers(n_train, horizon)?;
        self.test.ensure_covers(n_test, horizon)
    }
}
