//! Chronologically ordered multi-column time series

use crate::error::{Result, StackcastError};
use chrono::{DateTime, Duration, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One weighted input of a [`DerivedColumn`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnTerm {
    pub column: String,
    pub weight: f64,
}

/// A column computed as a weighted sum of existing columns,
/// e.g. residual load = load - solar - wind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedColumn {
    pub name: String,
    pub terms: Vec<ColumnTerm>,
}

impl DerivedColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            terms: Vec::new(),
        }
    }

    /// Add `column` with weight +1
    pub fn plus(mut self, column: impl Into<String>) -> Self {
        self.terms.push(ColumnTerm {
            column: column.into(),
            weight: 1.0,
        });
        self
    }

    /// Add `column` with weight -1
    pub fn minus(mut self, column: impl Into<String>) -> Self {
        self.terms.push(ColumnTerm {
            column: column.into(),
            weight: -1.0,
        });
        self
    }
}

/// Timestamped table of named numeric columns.
///
/// Row order is chronological order; timestamps are strictly increasing.
/// No resampling is performed, so gaps are kept as they are and can be
/// rejected with [`TimeSeries::ensure_contiguous`].
#[derive(Debug, Clone)]
pub struct TimeSeries {
    timestamps: Vec<DateTime<Utc>>,
    columns: Vec<String>,
    values: HashMap<String, Array1<f64>>,
}

impl TimeSeries {
    /// Create a series with no value columns. Fails if timestamps are not
    /// strictly increasing.
    pub fn new(timestamps: Vec<DateTime<Utc>>) -> Result<Self> {
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(StackcastError::DataError(format!(
                "timestamps must be strictly increasing: row {} ({}) is not after row {} ({})",
                pos + 1,
                timestamps[pos + 1],
                pos,
                timestamps[pos],
            )));
        }

        Ok(Self {
            timestamps,
            columns: Vec::new(),
            values: HashMap::new(),
        })
    }

    /// Hourly series starting at `start`, convenient for synthetic data.
    pub fn hourly(start: DateTime<Utc>, len: usize) -> Result<Self> {
        let timestamps = (0..len)
            .map(|i| start + Duration::hours(i as i64))
            .collect();
        Self::new(timestamps)
    }

    /// Builder form of [`TimeSeries::insert_column`]
    pub fn with_column(mut self, name: impl Into<String>, values: Array1<f64>) -> Result<Self> {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Insert or replace a column. Its length must match the timestamps.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Array1<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("column '{}' length = {}", name, self.len()),
                actual: format!("column '{}' length = {}", name, values.len()),
            });
        }

        if !self.values.contains_key(&name) {
            self.columns.push(name.clone());
        }
        self.values.insert(name, values);
        Ok(())
    }

    /// Compute a derived column and insert it
    pub fn add_derived(&mut self, derived: &DerivedColumn) -> Result<()> {
        let mut out = Array1::zeros(self.len());
        for term in &derived.terms {
            let col = self.column(&term.column)?;
            out.scaled_add(term.weight, col);
        }
        self.insert_column(derived.name.clone(), out)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timestamp(&self, idx: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(idx).copied()
    }

    /// Column names in insertion order
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Array1<f64>> {
        self.values.get(name).ok_or_else(|| {
            StackcastError::ConfigurationMismatch(format!(
                "column '{}' not found in input data",
                name
            ))
        })
    }

    /// Index of the first row whose timestamp is at or after `cutoff`.
    /// Returns `len()` when every row is earlier.
    pub fn index_at_or_after(&self, cutoff: DateTime<Utc>) -> usize {
        self.timestamps.partition_point(|t| *t < cutoff)
    }

    /// Sampling interval, taken from the first two timestamps
    pub fn step(&self) -> Option<Duration> {
        match self.timestamps.as_slice() {
            [first, second, ..] => Some(*second - *first),
            _ => None,
        }
    }

    /// Require a gap-free series: every consecutive difference must equal
    /// the first one. Positional offsets are only meaningful under this
    /// precondition.
    pub fn ensure_contiguous(&self) -> Result<()> {
        let Some(step) = self.step() else {
            return Ok(());
        };

        for (i, pair) in self.timestamps.windows(2).enumerate() {
            let diff = pair[1] - pair[0];
            if diff != step {
                return Err(StackcastError::ConfigurationMismatch(format!(
                    "series is not contiguous: gap of {} min between rows {} and {} (expected {} min)",
                    diff.num_minutes(),
                    i,
                    i + 1,
                    step.num_minutes(),
                )));
            }
        }
        Ok(())
    }
}
