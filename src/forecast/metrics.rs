//! Aggregate error metrics over all test windows and horizon steps

use crate::error::{Result, StackcastError};
use ndarray::{ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

/// MAPE divides by `max(|actual|, MAPE_DENOMINATOR_FLOOR)`
pub const MAPE_DENOMINATOR_FLOOR: f64 = 1.0;

/// Round to `decimals` places using the exact decimal value of `value`,
/// exact ties going to the even digit (4.35 is stored below 4.35 and
/// becomes 4.3; 0.125 becomes 0.12)
pub fn round_to(value: f64, decimals: u32) -> f64 {
    format!("{:.*}", decimals as usize, value)
        .parse()
        .unwrap_or(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent
    pub mape: f64,
}

impl ForecastMetrics {
    /// Metrics over every element of two equally shaped arrays
    pub fn compute<S1, S2, D>(actual: &ArrayBase<S1, D>, predicted: &ArrayBase<S2, D>) -> Result<Self>
    where
        S1: Data<Elem = f64>,
        S2: Data<Elem = f64>,
        D: Dimension,
    {
        if actual.shape() != predicted.shape() {
            return Err(StackcastError::ShapeError {
                expected: format!("{:?}", actual.shape()),
                actual: format!("{:?}", predicted.shape()),
            });
        }
        if actual.is_empty() {
            return Err(StackcastError::DataError(
                "cannot compute metrics over zero forecasts".to_string(),
            ));
        }

        let n = actual.len() as f64;
        let (abs_sum, sq_sum, pct_sum) = actual.iter().zip(predicted.iter()).fold(
            (0.0, 0.0, 0.0),
            |(abs_sum, sq_sum, pct_sum), (&a, &p)| {
                let err = a - p;
                (
                    abs_sum + err.abs(),
                    sq_sum + err * err,
                    pct_sum + err.abs() / a.abs().max(MAPE_DENOMINATOR_FLOOR),
                )
            },
        );

        Ok(Self {
            mae: abs_sum / n,
            rmse: (sq_sum / n).sqrt(),
            mape: pct_sum / n * 100.0,
        })
    }

    pub fn rounded(&self, decimals: u32) -> Self {
        Self {
            mae: round_to(self.mae, decimals),
            rmse: round_to(self.rmse, decimals),
            mape: round_to(self.mape, decimals),
        }
    }
}

/// Coefficient of determination of `predicted` against `actual`. A constant
/// `actual` scores 1 when matched exactly and 0 otherwise.
pub fn r_squared<S1, S2, D>(actual: &ArrayBase<S1, D>, predicted: &ArrayBase<S2, D>) -> Result<f64>
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    if actual.shape() != predicted.shape() || actual.is_empty() {
        return Err(StackcastError::ShapeError {
            expected: format!("{:?}, non-empty", actual.shape()),
            actual: format!("{:?}", predicted.shape()),
        });
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let (ss_res, ss_tot) = actual
        .iter()
        .zip(predicted.iter())
        .fold((0.0, 0.0), |(res, tot), (&a, &p)| (res + (a - p).powi(2), tot + (a - mean).powi(2)));

    Ok(if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    })
}
