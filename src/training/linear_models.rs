//! Ridge regression, used both as a base model and as the stacking meta-learner

use crate::error::{Result, StackcastError};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Lower-triangular factor of a symmetric positive-definite matrix
struct Cholesky {
    lower: Array2<f64>,
}

impl Cholesky {
    /// `None` when a pivot is not strictly positive
    fn factor(a: &Array2<f64>) -> Option<Self> {
        let n = a.nrows();
        let mut lower = Array2::<f64>::zeros((n, n));
        for i in 0..n {
            for j in 0..=i {
                let partial = lower.slice(s![i, ..j]).dot(&lower.slice(s![j, ..j]));
                let residual = a[[i, j]] - partial;
                lower[[i, j]] = if i == j {
                    if residual <= 0.0 {
                        return None;
                    }
                    residual.sqrt()
                } else {
                    residual / lower[[j, j]]
                };
            }
        }
        Some(Self { lower })
    }

    /// Solve `L Lᵀ x = b` by forward then backward substitution
    fn solve(&self, b: &Array1<f64>) -> Array1<f64> {
        let l = &self.lower;
        let n = l.nrows();

        let mut z = Array1::<f64>::zeros(n);
        for i in 0..n {
            z[i] = (b[i] - l.slice(s![i, ..i]).dot(&z.slice(s![..i]))) / l[[i, i]];
        }

        let mut x = Array1::<f64>::zeros(n);
        for i in (0..n).rev() {
            x[i] = (z[i] - l.slice(s![i + 1.., i]).dot(&x.slice(s![i + 1..]))) / l[[i, i]];
        }
        x
    }
}

/// Gaussian elimination with partial pivoting, for systems the Cholesky
/// path rejects
fn pivoted_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut m = a.clone();
    let mut rhs = b.clone();

    for col in 0..n {
        let pivot = (col..n).max_by(|&p, &q| m[[p, col]].abs().total_cmp(&m[[q, col]].abs()))?;
        if m[[pivot, col]].abs() < 1e-12 {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                m.swap([col, k], [pivot, k]);
            }
            rhs.swap(col, pivot);
        }
        for row in col + 1..n {
            let factor = m[[row, col]] / m[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                m[[row, k]] -= factor * m[[col, k]];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        x[i] = (rhs[i] - m.slice(s![i, i + 1..]).dot(&x.slice(s![i + 1..]))) / m[[i, i]];
    }
    Some(x)
}

/// Solve the ridge normal equations `(XᵀX + αI) w = Xᵀy`. A tiny diagonal
/// jitter is tried before falling back to pivoted elimination.
fn solve_normal_equations(gram: &Array2<f64>, rhs: &Array1<f64>) -> Option<Array1<f64>> {
    if let Some(chol) = Cholesky::factor(gram) {
        return Some(chol.solve(rhs));
    }
    let n = gram.nrows().max(1) as f64;
    let jitter = 1e-8 * gram.diag().iter().map(|v| v.abs()).sum::<f64>() / n;
    let mut jittered = gram.clone();
    jittered.diag_mut().mapv_inplace(|d| d + jitter);
    Cholesky::factor(&jittered)
        .map(|chol| chol.solve(rhs))
        .or_else(|| pivoted_solve(gram, rhs))
}

/// L2-regularised least squares. With `fit_intercept` the data are centred
/// first, so the intercept is not penalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: Option<f64>,
    pub fit_intercept: bool,
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha,
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        if x.nrows() == 0 {
            return Err(StackcastError::TrainingError("cannot fit ridge on zero rows".to_string()));
        }
        if !(self.alpha >= 0.0) {
            return Err(StackcastError::TrainingError(format!(
                "ridge alpha must be non-negative, got {}",
                self.alpha
            )));
        }

        let (x_offset, y_offset) = match (self.fit_intercept, x.mean_axis(Axis(0)), y.mean()) {
            (true, Some(xm), Some(ym)) => (xm, ym),
            _ => (Array1::zeros(x.ncols()), 0.0),
        };
        let xc = x - &x_offset.view().insert_axis(Axis(0));
        let yc = y - y_offset;

        let mut gram = xc.t().dot(&xc);
        gram.diag_mut().mapv_inplace(|d| d + self.alpha);
        let rhs = xc.t().dot(&yc);

        let weights = solve_normal_equations(&gram, &rhs).ok_or_else(|| {
            StackcastError::ComputationError("ridge normal equations are singular".to_string())
        })?;

        self.intercept = Some(y_offset - weights.dot(&x_offset));
        self.coefficients = Some(weights);
        Ok(self)
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let weights = self.coefficients.as_ref().ok_or(StackcastError::ModelNotFitted)?;
        if x.ncols() != weights.len() {
            return Err(StackcastError::ShapeError {
                expected: format!("{} features", weights.len()),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.dot(weights) + self.intercept.unwrap_or(0.0))
    }
}
