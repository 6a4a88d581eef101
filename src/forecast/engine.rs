//! Horizon loop: one independent stacking fit per forecast step

use super::config::{ForecastConfig, TargetConfig};
use super::export::{FeatureImportance, ForecastOutput};
use crate::data::{AuxiliaryForecast, TimeSeries};
use crate::ensemble::StackingRegressor;
use crate::error::{Result, StackcastError};
use crate::timeseries::{FeatureExtractor, WindowIndexer, WindowPlan};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tracing::{debug, error, info};

/// Test-era predictions and actuals for one target, `n_test x horizon`
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonForecast {
    pub target: String,
    pub test_starts: Vec<usize>,
    pub predictions: Array2<f64>,
    pub actuals: Array2<f64>,
    pub feature_names: Vec<String>,
    /// Base-model importances averaged over horizon steps, when any base
    /// model reports them
    pub feature_importances: Option<Array1<f64>>,
}

impl HorizonForecast {
    pub fn n_windows(&self) -> usize {
        self.predictions.nrows()
    }

    pub fn horizon(&self) -> usize {
        self.predictions.ncols()
    }
}

/// Result of one target in a multi-target run
#[derive(Debug)]
pub struct TargetOutcome {
    pub target: String,
    pub result: Result<ForecastOutput>,
    /// Present only for successful targets whose base models report importances
    pub importance: Option<FeatureImportance>,
}

/// Output of one horizon step
struct StepResult {
    predictions: Array1<f64>,
    actuals: Array1<f64>,
    importances: Option<Array1<f64>>,
}

/// Features kept per target in the importance report
pub const TOP_FEATURES: usize = 7;

/// Values of `column` at `start + h` for every start
fn values_at(column: &Array1<f64>, starts: &[usize], h: usize) -> Array1<f64> {
    starts.iter().map(|&s| column[s + h]).collect()
}

/// Drives the walk-forward stacking run over a loaded series.
///
/// Geometry, contiguity and fold count are checked once in [`new`](Self::new);
/// target columns and auxiliary coverage are checked per target before any
/// model is fit.
pub struct StackingForecaster<'a> {
    series: &'a TimeSeries,
    config: ForecastConfig,
    plan: WindowPlan,
}

impl<'a> StackingForecaster<'a> {
    pub fn new(series: &'a TimeSeries, config: ForecastConfig) -> Result<Self> {
        config.validate()?;
        let boundary = config.resolve_boundary(series)?;
        let plan = WindowIndexer::new(config.windows.clone())?.plan(series.len(), boundary);
        config.validate_against(series, plan.n_train())?;

        if plan.n_test() == 0 {
            return Err(StackcastError::ConfigurationMismatch(format!(
                "no test window fits between boundary {} and series end {}",
                boundary,
                series.len()
            )));
        }

        info!(
            rows = series.len(),
            boundary,
            n_train = plan.n_train(),
            n_test = plan.n_test(),
            horizon = plan.horizon,
            "window plan ready"
        );

        Ok(Self { series, config, plan })
    }

    pub fn plan(&self) -> &WindowPlan {
        &self.plan
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Setup checks for one target: columns, feature layout and auxiliary
    /// coverage
    pub fn check_target(&self, target: &TargetConfig, aux: Option<&AuxiliaryForecast>) -> Result<()> {
        target.validate_against(self.series)?;
        FeatureExtractor::new(
            self.series,
            &target.target_col,
            &target.covariate_columns(),
            self.config.features.clone(),
        )?;
        if let Some(aux) = aux {
            aux.ensure_covers(self.plan.n_train(), self.plan.n_test(), self.plan.horizon)?;
        }
        Ok(())
    }

    /// Run every horizon step for one target
    pub fn forecast_target(
        &self,
        target: &TargetConfig,
        aux: Option<&AuxiliaryForecast>,
    ) -> Result<HorizonForecast> {
        self.check_target(target, aux)?;

        let covariates = target.covariate_columns();
        let extractor = FeatureExtractor::new(
            self.series,
            &target.target_col,
            &covariates,
            self.config.features.clone(),
        )?;
        let reference = self.series.column(&target.reference_col)?;

        let horizon = self.plan.horizon;
        let started = Instant::now();
        let completed = AtomicUsize::new(0);
        info!(
            target = %target.name,
            n_features = extractor.n_features(),
            n_covariates = covariates.len(),
            with_auxiliary = aux.is_some(),
            "forecasting target"
        );

        let run = |h: usize| -> Result<StepResult> {
            let step = self
                .run_step(target, &extractor, reference, aux, h)
                .map_err(|e| e.at_step(&target.name, h))?;

            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            let every = self.config.progress_every;
            if done == horizon || (every > 0 && done % every == 0) {
                info!(target = %target.name, "Horizon {}/{} done", done, horizon);
            }
            Ok(step)
        };

        let steps: Vec<StepResult> = if self.config.parallel_horizons {
            (0..horizon).into_par_iter().map(run).collect::<Result<Vec<_>>>()?
        } else {
            (0..horizon).map(run).collect::<Result<Vec<_>>>()?
        };

        let n_test = self.plan.n_test();
        let mut predictions = Array2::zeros((n_test, horizon));
        let mut actuals = Array2::zeros((n_test, horizon));
        let mut importance_sum: Option<Array1<f64>> = None;
        let mut importance_steps = 0usize;
        for (h, step) in steps.into_iter().enumerate() {
            predictions.column_mut(h).assign(&step.predictions);
            actuals.column_mut(h).assign(&step.actuals);
            if let Some(imp) = step.importances {
                importance_steps += 1;
                importance_sum = Some(match importance_sum {
                    Some(acc) => acc + &imp,
                    None => imp,
                });
            }
        }

        info!(
            target = %target.name,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "target finished"
        );

        Ok(HorizonForecast {
            target: target.name.clone(),
            test_starts: self.plan.test_starts.clone(),
            predictions,
            actuals,
            feature_names: extractor.feature_names(),
            feature_importances: importance_sum.map(|sum| sum / importance_steps as f64),
        })
    }

    /// One horizon step: features, out-of-fold stack, test prediction
    fn run_step(
        &self,
        target: &TargetConfig,
        extractor: &FeatureExtractor<'_>,
        reference: &Array1<f64>,
        aux: Option<&AuxiliaryForecast>,
        h: usize,
    ) -> Result<StepResult> {
        let train = &self.plan.train_starts;
        let test = &self.plan.test_starts;

        let x_train = extractor.matrix(train, h)?;
        let y_train = extractor.targets(train, h);
        let x_test = extractor.matrix(test, h)?;
        let y_test = extractor.targets(test, h);

        let ref_train = values_at(reference, train, h);
        let ref_test = values_at(reference, test, h);
        let aux_columns = aux
            .map(|a| -> Result<(Array1<f64>, Array1<f64>)> {
                Ok((a.train.column(h, train.len())?, a.test.column(h, test.len())?))
            })
            .transpose()?;

        let mut extras_train = vec![&ref_train];
        let mut extras_test = vec![&ref_test];
        if let Some((aux_train, aux_test)) = &aux_columns {
            extras_train.push(aux_train);
            extras_test.push(aux_test);
        }

        let mut stack = StackingRegressor::new(
            self.config.stacking_config(target),
            self.config.base_models.clone(),
        );
        stack.fit(&x_train, &y_train, &extras_train)?;
        let predictions = stack.predict(&x_test, &extras_test)?;

        debug!(
            target = %target.name,
            step = h,
            meta = ?stack.meta_coefficients(),
            intercept = ?stack.meta_intercept(),
            "step fitted"
        );

        Ok(StepResult {
            predictions,
            actuals: y_test,
            importances: stack.base_importances(),
        })
    }

    /// Forecast a target and assemble its export record. Auxiliary sources
    /// with relative paths resolve against `aux_dir`.
    pub fn run_target(&self, target: &TargetConfig, aux_dir: Option<&Path>) -> Result<ForecastOutput> {
        let aux = target
            .auxiliary
            .as_ref()
            .map(|source| source.load(aux_dir))
            .transpose()?;
        let forecast = self.forecast_target(target, aux.as_ref())?;
        ForecastOutput::assemble(&forecast, &self.config.model_label, target.decimals, self.series)
    }

    /// Run every configured target. Setup checks for all targets happen
    /// before any model is fit; a failing target does not stop the others.
    pub fn run_all(&self, aux_dir: Option<&Path>) -> Vec<TargetOutcome> {
        let prepared: Vec<(&TargetConfig, Result<Option<AuxiliaryForecast>>)> = self
            .config
            .targets
            .iter()
            .map(|target| {
                let aux = target
                    .auxiliary
                    .as_ref()
                    .map(|source| source.load(aux_dir))
                    .transpose()
                    .and_then(|aux| {
                        self.check_target(target, aux.as_ref())?;
                        Ok(aux)
                    });
                (target, aux)
            })
            .collect();

        prepared
            .into_iter()
            .map(|(target, aux)| {
                let assembled = aux.and_then(|aux| {
                    let forecast = self.forecast_target(target, aux.as_ref())?;
                    let output = ForecastOutput::assemble(
                        &forecast,
                        &self.config.model_label,
                        target.decimals,
                        self.series,
                    )?;
                    Ok((output, FeatureImportance::from_forecast(&forecast, TOP_FEATURES)?))
                });
                let (result, importance) = match assembled {
                    Ok((output, importance)) => (Ok(output), importance),
                    Err(e) => {
                        error!(target = %target.name, error = %e, "target failed");
                        (Err(e), None)
                    }
                };
                TargetOutcome {
                    target: target.name.clone(),
                    result,
                    importance,
                }
            })
            .collect()
    }
}
