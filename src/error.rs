//! Error types for the stackcast forecaster

use thiserror::Error;

/// Result type alias for stackcast operations
pub type Result<T> = std::result::Result<T, StackcastError>;

/// Main error type for the forecasting engine
#[derive(Error, Debug)]
pub enum StackcastError {
    #[error("Data error: {0}")]
    DataError(String),

    /// Requested column absent, invalid window geometry, fold count out of
    /// range, or any other setup problem detected before model fitting.
    #[error("Configuration mismatch: {0}")]
    ConfigurationMismatch(String),

    /// A base or meta model could not be fit or could not predict.
    /// `window` is the row ordinal when the failure can be tied to one.
    #[error("Model '{model}' failed{}: {reason}", at_window(.window))]
    ModelFitFailure {
        model: String,
        window: Option<usize>,
        reason: String,
    },

    #[error("Target '{target}', horizon step {step}: {source}")]
    HorizonStepFailed {
        target: String,
        step: usize,
        #[source]
        source: Box<StackcastError>,
    },

    #[error("External predictions '{source_name}' have no entry for window {window}, horizon step {step}")]
    ExternalPredictionMisalignment {
        source_name: String,
        window: usize,
        step: usize,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

fn at_window(window: &Option<usize>) -> String {
    window.map(|w| format!(" at window {w}")).unwrap_or_default()
}

impl StackcastError {
    /// Wrap an error raised inside a horizon step with its target and step.
    pub fn at_step(self, target: &str, step: usize) -> Self {
        StackcastError::HorizonStepFailed {
            target: target.to_string(),
            step,
            source: Box::new(self),
        }
    }

    /// Attribute a model-level error to a named model and, when known, a
    /// window ordinal. Errors that already carry that context pass through
    /// unchanged.
    pub fn for_model(self, model: &str, window: Option<usize>) -> Self {
        match self {
            err @ StackcastError::ModelFitFailure { .. } => err,
            err @ StackcastError::ConfigurationMismatch(_) => err,
            err @ StackcastError::ExternalPredictionMisalignment { .. } => err,
            other => StackcastError::ModelFitFailure {
                model: model.to_string(),
                window,
                reason: other.to_string(),
            },
        }
    }

    /// True for errors raised during setup, before any model is fit.
    pub fn is_configuration_mismatch(&self) -> bool {
        match self {
            StackcastError::ConfigurationMismatch(_) => true,
            StackcastError::HorizonStepFailed { source, .. } => source.is_configuration_mismatch(),
            _ => false,
        }
    }

    pub fn is_model_failure(&self) -> bool {
        match self {
            StackcastError::ModelFitFailure { .. } => true,
            StackcastError::HorizonStepFailed { source, .. } => source.is_model_failure(),
            _ => false,
        }
    }
}

impl From<polars::error::PolarsError> for StackcastError {
    fn from(err: polars::error::PolarsError) -> Self {
        StackcastError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for StackcastError {
    fn from(err: serde_json::Error) -> Self {
        StackcastError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for StackcastError {
    fn from(err: ndarray::ShapeError) -> Self {
        StackcastError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StackcastError::DataError("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StackcastError = io_err.into();
        assert!(matches!(err, StackcastError::IoError(_)));
    }

    #[test]
    fn test_step_context_wraps_model_failure() {
        let err = StackcastError::ComputationError("singular".to_string())
            .for_model("ridge", Some(3))
            .at_step("solar", 7);

        assert!(err.is_model_failure());
        assert!(!err.is_configuration_mismatch());
        let msg = err.to_string();
        assert!(msg.contains("solar"));
        assert!(msg.contains("horizon step 7"));
        assert!(msg.contains("ridge"));
        assert!(msg.contains("window 3"));
    }

    #[test]
    fn test_for_model_keeps_existing_context() {
        let err = StackcastError::ModelFitFailure {
            model: "xgb".to_string(),
            window: Some(12),
            reason: "non-finite feature".to_string(),
        }
        .for_model("meta", None);

        match err {
            StackcastError::ModelFitFailure { model, window, .. } => {
                assert_eq!(model, "xgb");
                assert_eq!(window, Some(12));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_model_failure_without_window() {
        let err = StackcastError::ComputationError("singular".to_string()).for_model("meta", None);
        assert_eq!(err.to_string(), "Model 'meta' failed: Computation error: singular");
    }
}
