//! Input data module
//!
//! Provides the typed view of the cleaned input table:
//! - Chronologically ordered series with named numeric columns
//! - Loading from CSV, Parquet and JSON through polars
//! - Externally supplied predictions keyed by window and horizon step

mod series;
mod loader;
mod external;

pub use series::{TimeSeries, DerivedColumn, ColumnTerm};
pub use loader::{SeriesLoader, parse_timestamp};
pub use external::{ExternalPredictions, AuxiliaryForecast, WINDOW_COLUMN, HORIZON_COLUMN};
