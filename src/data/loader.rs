//! Loading cleaned tabular data into a [`TimeSeries`]

use super::series::TimeSeries;
use crate::error::{Result, StackcastError};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use ndarray::Array1;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Reads CSV, Parquet or line-delimited JSON tables with one timestamp
/// column and any number of numeric columns.
#[derive(Debug, Clone)]
pub struct SeriesLoader {
    time_column: String,
    infer_schema_length: usize,
}

impl Default for SeriesLoader {
    fn default() -> Self {
        Self::new("time")
    }
}

impl SeriesLoader {
    pub fn new(time_column: impl Into<String>) -> Self {
        Self {
            time_column: time_column.into(),
            infer_schema_length: 1000,
        }
    }

    /// Rows used by the CSV reader to infer column types
    pub fn with_infer_schema_length(mut self, rows: usize) -> Self {
        self.infer_schema_length = rows.max(1);
        self
    }

    /// Detect the file format from the extension and load
    pub fn load(&self, path: &Path) -> Result<TimeSeries> {
        let start = Instant::now();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let df = match ext.as_str() {
            "csv" => self.read_csv(path)?,
            "parquet" => ParquetReader::new(File::open(path)?).finish()?,
            "json" | "jsonl" | "ndjson" => JsonReader::new(File::open(path)?).finish()?,
            other => {
                return Err(StackcastError::DataError(format!(
                    "unsupported file format '{}' for {}",
                    other,
                    path.display()
                )))
            }
        };

        let series = self.from_dataframe(&df)?;
        info!(
            path = %path.display(),
            rows = series.len(),
            columns = series.column_names().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded time series"
        );
        Ok(series)
    }

    fn read_csv(&self, path: &Path) -> Result<DataFrame> {
        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(self.infer_schema_length))
            .try_into_reader_with_file_path(Some(path.to_path_buf()))?
            .finish()?;
        Ok(df)
    }

    /// Convert a data frame. The time column becomes the index; every other
    /// numeric column becomes a value column (nulls become NaN). Non-numeric
    /// columns are skipped.
    pub fn from_dataframe(&self, df: &DataFrame) -> Result<TimeSeries> {
        let time = df.column(&self.time_column).map_err(|_| {
            StackcastError::ConfigurationMismatch(format!(
                "time column '{}' not found in input data",
                self.time_column
            ))
        })?;
        let timestamps = parse_timestamps(time)?;
        let mut series = TimeSeries::new(timestamps)?;

        for column in df.get_columns() {
            let name = column.name().to_string();
            if name == self.time_column {
                continue;
            }
            if !(column.dtype().is_numeric() || matches!(column.dtype(), DataType::Boolean)) {
                debug!(column = %name, dtype = %column.dtype(), "Skipping non-numeric column");
                continue;
            }

            let casted = column.cast(&DataType::Float64)?;
            let values: Array1<f64> = casted
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            series.insert_column(name, values)?;
        }

        Ok(series)
    }
}

fn parse_timestamps(column: &Series) -> Result<Vec<DateTime<Utc>>> {
    match column.dtype() {
        DataType::String => column
            .str()?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                let text = value.ok_or_else(|| {
                    StackcastError::DataError(format!("missing timestamp at row {}", row))
                })?;
                parse_timestamp(text).ok_or_else(|| {
                    StackcastError::DataError(format!(
                        "unparseable timestamp '{}' at row {}",
                        text, row
                    ))
                })
            })
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let raw = column.cast(&DataType::Int64)?;
            raw.i64()?
                .into_iter()
                .enumerate()
                .map(|(row, value)| {
                    let value = value.ok_or_else(|| {
                        StackcastError::DataError(format!("missing timestamp at row {}", row))
                    })?;
                    let converted = match unit {
                        TimeUnit::Nanoseconds => Some(DateTime::<Utc>::from_timestamp_nanos(value)),
                        TimeUnit::Microseconds => DateTime::<Utc>::from_timestamp_micros(value),
                        TimeUnit::Milliseconds => DateTime::<Utc>::from_timestamp_millis(value),
                    };
                    converted.ok_or_else(|| {
                        StackcastError::DataError(format!(
                            "timestamp out of range at row {}",
                            row
                        ))
                    })
                })
                .collect()
        }
        other => Err(StackcastError::DataError(format!(
            "time column has unsupported type {}",
            other
        ))),
    }
}

/// Parse RFC 3339 / ISO-like timestamps. Offsets are converted to UTC,
/// naive timestamps are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}
