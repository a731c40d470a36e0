// Error taxonomy for forecasting and guarded execution
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ForecastError {
    #[error("SST fetch failed for {start}..{end}: {message}")]
    DataFetch {
        start: NaiveDate,
        end: NaiveDate,
        message: String,
    },
    #[error("No training data available for {location_id}")]
    InsufficientData { location_id: String },
    #[error("Insufficient history for {location_id}: missing {date}")]
    InsufficientHistory { location_id: String, date: NaiveDate },
    #[error("Model not trained for {location_id}")]
    ModelNotTrained { location_id: String },
    #[error("Location {0} not found")]
    UnknownLocation(String),
}

impl ForecastError {
    pub fn kind(&self) -> &'static str {
        match self {
            ForecastError::DataFetch { .. } => "data_fetch",
            ForecastError::InsufficientData { .. } => "insufficient_data",
            ForecastError::InsufficientHistory { .. } => "insufficient_history",
            ForecastError::ModelNotTrained { .. } => "model_not_trained",
            ForecastError::UnknownLocation(_) => "unknown_location",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorCode {
    DataDirNotFound,
    ExecutionFailed,
    OutputFilesMissing,
    OutputFilesStale,
    Timeout,
    CircuitOpen,
    Unexpected,
}

impl ExecutionErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionErrorCode::DataDirNotFound => "DATA_DIR_NOT_FOUND",
            ExecutionErrorCode::ExecutionFailed => "EXECUTION_FAILED",
            ExecutionErrorCode::OutputFilesMissing => "OUTPUT_FILES_MISSING",
            ExecutionErrorCode::OutputFilesStale => "OUTPUT_FILES_STALE",
            ExecutionErrorCode::Timeout => "TIMEOUT",
            ExecutionErrorCode::CircuitOpen => "CIRCUIT_OPEN",
            ExecutionErrorCode::Unexpected => "UNEXPECTED",
        }
    }
}

impl fmt::Display for ExecutionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of the guarded model pipeline.
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("[{code}] {message}")]
pub struct ExecutionError {
    pub code: ExecutionErrorCode,
    pub message: String,
    pub details: Value,
}

impl ExecutionError {
    pub fn new(code: ExecutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn timeout(after_secs: u64) -> Self {
        Self::new(
            ExecutionErrorCode::Timeout,
            format!("Model execution timed out after {after_secs} seconds"),
        )
        .with_details(json!({ "timeout_seconds": after_secs }))
    }

    pub fn circuit_open(failure_count: u32, retry_in_secs: u64) -> Self {
        Self::new(
            ExecutionErrorCode::CircuitOpen,
            "Circuit breaker is OPEN. Too many recent failures.",
        )
        .with_details(json!({
            "failure_count": failure_count,
            "retry_in_seconds": retry_in_secs,
        }))
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(
            self.code,
            ExecutionErrorCode::Timeout
                | ExecutionErrorCode::CircuitOpen
                | ExecutionErrorCode::DataDirNotFound
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExecutionError::new(ExecutionErrorCode::ExecutionFailed, "x").is_transient());
        assert!(ExecutionError::new(ExecutionErrorCode::OutputFilesMissing, "x").is_transient());
        assert!(!ExecutionError::timeout(600).is_transient());
        assert!(!ExecutionError::circuit_open(3, 300).is_transient());
    }

    #[test]
    fn test_display_includes_code() {
        let err = ExecutionError::timeout(600);
        assert_eq!(err.to_string(), "[TIMEOUT] Model execution timed out after 600 seconds");
        assert_eq!(err.details["timeout_seconds"], 600);
    }

    #[test]
    fn test_insufficient_history_names_date() {
        let err = ForecastError::InsufficientHistory {
            location_id: "havelock".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
        };
        assert!(err.to_string().contains("2024-05-02"));
        assert_eq!(err.kind(), "insufficient_history");
    }
}
