//! Error types for OntoAgg

use std::fmt;
use thiserror::Error;

/// Result type alias for OntoAgg operations
pub type Result<T> = std::result::Result<T, AggregationError>;

/// OntoAgg error types
#[derive(Error, Debug)]
pub enum AggregationError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Store could not be reached, or retries were exhausted
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store answered with a non-success status
    #[error("Store responded with status {status}: {body}")]
    StoreStatus { status: u16, body: String },

    /// Malformed JSON from the store
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A query row lacks a required binding
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: &'static str, context: String },

    /// Timestamp literal could not be parsed
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// Numeric literal could not be parsed
    #[error("Invalid number '{value}': {reason}")]
    InvalidNumber { value: String, reason: String },

    /// Provider service identifier not in the service catalogue
    #[error("Unknown service type: {0}")]
    UnknownServiceType(String),

    /// Raw and aggregated records for the same service in one pass
    #[error("Raw and aggregated records mixed for service {0}")]
    MixedRecordKinds(String),

    /// A state value of the wrong kind (resource vs. literal)
    #[error("Unexpected state value kind: expected {expected}, found {found}")]
    UnexpectedValueKind {
        expected: &'static str,
        found: String,
    },

    /// Unit reported more connected time than the window holds
    #[error("Connection time of unit {unit} ({connected_ms} ms) exceeds window ({window_ms} ms)")]
    ConnectionTimeExceedsWindow {
        unit: String,
        connected_ms: i64,
        window_ms: i64,
    },

    /// Statistics group with no contributing records
    #[error("Statistics group has zero quantity")]
    ZeroQuantity,

    /// Time weighting left [0, 1]
    #[error("Time weighting {0} out of range [0, 1]")]
    TimeWeightingOutOfRange(f64),

    /// Statistics overflowed the range of a double
    #[error("Non-finite statistics: {0}")]
    NonFiniteStatistics(String),

    /// Nothing to aggregate
    #[error("No records to aggregate")]
    EmptyInput,

    /// Manual run of a period on a day its schedule does not run it
    #[error("{period} is not due on schedule day {day}")]
    NotScheduled { period: String, day: u64 },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background computation did not complete
    #[error("Task error: {0}")]
    Task(String),

    /// Error raised while aggregating one (unit, service) group
    #[error("unit {unit}, service {service}, period {period}: {source}")]
    Group {
        unit: String,
        service: String,
        period: String,
        #[source]
        source: Box<AggregationError>,
    },
}

impl AggregationError {
    /// Wrap an error with the group it was raised for
    pub fn in_group(
        self,
        unit: impl Into<String>,
        service: impl Into<String>,
        period: impl fmt::Display,
    ) -> Self {
        AggregationError::Group {
            unit: unit.into(),
            service: service.into(),
            period: period.to_string(),
            source: Box::new(self),
        }
    }

    /// The error without any group context
    pub fn root(&self) -> &AggregationError {
        match self {
            AggregationError::Group { source, .. } => source.root(),
            other => other,
        }
    }

    /// Unit and service of the group the error was raised for
    pub fn group(&self) -> Option<(&str, &str)> {
        match self {
            AggregationError::Group { unit, service, .. } => Some((unit, service)),
            _ => None,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            AggregationError::Transport(_) | AggregationError::Io(_) => true,
            AggregationError::StoreStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if error is a rejected row or record
    pub fn is_data_error(&self) -> bool {
        matches!(
            self.root(),
            AggregationError::MissingField { .. }
                | AggregationError::InvalidTimestamp(_)
                | AggregationError::InvalidNumber { .. }
                | AggregationError::UnknownServiceType(_)
                | AggregationError::MixedRecordKinds(_)
                | AggregationError::UnexpectedValueKind { .. }
        )
    }

    /// Check if error indicates a broken statistical invariant
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self.root(),
            AggregationError::ConnectionTimeExceedsWindow { .. }
                | AggregationError::ZeroQuantity
                | AggregationError::TimeWeightingOutOfRange(_)
                | AggregationError::NonFiniteStatistics(_)
        )
    }
}

/// Errors gathered over a batch, reported once when the batch completes
#[derive(Debug, Default)]
pub struct ErrorCollection {
    errors: Vec<AggregationError>,
}

impl ErrorCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error
    pub fn push(&mut self, error: AggregationError) {
        self.errors.push(error);
    }

    /// Move all errors of another collection into this one
    pub fn absorb(&mut self, other: ErrorCollection) {
        self.errors.extend(other.errors);
    }

    /// Keep the value of an `Ok`, collect the error of an `Err`
    pub fn collect<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    /// Number of collected errors
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// True when no error was collected
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate over the collected errors
    pub fn iter(&self) -> impl Iterator<Item = &AggregationError> {
        self.errors.iter()
    }

    /// Log every collected error under the given batch label
    pub fn report(&self, batch: &str) {
        if self.errors.is_empty() {
            return;
        }
        for error in &self.errors {
            tracing::warn!(batch, "{}", error);
        }
        tracing::warn!(batch, count = self.errors.len(), "batch finished with errors");
    }
}

impl fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

/// Split results into their values and an error collection
pub fn partition_results<T>(results: impl IntoIterator<Item = Result<T>>) -> (Vec<T>, ErrorCollection) {
    let mut values = Vec::new();
    let mut errors = ErrorCollection::new();
    for result in results {
        if let Some(value) = errors.collect(result) {
            values.push(value);
        }
    }
    (values, errors)
}
