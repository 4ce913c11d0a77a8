use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;

pub type SimResult<T> = Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Io(#[from] IoError),
}

/// Errors raised while validating the configuration surface. Always fatal:
/// a session refuses to start on the first failing check.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required option: {0}")]
    MissingOption(String),

    #[error("Invalid value for '{option}': {reason}")]
    InvalidValue { option: String, reason: String },

    #[error("Unsupported data format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Speed multiplier {0} outside the accepted range [0.1, 10000]")]
    SpeedOutOfRange(f64),

    #[error("Order type set is empty or the default type is not in the set")]
    InvalidOrderTypes,
}

/// Errors related to quote data: parsing, validation, and stream lifecycle.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("Failed to parse row {line}: {reason}")]
    ParseRow { line: u64, reason: String },

    #[error("Unrecognized timestamp '{0}'")]
    Timestamp(String),

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),

    #[error("Feed is closed")]
    FeedClosed,

    #[error("Feed worker unavailable: {0}")]
    FeedWorker(String),

    #[error("Failed to parse float: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

/// Errors surfaced while validating or resolving an order. These become
/// `Rejected` execution reports rather than propagating; the variants carry
/// the taxonomy code so reports and logs stay in sync.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("[{code}] {message}")]
    Rejected { code: ErrorCode, message: String },
}

impl OrderError {
    pub fn rejected(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Rejected {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Rejected { code, .. } => *code,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Rejected { message, .. } => message,
        }
    }
}

/// Errors related to account state and its invariants.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Account is blown; trading is disabled for this session")]
    Blown,

    #[error("Account invariant violation: {0}")]
    InvariantViolation(String),
}

/// Errors related to the session state machine and its operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("No current tick; call next_tick() before executing orders")]
    NoCurrentTick,

    #[error("Report with status {0} cannot be applied to a position")]
    NotApplicable(String),
}

/// Errors related to file I/O and serialization.
#[derive(Debug, Error)]
pub enum IoError {
    #[error("IO operation failed")]
    Io(#[from] std::io::Error),

    #[error("Serialization failed")]
    Json(#[from] serde_json::Error),

    #[error("Failed to open data file '{path}': {reason}")]
    OpenFailed { path: String, reason: String },
}

// ================================================================================================
// Error Taxonomy
// ================================================================================================

/// Stable error codes attached to rejected execution reports and error-log
/// entries. Only [`ErrorCode::AccountBlown`] and [`ErrorCode::ConfigError`]
/// are session-fatal; every other code is recoverable and the session keeps
/// processing ticks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidOrderSize,
    InvalidLimitPrice,
    InsufficientBalance,
    PositionLimitExceeded,
    InvalidOrderType,
    LimitNotHit,
    NoLiquidity,
    SlippageExceeded,
    CsvReadError,
    AccountBlown,
    ConfigError,
}

impl ErrorCode {
    /// Whether the condition terminates the session instead of being logged
    /// and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AccountBlown | Self::ConfigError)
    }

    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ================================================================================================
// Error Log Entries
// ================================================================================================

/// One entry in the session's bounded error log, also handed to the
/// `on_error` callback as it occurs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Module path of the component that raised the error.
    pub source: &'static str,
    /// Free-form structured context (order id, line number, sizes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Wrapped cause, stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorRecord {
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
        source: &'static str,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            timestamp,
            source,
            details: None,
            cause: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_cause(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_error_code_round_trips_through_strings() {
        assert_eq!(ErrorCode::InvalidOrderSize.as_str(), "INVALID_ORDER_SIZE");
        assert_eq!(
            ErrorCode::from_str("POSITION_LIMIT_EXCEEDED").unwrap(),
            ErrorCode::PositionLimitExceeded
        );
    }

    #[test]
    fn test_only_blown_and_config_are_fatal() {
        use strum::IntoEnumIterator;

        let fatal: Vec<_> = ErrorCode::iter().filter(ErrorCode::is_fatal).collect();
        assert_eq!(fatal, vec![ErrorCode::AccountBlown, ErrorCode::ConfigError]);
    }

    #[test]
    fn test_order_error_carries_code_and_message() {
        let err = OrderError::rejected(ErrorCode::NoLiquidity, "depth is zero");
        assert_eq!(err.code(), ErrorCode::NoLiquidity);
        assert_eq!(err.message(), "depth is zero");
        assert_eq!(err.to_string(), "[NO_LIQUIDITY] depth is zero");
    }
}
