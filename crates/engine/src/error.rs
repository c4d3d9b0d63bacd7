use chrono::{DateTime, Utc};
use thiserror::Error;

use stockcast_core::DomainError;

/// Result type used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Engine failure.
///
/// All variants are raised synchronously by the offending call. The engine is
/// deterministic, so none of them are retried internally.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    /// Too few usable demand periods to fit a forecast.
    #[error("insufficient demand history: need at least {required} period(s), have {available}")]
    InsufficientData { required: usize, available: usize },

    /// Observations or forecast request parameters are malformed.
    #[error("invalid forecast input: {0}")]
    InvalidForecastInput(String),

    /// Lead time, service level or stock parameters are out of range.
    #[error("invalid policy input: {0}")]
    InvalidPolicyInput(String),

    /// The scenario perturbation cannot be applied to the baseline.
    #[error("invalid scenario: {0}")]
    InvalidScenario(String),

    /// The realized period has not closed inside the forecast horizon yet.
    #[error("accuracy check is premature: realized period ends {period_end}, horizon ends {horizon_end}")]
    PrematureAccuracyCheck {
        period_end: DateTime<Utc>,
        horizon_end: DateTime<Utc>,
    },

    /// A scenario snapshot was asked to make a transition its status forbids.
    #[error("invalid scenario transition: {0}")]
    ScenarioTransition(String),

    /// The engine configuration object is invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// How a failure should be surfaced to operators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Resolves itself once more demand history is recorded.
    NotEnoughHistory,
    /// Caller-supplied parameters or configuration need correcting.
    BadConfiguration,
    /// Timing precondition; retry after the period closes.
    NotYetAvailable,
}

impl EngineError {
    pub fn forecast_input(msg: impl Into<String>) -> Self {
        Self::InvalidForecastInput(msg.into())
    }

    pub fn policy_input(msg: impl Into<String>) -> Self {
        Self::InvalidPolicyInput(msg.into())
    }

    pub fn scenario(msg: impl Into<String>) -> Self {
        Self::InvalidScenario(msg.into())
    }

    pub fn transition(msg: impl Into<String>) -> Self {
        Self::ScenarioTransition(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InsufficientData { .. } => ErrorKind::NotEnoughHistory,
            EngineError::PrematureAccuracyCheck { .. } => ErrorKind::NotYetAvailable,
            EngineError::InvalidForecastInput(_)
            | EngineError::InvalidPolicyInput(_)
            | EngineError::InvalidScenario(_)
            | EngineError::ScenarioTransition(_)
            | EngineError::InvalidConfig(_) => ErrorKind::BadConfiguration,
        }
    }

    /// True when the same call may succeed later without operator action.
    pub fn is_retryable_later(&self) -> bool {
        !matches!(self.kind(), ErrorKind::BadConfiguration)
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        EngineError::InvalidForecastInput(value.to_string())
    }
}
