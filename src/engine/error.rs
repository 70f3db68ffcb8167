//! Executor error types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::bridge::BackendError;
use crate::engine::adapter::AdapterError;
use crate::engine::expander::ExpansionError;
use crate::engine::locator::ResolutionFailure;
use crate::engine::registry::RegistryError;
use crate::workflow::config::RetryConfig;
use crate::workflow::expressions::ExpressionError;
use crate::workflow::loader::LoadError;

/// Failure classes carried into results and the recorded root cause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Resolution,
    ActionExecution,
    Assertion,
    Expansion,
    Expression,
    Timeout,
    Config,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Resolution => "resolution",
            ErrorKind::ActionExecution => "action_execution",
            ErrorKind::Assertion => "assertion",
            ErrorKind::Expansion => "expansion",
            ErrorKind::Expression => "expression",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors raised while executing one step attempt
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("{0}")]
    Resolution(#[from] ResolutionFailure),

    #[error("Action '{keyword}' failed: {error}")]
    Action {
        keyword: String,
        #[source]
        error: BackendError,
    },

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("{0}")]
    Expansion(#[from] ExpansionError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("Step timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cancelled before execution")]
    Cancelled,
}

impl StepError {
    pub fn action(keyword: &str, error: BackendError) -> Self {
        StepError::Action {
            keyword: keyword.to_string(),
            error,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StepError::Resolution(_) => ErrorKind::Resolution,
            StepError::Action { .. } => ErrorKind::ActionExecution,
            StepError::Assertion(_) => ErrorKind::Assertion,
            StepError::Expansion(_) => ErrorKind::Expansion,
            StepError::Expression(_) => ErrorKind::Expression,
            StepError::Timeout(_) => ErrorKind::Timeout,
            StepError::InvalidParameter(_) | StepError::Config(_) => ErrorKind::Config,
            StepError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether another attempt may change the outcome. Locator failures are
    /// always retryable when a tier was actually tried; backend failures and
    /// step timeouts follow the transient-error table; everything else is
    /// permanent.
    pub fn is_retryable(&self, policy: &RetryConfig) -> bool {
        match self {
            StepError::Resolution(failure) => !failure.attempted_tiers.is_empty(),
            StepError::Action { error, .. } => policy.is_transient(error.kind()),
            StepError::Timeout(_) => policy.is_transient(crate::bridge::BackendErrorKind::Timeout),
            _ => false,
        }
    }
}

/// Errors that stop a run from starting
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Expression error: {0}")]
    ExpressionError(#[from] ExpressionError),

    #[error("Backend error: {0}")]
    BackendError(#[from] BackendError),

    #[error("Registry error: {0}")]
    RegistryError(#[from] RegistryError),

    #[error("Adapter error: {0}")]
    AdapterError(#[from] AdapterError),

    #[error("Load error: {0}")]
    LoadError(#[from] LoadError),
}
