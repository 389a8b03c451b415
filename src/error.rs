use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::session::SessionState;

/// Flat classification of every failure the operator can record on a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    PermissionDenied,
    UnsupportedEnvironment,
    CaptureUnavailable,
    EnvironmentUnavailable,
    InputRejected,
    OracleTransportError,
    OracleDecodeError,
    OracleUnavailable,
    ActionExecutionFailed,
    InvalidTransition,
    StepLimitExceeded,
    UnknownActionLimit,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Failures of the controllable surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unsupported environment: {0}")]
    Unsupported(String),
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
    #[error("environment unavailable: {0}")]
    Unavailable(String),
    #[error("input rejected: {0}")]
    InputRejected(String),
}

impl EnvironmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvironmentError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            EnvironmentError::Unsupported(_) => ErrorKind::UnsupportedEnvironment,
            EnvironmentError::CaptureUnavailable(_) => ErrorKind::CaptureUnavailable,
            EnvironmentError::Unavailable(_) => ErrorKind::EnvironmentUnavailable,
            EnvironmentError::InputRejected(_) => ErrorKind::InputRejected,
        }
    }
}

/// Failures of the decision oracle client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Network or call failure. The caller may retry.
    #[error("oracle transport error: {0}")]
    Transport(String),
    /// The response could not be turned into a well-formed action.
    #[error("oracle decode error: {0}")]
    Decode(String),
    #[error("oracle unavailable: {0}")]
    Unavailable(String),
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OracleError::Transport(_) => ErrorKind::OracleTransportError,
            OracleError::Decode(_) => ErrorKind::OracleDecodeError,
            OracleError::Unavailable(_) => ErrorKind::OracleUnavailable,
        }
    }
}

/// An environment primitive failed while executing an action.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{action} failed: {source}")]
pub struct ExecutionFailed {
    pub action: String,
    #[source]
    pub source: EnvironmentError,
}

/// An event was offered to the session state machine in a state that does
/// not accept it. The state is left untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot {event} while {from}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub event: &'static str,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OperatorError {
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error("action execution failed: {0}")]
    Execution(#[from] ExecutionFailed),
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    #[error("step limit of {0} cycles reached without completion")]
    StepLimitExceeded(u32),
    #[error("oracle produced {0} consecutive unrecognized actions")]
    UnknownActionLimit(u32),
}

impl OperatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OperatorError::Environment(e) => e.kind(),
            OperatorError::Oracle(e) => e.kind(),
            OperatorError::Execution(_) => ErrorKind::ActionExecutionFailed,
            OperatorError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            OperatorError::StepLimitExceeded(_) => ErrorKind::StepLimitExceeded,
            OperatorError::UnknownActionLimit(_) => ErrorKind::UnknownActionLimit,
        }
    }
}

/// What a session keeps of the failure that ended it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&OperatorError> for ErrorRecord {
    fn from(err: &OperatorError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
