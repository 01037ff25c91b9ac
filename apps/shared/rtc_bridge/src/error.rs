use rtc_protocol::{MethodResult, Value};
use thiserror::Error;

use crate::engine::EngineError;

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Why a method call could not be completed
///
/// Everything except `NativeFailure` is detected before the engine is touched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("invalid argument '{key}': {reason}")]
    InvalidArgument { key: String, reason: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("no native view registered with id {0}")]
    NotFound(i64),

    #[error("method '{0}' is not implemented")]
    Unimplemented(String),

    #[error("native failure: {message}")]
    NativeFailure { code: Option<i32>, message: String },
}

impl BridgeError {
    pub fn invalid_argument(key: impl Into<String>, reason: impl Into<String>) -> Self {
        BridgeError::InvalidArgument {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn no_session(method: &str) -> Self {
        BridgeError::InvalidState(format!(
            "'{}' requires an engine; call 'create' first",
            method
        ))
    }

    /// Stable code carried in `MethodResult::Error`
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            BridgeError::InvalidState(_) => "INVALID_STATE",
            BridgeError::NotFound(_) => "NOT_FOUND",
            BridgeError::Unimplemented(_) => "UNIMPLEMENTED",
            BridgeError::NativeFailure { .. } => "NATIVE_FAILURE",
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            BridgeError::InvalidArgument { key, .. } => Some(Value::String(key.clone())),
            BridgeError::NotFound(view_id) => Some(Value::Int(*view_id)),
            BridgeError::NativeFailure { code, .. } => code.map(Value::from),
            _ => None,
        }
    }
}

impl From<EngineError> for BridgeError {
    fn from(err: EngineError) -> Self {
        BridgeError::NativeFailure {
            code: Some(err.code),
            message: err.message,
        }
    }
}

impl From<BridgeError> for MethodResult {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Unimplemented(_) => MethodResult::NotImplemented,
            other => MethodResult::Error {
                code: other.code().to_string(),
                message: other.to_string(),
                details: other.details(),
            },
        }
    }
}
