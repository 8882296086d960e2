//! Error types for otter-lua
//!
//! Wraps the core [`LuaError`] and adds engine-level failures.

use thiserror::Error;

pub use otter_lua_core::{LuaError, LuaResult};

/// Errors returned by [`LuaEngineHandle`](crate::LuaEngineHandle) operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Error raised by the Lua context itself
    #[error(transparent)]
    Lua(#[from] LuaError),

    /// The job queue is at capacity
    #[error("Job queue full")]
    QueueFull,

    /// The worker thread has stopped
    #[error("Engine shut down")]
    ShutDown,

    /// A job panicked on the worker thread
    #[error("Worker panic: {0}")]
    WorkerPanic(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Traceback of the underlying Lua failure, if any
    pub fn traceback(&self) -> Option<&str> {
        match self {
            Self::Lua(err) => err.traceback(),
            _ => None,
        }
    }

    /// Short stable name of the error variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lua(err) => err.kind(),
            Self::QueueFull => "QueueFullError",
            Self::ShutDown => "ShutDownError",
            Self::WorkerPanic(_) => "WorkerPanicError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lua_errors_are_transparent() {
        let err: EngineError = LuaError::NotAFunction {
            path: "foo.bar".into(),
        }
        .into();
        assert_eq!(err.to_string(), "foo.bar is not a function");
        assert_eq!(err.kind(), "NotAFunctionError");
        assert!(err.traceback().is_none());
    }

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::QueueFull.to_string(), "Job queue full");
        assert_eq!(
            EngineError::WorkerPanic("boom".into()).to_string(),
            "Worker panic: boom"
        );
        assert_eq!(EngineError::ShutDown.kind(), "ShutDownError");
    }
}
