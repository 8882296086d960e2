//! Error types for Lua bridge operations
//!
//! Every failure the bridge can detect is returned to the caller as a
//! [`LuaError`]. Errors raised inside the Lua VM keep the traceback captured
//! by the message handler; failures of host callables invoked from Lua keep
//! the traceback captured at the point of detection plus the original error
//! as their `source`.

use std::fmt;
use thiserror::Error;

/// Result type alias for Lua bridge operations
pub type LuaResult<T> = Result<T, LuaError>;

const TRACEBACK_MARKER: &str = "\nstack traceback:";

/// The semantic type a value failed to convert into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionKind {
    Boolean,
    Integer,
    Unsigned,
    Float,
    String,
    Slice,
    Pointer,
    Map,
}

impl fmt::Display for ConversionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Boolean => "not a boolean",
            Self::Integer => "not an integer",
            Self::Unsigned => "not a unsigned",
            Self::Float => "not a float",
            Self::String => "not a string",
            Self::Slice => "wrong slice argument",
            Self::Pointer => "not a pointer",
            Self::Map => "not a map",
        };
        f.write_str(text)
    }
}

/// Structured error types for the Lua bridge
#[derive(Debug, Error)]
pub enum LuaError {
    /// Failed to create a Lua state
    #[error("State creation failed: {message}")]
    StateCreation { message: String },

    /// Source text failed to compile
    #[error("Load error: {message}")]
    Load { message: String },

    /// A runtime fault during protected execution, or a host callable
    /// failure reported through the error slot
    #[error("Call error: {message}{}", format_traceback(.traceback))]
    Call {
        message: String,
        traceback: Option<String>,
        #[source]
        cause: Option<Box<LuaError>>,
    },

    /// Argument count does not match the declared arity
    #[error("number of arguments not match, expected {expected}, got {actual}")]
    ArgumentCount { expected: usize, actual: usize },

    /// Value does not match the expected semantic type
    #[error("{kind}, got {actual}")]
    TypeConversion { kind: ConversionKind, actual: String },

    /// Value has no projection onto the marshaled vocabulary
    #[error("unsupported type {description}")]
    UnsupportedType { description: String },

    /// A namespace path segment exists but is not a table
    #[error("namespace {path} is not a table")]
    NamespaceConflict { path: String },

    /// A call path does not resolve to a function
    #[error("{path} is not a function")]
    NotAFunction { path: String },

    /// Dotted name is empty or has an empty segment
    #[error("Invalid name: {name:?}")]
    InvalidName { name: String },

    /// Malformed name/value binding list
    #[error("Invalid bindings: {message}")]
    InvalidBindings { message: String },

    /// A host callable returned an error or panicked
    #[error("Callback error: {message}")]
    Callback { message: String },

    /// Configuration could not be parsed
    #[error("Config error: {message}")]
    Config { message: String },

    /// Internal/unexpected error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn format_traceback(traceback: &Option<String>) -> String {
    match traceback {
        Some(traceback) if !traceback.is_empty() => format!("\n{}", traceback),
        _ => String::new(),
    }
}

impl LuaError {
    /// Create an error from the text a protected call left on the stack
    ///
    /// The message handler appends `stack traceback:` to the message; the two
    /// parts are stored separately.
    pub fn runtime(text: impl Into<String>) -> Self {
        let text = text.into();
        let (message, traceback) = split_traceback(&text);
        Self::Call {
            message,
            traceback,
            cause: None,
        }
    }

    /// Create a call error for a failure inside a host callable
    pub fn host_failure(message: impl Into<String>, traceback: Option<String>, cause: LuaError) -> Self {
        Self::Call {
            message: message.into(),
            traceback,
            cause: Some(Box::new(cause)),
        }
    }

    /// Create a type conversion error
    pub fn conversion(kind: ConversionKind, actual: impl Into<String>) -> Self {
        Self::TypeConversion {
            kind,
            actual: actual.into(),
        }
    }

    /// Create an unsupported type error
    pub fn unsupported(description: impl Into<String>) -> Self {
        Self::UnsupportedType {
            description: description.into(),
        }
    }

    /// Create a callback error
    pub fn callback(message: impl Into<String>) -> Self {
        Self::Callback {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error originated from script code
    pub fn is_script_error(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::Call { .. })
    }

    /// Get the stack traceback if available
    pub fn traceback(&self) -> Option<&str> {
        match self {
            Self::Call { traceback, .. } => traceback.as_deref(),
            _ => None,
        }
    }

    /// Get the host-side error that caused a call error, if any
    pub fn cause(&self) -> Option<&LuaError> {
        match self {
            Self::Call { cause, .. } => cause.as_deref(),
            _ => None,
        }
    }

    /// Get the error kind name (e.g., "CallError", "LoadError")
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateCreation { .. } => "StateCreationError",
            Self::Load { .. } => "LoadError",
            Self::Call { .. } => "CallError",
            Self::ArgumentCount { .. } => "ArgumentCountError",
            Self::TypeConversion { .. } => "TypeConversionError",
            Self::UnsupportedType { .. } => "UnsupportedTypeError",
            Self::NamespaceConflict { .. } => "NamespaceConflictError",
            Self::NotAFunction { .. } => "NotAFunctionError",
            Self::InvalidName { .. } => "InvalidNameError",
            Self::InvalidBindings { .. } => "InvalidBindingsError",
            Self::Callback { .. } => "CallbackError",
            Self::Config { .. } => "ConfigError",
            Self::Internal(_) => "InternalError",
        }
    }
}

/// Split `message\nstack traceback:...` into its two parts
pub(crate) fn split_traceback(text: &str) -> (String, Option<String>) {
    match text.find(TRACEBACK_MARKER) {
        Some(at) => (
            text[..at].to_string(),
            Some(text[at + 1..].to_string()),
        ),
        None if text.starts_with("stack traceback:") => (String::new(), Some(text.to_string())),
        None => (text.to_string(), None),
    }
}
