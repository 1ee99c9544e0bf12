use std::{
    backtrace::Backtrace,
    error::Error as StdError,
    fmt::{self, Debug, Display},
    io,
};

use parse_display::Display;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON-RPC error code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(transparent)]
#[display("{0}")]
pub struct ErrorCode(pub i64);

impl ErrorCode {
    pub const PARSE_ERROR: Self = Self(-32700);
    pub const INVALID_REQUEST: Self = Self(-32600);
    pub const METHOD_NOT_FOUND: Self = Self(-32601);
    pub const INVALID_PARAMS: Self = Self(-32602);

    /// Reported when a handler fails with an error that carries no error object of its own.
    pub const HANDLER_FAILURE: Self = Self(-1);

    pub fn message(self) -> &'static str {
        match self {
            Self::PARSE_ERROR => "Parse error",
            Self::INVALID_REQUEST => "Invalid Request",
            Self::METHOD_NOT_FOUND => "Method not found",
            Self::INVALID_PARAMS => "Invalid params",
            _ => "Handler failure",
        }
    }
}

/// The `{code, message}` error shape of JSON-RPC 2.0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl From<ErrorCode> for ErrorObject {
    fn from(code: ErrorCode) -> Self {
        Self::new(code, code.message())
    }
}

impl Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Failure of a handler.
///
/// Any [`std::error::Error`] converts into this type with `?`. Such failures reach the
/// peer as an error response with code [`ErrorCode::HANDLER_FAILURE`] whose message is
/// the source's `Display` output. Use [`Error::from_error_object`] to choose the error
/// object sent instead.
pub struct Error {
    repr: ErrorRepr,
    backtrace: Backtrace,
}

enum ErrorRepr {
    Source(Box<dyn StdError + Send + Sync>),
    Object(ErrorObject),
}

impl Error {
    pub fn msg(message: impl Display) -> Self {
        Self::from(MessageError(message.to_string()))
    }
    pub fn from_error_object(error: ErrorObject) -> Self {
        Self {
            repr: ErrorRepr::Object(error),
            backtrace: Backtrace::capture(),
        }
    }
    pub fn invalid_params(e: impl Display) -> Self {
        Self::from_error_object(ErrorObject::new(
            ErrorCode::INVALID_PARAMS,
            format!("{}: {e}", ErrorCode::INVALID_PARAMS.message()),
        ))
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }
    pub fn source(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match &self.repr {
            ErrorRepr::Source(e) => Some(&**e),
            ErrorRepr::Object(_) => None,
        }
    }

    pub fn to_error_object(&self) -> ErrorObject {
        match &self.repr {
            ErrorRepr::Source(e) => ErrorObject::new(ErrorCode::HANDLER_FAILURE, e.to_string()),
            ErrorRepr::Object(o) => o.clone(),
        }
    }
}

impl<E> From<E> for Error
where
    E: StdError + Send + Sync + 'static,
{
    fn from(e: E) -> Self {
        Self {
            repr: ErrorRepr::Source(Box::new(e)),
            backtrace: Backtrace::capture(),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Source(e) => Display::fmt(e, f),
            ErrorRepr::Object(o) => Display::fmt(o, f),
        }
    }
}
impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Source(e) => Debug::fmt(e, f)?,
            ErrorRepr::Object(o) => Debug::fmt(o, f)?,
        }
        if f.alternate() {
            write!(f, "\n{}", self.backtrace)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct MessageError(String);

/// Returns early from a handler with an [`Error`] built from a format string.
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return ::std::result::Result::Err($crate::Error::msg(::std::format!($($arg)*)))
    };
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport and protocol failures of a [`Server`](crate::Server) or [`Client`](crate::Client).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("connection closed")]
    ConnectionClosed,

    /// A response carried both `result` and `error`, neither, or was not an object.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("method `{0}` is already registered")]
    DuplicateMethod(String),
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;
