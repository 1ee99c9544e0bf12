use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Error, ErrorCode, ErrorObject, ErrorPayload, RequestId, Result};

/// Business logic bound to a method name.
///
/// `id` is `None` for notifications.
pub trait Handler: Send {
    fn call(&mut self, method: &str, params: Params, id: Option<&RequestId>) -> Result<Outcome>;
}

impl<T: Handler + ?Sized> Handler for Box<T> {
    fn call(&mut self, method: &str, params: Params, id: Option<&RequestId>) -> Result<Outcome> {
        (**self).call(method, params, id)
    }
}

/// A [`Handler`] backed by a closure. See [`handler_fn`].
pub struct FnHandler<F>(F);

impl<F> Handler for FnHandler<F>
where
    F: FnMut(&str, Params, Option<&RequestId>) -> Result<Outcome> + Send,
{
    fn call(&mut self, method: &str, params: Params, id: Option<&RequestId>) -> Result<Outcome> {
        (self.0)(method, params, id)
    }
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&str, Params, Option<&RequestId>) -> Result<Outcome> + Send,
{
    FnHandler(f)
}

/// What a handler asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Send nothing.
    NoReply,
    /// Reply with `result`.
    Success(Value),
    /// Reply with an error response.
    Error(ErrorPayload),
    /// Stop the server loop.
    Shutdown,
    /// Stop the server loop.
    Exit,
}

impl Outcome {
    pub fn success(result: impl Serialize) -> Result<Self> {
        Ok(Outcome::Success(serde_json::to_value(result)?))
    }
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Outcome::Error(ErrorPayload::Object(ErrorObject::new(code, message)))
    }
    /// An error response whose `error` member is `value` verbatim.
    pub fn custom_error(value: Value) -> Self {
        Outcome::Error(ErrorPayload::Custom(value))
    }
}

/// The `params` member of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Params(Value);

impl Params {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Deserializes the params, failing with `Invalid params` when they don't fit `T`.
    pub fn to<'a, T>(&'a self) -> Result<T>
    where
        T: Deserialize<'a>,
    {
        T::deserialize(&self.0).map_err(Error::invalid_params)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl From<Value> for Params {
    fn from(value: Value) -> Self {
        Self(value)
    }
}
