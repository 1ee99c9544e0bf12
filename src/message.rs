use derive_ex::derive_ex;
use ordered_float::OrderedFloat;
use parse_display::Display;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{ErrorCode, ErrorObject, SessionError, SessionResult};

#[cfg(test)]
mod tests;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Serialize, Deserialize, Clone, Display)]
#[derive_ex(Eq, PartialEq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    #[display("{0}")]
    Number(i64),
    #[display("{0}")]
    Float(#[eq(key = OrderedFloat($))] f64),
    #[display("{0}")]
    String(String),
}
impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(n) => RequestId::Number(n),
            Err(_) => RequestId::String(id.to_string()),
        }
    }
}
impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}
impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}
impl RequestId {
    /// The id as it is echoed back in a response: always a string.
    pub fn to_response_id(&self) -> RequestId {
        match self {
            RequestId::String(_) => self.clone(),
            _ => RequestId::String(self.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageBatch<T> {
    Single(T),
    Batch(Vec<T>),
}
impl<T> MessageBatch<T> {
    pub fn len(&self) -> usize {
        match self {
            MessageBatch::Single(_) => 1,
            MessageBatch::Batch(items) => items.len(),
        }
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn as_slice(&self) -> &[T] {
        match self {
            MessageBatch::Single(item) => std::slice::from_ref(item),
            MessageBatch::Batch(items) => items,
        }
    }
}
impl<T> IntoIterator for MessageBatch<T> {
    type Item = T;
    type IntoIter = MessageBatchIter<T>;
    fn into_iter(self) -> Self::IntoIter {
        match self {
            MessageBatch::Single(msg) => MessageBatchIter::One(Some(msg)),
            MessageBatch::Batch(vec) => MessageBatchIter::Many(vec.into_iter()),
        }
    }
}
impl From<Request> for MessageBatch<Request> {
    fn from(msg: Request) -> Self {
        MessageBatch::Single(msg)
    }
}
impl From<Vec<Request>> for MessageBatch<Request> {
    fn from(msgs: Vec<Request>) -> Self {
        MessageBatch::Batch(msgs)
    }
}

pub enum MessageBatchIter<T> {
    One(Option<T>),
    Many(std::vec::IntoIter<T>),
}
impl<T> Iterator for MessageBatchIter<T> {
    type Item = T;
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            MessageBatchIter::One(msg) => msg.take(),
            MessageBatchIter::Many(iter) => iter.next(),
        }
    }
}

/// Every member a JSON-RPC message may carry, before it is classified.
///
/// `result` and `error` keep an explicit `null` as `Some(Value::Null)` so that
/// a present-but-null member is distinguished from a missing one.
#[derive(Debug, Deserialize)]
pub(crate) struct RawMessage {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub result: Option<Value>,
    #[serde(default, deserialize_with = "present")]
    pub error: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl RawMessage {
    pub(crate) fn try_into_request(self) -> Option<Request> {
        if self.jsonrpc != JSONRPC_VERSION || self.result.is_some() || self.error.is_some() {
            return None;
        }
        let params = match self.params {
            None => Value::Null,
            Some(p @ (Value::Array(_) | Value::Object(_))) => p,
            Some(_) => return None,
        };
        Some(Request {
            jsonrpc: self.jsonrpc,
            id: self.id,
            method: self.method?,
            params,
        })
    }

    pub(crate) fn try_into_response(self) -> SessionResult<Response> {
        if self.jsonrpc != JSONRPC_VERSION {
            return Err(SessionError::MalformedResponse(format!(
                "unsupported jsonrpc version `{}`",
                self.jsonrpc
            )));
        }
        match (self.result, self.error) {
            (Some(result), None) => Ok(Response::Success(SuccessResponse {
                jsonrpc: self.jsonrpc,
                id: self.id,
                result,
            })),
            (None, Some(error)) => Ok(Response::Error(ErrorResponse {
                jsonrpc: self.jsonrpc,
                id: self.id,
                error: ErrorPayload::from_value(error),
            })),
            (Some(_), Some(_)) => Err(SessionError::MalformedResponse(
                "both `result` and `error` are present".into(),
            )),
            (None, None) => Err(SessionError::MalformedResponse(
                "neither `result` nor `error` is present".into(),
            )),
        }
    }
}

/// A call. A request without an id is a notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}
impl Request {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: method.into(),
            params,
        }
    }
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn success(id: Option<&RequestId>, result: Value) -> Self {
        Response::Success(SuccessResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.map(RequestId::to_response_id),
            result,
        })
    }
    pub fn error(id: Option<&RequestId>, error: impl Into<ErrorPayload>) -> Self {
        Response::Error(ErrorResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.map(RequestId::to_response_id),
            error: error.into(),
        })
    }

    /// Classifies a decoded JSON value as a success or an error response.
    pub fn classify(value: Value) -> SessionResult<Self> {
        if !value.is_object() {
            return Err(SessionError::MalformedResponse(format!(
                "expected an object, found `{value}`"
            )));
        }
        match serde_json::from_value::<RawMessage>(value) {
            Ok(m) => m.try_into_response(),
            Err(e) => Err(SessionError::MalformedResponse(e.to_string())),
        }
    }

    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Response::Success(r) => r.id.as_ref(),
            Response::Error(r) => r.id.as_ref(),
        }
    }
}

impl<'de> Deserialize<'de> for Response {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Response::classify(Value::deserialize(deserializer)?).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub error: ErrorPayload,
}

/// The `error` member of an error response: the standard object, or any JSON value
/// a handler chose to send instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    Object(ErrorObject),
    Custom(Value),
}
impl ErrorPayload {
    /// Only a value that is exactly an [`ErrorObject`] is classified as one, so that
    /// re-encoding a custom payload gives back every member it had.
    fn from_value(value: Value) -> Self {
        match serde_json::from_value::<ErrorObject>(value.clone()) {
            Ok(o) if serde_json::to_value(&o).is_ok_and(|v| v == value) => {
                ErrorPayload::Object(o)
            }
            _ => ErrorPayload::Custom(value),
        }
    }
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ErrorPayload::Object(o) => Some(o.code),
            ErrorPayload::Custom(_) => None,
        }
    }
}
impl From<ErrorObject> for ErrorPayload {
    fn from(o: ErrorObject) -> Self {
        ErrorPayload::Object(o)
    }
}
impl From<ErrorCode> for ErrorPayload {
    fn from(code: ErrorCode) -> Self {
        ErrorPayload::Object(code.into())
    }
}
