use parse_display::Display;
use serde_json::Value;
use tracing::{debug, warn};

use super::{
    Dispatcher, ErrorCode, ErrorObject, Handler, MessageBatch, Outcome, Params, RequestId,
    Response, Result, SessionResult, handler_fn, message::RawMessage,
};

/// A lifecycle transition requested by a handler. Never sent to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[display(style = "snake_case")]
pub enum Signal {
    Shutdown,
    Exit,
}

/// Parses message bodies, routes requests to handlers and encodes their replies.
///
/// Every engine has `shutdown` and `exit` registered; they answer with
/// [`Signal::Shutdown`] and [`Signal::Exit`].
pub struct Engine {
    dispatcher: Dispatcher,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let mut dispatcher = Dispatcher::new();
        for (method, outcome) in [("shutdown", Outcome::Shutdown), ("exit", Outcome::Exit)] {
            let registered =
                dispatcher.register(method, handler_fn(move |_, _, _| Ok(outcome.clone())));
            debug_assert!(registered.is_ok());
        }
        Self { dispatcher }
    }

    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> SessionResult<()> {
        self.dispatcher.register(method, handler)
    }

    /// Binds a closure to `method`.
    pub fn endpoint<F>(&mut self, method: impl Into<String>, f: F) -> SessionResult<()>
    where
        F: FnMut(&str, Params, Option<&RequestId>) -> Result<Outcome> + Send + 'static,
    {
        self.dispatcher.register(method, handler_fn(f))
    }

    /// Sets the closure called for methods that have no endpoint.
    pub fn default_endpoint<F>(&mut self, f: F)
    where
        F: FnMut(&str, Params, Option<&RequestId>) -> Result<Outcome> + Send + 'static,
    {
        self.dispatcher.set_default(handler_fn(f))
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Runs one request and returns the response to send, if any.
    ///
    /// Replies to notifications are dropped.
    pub fn dispatch(&mut self, message: Value) -> Result<Option<Response>, Signal> {
        let request = serde_json::from_value::<RawMessage>(message)
            .ok()
            .and_then(RawMessage::try_into_request);
        let Some(request) = request else {
            debug!("invalid request");
            return Ok(Some(Response::error(None, ErrorCode::INVALID_REQUEST)));
        };
        let id = request.id.as_ref();
        debug!(method = %request.method, id = ?id, "dispatch");

        let reply = match self.dispatcher.lookup(&request.method) {
            None => Response::error(
                id,
                ErrorObject::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("Method not found: {}", request.method),
                ),
            ),
            Some(handler) => match handler.call(&request.method, Params::new(request.params), id)
            {
                Ok(Outcome::NoReply) => return Ok(None),
                Ok(Outcome::Success(result)) => Response::success(id, result),
                Ok(Outcome::Error(error)) => Response::error(id, error),
                Ok(Outcome::Shutdown) => return Err(Signal::Shutdown),
                Ok(Outcome::Exit) => return Err(Signal::Exit),
                Err(e) => {
                    warn!(method = %request.method, "handler failed: {e}");
                    Response::error(id, e.to_error_object())
                }
            },
        };
        if id.is_none() {
            debug!(method = %request.method, "dropping reply to notification");
            return Ok(None);
        }
        Ok(Some(reply))
    }

    /// Parses one frame body and dispatches it as a request or a batch.
    ///
    /// Batch elements run in order. A [`Signal`] from any element stops the batch
    /// and is returned; later elements are not run.
    pub fn process_body(
        &mut self,
        body: &[u8],
    ) -> Result<Option<MessageBatch<Response>>, Signal> {
        let value = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(e) => {
                debug!("parse error: {e}");
                return Ok(Some(MessageBatch::Single(Response::error(
                    None,
                    ErrorCode::PARSE_ERROR,
                ))));
            }
        };
        match value {
            Value::Array(items) if !items.is_empty() => {
                let mut replies = Vec::new();
                for item in items {
                    if let Some(reply) = self.dispatch(item)? {
                        replies.push(reply);
                    }
                }
                Ok((!replies.is_empty()).then_some(MessageBatch::Batch(replies)))
            }
            value @ Value::Object(_) => Ok(self.dispatch(value)?.map(MessageBatch::Single)),
            _ => Ok(Some(MessageBatch::Single(Response::error(
                None,
                ErrorCode::INVALID_REQUEST,
            )))),
        }
    }

    /// Processes `body` and passes the encoded reply, if there is one, to `writer`.
    pub fn handle(&mut self, body: &[u8], writer: impl FnOnce(Vec<u8>)) -> Result<(), Signal> {
        let Some(reply) = self.process_body(body)? else {
            return Ok(());
        };
        let bytes = match serde_json::to_vec(&reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to encode reply: {e}");
                let error = ErrorObject::new(ErrorCode::HANDLER_FAILURE, e.to_string());
                serde_json::to_vec(&Response::error(None, error)).unwrap_or_default()
            }
        };
        writer(bytes);
        Ok(())
    }
}
