use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, ToSocketAddrs},
};
use tracing::debug;

use super::{
    DEFAULT_READ_CHUNK, ErrorResponse, Frame, FrameBuffer, MessageBatch, Request, Response,
    SessionError, SessionResult, SuccessResponse, encode_frame,
};

#[derive(Clone, Debug)]
pub struct ClientOptions {
    /// Upper bound on the bytes taken from the socket per read.
    pub read_chunk: usize,
}
impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

type OnSuccess = Arc<dyn Fn(&SuccessResponse) + Send + Sync>;
type OnError = Arc<dyn Fn(&ErrorResponse) + Send + Sync>;

/// The pair of callbacks run when the response to a request arrives.
///
/// Both default to doing nothing.
#[derive(Clone)]
pub struct Callbacks {
    on_success: OnSuccess,
    on_error: OnError,
}
impl Default for Callbacks {
    fn default() -> Self {
        Self {
            on_success: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        }
    }
}
impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn on_success(mut self, f: impl Fn(&SuccessResponse) + Send + Sync + 'static) -> Self {
        self.on_success = Arc::new(f);
        self
    }
    pub fn on_error(mut self, f: impl Fn(&ErrorResponse) + Send + Sync + 'static) -> Self {
        self.on_error = Arc::new(f);
        self
    }
}

/// One connection to a [`Server`](crate::Server).
///
/// Requests are sent with [`send`](Self::send) and their callbacks run from
/// [`turn`](Self::turn) when the matching response is received.
pub struct Client {
    stream: TcpStream,
    frames: FrameBuffer,
    inbound: VecDeque<Frame>,
    next_id: u64,
    callbacks: HashMap<String, Callbacks>,
    unmatched: Vec<Response>,
    read_buf: Vec<u8>,
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs) -> SessionResult<Self> {
        Self::connect_with(addr, &ClientOptions::default()).await
    }
    pub async fn connect_with(
        addr: impl ToSocketAddrs,
        options: &ClientOptions,
    ) -> SessionResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream, options))
    }
    pub fn from_stream(stream: TcpStream, options: &ClientOptions) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            inbound: VecDeque::new(),
            next_id: 1,
            callbacks: HashMap::new(),
            unmatched: Vec::new(),
            read_buf: vec![0; options.read_chunk.max(1)],
        }
    }

    /// Builds a request carrying this client's next id. Ids start at 1 and are never reused.
    pub fn request(&mut self, method: impl Into<String>, params: Value) -> Request {
        let id = self.next_id;
        self.next_id += 1;
        Request::new(id, method, params)
    }
    pub fn notify(&self, method: impl Into<String>, params: Value) -> Request {
        Request::notification(method, params)
    }

    /// Sends a request or a batch, registering `callbacks` under the id of every request in it.
    pub async fn send(
        &mut self,
        message: impl Into<MessageBatch<Request>>,
        callbacks: Callbacks,
    ) -> SessionResult<()> {
        let message = message.into();
        let body = serde_json::to_vec(&message)?;
        for id in message.as_slice().iter().filter_map(|r| r.id.as_ref()) {
            self.callbacks.insert(id.to_string(), callbacks.clone());
        }
        self.stream.write_all(&encode_frame(&body)).await?;
        Ok(())
    }

    /// Waits for the next frame and classifies it as a response or a batch of responses.
    pub async fn recv(&mut self) -> SessionResult<MessageBatch<Response>> {
        loop {
            if let Some(frame) = self.inbound.pop_front() {
                return parse_responses(&frame.body);
            }
            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                return Err(SessionError::ConnectionClosed);
            }
            self.inbound.extend(self.frames.feed(&self.read_buf[..n]));
        }
    }

    /// Receives one frame and runs the callbacks of the responses in it.
    ///
    /// Responses with no registered callback are kept for [`take_unmatched`](Self::take_unmatched).
    pub async fn turn(&mut self) -> SessionResult<bool> {
        for response in self.recv().await? {
            self.correlate(response);
        }
        Ok(true)
    }

    fn correlate(&mut self, response: Response) {
        let key = response.id().map(|id| id.to_string());
        let callbacks = key.as_ref().and_then(|key| self.callbacks.remove(key));
        let Some(callbacks) = callbacks else {
            debug!(id = ?key, "response without a pending request");
            self.unmatched.push(response);
            return;
        };
        match &response {
            Response::Success(r) => (callbacks.on_success)(r),
            Response::Error(r) => (callbacks.on_error)(r),
        }
    }

    /// Number of requests still waiting for a response.
    pub fn pending(&self) -> usize {
        self.callbacks.len()
    }

    pub fn take_unmatched(&mut self) -> Vec<Response> {
        std::mem::take(&mut self.unmatched)
    }
}

fn parse_responses(body: &[u8]) -> SessionResult<MessageBatch<Response>> {
    match serde_json::from_slice::<Value>(body)? {
        Value::Array(items) => Ok(MessageBatch::Batch(
            items
                .into_iter()
                .map(Response::classify)
                .collect::<SessionResult<_>>()?,
        )),
        value => Ok(MessageBatch::Single(Response::classify(value)?)),
    }
}
