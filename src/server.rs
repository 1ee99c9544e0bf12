use std::{
    collections::{BTreeMap, VecDeque},
    future::{Future, poll_fn},
    io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};

use parse_display::Display;
use tokio::{
    net::{TcpListener, TcpStream},
    time::{Sleep, sleep},
};
use tracing::{debug, info, warn};

use super::{
    Engine, FrameBuffer, Handler, Outcome, Params, RequestId, Result, SessionResult, Signal,
    encode_frame,
};

pub const DEFAULT_ADDR: &str = "localhost:8089";
pub const DEFAULT_READ_CHUNK: usize = 65536;
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub addr: String,
    /// Upper bound on the bytes taken from one socket per read.
    pub read_chunk: usize,
}
impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
#[display("#{0}")]
pub struct ConnectionId(u64);

struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    frames: FrameBuffer,
    outbound: VecDeque<Vec<u8>>,
}

#[derive(Default)]
struct Readiness {
    accepted: Option<(TcpStream, SocketAddr)>,
    readable: Vec<ConnectionId>,
    writable: Vec<ConnectionId>,
}
impl Readiness {
    fn is_empty(&self) -> bool {
        self.accepted.is_none() && self.readable.is_empty() && self.writable.is_empty()
    }
}

/// Serves many connections from one task.
///
/// Each [`turn`](Self::turn) waits once for any socket to become ready, then gives
/// every ready connection one read and, if it has queued replies, one write.
pub struct Server {
    listener: TcpListener,
    connections: BTreeMap<ConnectionId, Connection>,
    next_connection_id: u64,
    accept_backoff: Option<Pin<Box<Sleep>>>,
    engine: Engine,
    cleanup: Option<Box<dyn FnOnce() + Send>>,
    signal: Option<Signal>,
    read_buf: Vec<u8>,
}

impl Server {
    pub async fn bind(options: &ServerOptions) -> SessionResult<Self> {
        let listener = TcpListener::bind(&options.addr).await?;
        Ok(Self::from_listener(listener, options))
    }

    pub fn from_listener(listener: TcpListener, options: &ServerOptions) -> Self {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening");
        }
        Self {
            listener,
            connections: BTreeMap::new(),
            next_connection_id: 0,
            accept_backoff: None,
            engine: Engine::new(),
            cleanup: None,
            signal: None,
            read_buf: vec![0; options.read_chunk.max(1)],
        }
    }

    pub fn local_addr(&self) -> SessionResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }
    pub fn register(
        &mut self,
        method: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> SessionResult<()> {
        self.engine.register(method, handler)
    }
    pub fn endpoint<F>(&mut self, method: impl Into<String>, f: F) -> SessionResult<()>
    where
        F: FnMut(&str, Params, Option<&RequestId>) -> Result<Outcome> + Send + 'static,
    {
        self.engine.endpoint(method, f)
    }

    /// Sets a hook that runs once, when a control signal stops the loop.
    pub fn on_cleanup(&mut self, f: impl FnOnce() + Send + 'static) {
        self.cleanup = Some(Box::new(f));
    }

    /// The signal that stopped the loop, if it has stopped.
    pub fn signal(&self) -> Option<Signal> {
        self.signal
    }

    /// Turns the loop until a handler returns a control signal.
    pub async fn run(&mut self) -> SessionResult<Signal> {
        loop {
            if !self.turn().await? {
                if let Some(signal) = self.signal {
                    return Ok(signal);
                }
            }
        }
    }

    /// One iteration of the loop. Returns `false` once a control signal has stopped it.
    pub async fn turn(&mut self) -> SessionResult<bool> {
        if self.signal.is_some() {
            return Ok(false);
        }
        let ready = wait(&self.listener, &mut self.accept_backoff, &self.connections).await;

        if let Some((stream, peer)) = ready.accepted {
            self.accept(stream, peer);
        }
        for id in ready.readable {
            if let Some(signal) = self.read(id) {
                info!(%signal, "stopping");
                self.signal = Some(signal);
                if let Some(cleanup) = self.cleanup.take() {
                    cleanup();
                }
                return Ok(false);
            }
        }
        for id in ready.writable {
            self.write(id);
        }
        Ok(true)
    }

    fn accept(&mut self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        info!(%id, %peer, "connection accepted");
        self.connections.insert(
            id,
            Connection {
                stream,
                peer,
                frames: FrameBuffer::new(),
                outbound: VecDeque::new(),
            },
        );
    }

    fn read(&mut self, id: ConnectionId) -> Option<Signal> {
        let c = self.connections.get_mut(&id)?;
        let n = match c.stream.try_read(&mut self.read_buf) {
            Ok(0) => {
                info!(%id, peer = %c.peer, "connection closed");
                self.connections.remove(&id);
                return None;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
            Err(e) => {
                warn!(%id, peer = %c.peer, "read failed: {e}");
                self.connections.remove(&id);
                return None;
            }
        };
        for frame in c.frames.feed(&self.read_buf[..n]) {
            debug!(%id, len = frame.body.len(), "frame");
            let outbound = &mut c.outbound;
            if let Err(signal) = self
                .engine
                .handle(&frame.body, |reply| outbound.push_back(encode_frame(&reply)))
            {
                return Some(signal);
            }
        }
        None
    }

    fn write(&mut self, id: ConnectionId) {
        let Some(c) = self.connections.get_mut(&id) else {
            return;
        };
        let Some(data) = c.outbound.pop_front() else {
            return;
        };
        match c.stream.try_write(&data) {
            Ok(n) if n < data.len() => c.outbound.push_front(data[n..].to_vec()),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => c.outbound.push_front(data),
            Err(e) => {
                warn!(%id, peer = %c.peer, "write failed: {e}");
                self.connections.remove(&id);
            }
        }
    }
}

/// Resolves once the listener or any connection is ready, with every socket that is.
///
/// Write interest is only registered for connections with queued replies.
async fn wait(
    listener: &TcpListener,
    backoff: &mut Option<Pin<Box<Sleep>>>,
    connections: &BTreeMap<ConnectionId, Connection>,
) -> Readiness {
    poll_fn(|cx| {
        let mut ready = Readiness {
            accepted: poll_accept(listener, backoff, cx),
            ..Readiness::default()
        };
        for (id, c) in connections {
            if c.stream.poll_read_ready(cx).is_ready() {
                ready.readable.push(*id);
            }
            if !c.outbound.is_empty() && c.stream.poll_write_ready(cx).is_ready() {
                ready.writable.push(*id);
            }
        }
        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(ready)
        }
    })
    .await
}

/// Polls the listener unless a failed accept is still backing off.
///
/// Accept failures never stop the loop. Transient ones are retried on the next poll,
/// others (such as running out of file descriptors) after [`ACCEPT_RETRY_DELAY`].
fn poll_accept(
    listener: &TcpListener,
    backoff: &mut Option<Pin<Box<Sleep>>>,
    cx: &mut Context<'_>,
) -> Option<(TcpStream, SocketAddr)> {
    if let Some(delay) = backoff.as_mut() {
        if delay.as_mut().poll(cx).is_pending() {
            return None;
        }
    }
    *backoff = None;
    match listener.poll_accept(cx) {
        Poll::Ready(Ok(accepted)) => Some(accepted),
        Poll::Ready(Err(e)) => {
            accept_failed(&e, backoff, cx);
            None
        }
        Poll::Pending => None,
    }
}

fn accept_failed(e: &io::Error, backoff: &mut Option<Pin<Box<Sleep>>>, cx: &mut Context<'_>) {
    if is_transient(e) {
        warn!("accept failed: {e}");
        cx.waker().wake_by_ref();
        return;
    }
    warn!("accept failed, retrying in {ACCEPT_RETRY_DELAY:?}: {e}");
    let mut delay = Box::pin(sleep(ACCEPT_RETRY_DELAY));
    if delay.as_mut().poll(cx).is_ready() {
        cx.waker().wake_by_ref();
    }
    *backoff = Some(delay);
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
