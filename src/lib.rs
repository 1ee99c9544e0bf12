//! # sockrpc
//!
//! A small JSON-RPC 2.0 transport. Messages travel over TCP in LSP-style
//! `Content-Length` frames.
//!
//! - [`Server`] accepts many connections and serves them all from one task,
//!   giving each ready socket one read and one write per [`Server::turn`].
//! - [`Client`] sends requests and batches and runs a success or error callback
//!   when the response with the matching id comes back.
//! - [`Engine`] turns one frame body into zero or one reply. Handlers return an
//!   [`Outcome`]; the built-in `shutdown` and `exit` methods stop the server loop.
//!
//! ## Example
//!
//! ```no_run
//! use serde_json::json;
//! use sockrpc::{Callbacks, Client, Outcome, Server, ServerOptions};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = Server::bind(&ServerOptions::default()).await?;
//!     server.endpoint("echo", |_, params, _| Outcome::success(params.into_value()))?;
//!     let addr = server.local_addr()?;
//!     tokio::spawn(async move { server.run().await });
//!
//!     let mut client = Client::connect(addr).await?;
//!     let request = client.request("echo", json!({"x": 1}));
//!     let callbacks = Callbacks::new().on_success(|r| println!("{}", r.result));
//!     client.send(request, callbacks).await?;
//!     client.turn().await?;
//!     Ok(())
//! }
//! ```

mod client;
mod dispatcher;
mod engine;
mod error;
mod framing;
mod handler;
mod message;
mod server;

pub use client::*;
pub use dispatcher::*;
pub use engine::*;
pub use error::*;
pub use framing::*;
pub use handler::*;
pub use message::*;
pub use server::*;
