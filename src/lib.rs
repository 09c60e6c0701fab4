//! # framelink
//!
//! Checksummed binary framing over TCP, with a reconnecting client and a
//! multi-client listener.
//!
//! ## Layers
//!
//! - **Protocol**: `SOF | version | length | payload | CRC16 | EOF` frames and
//!   an incremental parser that resynchronizes past corrupted bytes
//! - **Codec**: request and ack envelopes carried in frame payloads
//! - **Client**: one actor task per session with auto-send, ack-timeout
//!   liveness and timed reconnects; the server can force its send interval
//! - **Server**: task-per-connection sessions answering every frame with an
//!   ack, sharing one live-updatable runtime config
//!
//! ## Example
//!
//! ```ignore
//! use framelink::client::ClientBuilder;
//! use framelink::server::Listener;
//!
//! #[tokio::main]
//! async fn main() -> framelink::Result<()> {
//!     let (mut listener, _server_events) = Listener::builder().forced_interval(1000).build();
//!     let port = listener.start(0).await?;
//!
//!     let (client, mut events) = ClientBuilder::new()
//!         .auto_payload("ping")
//!         .auto_send(true)
//!         .spawn();
//!     client.connect("127.0.0.1", port);
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{event:?}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod transport;
pub mod writer;

pub use client::{ClientBuilder, ClientEvent, ClientHandle, ClientState};
pub use config::{ClientConfig, ServerConfig};
pub use error::{FrameError, LinkError, Result};
pub use server::{Listener, ListenerBuilder, ServerEvent};
