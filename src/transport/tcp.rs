//! TCP stream transport.
//!
//! # Example
//!
//! ```ignore
//! use framelink::transport::{bind, connect};
//!
//! let listener = bind(0).await?;
//! let port = listener.local_addr()?.port();
//! let stream = connect("127.0.0.1", port).await?;
//! ```

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::error::Result;

/// Bind a listener on every IPv4 interface. Port 0 picks a free port.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).await?;
    tracing::debug!(addr = %listener.local_addr()?, "listener bound");
    Ok(listener)
}

/// Open an outbound connection with Nagle disabled.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    configure(&stream)?;
    Ok(stream)
}

/// Apply per-connection socket options to an accepted or connected stream.
pub fn configure(stream: &TcpStream) -> Result<()> {
    stream.set_nodelay(true)?;
    Ok(())
}
