//! Plain TCP byte-connection provider.
//!
//! Adapted from `ferrotunnel-core::transport::tcp`, trimmed of socket tuning
//! and TLS (out of scope for River — see DESIGN.md).

use river_common::Result;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Connect to `addr` over plain TCP.
pub async fn connect(addr: SocketAddr) -> Result<TcpStream> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true).ok();
    Ok(stream)
}

/// Bind a listener for accepting inbound TCP byte connections.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Accept one inbound connection.
pub async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr)> {
    let (stream, peer) = listener.accept().await?;
    stream.set_nodelay(true).ok();
    Ok((stream, peer))
}
