//! WebSocket byte-connection provider.
//!
//! `tokio-tungstenite` is message-framed, not byte-framed, so this adapter
//! bridges `Message::Binary` frames to `AsyncRead`/`AsyncWrite`, letting the
//! same [`crate::transport::ByteConnection`]-generic session code run over a
//! WebSocket exactly as it runs over plain TCP — spec.md §1 calls out
//! WebSocket as the conventional choice of byte connection.

use bytes::{Buf, BytesMut};
use futures::{Sink, Stream};
use river_common::{Result, RiverError};
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, accept_async, connect_async};

/// Adapts a `WebSocketStream` to `AsyncRead + AsyncWrite` by flattening
/// binary frames into a byte stream.
pub struct WebSocketConnection<S> {
    inner: WebSocketStream<S>,
    read_buf: BytesMut,
    eof: bool,
}

impl<S> WebSocketConnection<S> {
    fn new(inner: WebSocketStream<S>) -> Self {
        Self {
            inner,
            read_buf: BytesMut::new(),
            eof: false,
        }
    }
}

impl<S> AsyncRead for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if !this.read_buf.is_empty() {
                let n = std::cmp::min(buf.remaining(), this.read_buf.len());
                buf.put_slice(&this.read_buf[..n]);
                this.read_buf.advance(n);
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(Message::Binary(data)))) => {
                    this.read_buf.extend_from_slice(&data);
                }
                Poll::Ready(Some(Ok(Message::Close(_)))) | Poll::Ready(None) => {
                    this.eof = true;
                    return Poll::Ready(Ok(()));
                }
                Poll::Ready(Some(Ok(_))) => {
                    // Ping/Pong/Text frames carry no application bytes.
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Err(io::Error::other(e.to_string())));
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S> AsyncWrite for WebSocketConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_ready(cx) {
            Poll::Ready(Ok(())) => {
                let message = Message::Binary(data.to_vec().into());
                match Pin::new(&mut this.inner).start_send(message) {
                    Ok(()) => Poll::Ready(Ok(data.len())),
                    Err(e) => Poll::Ready(Err(io::Error::other(e.to_string()))),
                }
            }
            Poll::Ready(Err(e)) => Poll::Ready(Err(io::Error::other(e.to_string()))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_flush(cx)
            .map_err(|e| io::Error::other(e.to_string()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner)
            .poll_close(cx)
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

/// Connect to a WebSocket server and wrap the connection as a byte stream.
pub async fn connect(url: &str) -> Result<WebSocketConnection<MaybeTlsStream<TcpStream>>> {
    let (stream, _response) = connect_async(url)
        .await
        .map_err(|e| RiverError::ProtocolViolation(format!("websocket connect failed: {e}")))?;
    Ok(WebSocketConnection::new(stream))
}

/// Bind a TCP listener that will be upgraded to WebSocket on accept.
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Accept one inbound TCP connection and perform the WebSocket upgrade.
pub async fn accept(listener: &TcpListener) -> Result<(WebSocketConnection<TcpStream>, SocketAddr)> {
    let (tcp_stream, peer) = listener.accept().await?;
    let ws_stream = accept_async(tcp_stream)
        .await
        .map_err(|e| RiverError::ProtocolViolation(format!("websocket upgrade failed: {e}")))?;
    Ok((WebSocketConnection::new(ws_stream), peer))
}
