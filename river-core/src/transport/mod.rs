//! Byte-connection collaborator (spec.md §6).
//!
//! River treats the underlying reliable byte stream as an external
//! collaborator: anything implementing [`ByteConnection`] can carry a
//! session. Grounded in `ferrotunnel-core::transport::AsyncStream`, which
//! uses the same blanket-impl-over-`AsyncRead+AsyncWrite` shape; TLS is not
//! carried forward here (no spec.md mention, and Non-goals exclude
//! transport-level encryption — see DESIGN.md).
//!
//! Two reference providers ship: [`tcp`] (plain TCP) and [`websocket`] (a
//! `tokio-tungstenite` adapter), since spec.md names WebSocket as the
//! conventional choice while leaving the byte-stream provider itself out of
//! scope.

pub mod tcp;
pub mod websocket;

use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncWrite};

/// Any reliable, ordered, bidirectional byte stream a session can run over.
pub trait ByteConnection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteConnection for T {}

/// A boxed, type-erased byte connection, used where client/server code needs
/// to be generic over the concrete transport (TCP vs WebSocket).
pub type BoxedConnection = Pin<Box<dyn ByteConnection>>;
