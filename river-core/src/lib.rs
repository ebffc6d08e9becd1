//! River core: the session, dispatch, and transport machinery that sits
//! between the wire codec ([`river_protocol`]) and application handlers.

pub mod client;
pub mod codec_support;
pub mod dispatcher;
pub mod handler;
pub mod reconnect;
pub mod registry;
pub mod resend;
pub mod resource_limits;
pub mod sequence;
pub mod server;
pub mod session;
pub mod transport;

pub use client::RiverClient;
pub use server::RiverServer;
pub use session::{Session, SessionConfig, SessionHandle};
