#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for River
//!
//! These tests drive a real [`river_core::server::RiverServer`] and
//! [`river_core::client::RiverClient`] pair over an in-memory severable byte
//! connection (see `common::linked_connector`), exercising every call shape
//! and the reconnect/grace-window path spec.md §8 describes end to end.

mod common;

mod multi_client_test;
mod protocol_test;
mod reconnect_test;
mod stream_test;
mod subscription_test;
mod unary_test;
mod upload_test;
