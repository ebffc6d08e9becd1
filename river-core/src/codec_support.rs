//! Stand-in for the code-generation collaborator (spec.md §6).
//!
//! River itself never looks inside an application payload — `FramePayload::App`
//! carries opaque bytes once stamped (spec.md §9 Design Note (c)). In a real
//! deployment, generated stubs would supply typed encoders/decoders; here we
//! use `serde_json` directly since it is self-describing (unlike `bincode`,
//! which needs to know the target type up front), matching the envelope
//! shape `river/rpc.py` builds by hand: `{"ok": true, "payload": T}` /
//! `{"ok": false, "payload": AppError}`.

use bytes::Bytes;
use river_common::{AppError, Result, RiverError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// The decoded shape of an inbound stream payload.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(Value),
    Err(AppError),
}

/// Serialize an application value to the bytes carried by `FramePayload::App`.
pub fn to_app_bytes<T: Serialize>(value: &T) -> Result<Bytes> {
    let bytes = serde_json::to_vec(value).map_err(|e| RiverError::Serialization(e.to_string()))?;
    Ok(Bytes::from(bytes))
}

/// Deserialize application bytes into a concrete type.
pub fn from_app_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| RiverError::Serialization(e.to_string()))
}

/// Wrap a successful handler result in the `{"ok": true, "payload": T}` envelope.
pub fn encode_ok<T: Serialize>(payload: &T) -> Result<Bytes> {
    to_app_bytes(&serde_json::json!({ "ok": true, "payload": payload }))
}

/// Wrap an application error in the `{"ok": false, "payload": AppError}` envelope.
pub fn encode_err(err: &AppError) -> Result<Bytes> {
    to_app_bytes(&serde_json::json!({ "ok": false, "payload": err }))
}

/// Decode an `{"ok": ..., "payload": ...}` envelope off the wire.
pub fn decode_envelope(bytes: &[u8]) -> Result<Outcome> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| RiverError::Serialization(e.to_string()))?;
    let ok = value
        .get("ok")
        .and_then(Value::as_bool)
        .ok_or_else(|| RiverError::Serialization("envelope missing 'ok' field".into()))?;
    let payload = value
        .get("payload")
        .cloned()
        .unwrap_or(Value::Null);
    if ok {
        Ok(Outcome::Ok(payload))
    } else {
        let err: AppError = serde_json::from_value(payload)
            .map_err(|e| RiverError::Serialization(e.to_string()))?;
        Ok(Outcome::Err(err))
    }
}
