//! Lifecycle event decoding
//!
//! Raw message payloads arrive as UTF-8 JSON with an envelope key wrapping
//! the actual event body, which is itself a JSON-encoded string. Decoding
//! peeks at the `event_type` first so unsupported kinds can be acknowledged
//! and dropped without paying for a full decode; supported kinds are decoded
//! into a fully validated [`LifecycleEvent`]. Partially populated events do
//! not exist: a structural problem is a [`DecodeError`], which is fatal for
//! the message.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

/// Envelope key wrapping the event body
const ENVELOPE_KEY: &str = "oslo.message";

/// Event type emitted when a VM finishes building
pub const EVENT_TYPE_CREATE: &str = "compute.instance.create.end";
/// Event type emitted when a VM starts deleting
pub const EVENT_TYPE_DELETE: &str = "compute.instance.delete.start";

/// Error decoding a raw message payload
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed message body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no '{ENVELOPE_KEY}' envelope key")]
    MissingEnvelope,
}

/// Kind of lifecycle event the engine handles.
///
/// Unsupported kinds never reach this type; the decoder filters them into
/// [`DecodedMessage::Unsupported`], so downstream routing is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Delete,
}

impl EventKind {
    fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            EVENT_TYPE_CREATE => Some(Self::Create),
            EVENT_TYPE_DELETE => Some(Self::Delete),
            _ => None,
        }
    }
}

/// VM payload of a lifecycle event
#[derive(Debug, Clone, Deserialize)]
pub struct VmPayload {
    /// Control plane instance id
    pub instance_id: Uuid,
    /// Owning project id
    #[serde(rename = "tenant_id")]
    pub project_id: Uuid,
    /// VM display name
    #[serde(rename = "display_name")]
    pub vm_name: String,
    /// Image metadata as carried on the notification
    #[serde(default)]
    pub image_meta: HashMap<String, String>,
    /// Memory allocation in MiB
    #[serde(default)]
    pub memory_mb: Option<u64>,
    /// Virtual CPU count
    #[serde(default)]
    pub vcpus: Option<u32>,
}

/// A fully decoded lifecycle event, consumed once and discarded
#[derive(Debug, Clone)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    /// Originating project name, for logging only
    pub project_name: String,
    /// Originating user name, for logging only
    pub user_name: String,
    pub payload: VmPayload,
}

/// Decoder output: a handled event, or an event type we deliberately ignore
#[derive(Debug)]
pub enum DecodedMessage {
    Event(LifecycleEvent),
    /// Unsupported event type; carries the type for logging
    Unsupported(String),
}

#[derive(Deserialize)]
struct EventTypeProbe {
    event_type: String,
}

#[derive(Deserialize)]
struct RawMessage {
    event_type: String,
    #[serde(rename = "_context_project_name")]
    project_name: String,
    #[serde(rename = "_context_user_name")]
    user_name: String,
    payload: VmPayload,
}

/// Decode a raw message payload into a typed lifecycle event.
///
/// Unsupported event types are signalled, not errored: the caller is expected
/// to acknowledge and drop them. Anything structurally invalid is a
/// [`DecodeError`] and must not be acknowledged.
pub fn decode_message(raw: &[u8]) -> Result<DecodedMessage, DecodeError> {
    let envelope: serde_json::Value = serde_json::from_slice(raw)?;
    let body = envelope
        .get(ENVELOPE_KEY)
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingEnvelope)?;

    let probe: EventTypeProbe = serde_json::from_str(body)?;
    let Some(kind) = EventKind::from_event_type(&probe.event_type) else {
        return Ok(DecodedMessage::Unsupported(probe.event_type));
    };

    let raw_message: RawMessage = serde_json::from_str(body)?;
    debug_assert_eq!(raw_message.event_type, probe.event_type);

    Ok(DecodedMessage::Event(LifecycleEvent {
        kind,
        project_name: raw_message.project_name,
        user_name: raw_message.user_name,
        payload: raw_message.payload,
    }))
}
