//! Immutable notification envelope shared by the bus and webhook delivery.
//!
//! Every event serializes to a JSON object with a `type` discriminator and a
//! `content` map. Transaction events add their detail fields alongside:
//!
//! ```json
//! {"type":"transaction","content":{},"transaction_id":"ab12","xpub_id":"x1","status":"mined","value":1000}
//! ```

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Discriminator used by [`Event::transaction`].
pub const TRANSACTION_EVENT_TYPE: &str = "transaction";

/// Arbitrary key/value payload carried by every event.
pub type Content = Map<String, Value>;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("Event type must not be empty")]
    EmptyType,

    #[error("Event content must be a JSON object")]
    ContentNotObject,

    #[error("Transaction event is missing field {0:?}")]
    MissingField(&'static str),
}

// ---------------------------------------------------------------------------
// Event
// ---------------------------------------------------------------------------

/// Transaction detail carried by a `transaction` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEvent {
    pub transaction_id: String,
    /// Identity of the wallet owner. Serialized as `xpub_id`.
    pub owner_id: String,
    pub status: String,
    pub value: u64,
}

/// What kind of event this is, beyond its `type` string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Raw,
    Transaction(TransactionEvent),
}

/// A notification pushed through the bus.
///
/// Fields are private and there are no setters; a single event is cloned to
/// every subscriber and none of them can alter what the others see.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "EventWire")]
pub struct Event {
    event_type: String,
    content: Content,
    kind: EventKind,
}

impl Event {
    /// Build a raw event. `content` must be a JSON object or `null`.
    pub fn raw(event_type: impl Into<String>, content: Value) -> Result<Self, EventError> {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return Err(EventError::EmptyType);
        }
        let content = match content {
            Value::Object(map) => map,
            Value::Null => Content::new(),
            _ => return Err(EventError::ContentNotObject),
        };
        Ok(Self {
            event_type,
            content,
            kind: EventKind::Raw,
        })
    }

    /// Build a `transaction` event with empty content.
    pub fn transaction(detail: TransactionEvent) -> Self {
        Self {
            event_type: TRANSACTION_EVENT_TYPE.to_string(),
            content: Content::new(),
            kind: EventKind::Transaction(detail),
        }
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Transaction detail, if this is a transaction event.
    pub fn as_transaction(&self) -> Option<&TransactionEvent> {
        match &self.kind {
            EventKind::Transaction(detail) => Some(detail),
            EventKind::Raw => None,
        }
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", &self.event_type)?;
        map.serialize_entry("content", &self.content)?;
        if let EventKind::Transaction(detail) = &self.kind {
            map.serialize_entry("transaction_id", &detail.transaction_id)?;
            map.serialize_entry("xpub_id", &detail.owner_id)?;
            map.serialize_entry("status", &detail.status)?;
            map.serialize_entry("value", &detail.value)?;
        }
        map.end()
    }
}

/// Flat wire shape accepted when decoding an [`Event`].
#[derive(Deserialize)]
struct EventWire {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    content: Content,
    transaction_id: Option<String>,
    xpub_id: Option<String>,
    status: Option<String>,
    value: Option<u64>,
}

impl TryFrom<EventWire> for Event {
    type Error = EventError;

    fn try_from(wire: EventWire) -> Result<Self, Self::Error> {
        if wire.event_type.is_empty() {
            return Err(EventError::EmptyType);
        }
        if wire.event_type != TRANSACTION_EVENT_TYPE {
            return Ok(Self {
                event_type: wire.event_type,
                content: wire.content,
                kind: EventKind::Raw,
            });
        }
        let detail = TransactionEvent {
            transaction_id: wire
                .transaction_id
                .ok_or(EventError::MissingField("transaction_id"))?,
            owner_id: wire.xpub_id.ok_or(EventError::MissingField("xpub_id"))?,
            status: wire.status.ok_or(EventError::MissingField("status"))?,
            value: wire.value.ok_or(EventError::MissingField("value"))?,
        };
        Ok(Self {
            event_type: wire.event_type,
            content: wire.content,
            kind: EventKind::Transaction(detail),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
