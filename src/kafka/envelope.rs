//! Message envelope
//!
//! An envelope is the unit exchanged over the broker: an event name plus a
//! set of named payload sections. On the wire it is UTF-8 JSON:
//!
//! ```text
//! {"event": "payment.created", "payload": {"payment": {"entity": {...}}}}
//! ```
//!
//! The event name is validated on construction and on decode, so an
//! `Envelope` value always carries a non-empty event.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::constants::MAX_WIRE_DEPTH;
use super::error::{MessagingError, Result};
use super::message::RawMessage;

/// Key under which `add_entity` nests a payload section's value
pub const ENTITY_KEY: &str = "entity";

/// Event name plus named payload sections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    event: String,
    payload: HashMap<String, Value>,
}

/// Shape accepted on decode, before the event invariant is checked
#[derive(Deserialize)]
struct WireEnvelope {
    event: Option<String>,
    #[serde(default)]
    payload: Option<HashMap<String, Value>>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = String;

    fn try_from(wire: WireEnvelope) -> std::result::Result<Self, Self::Error> {
        match wire.event {
            Some(event) if !event.is_empty() => Ok(Envelope {
                event,
                payload: wire.payload.unwrap_or_default(),
            }),
            Some(_) => Err("event must not be empty".to_string()),
            None => Err("missing field `event`".to_string()),
        }
    }
}

impl Envelope {
    /// Create an envelope with an empty payload
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Config` if `event` is empty.
    pub fn new(event: impl Into<String>) -> Result<Self> {
        let event = event.into();
        if event.is_empty() {
            return Err(MessagingError::Config(
                "envelope event must not be empty".to_string(),
            ));
        }
        Ok(Self {
            event,
            payload: HashMap::new(),
        })
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Insert or overwrite the payload section under `key`
    pub fn add_payload(&mut self, key: impl Into<String>, payload: impl Into<Value>) {
        self.payload.insert(key.into(), payload.into());
    }

    /// Store `entity` as `{"entity": <entity>}` under `key`
    pub fn add_entity<T: Serialize>(&mut self, key: impl Into<String>, entity: &T) -> Result<()> {
        let value = serde_json::to_value(entity)
            .map_err(|e| MessagingError::Config(format!("entity is not serializable: {}", e)))?;
        let mut section = serde_json::Map::new();
        section.insert(ENTITY_KEY.to_string(), value);
        self.add_payload(key, Value::Object(section));
        Ok(())
    }

    pub fn payload(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// All payload sections, in no particular order
    pub fn payload_sections(&self) -> &HashMap<String, Value> {
        &self.payload
    }

    /// Decode the `"entity"` sub-object of the section under `key`
    ///
    /// Returns `Ok(None)` if the section is absent.
    pub fn entity<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(section) = self.payload.get(key) else {
            return Ok(None);
        };
        let entity = section.get(ENTITY_KEY).ok_or_else(|| {
            MessagingError::Decode(format!("payload section {} has no {}", key, ENTITY_KEY))
        })?;
        Ok(Some(T::deserialize(entity)?))
    }

    /// Canonical wire encoding
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Config` if a payload section nests deeper
    /// than `load` can decode.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        // the envelope object and the payload map take two levels
        let section_limit = MAX_WIRE_DEPTH - 2;
        if let Some(key) = self
            .payload
            .iter()
            .find(|(_, value)| nests_deeper_than(value, section_limit))
            .map(|(key, _)| key)
        {
            return Err(MessagingError::Config(format!(
                "payload section {} nests deeper than {} levels",
                key, section_limit
            )));
        }
        serde_json::to_vec(self)
            .map_err(|e| MessagingError::Config(format!("envelope is not serializable: {}", e)))
    }

    /// Parse the wire encoding
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Decode` if the bytes are not JSON of the
    /// envelope shape or the event is missing or empty.
    pub fn load(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse the value of a consumed message
    pub fn load_message(message: &RawMessage) -> Result<Self> {
        match message.value.as_deref() {
            Some(value) => Self::load(value),
            None => Err(MessagingError::Decode(format!(
                "message at {}[{}]@{} has no value",
                message.topic, message.partition, message.offset
            ))),
        }
    }
}

/// Whether `value` has more than `limit` levels of arrays or objects
fn nests_deeper_than(value: &Value, limit: usize) -> bool {
    match value {
        Value::Array(items) => {
            limit == 0 || items.iter().any(|v| nests_deeper_than(v, limit - 1))
        }
        Value::Object(fields) => {
            limit == 0 || fields.values().any(|v| nests_deeper_than(v, limit - 1))
        }
        _ => false,
    }
}

impl TryFrom<&[u8]> for Envelope {
    type Error = MessagingError;

    fn try_from(bytes: &[u8]) -> Result<Self> {
        Self::load(bytes)
    }
}
