//! Raw broker messages
//!
//! A `RawMessage` is an owned copy of what the client surfaced for one
//! record. The poll loop forwards these untouched; decoding into an
//! `Envelope` is left to whoever drains the stream.

use bytes::Bytes;
use rdkafka::message::{BorrowedMessage, Headers, Message};

use super::envelope::Envelope;
use super::error::Result;

/// One consumed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub topic: String,
    pub key: Option<Bytes>,
    pub value: Option<Bytes>,
    pub partition: i32,
    pub offset: i64,
    /// Milliseconds since the Unix epoch, if the broker reported one
    pub timestamp: Option<i64>,
    pub headers: Vec<(String, Option<Bytes>)>,
}

impl RawMessage {
    /// Message with no partition/offset information
    pub fn new(topic: impl Into<String>, key: Option<Bytes>, value: Option<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            key,
            value,
            partition: -1,
            offset: -1,
            timestamp: None,
            headers: Vec::new(),
        }
    }

    /// Key as UTF-8, lossily
    pub fn key_str(&self) -> Option<String> {
        self.key
            .as_deref()
            .map(|k| String::from_utf8_lossy(k).into_owned())
    }

    /// First header with the given name
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .and_then(|(_, value)| value.as_deref())
    }

    /// Decode the value as an `Envelope`
    pub fn decode(&self) -> Result<Envelope> {
        Envelope::load_message(self)
    }
}

impl<'a> From<&BorrowedMessage<'a>> for RawMessage {
    fn from(msg: &BorrowedMessage<'a>) -> Self {
        let headers = msg
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|header| {
                        (
                            header.key.to_string(),
                            header.value.map(Bytes::copy_from_slice),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: msg.topic().to_string(),
            key: msg.key().map(Bytes::copy_from_slice),
            value: msg.payload().map(Bytes::copy_from_slice),
            partition: msg.partition(),
            offset: msg.offset(),
            timestamp: msg.timestamp().to_millis(),
            headers,
        }
    }
}
