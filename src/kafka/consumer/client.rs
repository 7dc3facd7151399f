//! Poll-side client abstraction
//!
//! The consumer drives its client from a blocking worker thread, one call at
//! a time, so implementations only need to be `Send`.

use std::time::Duration;

use rdkafka::consumer::{BaseConsumer, Consumer as _};

use crate::kafka::error::ClientError;
use crate::kafka::message::RawMessage;

/// Primitives a broker client must provide to back a `Consumer`
pub trait PollClient: Send + 'static {
    /// Wait up to `timeout` for the next record
    ///
    /// `None` means nothing arrived in time. An error is a transient client
    /// fault; the caller decides whether to keep polling.
    fn poll(&mut self, timeout: Duration) -> Option<Result<RawMessage, ClientError>>;

    /// Leave the subscription and release broker resources
    fn close(&mut self);
}

/// rdkafka-backed client subscribed to one topic
pub struct KafkaPollClient {
    consumer: BaseConsumer,
}

impl KafkaPollClient {
    /// Subscribe `consumer` to `topic`
    pub fn subscribe(consumer: BaseConsumer, topic: &str) -> Result<Self, ClientError> {
        consumer.subscribe(&[topic])?;
        Ok(Self { consumer })
    }
}

impl PollClient for KafkaPollClient {
    fn poll(&mut self, timeout: Duration) -> Option<Result<RawMessage, ClientError>> {
        self.consumer
            .poll(timeout)
            .map(|result| result.map(|msg| RawMessage::from(&msg)).map_err(ClientError::from))
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
    }
}
