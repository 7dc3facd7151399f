//! Produce-side client abstraction
//!
//! `KafkaProducer` is generic over this trait. The rdkafka `FutureProducer`
//! implementation is the one used in production.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;

use crate::kafka::error::ClientError;

/// One record ready to hand to the client
#[derive(Debug, Clone, Copy)]
pub struct OutboundRecord<'a> {
    pub topic: &'a str,
    pub key: &'a [u8],
    pub payload: &'a [u8],
    pub headers: &'a [(&'a str, &'a [u8])],
}

/// Primitives a broker client must provide to back a `KafkaProducer`
///
/// Implementations must be safe to call `send` on from several tasks at once.
#[async_trait]
pub trait ProduceClient: Send + Sync + 'static {
    /// Enqueue `record` and wait for the broker's verdict
    ///
    /// Returns the (partition, offset) the record was written at.
    async fn send(
        &self,
        record: OutboundRecord<'_>,
        queue_timeout: Duration,
    ) -> Result<(i32, i64), ClientError>;

    /// Block until outstanding deliveries complete or `timeout` passes
    fn flush(&self, timeout: Duration) -> Result<(), ClientError>;

    /// Number of records queued or awaiting acknowledgment
    fn in_flight_count(&self) -> i32;
}

#[async_trait]
impl ProduceClient for FutureProducer {
    async fn send(
        &self,
        record: OutboundRecord<'_>,
        queue_timeout: Duration,
    ) -> Result<(i32, i64), ClientError> {
        let mut headers = OwnedHeaders::new_with_capacity(record.headers.len());
        for &(key, value) in record.headers {
            headers = headers.insert(Header {
                key,
                value: Some(value),
            });
        }

        let future_record = FutureRecord::to(record.topic)
            .key(record.key)
            .payload(record.payload)
            .headers(headers);

        FutureProducer::send(self, future_record, Timeout::After(queue_timeout))
            .await
            .map_err(|(err, _)| ClientError::from(err))
    }

    fn flush(&self, timeout: Duration) -> Result<(), ClientError> {
        Producer::flush(self, Timeout::After(timeout)).map_err(ClientError::from)
    }

    fn in_flight_count(&self) -> i32 {
        Producer::in_flight_count(self)
    }
}
