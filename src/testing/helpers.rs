//! Test fixtures
//!
//! Builders for envelopes, configurations and consumers used across the
//! unit tests.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::mocks::{MemoryBroker, MemoryConsumer};
use crate::config::{ConsumerConfig, KafkaCredentials, ProducerConfig};
use crate::kafka::consumer::Consumer;
use crate::kafka::envelope::Envelope;
use crate::kafka::message::RawMessage;

/// Entity carried by `sample_envelope`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: u64,
    pub amount: i64,
    pub currency: String,
}

pub fn sample_payment() -> Payment {
    Payment {
        id: 42,
        amount: 1250,
        currency: "EUR".to_string(),
    }
}

/// Envelope for `event` with a `payment` entity section
pub fn sample_envelope(event: &str) -> Envelope {
    let mut envelope = Envelope::new(event).expect("non-empty event");
    envelope
        .add_entity("payment", &sample_payment())
        .expect("payment serializes");
    envelope
}

pub fn local_credentials() -> KafkaCredentials {
    KafkaCredentials {
        brokers: Some("localhost:9092".to_string()),
        ..Default::default()
    }
}

pub fn consumer_config(group: &str) -> ConsumerConfig {
    ConsumerConfig::new(local_credentials(), group)
}

pub fn producer_config() -> ProducerConfig {
    ProducerConfig::new(local_credentials())
}

/// Consumer over a fresh in-memory broker
pub fn memory_consumer(topic: &str) -> (MemoryBroker, Consumer<MemoryConsumer>) {
    let broker = MemoryBroker::new(topic);
    let consumer = Consumer::with_client(topic, broker.consumer());
    (broker, consumer)
}

/// Receive until the sender side closes
pub async fn drain(mut rx: mpsc::Receiver<RawMessage>) -> Vec<RawMessage> {
    let mut received = Vec::new();
    while let Some(message) = rx.recv().await {
        received.push(message);
    }
    received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_envelope_has_payment_entity() {
        let envelope = sample_envelope("payment.created");
        assert_eq!(envelope.event(), "payment.created");
        let payment: Payment = envelope.entity("payment").unwrap().unwrap();
        assert_eq!(payment, sample_payment());
    }

    #[test]
    fn test_fixture_configs_validate() {
        assert!(consumer_config("group-a").validate().is_ok());
        assert!(producer_config().validate().is_ok());
    }
}
