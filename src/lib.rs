//! Envelope messaging over Kafka
//!
//! Applications publish [`Envelope`]s through a [`Publisher`] (either the
//! native [`KafkaProducer`] or the [`HttpProducer`] proxy transport) and read
//! them back with a [`Consumer`], one message at a time or as a cancellable
//! stream. Every operation takes a [`Context`] carrying cancellation, an
//! optional deadline and a correlation id.

pub mod config; // Client configuration and environment loading
pub mod kafka; // Envelope, producers, consumer, errors
pub mod logging; // Optional tracing subscriber setup
pub mod secrets; // Secret lookup with TTL cache

// Test utilities (only compiled in test builds)
#[cfg(test)]
pub mod testing;

pub use config::{ConsumerConfig, KafkaCredentials, ProducerConfig, ProxyConfig};
pub use kafka::{
    Consumer, Context, Delivery, DoneReason, Envelope, ErrorKind, HttpProducer, KafkaProducer,
    MessagingError, PollSummary, Publisher, RawMessage, Result, StopReason,
};
pub use secrets::{SecretCache, SecretSource, SecretStore};
