// Kafka messaging module
//
// Architecture Overview:
// =====================
//
// Two sides share one message format (the Envelope):
//
// 1. PRODUCE SIDE (async):
//    - Publisher trait, implemented by the native librdkafka producer and by
//      the HTTP proxy producer
//    - Each produce call is awaited until the broker or proxy answers
//
// 2. CONSUME SIDE (blocking client, async surface):
//    - The librdkafka consumer is driven from a spawn_blocking worker
//    - Records are handed to async code over a bounded mpsc channel
//
// Every operation takes a Context, and every wait inside the crate races
// against it.

pub mod constants;
pub mod consumer;
pub mod context;
pub mod envelope;
pub mod error;
pub mod message;
pub mod producer;

// Re-export commonly used types for convenience
pub use consumer::{Consumer, KafkaPollClient, PollClient, PollSummary, StopReason};
pub use context::{Context, DoneReason};
pub use envelope::Envelope;
pub use error::{ClientError, ErrorKind, MessagingError, Result};
pub use message::RawMessage;
pub use producer::{Delivery, HttpProducer, KafkaProducer, ProduceClient, Publisher};
