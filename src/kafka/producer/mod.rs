//! Producers
//!
//! Two transports publish envelopes: [`KafkaProducer`] talks to the broker
//! through librdkafka, [`HttpProducer`] posts to a proxy that forwards to the
//! broker. Both implement [`Publisher`], so application code can hold an
//! `Arc<dyn Publisher>` and never learn which transport is in use.

pub mod client;
pub mod native;
pub mod proxy;

use std::time::Duration;

use async_trait::async_trait;

use super::context::Context;
use super::envelope::Envelope;
use super::error::Result;

pub use client::{OutboundRecord, ProduceClient};
pub use native::KafkaProducer;
pub use proxy::HttpProducer;

/// Acknowledgment returned by a successful `produce`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The broker stored the record at this position
    Broker { partition: i32, offset: i64 },
    /// The proxy accepted the record with this HTTP status
    Proxy { status: u16 },
}

/// Publish capability shared by both transports
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Topic every `produce` call writes to
    fn topic(&self) -> &str;

    /// Serialize `envelope` and publish it under `key`
    async fn produce(&self, ctx: &Context, key: &str, envelope: &Envelope) -> Result<Delivery>;

    /// Release the transport, flushing outstanding deliveries where the
    /// transport buffers them
    ///
    /// Sends are refused from the first call on. Once a close has succeeded
    /// further calls are no-ops; after a failed flush another call retries it.
    async fn close(&self, ctx: &Context, timeout: Duration) -> Result<()>;
}
