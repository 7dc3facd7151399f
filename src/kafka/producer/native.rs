//! Native Kafka producer
//!
//! This module wraps rdkafka's `FutureProducer` behind the `Publisher`
//! contract. Each producer is bound to one topic; `produce` may be called
//! from many tasks at once since librdkafka handles concurrent sends.
//!
//! ## OpenSSL Warning
//!
//! SASL_SSL uses system OpenSSL via librdkafka. Do not enable the
//! `ssl-vendored` feature when linking into a process that already loads its
//! own OpenSSL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::producer::FutureProducer;
use tracing::{debug, info, warn};

use super::client::{OutboundRecord, ProduceClient};
use super::{Delivery, Publisher};
use crate::config::{validate_topic, ProducerConfig};
use crate::kafka::constants::{CORRELATION_ID_HEADER, DEFAULT_QUEUE_TIMEOUT_MS};
use crate::kafka::context::Context;
use crate::kafka::envelope::Envelope;
use crate::kafka::error::{MessagingError, Result};

/// Publishes envelopes straight to the broker
pub struct KafkaProducer<P: ProduceClient = FutureProducer> {
    topic: String,
    client: Arc<P>,
    /// Set by the first `close`; refuses further sends
    closed: AtomicBool,
    /// Set once a `close` has flushed everything
    flushed: AtomicBool,
}

impl KafkaProducer<FutureProducer> {
    /// Create a producer for `topic` from configuration
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Config` if the configuration or topic is
    /// invalid, and `MessagingError::Connection` if librdkafka refuses to
    /// create the client.
    pub fn new(ctx: &Context, config: &ProducerConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        config.validate()?;

        let producer: FutureProducer =
            config
                .to_client_config()?
                .create()
                .map_err(|e| MessagingError::Connection {
                    component: "producer",
                    reason: e.to_string(),
                })?;

        info!(
            correlation_id = ctx.correlation_id(),
            topic = %topic,
            brokers = config.credentials.brokers.as_deref().unwrap_or_default(),
            "Kafka producer created"
        );

        Ok(Self::with_client(topic, producer))
    }
}

impl<P: ProduceClient> KafkaProducer<P> {
    /// Wrap an already-constructed client
    pub fn with_client(topic: impl Into<String>, client: P) -> Self {
        Self {
            topic: topic.into(),
            client: Arc::new(client),
            closed: AtomicBool::new(false),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &P {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue-space budget for one send: the context's remaining time, or the default
    fn queue_timeout(ctx: &Context) -> Duration {
        ctx.remaining()
            .unwrap_or(Duration::from_millis(DEFAULT_QUEUE_TIMEOUT_MS))
    }
}

#[async_trait]
impl<P: ProduceClient> Publisher for KafkaProducer<P> {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn produce(&self, ctx: &Context, key: &str, envelope: &Envelope) -> Result<Delivery> {
        if self.is_closed() {
            return Err(MessagingError::Closed {
                component: "producer",
            });
        }
        if let Some(reason) = ctx.done_reason() {
            return Err(MessagingError::Cancelled {
                operation: "produce",
                reason,
            });
        }

        let payload = envelope.serialize()?;
        let headers = [(CORRELATION_ID_HEADER, ctx.correlation_id().as_bytes())];
        let record = OutboundRecord {
            topic: &self.topic,
            key: key.as_bytes(),
            payload: &payload,
            headers: &headers,
        };

        let result = tokio::select! {
            reason = ctx.done() => {
                return Err(MessagingError::Cancelled { operation: "produce", reason });
            }
            result = self.client.send(record, Self::queue_timeout(ctx)) => result,
        };

        match result {
            Ok((partition, offset)) => {
                debug!(
                    correlation_id = ctx.correlation_id(),
                    topic = %self.topic,
                    key,
                    event = envelope.event(),
                    partition,
                    offset,
                    "Message delivered"
                );
                Ok(Delivery::Broker { partition, offset })
            }
            Err(err) => {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    topic = %self.topic,
                    key,
                    error = %err,
                    "Message delivery failed"
                );
                Err(MessagingError::Delivery {
                    topic: self.topic.clone(),
                    status: None,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Stop accepting sends and flush what is queued
    ///
    /// The producer refuses new sends from the first call on, even if the
    /// flush fails. A close that timed out or was cancelled leaves records
    /// queued; calling `close` again retries the flush. Once a flush has
    /// succeeded further calls return `Ok` immediately.
    async fn close(&self, ctx: &Context, timeout: Duration) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        if self.flushed.load(Ordering::Acquire) {
            return Ok(());
        }

        // flush blocks the calling thread for up to `timeout`
        let client = Arc::clone(&self.client);
        let flush = tokio::task::spawn_blocking(move || {
            let result = client.flush(timeout);
            (result, client.in_flight_count())
        });

        let (result, pending) = tokio::select! {
            reason = ctx.done() => {
                return Err(MessagingError::Cancelled { operation: "producer close", reason });
            }
            joined = flush => joined.map_err(|e| MessagingError::Internal(format!("flush task failed: {}", e)))?,
        };

        // Deliveries still queued means the flush ran out of time, whatever
        // error the client attached to it
        if pending > 0 {
            warn!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                pending,
                timeout_ms = timeout.as_millis() as u64,
                "Flush timed out with deliveries outstanding"
            );
            return Err(MessagingError::Timeout {
                operation: "producer flush",
                timeout_ms: timeout.as_millis() as u64,
            });
        }

        result.map_err(|err| MessagingError::Internal(format!("flush failed: {}", err)))?;
        self.flushed.store(true, Ordering::Release);
        info!(
            correlation_id = ctx.correlation_id(),
            topic = %self.topic,
            "Kafka producer closed"
        );
        Ok(())
    }
}

impl<P: ProduceClient> std::fmt::Debug for KafkaProducer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaProducer")
            .field("topic", &self.topic)
            .field("closed", &self.is_closed())
            .finish()
    }
}
