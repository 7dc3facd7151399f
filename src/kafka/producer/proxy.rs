//! HTTP proxy producer
//!
//! Publishes envelopes through an intermediary service that owns the broker
//! connection. Each `produce` is one synchronous `POST`:
//!
//! ```text
//! POST <endpoint>
//! {"topic": "payments", "key": "42", "value": "{\"event\":\"...\",\"payload\":{...}}"}
//! ```
//!
//! Any 2xx status is a successful delivery; every other status is reported
//! as `MessagingError::Delivery` carrying the status and response body.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::{Delivery, Publisher};
use crate::config::{validate_topic, ProxyConfig};
use crate::kafka::constants::CORRELATION_ID_HEADER;
use crate::kafka::context::Context;
use crate::kafka::envelope::Envelope;
use crate::kafka::error::{MessagingError, Result};

/// Request body understood by the proxy
#[derive(Debug, Serialize)]
struct ProxyRecord<'a> {
    topic: &'a str,
    key: &'a str,
    /// The JSON-encoded envelope, as a string
    value: String,
}

/// Publishes envelopes by POSTing them to a Kafka HTTP proxy
pub struct HttpProducer {
    http: reqwest::Client,
    endpoint: String,
    topic: String,
    default_timeout: Duration,
    closed: AtomicBool,
}

impl HttpProducer {
    /// Create a proxy producer for `topic`
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Config` for an invalid endpoint, timeout or
    /// topic, and `MessagingError::Connection` if the HTTP client cannot be
    /// built.
    pub fn new(config: &ProxyConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        config.validate()?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| MessagingError::Connection {
                component: "proxy producer",
                reason: format!("HTTP client: {}", e),
            })?;

        info!(endpoint = %config.endpoint, topic = %topic, "HTTP proxy producer created");

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            topic,
            default_timeout: config.timeout,
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Request deadline: the context's remaining time if it has one
    fn request_timeout(&self, ctx: &Context) -> Duration {
        ctx.remaining().unwrap_or(self.default_timeout)
    }

    fn delivery_error(&self, status: Option<u16>, reason: impl Into<String>) -> MessagingError {
        MessagingError::Delivery {
            topic: self.topic.clone(),
            status,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Publisher for HttpProducer {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn produce(&self, ctx: &Context, key: &str, envelope: &Envelope) -> Result<Delivery> {
        if self.is_closed() {
            return Err(MessagingError::Closed {
                component: "proxy producer",
            });
        }
        if let Some(reason) = ctx.done_reason() {
            return Err(MessagingError::Cancelled {
                operation: "produce",
                reason,
            });
        }

        let value = String::from_utf8(envelope.serialize()?)
            .map_err(|e| MessagingError::Config(format!("envelope is not UTF-8: {}", e)))?;
        let body = ProxyRecord {
            topic: &self.topic,
            key,
            value,
        };

        let timeout = self.request_timeout(ctx);
        let request = self
            .http
            .post(&self.endpoint)
            .header(CORRELATION_ID_HEADER, ctx.correlation_id())
            .timeout(timeout)
            .json(&body)
            .send();

        let response = tokio::select! {
            reason = ctx.done() => {
                return Err(MessagingError::Cancelled { operation: "produce", reason });
            }
            response = request => response,
        };

        let response = response.map_err(|e| {
            if e.is_timeout() {
                MessagingError::Timeout {
                    operation: "proxy produce",
                    timeout_ms: timeout.as_millis() as u64,
                }
            } else {
                self.delivery_error(None, format!("proxy request failed: {}", e))
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                key,
                event = envelope.event(),
                status = status.as_u16(),
                "Message accepted by proxy"
            );
            return Ok(Delivery::Proxy {
                status: status.as_u16(),
            });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            correlation_id = ctx.correlation_id(),
            topic = %self.topic,
            key,
            status = status.as_u16(),
            body = %body,
            "Proxy rejected message"
        );
        Err(self.delivery_error(Some(status.as_u16()), body))
    }

    async fn close(&self, ctx: &Context, _timeout: Duration) -> Result<()> {
        // Every produce is synchronous, so there is nothing to flush
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                "HTTP proxy producer closed"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for HttpProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProducer")
            .field("endpoint", &self.endpoint)
            .field("topic", &self.topic)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::error::ErrorKind;

    #[test]
    fn test_new_validates_endpoint() {
        let err = HttpProducer::new(&ProxyConfig::new("not-a-url"), "events").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn test_request_timeout_prefers_context_deadline() {
        let producer = HttpProducer::new(
            &ProxyConfig::new("http://localhost:1/produce").with_timeout(Duration::from_secs(60)),
            "events",
        )
        .unwrap();

        let ctx = Context::background();
        assert_eq!(producer.request_timeout(&ctx), Duration::from_secs(60));

        let ctx = ctx.with_timeout(Duration::from_secs(5));
        assert!(producer.request_timeout(&ctx) <= Duration::from_secs(5));
    }

    #[test]
    fn test_proxy_record_shape() {
        let mut envelope = Envelope::new("payment.created").unwrap();
        envelope.add_payload("payment", serde_json::json!({"entity": {"id": 1}}));
        let record = ProxyRecord {
            topic: "payments",
            key: "1",
            value: String::from_utf8(envelope.serialize().unwrap()).unwrap(),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["topic"], "payments");
        assert_eq!(json["key"], "1");
        let inner = Envelope::load(json["value"].as_str().unwrap().as_bytes()).unwrap();
        assert_eq!(inner, envelope);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let producer =
            HttpProducer::new(&ProxyConfig::new("http://localhost:1/produce"), "events").unwrap();
        let ctx = Context::background();

        producer.close(&ctx, Duration::ZERO).await.unwrap();
        producer.close(&ctx, Duration::ZERO).await.unwrap();

        let err = producer
            .produce(&ctx, "k", &Envelope::new("e").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Closed);
    }

    #[tokio::test]
    async fn test_connection_refused_is_delivery_error() {
        let producer = HttpProducer::new(
            &ProxyConfig::new("http://127.0.0.1:1/produce").with_timeout(Duration::from_secs(2)),
            "events",
        )
        .unwrap();

        let err = producer
            .produce(&Context::background(), "k", &Envelope::new("e").unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Delivery);
        assert_eq!(err.status(), None);
    }
}
