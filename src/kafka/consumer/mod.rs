//! Consumer
//!
//! A [`Consumer`] is bound to one topic and owns one broker client. The
//! client is blocking, so every operation checks it out of the consumer,
//! drives it on a `spawn_blocking` thread and checks it back in when the
//! thread finishes. Only one operation may hold the client at a time; a
//! second concurrent call fails with `MessagingError::Busy`.
//!
//! ## Streaming
//!
//! [`Consumer::poll`] forwards every record to a bounded `mpsc` channel until
//! the context is done, the consumer is closed or the receiver goes away. The
//! worker drops its `Sender` on every exit path, so the receiver sees the
//! stream end exactly once:
//!
//! ```text
//! let (tx, mut rx) = mpsc::channel(64);
//! let poll = consumer.poll(&ctx, Duration::from_millis(2000), tx);
//! // ... rx.recv().await yields RawMessage until the loop stops, then None
//! ```
//!
//! ## Closing
//!
//! `close` is idempotent. If an operation is in flight it is told to stop and
//! the client is released when the worker hands it back.

pub mod client;
mod worker;


use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rdkafka::consumer::BaseConsumer;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::{validate_topic, ConsumerConfig};
use crate::kafka::constants::MIN_POLL_INTERVAL_MS;
use crate::kafka::context::Context;
use crate::kafka::error::{MessagingError, Result};
use crate::kafka::message::RawMessage;

pub use client::{KafkaPollClient, PollClient};
pub use worker::{PollSummary, StopReason};

use worker::{read_one, PollWorker};

/// Where the client currently is
enum Slot<C> {
    /// Parked in the consumer, ready for the next operation
    Idle(C),
    /// Checked out by a worker thread
    Busy,
    Closed,
}

/// Topic-bound consumer over a blocking poll client
pub struct Consumer<C: PollClient = KafkaPollClient> {
    topic: String,
    slot: Arc<Mutex<Slot<C>>>,
    shutdown: CancellationToken,
}

impl Consumer<KafkaPollClient> {
    /// Create a consumer subscribed to `topic`
    ///
    /// # Errors
    ///
    /// Returns `MessagingError::Config` if the configuration or topic is
    /// invalid, and `MessagingError::Connection` if the client cannot be
    /// created or subscribed.
    pub fn new(ctx: &Context, config: &ConsumerConfig, topic: impl Into<String>) -> Result<Self> {
        let topic = topic.into();
        validate_topic(&topic)?;
        config.validate()?;

        let consumer: BaseConsumer =
            config
                .to_client_config()?
                .create()
                .map_err(|e| MessagingError::Connection {
                    component: "consumer",
                    reason: e.to_string(),
                })?;
        let client =
            KafkaPollClient::subscribe(consumer, &topic).map_err(|e| MessagingError::Connection {
                component: "consumer",
                reason: format!("subscribe to {}: {}", topic, e),
            })?;

        info!(
            correlation_id = ctx.correlation_id(),
            topic = %topic,
            group_id = config.group_id.as_deref().unwrap_or_default(),
            brokers = config.credentials.brokers.as_deref().unwrap_or_default(),
            "Kafka consumer created"
        );

        Ok(Self::with_client(topic, client))
    }
}

impl<C: PollClient> Consumer<C> {
    /// Wrap an already-subscribed client
    pub fn with_client(topic: impl Into<String>, client: C) -> Self {
        Self {
            topic: topic.into(),
            slot: Arc::new(Mutex::new(Slot::Idle(client))),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.slot.lock(), Slot::Closed)
    }

    /// Wait up to `timeout` for the next record
    ///
    /// Client errors during the wait are logged and absorbed.
    ///
    /// # Errors
    ///
    /// - `Timeout` if nothing arrived within `timeout`
    /// - `Cancelled` if `ctx` finished first
    /// - `Closed` if the consumer is, or becomes, closed
    /// - `Busy` if another operation holds the client
    pub async fn read_message(&self, ctx: &Context, timeout: Duration) -> Result<RawMessage> {
        let client = self.checkout("read_message")?;
        let stop = self.shutdown.child_token();
        let _stop_on_drop = stop.clone().drop_guard();

        let slot = Arc::clone(&self.slot);
        let topic = self.topic.clone();
        let worker_ctx = ctx.clone();
        let task = tokio::task::spawn_blocking(move || {
            let (client, result) = read_one(client, &topic, &worker_ctx, &stop, timeout);
            checkin(&slot, client);
            result
        });

        let result = self.join(ctx, task).await?;
        if let Ok(message) = &result {
            debug!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                partition = message.partition,
                offset = message.offset,
                "Message read"
            );
        }
        result
    }

    /// Forward every record to `output` until `ctx` is done
    ///
    /// `interval` bounds each wait on the client, and so how quickly the
    /// loop notices cancellation while the topic is idle. Values below one
    /// millisecond are raised to one millisecond.
    ///
    /// Dropping the returned future stops the loop as if the consumer had
    /// been closed, except that the consumer stays usable.
    ///
    /// # Errors
    ///
    /// `Closed` or `Busy` if the loop could not start. Once started, the loop
    /// only ends by cancellation, so its outcome is reported as a
    /// [`PollSummary`] rather than an error.
    pub async fn poll(
        &self,
        ctx: &Context,
        interval: Duration,
        output: mpsc::Sender<RawMessage>,
    ) -> Result<PollSummary> {
        let client = self.checkout("poll")?;
        let stop = self.shutdown.child_token();
        let _stop_on_drop = stop.clone().drop_guard();

        let worker = PollWorker {
            client,
            topic: self.topic.clone(),
            ctx: ctx.clone(),
            stop,
            interval: interval.max(Duration::from_millis(MIN_POLL_INTERVAL_MS)),
            output,
            runtime: Handle::current(),
        };
        let slot = Arc::clone(&self.slot);
        let task = tokio::task::spawn_blocking(move || {
            let (client, summary) = worker.run();
            checkin(&slot, client);
            summary
        });

        self.join(ctx, task).await
    }

    /// Release the client
    ///
    /// Safe to call more than once and while an operation is running; the
    /// running operation stops at its next checkpoint.
    pub fn close(&self, ctx: &Context) {
        self.shutdown.cancel();
        let previous = std::mem::replace(&mut *self.slot.lock(), Slot::Closed);

        match previous {
            Slot::Idle(mut client) => {
                client.close();
                info!(
                    correlation_id = ctx.correlation_id(),
                    topic = %self.topic,
                    "Kafka consumer closed"
                );
            }
            Slot::Busy => info!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                "Kafka consumer closing, waiting for worker to stop"
            ),
            Slot::Closed => debug!(topic = %self.topic, "Consumer already closed"),
        }
    }

    fn checkout(&self, operation: &'static str) -> Result<C> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Busy) {
            Slot::Idle(client) => Ok(client),
            Slot::Busy => Err(MessagingError::Busy { operation }),
            Slot::Closed => {
                *slot = Slot::Closed;
                Err(MessagingError::Closed {
                    component: "consumer",
                })
            }
        }
    }

    async fn join<T>(&self, ctx: &Context, task: JoinHandle<T>) -> Result<T> {
        task.await.map_err(|e| {
            // the client went down with the worker
            *self.slot.lock() = Slot::Closed;
            self.shutdown.cancel();
            error!(
                correlation_id = ctx.correlation_id(),
                topic = %self.topic,
                error = %e,
                "Consumer worker failed"
            );
            MessagingError::Internal(format!("consumer worker failed: {}", e))
        })
    }
}

impl<C: PollClient> Consumer<C> {
    /// Run [`Consumer::poll`] as its own task
    ///
    /// Returns the receiving end of a channel holding up to `buffer` records,
    /// and the handle of the task running the loop.
    pub fn spawn_poll(
        self: &Arc<Self>,
        ctx: &Context,
        interval: Duration,
        buffer: usize,
    ) -> (mpsc::Receiver<RawMessage>, JoinHandle<Result<PollSummary>>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let consumer = Arc::clone(self);
        let ctx = ctx.clone();
        let handle = tokio::spawn(async move { consumer.poll(&ctx, interval, tx).await });
        (rx, handle)
    }
}

impl<C: PollClient> std::fmt::Debug for Consumer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match *self.slot.lock() {
            Slot::Idle(_) => "idle",
            Slot::Busy => "busy",
            Slot::Closed => "closed",
        };
        f.debug_struct("Consumer")
            .field("topic", &self.topic)
            .field("state", &state)
            .finish()
    }
}

/// Return a client from a worker, closing it if the consumer closed meanwhile
fn checkin<C: PollClient>(slot: &Mutex<Slot<C>>, mut client: C) {
    let mut guard = slot.lock();
    if matches!(*guard, Slot::Closed) {
        drop(guard);
        client.close();
    } else {
        *guard = Slot::Idle(client);
    }
}
