//! Blocking worker loops for the consumer
//!
//! Both loops run on a `spawn_blocking` thread and own the client for their
//! whole lifetime. They check for cancellation at every suspension point:
//! the top of each iteration, the client wait (bounded by the poll interval
//! or read slice), the output push and the error backoff.
//!
//! ## Ordering
//!
//! Messages are pushed to the output channel in the order the client
//! surfaced them. The client preserves per-partition order only.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::client::PollClient;
use crate::kafka::constants::{
    POLL_ERROR_BACKOFF_INITIAL_MS, POLL_ERROR_BACKOFF_MAX_MS, READ_POLL_SLICE_MS,
};
use crate::kafka::context::{Context, DoneReason};
use crate::kafka::error::{MessagingError, Result};
use crate::kafka::message::RawMessage;

/// Why a poll loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller's context was cancelled
    Cancelled,
    /// The caller's context deadline passed
    DeadlineExceeded,
    /// `Consumer::close` was called, or the `poll` future was dropped
    ConsumerClosed,
    /// The receiving half of the output channel was dropped
    ReceiverDropped,
}

impl From<DoneReason> for StopReason {
    fn from(reason: DoneReason) -> Self {
        match reason {
            DoneReason::Cancelled => StopReason::Cancelled,
            DoneReason::DeadlineExceeded => StopReason::DeadlineExceeded,
        }
    }
}

/// Outcome of one `Consumer::poll` run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    /// Messages pushed onto the output channel
    pub forwarded: u64,
    /// Client errors logged and absorbed
    pub poll_errors: u64,
    pub stop: StopReason,
}

/// Exponential delay between consecutive client errors
#[derive(Debug)]
struct Backoff {
    next: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            next: Duration::from_millis(POLL_ERROR_BACKOFF_INITIAL_MS),
        }
    }

    fn reset(&mut self) {
        self.next = Duration::from_millis(POLL_ERROR_BACKOFF_INITIAL_MS);
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(Duration::from_millis(POLL_ERROR_BACKOFF_MAX_MS));
        delay
    }
}

/// Everything the poll loop needs, moved onto the blocking thread
pub(crate) struct PollWorker<C> {
    pub client: C,
    pub topic: String,
    pub ctx: Context,
    pub stop: CancellationToken,
    pub interval: Duration,
    pub output: mpsc::Sender<RawMessage>,
    pub runtime: Handle,
}

impl<C: PollClient> PollWorker<C> {
    /// Run until cancelled, then hand the client back
    ///
    /// `output` is dropped when this returns, which ends the receiver's
    /// stream once it has drained the buffer.
    pub fn run(self) -> (C, PollSummary) {
        let PollWorker {
            mut client,
            topic,
            ctx,
            stop,
            interval,
            output,
            runtime,
        } = self;

        info!(
            correlation_id = ctx.correlation_id(),
            topic = %topic,
            interval_ms = interval.as_millis() as u64,
            "Poll loop started"
        );

        let mut forwarded = 0u64;
        let mut poll_errors = 0u64;
        let mut backoff = Backoff::new();

        let reason = loop {
            if let Some(reason) = stop_signal(&ctx, &stop, &output) {
                break reason;
            }

            let wait = match ctx.remaining() {
                Some(remaining) => interval.min(remaining),
                None => interval,
            };

            match client.poll(wait) {
                None => backoff.reset(),
                Some(Ok(message)) => {
                    backoff.reset();
                    if let Err(reason) = forward(&runtime, &ctx, &stop, &output, message) {
                        break reason;
                    }
                    forwarded += 1;
                }
                Some(Err(err)) => {
                    poll_errors += 1;
                    let delay = backoff.next_delay();
                    warn!(
                        correlation_id = ctx.correlation_id(),
                        topic = %topic,
                        error = %err,
                        retry_in_ms = delay.as_millis() as u64,
                        "Consumer poll error"
                    );
                    if let Some(reason) = pause(&runtime, &ctx, &stop, delay) {
                        break reason;
                    }
                }
            }
        };

        drop(output);

        let summary = PollSummary {
            forwarded,
            poll_errors,
            stop: reason,
        };
        info!(
            correlation_id = ctx.correlation_id(),
            topic = %topic,
            forwarded,
            poll_errors,
            stop = ?reason,
            "Poll loop stopped"
        );
        (client, summary)
    }
}

fn stop_signal(
    ctx: &Context,
    stop: &CancellationToken,
    output: &mpsc::Sender<RawMessage>,
) -> Option<StopReason> {
    if stop.is_cancelled() {
        return Some(StopReason::ConsumerClosed);
    }
    if let Some(reason) = ctx.done_reason() {
        return Some(reason.into());
    }
    if output.is_closed() {
        return Some(StopReason::ReceiverDropped);
    }
    None
}

/// Push one message, blocking while the buffer is full
fn forward(
    runtime: &Handle,
    ctx: &Context,
    stop: &CancellationToken,
    output: &mpsc::Sender<RawMessage>,
    message: RawMessage,
) -> std::result::Result<(), StopReason> {
    let message = match output.try_send(message) {
        Ok(()) => return Ok(()),
        Err(TrySendError::Closed(_)) => return Err(StopReason::ReceiverDropped),
        Err(TrySendError::Full(message)) => message,
    };

    debug!(
        correlation_id = ctx.correlation_id(),
        "Output channel full, waiting for receiver"
    );
    runtime.block_on(async {
        tokio::select! {
            reason = ctx.done() => Err(reason.into()),
            _ = stop.cancelled() => Err(StopReason::ConsumerClosed),
            sent = output.send(message) => sent.map_err(|_| StopReason::ReceiverDropped),
        }
    })
}

/// Sleep for `delay` unless a stop signal arrives first
fn pause(
    runtime: &Handle,
    ctx: &Context,
    stop: &CancellationToken,
    delay: Duration,
) -> Option<StopReason> {
    runtime.block_on(async {
        tokio::select! {
            reason = ctx.done() => Some(reason.into()),
            _ = stop.cancelled() => Some(StopReason::ConsumerClosed),
            _ = tokio::time::sleep(delay) => None,
        }
    })
}

/// Wait for a single message, hand the client back with the result
///
/// The wait is sliced so that cancellation is noticed within
/// `READ_POLL_SLICE_MS` even when `timeout` is long.
pub(crate) fn read_one<C: PollClient>(
    mut client: C,
    topic: &str,
    ctx: &Context,
    stop: &CancellationToken,
    timeout: Duration,
) -> (C, Result<RawMessage>) {
    let deadline = Instant::now() + timeout;
    let slice = Duration::from_millis(READ_POLL_SLICE_MS);

    let result = loop {
        if stop.is_cancelled() {
            break Err(MessagingError::Closed {
                component: "consumer",
            });
        }
        if let Some(reason) = ctx.done_reason() {
            break Err(MessagingError::Cancelled {
                operation: "read_message",
                reason,
            });
        }

        let mut wait = deadline.saturating_duration_since(Instant::now()).min(slice);
        if let Some(remaining) = ctx.remaining() {
            wait = wait.min(remaining);
        }

        match client.poll(wait) {
            Some(Ok(message)) => break Ok(message),
            Some(Err(err)) => {
                warn!(
                    correlation_id = ctx.correlation_id(),
                    topic,
                    error = %err,
                    "Consumer read error"
                );
            }
            None => {}
        }

        if Instant::now() >= deadline {
            break Err(MessagingError::Timeout {
                operation: "read_message",
                timeout_ms: timeout.as_millis() as u64,
            });
        }
    };

    (client, result)
}
