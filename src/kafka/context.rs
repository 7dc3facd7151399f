//! Request context: cancellation, deadline and correlation id
//!
//! Every blocking or long-running operation takes a `&Context`. A context is
//! "done" once its token is cancelled or its deadline passes; children inherit
//! both from their parent, so cancelling a parent stops everything derived
//! from it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a context finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneReason {
    /// `cancel()` was called on this context or an ancestor
    Cancelled,
    /// The deadline passed
    DeadlineExceeded,
}

impl fmt::Display for DoneReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DoneReason::Cancelled => write!(f, "context cancelled"),
            DoneReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation scope passed to producers and consumers
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
    correlation_id: Arc<str>,
}

impl Context {
    /// Root context with a freshly generated correlation id
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
            correlation_id: Arc::from(uuid::Uuid::new_v4().to_string()),
        }
    }

    /// Replace the correlation id, keeping cancellation and deadline
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Arc::from(correlation_id.into());
        self
    }

    /// Child context that can be cancelled independently of its parent
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            correlation_id: Arc::clone(&self.correlation_id),
        }
    }

    /// Child context that expires after `timeout` (or earlier, if the parent does)
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Child context that expires at `deadline` (or earlier, if the parent does)
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        });
        child
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Non-blocking check; `None` while the context is still live
    pub fn done_reason(&self) -> Option<DoneReason> {
        if self.token.is_cancelled() {
            return Some(DoneReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(DoneReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done_reason().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> DoneReason {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => DoneReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => DoneReason::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                DoneReason::Cancelled
            }
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when the context has no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// The underlying token, for callers that compose with other tokio-util APIs
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
