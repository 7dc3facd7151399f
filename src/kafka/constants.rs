//! Messaging constants
//!
//! This module centralizes the defaults, bounds and header names used by the
//! producers and the consumer. Using named constants keeps the timing
//! behaviour of the poll loop and the transports in one place.

// ===== Connection Defaults =====

/// Default bootstrap server list when none is configured
pub const DEFAULT_BOOTSTRAP_SERVERS: &str = "localhost:9092";

/// Security protocols accepted by librdkafka
pub const SECURITY_PROTOCOLS: &[&str] = &["PLAINTEXT", "SSL", "SASL_PLAINTEXT", "SASL_SSL"];

/// Offset reset policies accepted by librdkafka
pub const OFFSET_RESET_POLICIES: &[&str] = &[
    "smallest", "earliest", "beginning", "largest", "latest", "end", "error",
];

// ===== Producer Timing =====

/// How long a send may wait for room in librdkafka's local queue when the
/// context carries no deadline (ms)
///
/// Broker acknowledgment is bounded separately by `message.timeout.ms`.
pub const DEFAULT_QUEUE_TIMEOUT_MS: u64 = 30_000;

/// Suggested flush timeout for `Publisher::close` (ms)
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 10_000;

/// Default request timeout for the HTTP proxy transport (ms)
pub const DEFAULT_PROXY_TIMEOUT_MS: u64 = 60_000;

/// Minimum HTTP proxy timeout (ms)
pub const MIN_PROXY_TIMEOUT_MS: u64 = 100;

/// Maximum HTTP proxy timeout (ms)
pub const MAX_PROXY_TIMEOUT_MS: u64 = 600_000;

// ===== Consumer Timing =====

/// Default poll interval for the poll loop (ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;

/// Minimum poll interval (ms)
///
/// A zero interval would turn the worker into a busy loop.
pub const MIN_POLL_INTERVAL_MS: u64 = 1;

/// Upper bound on a single wait inside `read_message` (ms)
///
/// Cancellation is observed at least this often while a read is blocked.
pub const READ_POLL_SLICE_MS: u64 = 100;

/// First backoff after a client error in the poll loop (ms)
pub const POLL_ERROR_BACKOFF_INITIAL_MS: u64 = 100;

/// Largest backoff between consecutive client errors in the poll loop (ms)
pub const POLL_ERROR_BACKOFF_MAX_MS: u64 = 5_000;

// ===== Wire Format =====

/// Deepest container nesting `serde_json` will decode in one document
///
/// Counts the envelope object and the payload map, so a payload section may
/// nest two levels less than this.
pub const MAX_WIRE_DEPTH: usize = 127;

// ===== Headers =====

/// Header carrying the caller's correlation id on produced messages and proxy requests
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

// ===== Secrets =====

/// Default lifetime of a cached secret (15 minutes)
pub const DEFAULT_SECRET_TTL_SECS: u64 = 15 * 60;
