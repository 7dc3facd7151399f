//! Credential lookup with a time-bounded cache
//!
//! Broker credentials usually live in a secret manager rather than in the
//! environment. A [`SecretSource`] fetches the raw secret string by id; the
//! [`SecretStore`] parses it as a JSON object and caches the raw value for a
//! fixed TTL so repeated client construction does not hit the source.
//!
//! ```text
//! let store = SecretStore::with_default_ttl(source);
//! let secret = store.get_secret(&ctx, "kafka/payments").await?;
//! credentials.apply_secret(&secret);
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::kafka::constants::DEFAULT_SECRET_TTL_SECS;
use crate::kafka::context::Context;
use crate::kafka::error::{ClientError, MessagingError, Result};

/// Backend that resolves a secret id to its raw string value
#[async_trait]
pub trait SecretSource: Send + Sync {
    async fn fetch(&self, id: &str) -> std::result::Result<String, ClientError>;
}

#[derive(Debug, Clone)]
struct CachedSecret {
    value: String,
    fetched_at: Instant,
}

/// Raw secret values keyed by id, each valid for `ttl` after insertion
#[derive(Debug, Clone)]
pub struct SecretCache {
    entries: Arc<RwLock<HashMap<String, CachedSecret>>>,
    ttl: Duration,
}

impl SecretCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries held, expired ones included until swept
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached value for `id`, unless it has expired
    ///
    /// An expired entry is dropped on lookup.
    pub fn get(&self, id: &str) -> Option<String> {
        {
            let entries = self.entries.read();
            match entries.get(id) {
                None => return None,
                Some(entry) if entry.fetched_at.elapsed() < self.ttl => {
                    return Some(entry.value.clone())
                }
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write();
        // another caller may have refreshed it between the two locks
        match entries.get(id) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(id);
                None
            }
            None => None,
        }
    }

    /// Cache `value` under `id`, sweeping out every expired entry
    pub fn insert(&self, id: impl Into<String>, value: impl Into<String>) {
        let mut entries = self.entries.write();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        entries.insert(
            id.into(),
            CachedSecret {
                value: value.into(),
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, id: &str) {
        self.entries.write().remove(id);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

/// Fetches secrets from a source, parsing and caching them
pub struct SecretStore<S: SecretSource> {
    source: S,
    cache: SecretCache,
}

impl<S: SecretSource> SecretStore<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            cache: SecretCache::new(ttl),
        }
    }

    /// Store caching each secret for `DEFAULT_SECRET_TTL_SECS`
    pub fn with_default_ttl(source: S) -> Self {
        Self::new(source, Duration::from_secs(DEFAULT_SECRET_TTL_SECS))
    }

    pub fn cache(&self) -> &SecretCache {
        &self.cache
    }

    /// Secret `id` as a JSON object
    ///
    /// # Errors
    ///
    /// - `Secret` if the source fails
    /// - `Decode` if the value is not a JSON object
    /// - `Cancelled` if `ctx` finishes before the source answers
    pub async fn get_secret(&self, ctx: &Context, id: &str) -> Result<Map<String, Value>> {
        if let Some(raw) = self.cache.get(id) {
            debug!(correlation_id = ctx.correlation_id(), secret_id = id, "Secret cache hit");
            return parse_secret(id, &raw);
        }

        let fetched = tokio::select! {
            reason = ctx.done() => {
                return Err(MessagingError::Cancelled { operation: "get_secret", reason });
            }
            fetched = self.source.fetch(id) => fetched,
        };
        let raw = fetched.map_err(|err| {
            warn!(
                correlation_id = ctx.correlation_id(),
                secret_id = id,
                error = %err,
                "Secret fetch failed"
            );
            MessagingError::Secret {
                id: id.to_string(),
                reason: err.to_string(),
            }
        })?;

        // only well-formed secrets are cached
        let secret = parse_secret(id, &raw)?;
        self.cache.insert(id, raw);
        debug!(correlation_id = ctx.correlation_id(), secret_id = id, "Secret fetched");
        Ok(secret)
    }
}

fn parse_secret(id: &str, raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(MessagingError::Decode(format!(
            "secret {} is not a JSON object (found {})",
            id,
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
