// Configuration module for kafka_bridge
//
// Connection settings are option structs whose serde names are the librdkafka
// property names. Unset fields are skipped on serialization, so building a
// client config forwards exactly the keys the caller set.

use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::kafka::constants::{
    DEFAULT_BOOTSTRAP_SERVERS, DEFAULT_PROXY_TIMEOUT_MS, MAX_PROXY_TIMEOUT_MS,
    MIN_PROXY_TIMEOUT_MS, OFFSET_RESET_POLICIES, SECURITY_PROTOCOLS,
};
use crate::kafka::error::{MessagingError, Result};

/// Credential block shared by consumers and producers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KafkaCredentials {
    /// Comma-separated broker list (e.g., "kafka1:9092,kafka2:9092")
    #[serde(rename = "bootstrap.servers", skip_serializing_if = "Option::is_none")]
    pub brokers: Option<String>,
    #[serde(rename = "sasl.username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "sasl.password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512)
    #[serde(rename = "sasl.mechanisms", skip_serializing_if = "Option::is_none")]
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL)
    #[serde(rename = "security.protocol", skip_serializing_if = "Option::is_none")]
    pub security_protocol: Option<String>,
    #[serde(rename = "client.id", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl KafkaCredentials {
    /// Build from `KAFKA_*` environment variables
    ///
    /// The broker list falls back to `localhost:9092`; every other field is
    /// left unset when its variable is missing or empty.
    pub fn from_env() -> Self {
        Self {
            brokers: Some(
                env_var("KAFKA_BOOTSTRAP_SERVERS")
                    .unwrap_or_else(|| DEFAULT_BOOTSTRAP_SERVERS.to_string()),
            ),
            username: env_var("KAFKA_SASL_USERNAME"),
            password: env_var("KAFKA_SASL_PASSWORD"),
            sasl_mechanism: env_var("KAFKA_SASL_MECHANISM"),
            security_protocol: env_var("KAFKA_SECURITY_PROTOCOL"),
            client_id: env_var("KAFKA_CLIENT_ID"),
        }
    }

    /// Fill username and password from a secret's `username`/`password` keys
    ///
    /// Keys that are absent or not strings leave the current value in place.
    pub fn apply_secret(&mut self, secret: &serde_json::Map<String, Value>) {
        if let Some(Value::String(username)) = secret.get("username") {
            self.username = Some(username.clone());
        }
        if let Some(Value::String(password)) = secret.get("password") {
            self.password = Some(password.clone());
        }
    }

    /// Check the credential block for combinations librdkafka would reject
    pub fn validate(&self) -> Result<()> {
        match self.brokers.as_deref() {
            Some(brokers) if !brokers.trim().is_empty() => {}
            _ => {
                return Err(MessagingError::Config(
                    "bootstrap.servers is empty".to_string(),
                ))
            }
        }

        if let Some(protocol) = self.security_protocol.as_deref() {
            if !SECURITY_PROTOCOLS
                .iter()
                .any(|p| p.eq_ignore_ascii_case(protocol))
            {
                return Err(MessagingError::Config(format!(
                    "unknown security.protocol: {}",
                    protocol
                )));
            }

            // SASL_* protocols need a mechanism and a full credential pair
            if protocol.to_ascii_uppercase().starts_with("SASL") {
                if is_blank(&self.sasl_mechanism) {
                    return Err(MessagingError::Config(format!(
                        "sasl.mechanisms is required for {}",
                        protocol
                    )));
                }
                if is_blank(&self.username) || is_blank(&self.password) {
                    return Err(MessagingError::Config(format!(
                        "sasl.username and sasl.password are required for {}",
                        protocol
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Consumer settings: credentials plus group and offset policy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    #[serde(flatten)]
    pub credentials: KafkaCredentials,
    #[serde(rename = "group.id", skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    /// Event-channel toggle of the Go client; kept in the config shape but
    /// never sent to librdkafka, which rejects unknown properties
    #[serde(
        rename = "go.events.channel.enable",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub events_channel: bool,
    #[serde(rename = "auto.offset.reset", skip_serializing_if = "Option::is_none")]
    pub offset_reset: Option<String>,
    /// Additional librdkafka properties forwarded verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ConsumerConfig {
    pub fn new(credentials: KafkaCredentials, group_id: impl Into<String>) -> Self {
        Self {
            credentials,
            group_id: Some(group_id.into()),
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self {
            credentials: KafkaCredentials::from_env(),
            group_id: env_var("KAFKA_GROUP_ID"),
            events_channel: false,
            offset_reset: env_var("KAFKA_OFFSET_RESET"),
            extra: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;

        if is_blank(&self.group_id) {
            return Err(MessagingError::Config("group.id is empty".to_string()));
        }

        if let Some(policy) = self.offset_reset.as_deref() {
            if !OFFSET_RESET_POLICIES.contains(&policy) {
                return Err(MessagingError::Config(format!(
                    "unknown auto.offset.reset: {}",
                    policy
                )));
            }
        }

        Ok(())
    }

    /// librdkafka properties for this consumer, unset fields omitted
    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        let mut properties = to_properties(self)?;
        properties.remove("go.events.channel.enable");
        Ok(properties)
    }

    pub fn to_client_config(&self) -> Result<ClientConfig> {
        Ok(client_config_from(self.properties()?))
    }
}

/// Producer settings: credentials plus acknowledgment level
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    #[serde(flatten)]
    pub credentials: KafkaCredentials,
    /// Acknowledgment level ("0", "1", "all")
    #[serde(rename = "acks", skip_serializing_if = "Option::is_none")]
    pub acks: Option<String>,
    /// Additional librdkafka properties forwarded verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ProducerConfig {
    pub fn new(credentials: KafkaCredentials) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    pub fn from_env() -> Self {
        Self {
            credentials: KafkaCredentials::from_env(),
            acks: env_var("KAFKA_ACKS"),
            extra: BTreeMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.credentials.validate()?;

        if let Some(acks) = self.acks.as_deref() {
            let valid = matches!(acks, "all") || acks.parse::<i32>().is_ok_and(|n| n >= -1);
            if !valid {
                return Err(MessagingError::Config(format!("invalid acks: {}", acks)));
            }
        }

        Ok(())
    }

    pub fn properties(&self) -> Result<BTreeMap<String, String>> {
        to_properties(self)
    }

    pub fn to_client_config(&self) -> Result<ClientConfig> {
        Ok(client_config_from(self.properties()?))
    }
}

/// Settings for the HTTP proxy transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// URL that accepts `POST {"topic", "key", "value"}`
    pub endpoint: String,
    /// Request timeout used when the caller's context has no deadline
    #[serde(with = "duration_ms", default = "default_proxy_timeout")]
    pub timeout: Duration,
}

impl ProxyConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: default_proxy_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build from `KAFKA_PROXY_URL` and `KAFKA_PROXY_TIMEOUT_MS`
    pub fn from_env() -> Result<Self> {
        let endpoint = env_var("KAFKA_PROXY_URL")
            .ok_or_else(|| MessagingError::Config("KAFKA_PROXY_URL is not set".to_string()))?;
        let timeout = match env_var("KAFKA_PROXY_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(ms.parse().map_err(|_| {
                MessagingError::Config(format!("KAFKA_PROXY_TIMEOUT_MS is not a number: {}", ms))
            })?),
            None => default_proxy_timeout(),
        };
        Ok(Self { endpoint, timeout })
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")) {
            return Err(MessagingError::Config(format!(
                "proxy endpoint must be an http(s) URL: {}",
                self.endpoint
            )));
        }

        let ms = self.timeout.as_millis() as u64;
        if !(MIN_PROXY_TIMEOUT_MS..=MAX_PROXY_TIMEOUT_MS).contains(&ms) {
            return Err(MessagingError::Config(format!(
                "proxy timeout must be between {}ms and {}ms, got {}ms",
                MIN_PROXY_TIMEOUT_MS, MAX_PROXY_TIMEOUT_MS, ms
            )));
        }

        Ok(())
    }
}

fn default_proxy_timeout() -> Duration {
    Duration::from_millis(DEFAULT_PROXY_TIMEOUT_MS)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Validate a topic name the way the broker would
pub fn validate_topic(topic: &str) -> Result<()> {
    if topic.is_empty() {
        return Err(MessagingError::Config("topic is empty".to_string()));
    }
    if topic.len() > 249 {
        return Err(MessagingError::Config(format!(
            "topic name exceeds 249 characters: {}",
            topic.len()
        )));
    }
    if topic == "." || topic == ".." {
        return Err(MessagingError::Config(format!("invalid topic name: {}", topic)));
    }
    if let Some(c) = topic
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(MessagingError::Config(format!(
            "invalid character {:?} in topic name {}",
            c, topic
        )));
    }
    Ok(())
}

fn to_properties<T: Serialize>(config: &T) -> Result<BTreeMap<String, String>> {
    let value = serde_json::to_value(config)
        .map_err(|e| MessagingError::Config(format!("unserializable config: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(MessagingError::Config(
            "config did not serialize to an object".to_string(),
        ));
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

fn client_config_from(properties: BTreeMap<String, String>) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    for (key, value) in properties {
        client_config.set(key, value);
    }
    client_config
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
