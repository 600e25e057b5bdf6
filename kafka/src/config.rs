//! Session configuration shared by the producer and the subscriber.

use crate::error::{KafkaError, Result};
use rdkafka::ClientConfig;
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Bootstrap address used by [`SessionConfig::local_fallback`].
pub const LOCAL_BOOTSTRAP: &str = "localhost:9094";

/// Default consumer group, named after this client.
///
/// Pass `python-consumer-group` explicitly to resume offsets committed by
/// the earlier Python tool.
pub const DEFAULT_GROUP_ID: &str = "kafka-client-group";

/// Transport security between client and broker.
///
/// There is no default; callers always pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum SecurityMode {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityMode {
    /// Value of librdkafka's `security.protocol`.
    pub fn as_protocol(&self) -> &'static str {
        match self {
            SecurityMode::Plaintext => "PLAINTEXT",
            SecurityMode::Ssl => "SSL",
            SecurityMode::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityMode::SaslSsl => "SASL_SSL",
        }
    }

    /// Returns `true` for modes that authenticate with SASL.
    pub fn uses_sasl(&self) -> bool {
        matches!(self, SecurityMode::SaslPlaintext | SecurityMode::SaslSsl)
    }
}

impl FromStr for SecurityMode {
    type Err = KafkaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "plaintext" => Ok(SecurityMode::Plaintext),
            "ssl" => Ok(SecurityMode::Ssl),
            "sasl_plaintext" => Ok(SecurityMode::SaslPlaintext),
            "sasl_ssl" => Ok(SecurityMode::SaslSsl),
            other => Err(KafkaError::Config(format!(
                "unknown security mode '{other}' \
                 (expected plaintext, ssl, sasl_plaintext or sasl_ssl)"
            ))),
        }
    }
}

impl TryFrom<String> for SecurityMode {
    type Error = KafkaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for SecurityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_protocol())
    }
}

/// Where a consumer group starts when it has no committed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum OffsetReset {
    /// Replay the full retained history.
    Earliest,
    /// Only records published after the subscription.
    Latest,
}

impl OffsetReset {
    /// Value of librdkafka's `auto.offset.reset`.
    pub fn as_str(&self) -> &'static str {
        match self {
            OffsetReset::Earliest => "earliest",
            OffsetReset::Latest => "latest",
        }
    }
}

impl FromStr for OffsetReset {
    type Err = KafkaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            other => Err(KafkaError::Config(format!(
                "unknown offset reset policy '{other}' (expected earliest or latest)"
            ))),
        }
    }
}

impl TryFrom<String> for OffsetReset {
    type Error = KafkaError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SASL credentials for the `sasl_*` security modes.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SaslCredentials {
    /// SASL mechanism, e.g. `PLAIN` or `SCRAM-SHA-512`.
    pub mechanism: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SaslCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaslCredentials")
            .field("mechanism", &self.mechanism)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Configuration for a producer or consumer session.
///
/// Built once before the session is created and never mutated afterwards.
/// Producer-only and consumer-only settings live side by side; each role
/// ignores the settings of the other.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    /// Comma-separated list of Kafka brokers.
    pub bootstrap: String,

    /// Transport security.
    pub security_mode: SecurityMode,

    /// Credentials, required by the SASL security modes.
    #[serde(default)]
    pub sasl: Option<SaslCredentials>,

    /// Upper bound on establishing a broker connection.
    #[serde(
        rename = "connection_setup_timeout_ms",
        deserialize_with = "millis",
        default = "defaults::connection_setup_timeout"
    )]
    pub connection_setup_timeout: Duration,

    /// Upper bound from submit to delivery report (producer only).
    ///
    /// Keep this above any idle timeout imposed by the network path, such as
    /// a load balancer in front of the brokers.
    #[serde(
        rename = "message_delivery_timeout_ms",
        deserialize_with = "millis",
        default = "defaults::message_delivery_timeout"
    )]
    pub message_delivery_timeout: Duration,

    /// Retries on transient send failures (producer only).
    #[serde(default = "defaults::retries")]
    pub retries: u32,

    /// Consumer group ID (consumer only).
    #[serde(default = "defaults::group_id")]
    pub group_id: String,

    /// Start position when the group has no committed offset (consumer only).
    #[serde(default = "defaults::offset_reset")]
    pub offset_reset: OffsetReset,

    /// Group coordinator session timeout (consumer only).
    #[serde(
        rename = "session_timeout_ms",
        deserialize_with = "millis",
        default = "defaults::session_timeout"
    )]
    pub session_timeout: Duration,

    /// Heartbeat interval towards the group coordinator (consumer only).
    #[serde(
        rename = "heartbeat_interval_ms",
        deserialize_with = "millis",
        default = "defaults::heartbeat_interval"
    )]
    pub heartbeat_interval: Duration,
}

mod defaults {
    use super::{OffsetReset, DEFAULT_GROUP_ID};
    use std::time::Duration;

    pub fn connection_setup_timeout() -> Duration {
        Duration::from_secs(10)
    }

    pub fn message_delivery_timeout() -> Duration {
        Duration::from_secs(300)
    }

    pub fn retries() -> u32 {
        3
    }

    pub fn group_id() -> String {
        DEFAULT_GROUP_ID.to_string()
    }

    pub fn offset_reset() -> OffsetReset {
        OffsetReset::Earliest
    }

    pub fn session_timeout() -> Duration {
        Duration::from_secs(45)
    }

    pub fn heartbeat_interval() -> Duration {
        Duration::from_secs(15)
    }
}

fn millis<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl SessionConfig {
    /// Creates a configuration with default timeouts.
    ///
    /// # Arguments
    ///
    /// * `bootstrap` - Comma-separated list of Kafka brokers
    /// * `security_mode` - Transport security
    pub fn new(bootstrap: impl Into<String>, security_mode: SecurityMode) -> Self {
        Self {
            bootstrap: bootstrap.into(),
            security_mode,
            sasl: None,
            connection_setup_timeout: defaults::connection_setup_timeout(),
            message_delivery_timeout: defaults::message_delivery_timeout(),
            retries: defaults::retries(),
            group_id: defaults::group_id(),
            offset_reset: defaults::offset_reset(),
            session_timeout: defaults::session_timeout(),
            heartbeat_interval: defaults::heartbeat_interval(),
        }
    }

    /// Creates a configuration pointing at [`LOCAL_BOOTSTRAP`].
    ///
    /// Only suitable for local development; a warning is logged.
    pub fn local_fallback(security_mode: SecurityMode) -> Self {
        warn!(
            "Using default bootstrap server '{}'; set an explicit broker address for non-local use",
            LOCAL_BOOTSTRAP
        );
        Self::new(LOCAL_BOOTSTRAP, security_mode)
    }

    /// Loads a configuration from a JSON document.
    ///
    /// `bootstrap` and `security_mode` are required; durations are given in
    /// milliseconds (`*_ms` keys).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading session configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses a configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Sets SASL credentials.
    pub fn with_sasl(
        mut self,
        mechanism: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.sasl = Some(SaslCredentials {
            mechanism: mechanism.into(),
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Sets the connection setup timeout.
    pub fn with_connection_setup_timeout(mut self, timeout: Duration) -> Self {
        self.connection_setup_timeout = timeout;
        self
    }

    /// Sets the message delivery timeout.
    pub fn with_message_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.message_delivery_timeout = timeout;
        self
    }

    /// Sets the number of send retries.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the consumer group ID.
    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = group_id.into();
        self
    }

    /// Sets the offset reset policy.
    pub fn with_offset_reset(mut self, policy: OffsetReset) -> Self {
        self.offset_reset = policy;
        self
    }

    /// Sets the group session timeout.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Checks the configuration before any session is created.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        validate_bootstrap(&self.bootstrap)?;

        if self.security_mode.uses_sasl() {
            match &self.sasl {
                Some(sasl) if !sasl.mechanism.trim().is_empty() && !sasl.username.is_empty() => {}
                Some(_) => {
                    return Err(KafkaError::Config(format!(
                        "security mode {} requires a SASL mechanism and username",
                        self.security_mode
                    )))
                }
                None => {
                    return Err(KafkaError::Config(format!(
                        "security mode {} requires SASL credentials",
                        self.security_mode
                    )))
                }
            }
        }

        for (name, value) in [
            ("connection setup timeout", self.connection_setup_timeout),
            ("message delivery timeout", self.message_delivery_timeout),
            ("session timeout", self.session_timeout),
            ("heartbeat interval", self.heartbeat_interval),
        ] {
            if value.is_zero() {
                return Err(KafkaError::Config(format!("{name} must be greater than zero")));
            }
        }

        if self.group_id.trim().is_empty() {
            return Err(KafkaError::Config("consumer group ID must not be empty".to_string()));
        }

        if self.heartbeat_interval >= self.session_timeout {
            return Err(KafkaError::Config(format!(
                "heartbeat interval ({:?}) must be smaller than the session timeout ({:?})",
                self.heartbeat_interval, self.session_timeout
            )));
        }
        if self
            .heartbeat_interval
            .checked_mul(3)
            .map_or(true, |limit| limit > self.session_timeout)
        {
            warn!(
                "Heartbeat interval {:?} exceeds one third of the session timeout {:?}; \
                 a single missed heartbeat may evict the consumer",
                self.heartbeat_interval, self.session_timeout
            );
        }

        Ok(())
    }

    /// Client configuration for a producer session.
    pub fn producer_client_config(&self) -> ClientConfig {
        let mut client_config = self.base_client_config();
        client_config
            .set("message.timeout.ms", millis_str(self.message_delivery_timeout))
            .set("retries", self.retries.to_string());
        client_config
    }

    /// Client configuration for a consumer session.
    pub fn consumer_client_config(&self) -> ClientConfig {
        let mut client_config = self.base_client_config();
        client_config
            .set("group.id", &self.group_id)
            .set("auto.offset.reset", self.offset_reset.as_str())
            .set("session.timeout.ms", millis_str(self.session_timeout))
            .set("heartbeat.interval.ms", millis_str(self.heartbeat_interval))
            .set("enable.partition.eof", "false");
        client_config
    }

    fn base_client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &self.bootstrap)
            .set("security.protocol", self.security_mode.as_protocol())
            .set(
                "socket.connection.setup.timeout.ms",
                millis_str(self.connection_setup_timeout),
            );
        if let Some(sasl) = &self.sasl {
            client_config
                .set("sasl.mechanism", &sasl.mechanism)
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }
        client_config
    }
}

fn millis_str(duration: Duration) -> String {
    duration.as_millis().to_string()
}

fn validate_bootstrap(bootstrap: &str) -> Result<()> {
    if bootstrap.trim().is_empty() {
        return Err(KafkaError::Config("bootstrap address must not be empty".to_string()));
    }

    for entry in bootstrap.split(',').map(str::trim) {
        let valid = entry
            .rsplit_once(':')
            .map(|(host, port)| !host.is_empty() && matches!(port.parse::<u16>(), Ok(p) if p > 0))
            .unwrap_or(false);
        if !valid {
            return Err(KafkaError::Config(format!(
                "malformed broker address '{entry}' (expected host:port)"
            )));
        }
    }

    Ok(())
}
