//! Configuration for the vitals simulator.
//!
//! Resolved once at startup from environment variables (optionally seeded
//! from a `.env` file by the binary) and passed by reference afterwards.

use crate::error::{Result, SimulatorError};
use crate::ward::{parse_patient_list, patient_ids, DEFAULT_PATIENT_COUNT};
use rdkafka::config::ClientConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_BOOTSTRAP_SERVERS: &str = "KAFKA_BOOTSTRAP_SERVERS";
pub const ENV_SASL_USERNAME: &str = "SASL_USERNAME";
pub const ENV_SASL_PASSWORD: &str = "SASL_PASSWORD";
pub const ENV_SECURITY_PROTOCOL: &str = "SECURITY_PROTOCOL";
pub const ENV_SASL_MECHANISM: &str = "SASL_MECHANISM";
pub const ENV_OUTPUT_TOPIC: &str = "OUTPUT_TOPIC";
pub const ENV_GENERATION_INTERVAL_MS: &str = "GENERATION_INTERVAL_MS";
pub const ENV_PATIENT_COUNT: &str = "PATIENT_COUNT";
pub const ENV_PATIENT_IDS: &str = "PATIENT_IDS";
pub const ENV_FLUSH_TIMEOUT_MS: &str = "FLUSH_TIMEOUT_MS";
pub const ENV_MESSAGE_TIMEOUT_MS: &str = "MESSAGE_TIMEOUT_MS";
pub const ENV_CONNECT_TIMEOUT_MS: &str = "CONNECT_TIMEOUT_MS";
pub const ENV_MAX_CYCLES: &str = "MAX_CYCLES";

/// Transport security mode passed to the broker client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityProtocol {
    Plaintext,
    Ssl,
    SaslPlaintext,
    SaslSsl,
}

impl SecurityProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityProtocol::Plaintext => "PLAINTEXT",
            SecurityProtocol::Ssl => "SSL",
            SecurityProtocol::SaslPlaintext => "SASL_PLAINTEXT",
            SecurityProtocol::SaslSsl => "SASL_SSL",
        }
    }

    /// Returns whether SASL settings apply to this protocol.
    pub fn uses_sasl(&self) -> bool {
        matches!(self, SecurityProtocol::SaslPlaintext | SecurityProtocol::SaslSsl)
    }
}

impl FromStr for SecurityProtocol {
    type Err = SimulatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PLAINTEXT" => Ok(SecurityProtocol::Plaintext),
            "SSL" => Ok(SecurityProtocol::Ssl),
            "SASL_PLAINTEXT" => Ok(SecurityProtocol::SaslPlaintext),
            "SASL_SSL" => Ok(SecurityProtocol::SaslSsl),
            other => Err(SimulatorError::Config(format!(
                "unknown security protocol '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SecurityProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main configuration for the simulator.
#[derive(Clone)]
pub struct Config {
    /// Comma-separated broker endpoints
    pub bootstrap_servers: String,

    pub sasl_username: Option<String>,
    pub sasl_password: Option<String>,

    pub security_protocol: SecurityProtocol,

    /// SASL mechanism (e.g. "PLAIN", "SCRAM-SHA-256")
    pub sasl_mechanism: String,

    /// Destination topic
    pub topic: String,

    /// Pause between publish cycles
    pub interval: Duration,

    /// Upper bound on each flush barrier
    pub flush_timeout: Duration,

    /// Per-message delivery timeout forwarded to the client
    pub message_timeout: Option<Duration>,

    /// Bound on the startup metadata request that checks the broker is reachable
    pub connect_timeout: Duration,

    /// Simulated patients, in publish order
    pub patients: Vec<String>,

    /// Stop after this many cycles (runs forever when unset)
    pub max_cycles: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bootstrap_servers: String::new(),
            sasl_username: None,
            sasl_password: None,
            security_protocol: SecurityProtocol::SaslSsl,
            sasl_mechanism: "PLAIN".to_string(),
            topic: "vitals_topic".to_string(),
            interval: Duration::from_millis(1000),
            flush_timeout: Duration::from_millis(30_000),
            message_timeout: None,
            connect_timeout: Duration::from_millis(10_000),
            patients: patient_ids(DEFAULT_PATIENT_COUNT),
            max_cycles: None,
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, which maps a key to its raw value.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let defaults = Config::default();

        let bootstrap_servers = get(ENV_BOOTSTRAP_SERVERS).ok_or_else(|| {
            SimulatorError::Config(format!("{} must be set", ENV_BOOTSTRAP_SERVERS))
        })?;
        if bootstrap_servers.split(',').all(|s| s.trim().is_empty()) {
            return Err(SimulatorError::Config(format!(
                "{} contains no broker addresses",
                ENV_BOOTSTRAP_SERVERS
            )));
        }

        let security_protocol = match get(ENV_SECURITY_PROTOCOL) {
            Some(raw) => raw.parse()?,
            None => defaults.security_protocol,
        };

        let patients = match get(ENV_PATIENT_IDS) {
            Some(raw) => parse_patient_list(&raw),
            None => {
                let count = parse_number(&get, ENV_PATIENT_COUNT)?
                    .unwrap_or(DEFAULT_PATIENT_COUNT as u64);
                patient_ids(count as usize)
            }
        };
        if patients.is_empty() {
            return Err(SimulatorError::Config(
                "at least one patient must be simulated".to_string(),
            ));
        }

        let interval = parse_number(&get, ENV_GENERATION_INTERVAL_MS)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.interval);
        let flush_timeout =
            parse_timeout(&get, ENV_FLUSH_TIMEOUT_MS)?.unwrap_or(defaults.flush_timeout);
        let message_timeout = parse_timeout(&get, ENV_MESSAGE_TIMEOUT_MS)?;
        let connect_timeout =
            parse_timeout(&get, ENV_CONNECT_TIMEOUT_MS)?.unwrap_or(defaults.connect_timeout);

        Ok(Self {
            bootstrap_servers,
            sasl_username: get(ENV_SASL_USERNAME),
            sasl_password: get(ENV_SASL_PASSWORD),
            security_protocol,
            sasl_mechanism: get(ENV_SASL_MECHANISM).unwrap_or(defaults.sasl_mechanism),
            topic: get(ENV_OUTPUT_TOPIC).unwrap_or(defaults.topic),
            interval,
            flush_timeout,
            message_timeout,
            connect_timeout,
            patients,
            max_cycles: parse_number(&get, ENV_MAX_CYCLES)?,
        })
    }

    /// Builds the broker client configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new();
        client
            .set("bootstrap.servers", &self.bootstrap_servers)
            .set("security.protocol", self.security_protocol.as_str());

        if self.security_protocol.uses_sasl() {
            client.set("sasl.mechanism", &self.sasl_mechanism);
            if let Some(username) = &self.sasl_username {
                client.set("sasl.username", username);
            }
            if let Some(password) = &self.sasl_password {
                client.set("sasl.password", password);
            }
        }

        if let Some(timeout) = self.message_timeout {
            client.set("message.timeout.ms", timeout.as_millis().to_string());
        }

        client
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bootstrap_servers", &self.bootstrap_servers)
            .field("sasl_username", &self.sasl_username)
            .field("sasl_password", &self.sasl_password.as_ref().map(|_| "<redacted>"))
            .field("security_protocol", &self.security_protocol)
            .field("sasl_mechanism", &self.sasl_mechanism)
            .field("topic", &self.topic)
            .field("interval", &self.interval)
            .field("flush_timeout", &self.flush_timeout)
            .field("message_timeout", &self.message_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("patients", &self.patients)
            .field("max_cycles", &self.max_cycles)
            .finish()
    }
}

fn parse_number<F>(get: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<u64>().map_err(|e| {
                SimulatorError::Config(format!("{} must be a non-negative integer, got '{}': {}", key, raw, e))
            })
        })
        .transpose()
}

/// Parses a millisecond timeout. The client takes timeouts as a positive `i32`.
fn parse_timeout<F>(get: &F, key: &str) -> Result<Option<Duration>>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_number(get, key)? {
        Some(ms) if ms == 0 || ms > i32::MAX as u64 => Err(SimulatorError::Config(format!(
            "{} must be between 1 and {} milliseconds, got {}",
            key,
            i32::MAX,
            ms
        ))),
        other => Ok(other.map(Duration::from_millis)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[(ENV_BOOTSTRAP_SERVERS, "broker:9092")])).unwrap();

        assert_eq!(config.bootstrap_servers, "broker:9092");
        assert_eq!(config.security_protocol, SecurityProtocol::SaslSsl);
        assert_eq!(config.sasl_mechanism, "PLAIN");
        assert_eq!(config.topic, "vitals_topic");
        assert_eq!(config.interval, Duration::from_millis(1000));
        assert_eq!(config.patients.len(), 5);
        assert_eq!(config.patients[0], "patient_1");
        assert!(config.sasl_username.is_none());
        assert!(config.max_cycles.is_none());
    }

    #[test]
    fn test_missing_bootstrap_servers() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, SimulatorError::Config(_)));

        let err = Config::from_lookup(lookup(&[(ENV_BOOTSTRAP_SERVERS, "  ")])).unwrap_err();
        assert!(matches!(err, SimulatorError::Config(_)));

        let err = Config::from_lookup(lookup(&[(ENV_BOOTSTRAP_SERVERS, ", ,")])).unwrap_err();
        assert!(matches!(err, SimulatorError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "a:9092,b:9092"),
            (ENV_SASL_USERNAME, "user"),
            (ENV_SASL_PASSWORD, "secret"),
            (ENV_SECURITY_PROTOCOL, "sasl_plaintext"),
            (ENV_SASL_MECHANISM, "SCRAM-SHA-256"),
            (ENV_OUTPUT_TOPIC, "icu_vitals"),
            (ENV_GENERATION_INTERVAL_MS, "250"),
            (ENV_PATIENT_COUNT, "3"),
            (ENV_MAX_CYCLES, "10"),
        ]))
        .unwrap();

        assert_eq!(config.security_protocol, SecurityProtocol::SaslPlaintext);
        assert_eq!(config.sasl_username.as_deref(), Some("user"));
        assert_eq!(config.topic, "icu_vitals");
        assert_eq!(config.interval, Duration::from_millis(250));
        assert_eq!(config.patients, vec!["patient_1", "patient_2", "patient_3"]);
        assert_eq!(config.max_cycles, Some(10));
    }

    #[test]
    fn test_explicit_patient_list_wins() {
        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_PATIENT_COUNT, "9"),
            (ENV_PATIENT_IDS, "bed-1,bed-2"),
        ]))
        .unwrap();

        assert_eq!(config.patients, vec!["bed-1", "bed-2"]);
    }

    #[test]
    fn test_invalid_values() {
        let err = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_GENERATION_INTERVAL_MS, "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(ENV_GENERATION_INTERVAL_MS));

        assert!(Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_PATIENT_COUNT, "0"),
        ]))
        .is_err());

        assert!(Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_SECURITY_PROTOCOL, "carrier-pigeon"),
        ]))
        .is_err());
    }

    #[test]
    fn test_timeouts_must_fit_client_range() {
        for key in [ENV_FLUSH_TIMEOUT_MS, ENV_MESSAGE_TIMEOUT_MS, ENV_CONNECT_TIMEOUT_MS] {
            for bad in ["0", "2147483648"] {
                let err = Config::from_lookup(lookup(&[
                    (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
                    (key, bad),
                ]))
                .unwrap_err();
                assert!(matches!(err, SimulatorError::Config(_)), "{}={}", key, bad);
                assert!(err.to_string().contains(key));
            }
        }

        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_FLUSH_TIMEOUT_MS, "2147483647"),
            (ENV_CONNECT_TIMEOUT_MS, "1"),
        ]))
        .unwrap();
        assert_eq!(config.flush_timeout, Duration::from_millis(i32::MAX as u64));
        assert_eq!(config.connect_timeout, Duration::from_millis(1));
    }

    #[test]
    fn test_client_config() {
        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_SASL_USERNAME, "user"),
            (ENV_SASL_PASSWORD, "secret"),
            (ENV_MESSAGE_TIMEOUT_MS, "5000"),
        ]))
        .unwrap();

        let client = config.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(client.get("security.protocol"), Some("SASL_SSL"));
        assert_eq!(client.get("sasl.mechanism"), Some("PLAIN"));
        assert_eq!(client.get("sasl.username"), Some("user"));
        assert_eq!(client.get("sasl.password"), Some("secret"));
        assert_eq!(client.get("message.timeout.ms"), Some("5000"));
    }

    #[test]
    fn test_plaintext_skips_sasl() {
        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "localhost:9092"),
            (ENV_SECURITY_PROTOCOL, "PLAINTEXT"),
            (ENV_SASL_USERNAME, "user"),
        ]))
        .unwrap();

        let client = config.client_config();
        assert_eq!(client.get("security.protocol"), Some("PLAINTEXT"));
        assert_eq!(client.get("sasl.username"), None);
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = Config::from_lookup(lookup(&[
            (ENV_BOOTSTRAP_SERVERS, "broker:9092"),
            (ENV_SASL_PASSWORD, "hunter2"),
        ]))
        .unwrap();

        let debug = format!("{:?}", config);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<redacted>"));
    }
}
