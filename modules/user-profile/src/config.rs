use event_bus::consumer_retry::RetryConfig;
use event_bus::ConsumerOptions;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Nats,
    /// Process-local broker for single-process development and tests
    ///
    /// Nothing outside this process can read or publish on it, so events
    /// from a separately started identity-auth never arrive.
    InMemory,
}

impl FromStr for BusType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nats" => Ok(Self::Nats),
            "inmemory" => Ok(Self::InMemory),
            other => Err(ConfigError::Invalid {
                name: "BUS_TYPE",
                reason: format!("expected nats or inmemory, got {other:?}"),
            }),
        }
    }
}

/// Application configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: BusType,
    pub nats_url: String,
    pub events_topic: String,
    pub consumer_group: String,
    pub consumer: ConsumerOptions,
    pub retry: RetryConfig,
    pub host: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let bus_type = lookup("BUS_TYPE")
            .unwrap_or_else(|| "nats".to_string())
            .parse()?;

        let nats_url = lookup("NATS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string());
        let events_topic = lookup("EVENTS_TOPIC").unwrap_or_else(|| "auth.events".to_string());

        let consumer_group =
            lookup("CONSUMER_GROUP").unwrap_or_else(|| "user-service-group".to_string());
        if consumer_group.trim().is_empty() {
            return Err(ConfigError::Invalid {
                name: "CONSUMER_GROUP",
                reason: "must not be empty".to_string(),
            });
        }

        let ack_wait_secs: u64 = positive(&lookup, "CONSUMER_ACK_WAIT_SECS", 30)?;
        let max_ack_pending: i64 = positive(&lookup, "CONSUMER_MAX_ACK_PENDING", 1)?;

        let max_attempts: u32 = parse_or(&lookup, "RELAY_MAX_ATTEMPTS", 3)?;
        let initial_backoff_ms: u64 = positive(&lookup, "RELAY_RETRY_BACKOFF_MS", 500)?;
        let max_backoff_ms: u64 = positive(&lookup, "RELAY_MAX_BACKOFF_MS", 30_000)?;
        if max_backoff_ms < initial_backoff_ms {
            return Err(ConfigError::Invalid {
                name: "RELAY_MAX_BACKOFF_MS",
                reason: "must not be below RELAY_RETRY_BACKOFF_MS".to_string(),
            });
        }

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8082)?;

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            events_topic,
            consumer_group,
            consumer: ConsumerOptions {
                ack_wait: Duration::from_secs(ack_wait_secs),
                max_ack_pending,
            },
            retry: RetryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(initial_backoff_ms),
                max_backoff: Duration::from_millis(max_backoff_ms),
            },
            host,
            port,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parse_or(lookup, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let mut map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        map.entry("DATABASE_URL".to_string())
            .or_insert_with(|| "sqlite::memory:".to_string());
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg.bus_type, BusType::Nats);
        assert_eq!(cfg.events_topic, "auth.events");
        assert_eq!(cfg.consumer_group, "user-service-group");
        assert_eq!(cfg.consumer.ack_wait, Duration::from_secs(30));
        assert_eq!(cfg.consumer.max_ack_pending, 1);
        assert_eq!(cfg.retry, RetryConfig::default());
        assert_eq!(cfg.port, 8082);
    }

    #[test]
    fn test_database_url_is_required() {
        let err = Config::from_lookup(|_: &str| None).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_zero_attempts_disables_dead_lettering() {
        let cfg = Config::from_lookup(lookup(&[("RELAY_MAX_ATTEMPTS", "0")])).unwrap();
        assert_eq!(cfg.retry.max_attempts, 0);
        assert!(!cfg.retry.is_exhausted(100));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ("CONSUMER_GROUP", " "),
            ("CONSUMER_ACK_WAIT_SECS", "0"),
            ("CONSUMER_MAX_ACK_PENDING", "-1"),
            ("RELAY_MAX_ATTEMPTS", "many"),
            ("RELAY_RETRY_BACKOFF_MS", "0"),
            ("RELAY_MAX_BACKOFF_MS", "100"),
            ("BUS_TYPE", "kafka"),
        ];

        for (name, value) in cases {
            let err = Config::from_lookup(lookup(&[(name, value)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: n, .. } if n == name),
                "{name}={value}: {err:?}"
            );
        }
    }
}
