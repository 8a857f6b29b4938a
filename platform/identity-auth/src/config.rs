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

/// Which broker backend the service talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Nats,
    /// Process-local broker for single-process development and tests
    ///
    /// Nothing outside this process can read or publish on it, so a
    /// separately started user-profile never sees the events published here.
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
    pub outbox_poll_interval: Duration,
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

        let poll_ms: u64 = parse_or(&lookup, "OUTBOX_POLL_INTERVAL_MS", 5000)?;
        if poll_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "OUTBOX_POLL_INTERVAL_MS",
                reason: "must be greater than zero".to_string(),
            });
        }

        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = parse_or(&lookup, "PORT", 8080)?;

        Ok(Config {
            database_url,
            bus_type,
            nats_url,
            events_topic,
            outbox_poll_interval: Duration::from_millis(poll_ms),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(lookup(&[("DATABASE_URL", "sqlite::memory:")])).unwrap();
        assert_eq!(cfg.bus_type, BusType::Nats);
        assert_eq!(cfg.nats_url, "nats://localhost:4222");
        assert_eq!(cfg.events_topic, "auth.events");
        assert_eq!(cfg.outbox_poll_interval, Duration::from_secs(5));
        assert_eq!(cfg.host, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
    }

    #[test]
    fn test_database_url_is_required() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));

        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("DATABASE_URL"));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("BUS_TYPE", "kafka"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BUS_TYPE", .. }));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("PORT", "http"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite::memory:"),
            ("OUTBOX_POLL_INTERVAL_MS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "OUTBOX_POLL_INTERVAL_MS", .. }));
    }

    #[test]
    fn test_overrides() {
        let cfg = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://auth.db"),
            ("BUS_TYPE", "InMemory"),
            ("EVENTS_TOPIC", "sso.events"),
            ("OUTBOX_POLL_INTERVAL_MS", "250"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(cfg.bus_type, BusType::InMemory);
        assert_eq!(cfg.events_topic, "sso.events");
        assert_eq!(cfg.outbox_poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.port, 9000);
    }
}
