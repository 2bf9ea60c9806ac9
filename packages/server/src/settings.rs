//! Process settings read from the environment.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use db::DbConfig;
use queue_core::QueueInterest;
use thiserror::Error;
use tracing::Level;

/// Settings errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("WORK_QUEUES weight must be an integer for queue {0:?}")]
    InvalidWeight(String),
    #[error("invalid WORK_QUEUES token {0:?}, expected name or name:weight")]
    InvalidQueueToken(String),
    #[error("invalid REST_URL {0:?}")]
    InvalidRestUrl(String),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Everything a server process needs to start.
#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: DbConfig,
    /// Host and port this server advertises in its server key.
    pub host: String,
    pub port: u16,
    pub num_workers: usize,
    pub work_queues: BTreeMap<String, QueueInterest>,
    pub heartbeat_interval: Duration,
    pub poll_interval: Duration,
    pub log_level: Level,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from any variable lookup. Unset and blank values
    /// take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let mut storage = DbConfig::remote(var("STORAGE_URL").unwrap_or_else(|| "mem://".into()));
        if let Some(namespace) = var("STORAGE_NAMESPACE") {
            storage = storage.with_namespace(namespace);
        }
        if let Some(database) = var("STORAGE_DATABASE") {
            storage = storage.with_database(database);
        }
        if let (Some(user), Some(pass)) = (var("STORAGE_USER"), var("STORAGE_PASS")) {
            storage = storage.with_credentials(user, pass);
        }

        let rest_url = var("REST_URL").unwrap_or_else(|| "http://localhost:8000".into());
        let (host, port) = parse_rest_url(&rest_url)?;

        let num_workers = match var("NUM_WORKERS") {
            Some(value) => parse_number("NUM_WORKERS", &value)?,
            None => std::thread::available_parallelism().map_or(1, |n| n.get()),
        };

        let work_queues = parse_work_queues(&var("WORK_QUEUES").unwrap_or_default())?;

        let heartbeat_secs: u64 = match var("HEARTBEAT_SECS") {
            Some(value) => parse_number("HEARTBEAT_SECS", &value)?,
            None => 10,
        };
        let poll_ms: u64 = match var("POLL_INTERVAL_MS") {
            Some(value) => parse_number("POLL_INTERVAL_MS", &value)?,
            None => 1000,
        };

        let log_level = match var("LOG_LEVEL") {
            Some(value) => parse_log_level(&value)?,
            None => Level::INFO,
        };

        Ok(Self {
            storage,
            host,
            port,
            num_workers,
            work_queues,
            heartbeat_interval: Duration::from_secs(heartbeat_secs.max(1)),
            poll_interval: Duration::from_millis(poll_ms.max(1)),
            log_level,
        })
    }
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

/// Parse whitespace separated `name[:weight]` tokens.
///
/// A missing or empty weight means 1.
pub fn parse_work_queues(tokens: &str) -> Result<BTreeMap<String, QueueInterest>, ConfigError> {
    let mut queues = BTreeMap::new();

    for token in tokens.split_whitespace() {
        let mut parts = token.split(':');
        let name = parts.next().unwrap_or_default();
        let weight = parts.next();
        if parts.next().is_some() || name.is_empty() {
            return Err(ConfigError::InvalidQueueToken(token.to_string()));
        }

        let weight = match weight {
            None | Some("") => 1,
            Some(weight) => weight
                .parse()
                .map_err(|_| ConfigError::InvalidWeight(name.to_string()))?,
        };
        queues.insert(name.to_string(), QueueInterest { weight });
    }

    Ok(queues)
}

/// Host and port from a URL like `http://host:port/path`.
pub fn parse_rest_url(url: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::InvalidRestUrl(url.to_string());

    let (scheme, rest) = url.split_once("://").ok_or_else(invalid)?;
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or_default();

    let (host, port) = if let Some(bracketed) = authority.strip_prefix('[') {
        let (host, after) = bracketed.split_once(']').ok_or_else(invalid)?;
        (host, after.strip_prefix(':'))
    } else {
        match authority.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (authority, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }

    let port = match port {
        Some(port) => port.parse().map_err(|_| invalid())?,
        None => match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => 80,
            "https" | "wss" => 443,
            _ => return Err(invalid()),
        },
    };

    Ok((host.to_string(), port))
}

fn parse_log_level(value: &str) -> Result<Level, ConfigError> {
    let value = value.trim().to_ascii_lowercase();
    let value = match value.as_str() {
        "warning" => "warn",
        "critical" | "fatal" => "error",
        other => other,
    };
    Level::from_str(value).map_err(|_| ConfigError::InvalidValue {
        name: "LOG_LEVEL",
        value: value.to_string(),
    })
}
