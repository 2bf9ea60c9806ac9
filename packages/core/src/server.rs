//! Server registry domain types.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{QueueError, epoch_seconds};

/// Lifecycle state advertised by a server process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unknown,
    StartingUp,
    Running,
    ShuttingDown,
}

impl LifecycleState {
    /// Permitted moves are `starting_up -> running -> shutting_down`.
    pub fn can_transition_to(self, next: LifecycleState) -> bool {
        matches!(
            (self, next),
            (LifecycleState::StartingUp, LifecycleState::Running)
                | (LifecycleState::Running, LifecycleState::ShuttingDown)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::StartingUp => "starting_up",
            LifecycleState::Running => "running",
            LifecycleState::ShuttingDown => "shutting_down",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unique identity of one server process instance.
///
/// The process start time is part of the key, so a recycled pid in a new
/// container still yields a distinct key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerKey {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    /// Process start, epoch seconds.
    pub start_time: f64,
}

impl ServerKey {
    pub fn new(host: impl Into<String>, port: u16, pid: u32, start_time: f64) -> Self {
        Self {
            host: host.into(),
            port,
            pid,
            start_time,
        }
    }

    /// Identity of the calling process, started at `started_at`.
    pub fn for_current_process(host: impl Into<String>, port: u16, started_at: DateTime<Utc>) -> Self {
        Self::new(host, port, std::process::id(), epoch_seconds(started_at))
    }
}

impl std::fmt::Display for ServerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.host, self.port, self.pid, self.start_time)
    }
}

impl FromStr for ServerKey {
    type Err = QueueError;

    /// Parse `host:port:pid:start_time`, splitting from the right so an
    /// IPv6 host keeps its colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || QueueError::Validation(format!("malformed server key: {}", s));

        let mut parts = s.rsplitn(4, ':');
        let start_time = parts.next().ok_or_else(invalid)?;
        let pid = parts.next().ok_or_else(invalid)?;
        let port = parts.next().ok_or_else(invalid)?;
        let host = parts.next().ok_or_else(invalid)?;

        Ok(Self {
            host: host.to_string(),
            port: port.parse().map_err(|_| invalid())?,
            pid: pid.parse().map_err(|_| invalid())?,
            start_time: start_time.parse().map_err(|_| invalid())?,
        })
    }
}

/// Interest a server advertises in one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInterest {
    /// Relative share of polls this queue receives.
    pub weight: u32,
}

impl Default for QueueInterest {
    fn default() -> Self {
        Self { weight: 1 }
    }
}

/// Registry entry for one live server process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerRecord {
    pub host: String,
    pub port: u16,
    pub pid: u32,
    pub start_time: f64,
    #[serde(default)]
    pub queues: BTreeMap<String, QueueInterest>,
    pub num_workers: usize,
    #[serde(rename = "state")]
    pub lifecycle_state: LifecycleState,
    /// Last heartbeat, epoch seconds.
    pub last_heartbeat: f64,
}

impl ServerRecord {
    /// Key this record is registered under.
    pub fn server_key(&self) -> ServerKey {
        ServerKey::new(self.host.clone(), self.port, self.pid, self.start_time)
    }

    /// Seconds since the last heartbeat.
    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> f64 {
        epoch_seconds(now) - self.last_heartbeat
    }

    /// Whether the server missed heartbeats for longer than `max_age` seconds.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: f64) -> bool {
        self.heartbeat_age(now) > max_age
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn only_forward_transitions_are_allowed() {
        use LifecycleState::*;
        assert!(StartingUp.can_transition_to(Running));
        assert!(Running.can_transition_to(ShuttingDown));
        assert!(!StartingUp.can_transition_to(ShuttingDown));
        assert!(!Running.can_transition_to(StartingUp));
        assert!(!ShuttingDown.can_transition_to(Running));
        assert!(!Unknown.can_transition_to(Running));
    }

    #[test]
    fn server_key_round_trips_through_string() {
        let key = ServerKey::new("10.0.0.7", 8000, 4242, 1_700_000_000.25);
        assert_eq!(key.to_string(), "10.0.0.7:8000:4242:1700000000.25");
        assert_eq!(key.to_string().parse::<ServerKey>().unwrap(), key);
    }

    #[test]
    fn server_key_keeps_ipv6_host() {
        let key: ServerKey = "::1:8000:12:5.5".parse().unwrap();
        assert_eq!(key.host, "::1");
        assert_eq!(key.port, 8000);
        assert_eq!(key.pid, 12);
    }

    #[test]
    fn malformed_server_key_is_rejected() {
        assert!("localhost:8000".parse::<ServerKey>().is_err());
        assert!("localhost:http:1:2.0".parse::<ServerKey>().is_err());
    }

    #[test]
    fn record_serializes_state_field() {
        let record = ServerRecord {
            host: "localhost".into(),
            port: 8000,
            pid: 1,
            start_time: 10.0,
            queues: BTreeMap::from([("ingest".to_string(), QueueInterest { weight: 3 })]),
            num_workers: 2,
            lifecycle_state: LifecycleState::StartingUp,
            last_heartbeat: 11.0,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["state"], "starting_up");
        assert_eq!(value["queues"]["ingest"]["weight"], 3);
    }

    #[test]
    fn staleness_uses_last_heartbeat() {
        let record = ServerRecord {
            host: "h".into(),
            port: 1,
            pid: 1,
            start_time: 0.0,
            queues: BTreeMap::new(),
            num_workers: 1,
            lifecycle_state: LifecycleState::Running,
            last_heartbeat: 100.0,
        };
        let now = Utc.timestamp_opt(130, 0).unwrap();
        assert!(record.is_stale(now, 20.0));
        assert!(!record.is_stale(now, 60.0));
    }
}
