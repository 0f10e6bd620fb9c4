//! Engine configuration loaded from the environment.
//!
//! | variable | default |
//! |---|---|
//! | `WAYPOINT_STALE_IN_PREPARATION_HOURS` | 168 |
//! | `WAYPOINT_STALE_IN_TRANSIT_HOURS` | 336 |
//! | `WAYPOINT_STALE_IN_CUSTOMS_HOURS` | 120 |
//! | `WAYPOINT_STALE_QUALITY_CHECK_HOURS` | 72 |
//! | `WAYPOINT_STALE_<STATUS>_HOURS` (other non-terminal statuses) | unset |
//! | `WAYPOINT_HIGH_VALUE_THRESHOLD` | 5000000 |
//! | `WAYPOINT_APPROVAL_GRACE_HOURS` | 48 |
//! | `WAYPOINT_METRICS_WINDOW_DAYS` | 30 |
//! | `WAYPOINT_BIND_ADDR` | `0.0.0.0:8080` |

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use waypoint_transfers::{CriticalityPolicy, TransferStatus};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_METRICS_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} must be a socket address, got {value:?}")]
    InvalidAddr { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub criticality: CriticalityPolicy,
    pub metrics_window: Duration,
    pub bind_addr: SocketAddr,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            criticality: CriticalityPolicy::default(),
            metrics_window: Duration::days(DEFAULT_METRICS_WINDOW_DAYS),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (unset keys keep defaults).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        for status in TransferStatus::ALL.into_iter().filter(|s| !s.is_terminal()) {
            let key = format!("WAYPOINT_STALE_{}_HOURS", status.as_str());
            if let Some(hours) = number(&lookup, &key)? {
                let limit = span(&lookup, &key, Duration::try_hours(hours))?;
                config.criticality = config.criticality.with_staleness(status, limit);
            }
        }

        if let Some(threshold) = number(&lookup, "WAYPOINT_HIGH_VALUE_THRESHOLD")? {
            config.criticality = config.criticality.with_high_value_threshold(threshold as u64);
        }
        if let Some(hours) = number(&lookup, "WAYPOINT_APPROVAL_GRACE_HOURS")? {
            let grace = span(&lookup, "WAYPOINT_APPROVAL_GRACE_HOURS", Duration::try_hours(hours))?;
            config.criticality = config.criticality.with_approval_grace(grace);
        }
        if let Some(days) = number(&lookup, "WAYPOINT_METRICS_WINDOW_DAYS")? {
            config.metrics_window = span(&lookup, "WAYPOINT_METRICS_WINDOW_DAYS", Duration::try_days(days))?;
        }
        if let Some(raw) = lookup("WAYPOINT_BIND_ADDR") {
            config.bind_addr = raw.trim().parse().map_err(|_| ConfigError::InvalidAddr {
                key: "WAYPOINT_BIND_ADDR".to_string(),
                value: raw.clone(),
            })?;
        }

        Ok(config)
    }
}

fn number<F>(lookup: &F, key: &str) -> Result<Option<i64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    match raw.trim().parse::<i64>() {
        Ok(n) if n >= 0 => Ok(Some(n)),
        _ => Err(ConfigError::InvalidNumber {
            key: key.to_string(),
            value: raw,
        }),
    }
}

/// A parsed number that does not fit a `Duration` is as invalid as a malformed one.
fn span<F>(lookup: &F, key: &str, duration: Option<Duration>) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    duration.ok_or_else(|| ConfigError::InvalidNumber {
        key: key.to_string(),
        value: lookup(key).unwrap_or_default(),
    })
}
