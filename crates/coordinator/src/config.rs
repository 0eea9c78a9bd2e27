use std::str::FromStr;
use std::time::Duration;

use concord_core::collaboration::{
    validate_identifier, LockTtlPolicy, DEFAULT_LOCK_TTL_SECS, HEARTBEAT_INTERVAL_SECS,
    MAX_LOCK_TTL_SECS, MIN_LOCK_TTL_MS, PRESENCE_STALE_THRESHOLD_SECS,
};
use concord_core::error::CoreError;

/// Default per-call store and broker deadline.
const DEFAULT_OP_TIMEOUT_MS: u64 = 5000;

/// Default metrics sampling period.
const DEFAULT_METRICS_SAMPLE_INTERVAL_SECS: u64 = 60;

/// Coordinator configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development (in-process store,
/// no broker). In production, override via environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorConfig {
    /// `memory://` or `redis://host:port/db`.
    pub store_url: String,
    /// Prefix for every key this deployment writes.
    pub namespace: String,
    /// Broker for event dispatch; `None` runs in store-only mode.
    pub broker_url: Option<String>,
    /// Events go out on `{topic_prefix}.{event_type}`.
    pub topic_prefix: String,
    pub lock_ttl: LockTtlPolicy,
    /// Cadence clients are expected to heartbeat at.
    pub heartbeat_interval: Duration,
    /// Presence TTL. Must exceed `heartbeat_interval`.
    pub presence_stale_threshold: Duration,
    /// Deadline for each store call and broker publish.
    pub op_timeout: Duration,
    /// `None` disables the metrics sampler.
    pub metrics_sample_interval: Option<Duration>,
    /// `None` disables the presence sweeper.
    pub presence_sweep_interval: Option<Duration>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            store_url: "memory://".into(),
            namespace: "concord".into(),
            broker_url: None,
            topic_prefix: "resource.events".into(),
            lock_ttl: LockTtlPolicy::default(),
            heartbeat_interval: Duration::from_secs(HEARTBEAT_INTERVAL_SECS),
            presence_stale_threshold: Duration::from_secs(PRESENCE_STALE_THRESHOLD_SECS),
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            metrics_sample_interval: Some(Duration::from_secs(
                DEFAULT_METRICS_SAMPLE_INTERVAL_SECS,
            )),
            presence_sweep_interval: None,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                         | Default           |
    /// |---------------------------------|-------------------|
    /// | `STORE_URL`                     | `memory://`       |
    /// | `STORE_NAMESPACE`               | `concord`         |
    /// | `BROKER_URL`                    | unset             |
    /// | `BROKER_TOPIC_PREFIX`           | `resource.events` |
    /// | `LOCK_TTL_DEFAULT_SECS`         | `1800`            |
    /// | `LOCK_TTL_MIN_MS`               | `1000`            |
    /// | `LOCK_TTL_MAX_SECS`             | `14400`           |
    /// | `HEARTBEAT_INTERVAL_SECS`       | `30`              |
    /// | `PRESENCE_STALE_THRESHOLD_SECS` | `120`             |
    /// | `STORE_OP_TIMEOUT_MS`           | `5000`            |
    /// | `METRICS_SAMPLE_INTERVAL_SECS`  | `60` (`0` = off)  |
    /// | `PRESENCE_SWEEP_INTERVAL_SECS`  | `0` (off)         |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let text = |name: &str, default: &str| -> String {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |name: &str, default: u64| -> Result<u64, CoreError> {
            match lookup(name).map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => parse_var(name, &v),
                _ => Ok(default),
            }
        };
        let optional_interval = |name: &str, default: u64| -> Result<Option<Duration>, CoreError> {
            let secs = number(name, default)?;
            Ok((secs > 0).then(|| Duration::from_secs(secs)))
        };

        let config = Self {
            store_url: text("STORE_URL", "memory://"),
            namespace: text("STORE_NAMESPACE", "concord"),
            broker_url: lookup("BROKER_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            topic_prefix: text("BROKER_TOPIC_PREFIX", "resource.events"),
            lock_ttl: LockTtlPolicy {
                default: Duration::from_secs(number(
                    "LOCK_TTL_DEFAULT_SECS",
                    DEFAULT_LOCK_TTL_SECS,
                )?),
                min: Duration::from_millis(number("LOCK_TTL_MIN_MS", MIN_LOCK_TTL_MS)?),
                max: Duration::from_secs(number("LOCK_TTL_MAX_SECS", MAX_LOCK_TTL_SECS)?),
            },
            heartbeat_interval: Duration::from_secs(number(
                "HEARTBEAT_INTERVAL_SECS",
                HEARTBEAT_INTERVAL_SECS,
            )?),
            presence_stale_threshold: Duration::from_secs(number(
                "PRESENCE_STALE_THRESHOLD_SECS",
                PRESENCE_STALE_THRESHOLD_SECS,
            )?),
            op_timeout: Duration::from_millis(number(
                "STORE_OP_TIMEOUT_MS",
                DEFAULT_OP_TIMEOUT_MS,
            )?),
            metrics_sample_interval: optional_interval(
                "METRICS_SAMPLE_INTERVAL_SECS",
                DEFAULT_METRICS_SAMPLE_INTERVAL_SECS,
            )?,
            presence_sweep_interval: optional_interval("PRESENCE_SWEEP_INTERVAL_SECS", 0)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_identifier("STORE_NAMESPACE", &self.namespace).map_err(CoreError::Validation)?;
        self.lock_ttl.validate().map_err(CoreError::Validation)?;

        if self.heartbeat_interval.is_zero() {
            return Err(CoreError::Validation(
                "HEARTBEAT_INTERVAL_SECS must be greater than zero".into(),
            ));
        }
        if self.presence_stale_threshold <= self.heartbeat_interval {
            return Err(CoreError::Validation(format!(
                "PRESENCE_STALE_THRESHOLD_SECS ({}s) must exceed HEARTBEAT_INTERVAL_SECS ({}s)",
                self.presence_stale_threshold.as_secs(),
                self.heartbeat_interval.as_secs()
            )));
        }
        if self.op_timeout.is_zero() {
            return Err(CoreError::Validation(
                "STORE_OP_TIMEOUT_MS must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T, CoreError> {
    value.parse().map_err(|_| {
        CoreError::Validation(format!(
            "{name} must be a non-negative integer, got '{value}'"
        ))
    })
}
