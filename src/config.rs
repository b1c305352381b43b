use std::path::PathBuf;
use std::time::Duration;

use crate::engine::OverlapRule;

/// Server settings, read once from `AGENTCAL_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub data_dir: PathBuf,
    pub password: String,
    /// Login name that acts as admin.
    pub service_user: String,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub slot_overlap: OverlapRule,
    pub max_subscriptions: usize,
    pub subscription_idle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            data_dir: PathBuf::from("./data"),
            password: "agentcal".into(),
            service_user: "agentcal".into(),
            max_connections: 256,
            compact_threshold: 1000,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            slot_overlap: OverlapRule::Interval,
            max_subscriptions: 1024,
            subscription_idle: Duration::from_secs(900),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |name: &'static str| lookup(&format!("AGENTCAL_{name}"));

        Ok(Self {
            port: parse_or(var("PORT"), "AGENTCAL_PORT", defaults.port)?,
            bind: var("BIND").unwrap_or(defaults.bind),
            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            password: var("PASSWORD").unwrap_or(defaults.password),
            service_user: var("SERVICE_USER").unwrap_or(defaults.service_user),
            max_connections: parse_or(
                var("MAX_CONNECTIONS"),
                "AGENTCAL_MAX_CONNECTIONS",
                defaults.max_connections,
            )?,
            compact_threshold: parse_or(
                var("COMPACT_THRESHOLD"),
                "AGENTCAL_COMPACT_THRESHOLD",
                defaults.compact_threshold,
            )?,
            metrics_port: var("METRICS_PORT")
                .map(|v| parse_value(&v, "AGENTCAL_METRICS_PORT"))
                .transpose()?,
            tls_cert: var("TLS_CERT").map(PathBuf::from),
            tls_key: var("TLS_KEY").map(PathBuf::from),
            slot_overlap: match var("SLOT_OVERLAP") {
                Some(v) => v.parse().map_err(|reason| ConfigError::Invalid {
                    key: "AGENTCAL_SLOT_OVERLAP",
                    value: v.clone(),
                    reason,
                })?,
                None => defaults.slot_overlap,
            },
            max_subscriptions: parse_or(
                var("MAX_SUBSCRIPTIONS"),
                "AGENTCAL_MAX_SUBSCRIPTIONS",
                defaults.max_subscriptions,
            )?,
            subscription_idle: match var("SUBSCRIPTION_IDLE_SECS") {
                Some(v) => Duration::from_secs(parse_value(&v, "AGENTCAL_SUBSCRIPTION_IDLE_SECS")?),
                None => defaults.subscription_idle,
            },
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("agentcal.wal")
    }
}

fn parse_value<T>(value: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.map_or(Ok(default), |v| parse_value(&v, key))
}

#[derive(Debug)]
pub enum ConfigError {
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value, reason } => {
                write!(f, "invalid {key}={value:?}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
