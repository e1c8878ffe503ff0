//! Configuration for the resource directory.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $RD_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/coap-rd/config.toml
//!   3. ~/.config/coap-rd/config.toml

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::params;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RdConfig {
    pub network: NetworkConfig,
    pub registry: RegistryConfig,
    pub probe: ProbeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the CoAP socket binds to. `::` accepts IPv4 too.
    pub bind_addr: IpAddr,
    /// UDP port for CoAP. 0 = OS-assigned.
    pub coap_port: u16,
    /// TCP port for the local admin API (always bound to loopback).
    pub api_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Domain given to endpoints that register without `d`.
    pub default_domain: String,
    /// Lifetime in seconds for registrations without `lt`.
    pub default_lifetime: u32,
    /// How often expired endpoints are swept.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound on one discovery probe, retransmissions included.
    pub timeout_secs: u64,
    pub ack_timeout_ms: u64,
    pub max_retransmit: u32,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::from([0u16; 8]),
            coap_port: crate::coap::DEFAULT_PORT,
            api_port: 9001,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_domain: "local".to_string(),
            default_lifetime: params::DEFAULT_LIFETIME,
            sweep_interval_secs: 5,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: crate::coap::EXCHANGE_LIFETIME_SECS,
            ack_timeout_ms: crate::coap::ACK_TIMEOUT_MS,
            max_retransmit: crate::coap::MAX_RETRANSMIT,
        }
    }
}

impl RegistryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("coap-rd")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl RdConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?
        } else {
            RdConfig::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("RD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&RdConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply RD_* overrides. `lookup` is `std::env::var` outside of tests.
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("RD_NETWORK__BIND_ADDR").and_then(|v| v.parse().ok()) {
            self.network.bind_addr = v;
        }
        if let Some(v) = lookup("RD_NETWORK__COAP_PORT").and_then(|v| v.parse().ok()) {
            self.network.coap_port = v;
        }
        if let Some(v) = lookup("RD_NETWORK__API_PORT").and_then(|v| v.parse().ok()) {
            self.network.api_port = v;
        }
        if let Some(v) = lookup("RD_REGISTRY__DEFAULT_DOMAIN") {
            self.registry.default_domain = v;
        }
        if let Some(v) = lookup("RD_REGISTRY__DEFAULT_LIFETIME").and_then(|v| v.parse().ok()) {
            self.registry.default_lifetime = v;
        }
        if let Some(v) = lookup("RD_REGISTRY__SWEEP_INTERVAL_SECS").and_then(|v| v.parse().ok()) {
            self.registry.sweep_interval_secs = v;
        }
        if let Some(v) = lookup("RD_PROBE__TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.probe.timeout_secs = v;
        }
        if let Some(v) = lookup("RD_PROBE__ACK_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.probe.ack_timeout_ms = v;
        }
        if let Some(v) = lookup("RD_PROBE__MAX_RETRANSMIT").and_then(|v| v.parse().ok()) {
            self.probe.max_retransmit = v;
        }
    }

    /// Defaults are subject to the same bounds as registration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !params::validate_name(&self.registry.default_domain) {
            return Err(ConfigError::Invalid {
                key: "registry.default_domain",
                reason: format!("must be 1 to {} characters", params::MAX_NAME_LEN),
            });
        }
        if !params::validate_lifetime(u64::from(self.registry.default_lifetime)) {
            return Err(ConfigError::Invalid {
                key: "registry.default_lifetime",
                reason: format!("must be at least {}", params::MIN_LIFETIME),
            });
        }
        Ok(())
    }
}
