//! Reconciler configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use typhoon_types::EvmAddress;

use crate::logging::LogFormat;
use crate::ConfigError;

/// Configuration for the reconciliation engine and its daemon.
///
/// Can be loaded from a TOML file via [`ReconcilerConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReconcilerConfig {
    /// Node endpoint. `ws://`/`wss://` enables the socket transport with HTTP
    /// fallback.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// HTTP endpoint used when the socket is unavailable. Derived from
    /// `rpc_url` when unset.
    #[serde(default)]
    pub http_fallback_url: Option<String>,

    /// Address of the Typhoon contract whose events are mirrored.
    #[serde(default)]
    pub contract_address: Option<String>,

    /// ERC-20 the contract is paid in; its `decimals()` is read at startup.
    #[serde(default)]
    pub payment_token_address: Option<String>,

    /// Explicit decimal count, skipping the `decimals()` call.
    #[serde(default)]
    pub token_decimals: Option<u8>,

    /// First chain block to scan on a fresh mirror.
    #[serde(default)]
    pub start_block: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Widest `eth_getLogs` range requested in one cycle.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,

    /// Blocks behind head treated as not yet final.
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,

    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Capacity of the in-memory recently-applied set.
    #[serde(default = "default_guard_capacity")]
    pub guard_capacity: usize,

    /// Lag above which `/health` reports unhealthy.
    #[serde(default = "default_max_lag_blocks")]
    pub max_lag_blocks: u64,

    /// Data directory for the mirror store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Port of the control and read API.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter, e.g. "info" or "info,typhoon_reconciler=debug".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Start the reconciliation loop as soon as the daemon is up.
    #[serde(default = "default_true")]
    pub autostart: bool,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_block_range() -> u64 {
    2_000
}

fn default_confirmations() -> u64 {
    3
}

fn default_rpc_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_initial_ms() -> u64 {
    1_000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_guard_capacity() -> usize {
    10_000
}

fn default_max_lag_blocks() -> u64 {
    100
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./typhoon_data")
}

fn default_api_port() -> u16 {
    7300
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

// ── Impl ───────────────────────────────────────────────────────────────

impl ReconcilerConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(format!("{path}: {e}")))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn contract(&self) -> Result<EvmAddress, ConfigError> {
        let raw = self
            .contract_address
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingContract)?;
        EvmAddress::parse(raw).map_err(|_| ConfigError::InvalidAddress {
            field: "contract_address",
            value: raw.to_string(),
        })
    }

    pub fn payment_token(&self) -> Result<Option<EvmAddress>, ConfigError> {
        match self.payment_token_address.as_deref() {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => EvmAddress::parse(raw)
                .map(Some)
                .map_err(|_| ConfigError::InvalidAddress {
                    field: "payment_token_address",
                    value: raw.to_string(),
                }),
        }
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse()
    }

    /// Check everything that can be checked without the node or the store.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.contract()?;
        let token = self.payment_token()?;
        if self.token_decimals.is_none() && token.is_none() {
            return Err(ConfigError::MissingDecimals);
        }
        for (field, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("max_block_range", self.max_block_range),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("backoff_initial_ms", self.backoff_initial_ms),
            ("backoff_max_ms", self.backoff_max_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        if self.backoff_initial_ms > self.backoff_max_ms {
            return Err(ConfigError::BackoffOrder {
                initial: self.backoff_initial_ms,
                max: self.backoff_max_ms,
            });
        }
        self.log_format()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            http_fallback_url: None,
            contract_address: None,
            payment_token_address: None,
            token_decimals: None,
            start_block: 0,
            poll_interval_ms: default_poll_interval_ms(),
            max_block_range: default_max_block_range(),
            confirmations: default_confirmations(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            guard_capacity: default_guard_capacity(),
            max_lag_blocks: default_max_lag_blocks(),
            data_dir: default_data_dir(),
            api_port: default_api_port(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            autostart: default_true(),
        }
    }
}
