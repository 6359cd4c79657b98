//! Configuration module
//!
//! Loaded from a TOML file, with `.env` and environment overrides for the
//! endpoint, program id and keypair path. Every field has a default, so an
//! empty file is a valid mainnet configuration.

use crate::constants::{DEFAULT_PROGRAM_ID, DEFAULT_START_PRICE, MAX_MESSAGE_LEN};
use crate::program::{ClaimPolicy, ProgramConfig};
use crate::reconciler::ReconcilerConfig;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rpc: RpcConfig,
    pub program: ProgramSettings,
    pub reconciler: ReconcilerSettings,
    pub submission: SubmissionSettings,
    pub wallet: WalletConfig,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub url: String,
    pub ws_url: String,
    /// `processed`, `confirmed` or `finalized`
    pub commitment: String,
    pub timeout_secs: u64,
    /// Client-side request budget
    pub rate_limit_rps: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramSettings {
    pub program_id: String,
    pub start_price_lamports: u64,
    /// Re-open bidding after a claim instead of freezing the round
    pub rearm_after_claim: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcilerSettings {
    pub poll_interval_secs: u64,
    pub history_ttl_secs: u64,
    pub history_fetch_limit: usize,
    pub history_window: usize,
    pub rate_limit_cooldown_secs: u64,
    pub max_consecutive_failures: u32,
    pub enable_push: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionSettings {
    pub confirm_poll_interval_ms: u64,
    pub max_message_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    pub keypair_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub enable_metrics: bool,
    pub json_logs: bool,
}

// Default value functions
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_ws_url() -> String { "wss://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_rpc_timeout() -> u64 { 30 }
fn default_rate_limit() -> u32 { 10 }
fn default_poll_interval() -> u64 { 600 }
fn default_history_ttl() -> u64 { 10 }
fn default_history_fetch_limit() -> usize { 5 }
fn default_history_window() -> usize { 5 }
fn default_cooldown() -> u64 { 15 }
fn default_max_failures() -> u32 { 5 }
fn default_confirm_poll_interval() -> u64 { 500 }
fn default_keypair_path() -> String { "~/.config/solana/id.json".to_string() }
fn default_true() -> bool { true }

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_rpc_url(),
            ws_url: default_ws_url(),
            commitment: default_commitment(),
            timeout_secs: default_rpc_timeout(),
            rate_limit_rps: default_rate_limit(),
        }
    }
}

impl Default for ProgramSettings {
    fn default() -> Self {
        Self {
            program_id: DEFAULT_PROGRAM_ID.to_string(),
            start_price_lamports: DEFAULT_START_PRICE,
            rearm_after_claim: false,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            history_ttl_secs: default_history_ttl(),
            history_fetch_limit: default_history_fetch_limit(),
            history_window: default_history_window(),
            rate_limit_cooldown_secs: default_cooldown(),
            max_consecutive_failures: default_max_failures(),
            enable_push: default_true(),
        }
    }
}

impl Default for SubmissionSettings {
    fn default() -> Self {
        Self {
            confirm_poll_interval_ms: default_confirm_poll_interval(),
            max_message_len: MAX_MESSAGE_LEN,
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            keypair_path: default_keypair_path(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: default_true(),
            json_logs: false,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `.env`, then the file if it exists, then environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let path = path.as_ref();
        let mut config = if path.exists() {
            toml::from_str(&std::fs::read_to_string(path)?)?
        } else {
            tracing::info!(path = %path.display(), "Config file not found, using defaults");
            Config::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply `THRONE_*` overrides from `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("THRONE_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(ws_url) = lookup("THRONE_WS_URL") {
            self.rpc.ws_url = ws_url;
        }
        if let Some(program_id) = lookup("THRONE_PROGRAM_ID") {
            self.program.program_id = program_id;
        }
        if let Some(keypair) = lookup("THRONE_KEYPAIR") {
            self.wallet.keypair_path = keypair;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc.url.starts_with("http://") || self.rpc.url.starts_with("https://")) {
            return Err(ConfigError::invalid("rpc.url", "must be an http(s) URL"));
        }
        if !(self.rpc.ws_url.starts_with("ws://") || self.rpc.ws_url.starts_with("wss://")) {
            return Err(ConfigError::invalid("rpc.ws_url", "must be a ws(s) URL"));
        }
        self.commitment()?;
        self.program_id()?;
        if self.rpc.timeout_secs == 0 {
            return Err(ConfigError::invalid("rpc.timeout_secs", "must be positive"));
        }
        if self.rpc.rate_limit_rps == 0 {
            return Err(ConfigError::invalid("rpc.rate_limit_rps", "must be positive"));
        }
        if self.program.start_price_lamports == 0 {
            return Err(ConfigError::invalid("program.start_price_lamports", "must be positive"));
        }
        if self.reconciler.poll_interval_secs == 0 {
            return Err(ConfigError::invalid("reconciler.poll_interval_secs", "must be positive"));
        }
        if self.reconciler.history_window == 0 || self.reconciler.history_fetch_limit == 0 {
            return Err(ConfigError::invalid(
                "reconciler.history_window",
                "window and fetch limit must be positive",
            ));
        }
        if self.submission.confirm_poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "submission.confirm_poll_interval_ms",
                "must be positive",
            ));
        }
        if self.submission.max_message_len == 0 || self.submission.max_message_len > MAX_MESSAGE_LEN {
            return Err(ConfigError::invalid(
                "submission.max_message_len",
                format!("must be between 1 and {}", MAX_MESSAGE_LEN),
            ));
        }
        Ok(())
    }

    pub fn program_id(&self) -> Result<Pubkey, ConfigError> {
        Pubkey::from_str(&self.program.program_id)
            .map_err(|e| ConfigError::invalid("program.program_id", e.to_string()))
    }

    pub fn commitment(&self) -> Result<CommitmentConfig, ConfigError> {
        CommitmentConfig::from_str(&self.rpc.commitment)
            .map_err(|e| ConfigError::invalid("rpc.commitment", e.to_string()))
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn program_config(&self) -> ProgramConfig {
        ProgramConfig {
            claim_policy: if self.program.rearm_after_claim {
                ClaimPolicy::Rearm {
                    start_price: self.program.start_price_lamports,
                }
            } else {
                ClaimPolicy::Freeze
            },
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        let r = &self.reconciler;
        ReconcilerConfig {
            poll_interval: Duration::from_secs(r.poll_interval_secs),
            history_ttl: Duration::from_secs(r.history_ttl_secs),
            history_fetch_limit: r.history_fetch_limit,
            history_window: r.history_window,
            rate_limit_cooldown: Duration::from_secs(r.rate_limit_cooldown_secs),
            max_consecutive_failures: r.max_consecutive_failures,
        }
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.submission.confirm_poll_interval_ms)
    }

    /// Keypair path with a leading `~` expanded from `HOME`
    pub fn keypair_path(&self) -> String {
        match self.wallet.keypair_path.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => format!("{}/{}", home.trim_end_matches('/'), rest),
                Err(_) => self.wallet.keypair_path.clone(),
            },
            None => self.wallet.keypair_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.reconciler.poll_interval_secs, 600);
        assert_eq!(config.reconciler.history_ttl_secs, 10);
        assert_eq!(config.reconciler.history_window, 5);
        assert_eq!(config.reconciler.rate_limit_cooldown_secs, 15);
        assert_eq!(config.program_id().unwrap().to_string(), DEFAULT_PROGRAM_ID);
        assert_eq!(config.program_config().claim_policy, ClaimPolicy::Freeze);
    }

    #[test]
    fn test_from_file_partial_sections() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[rpc]
url = "http://127.0.0.1:8899"
ws_url = "ws://127.0.0.1:8900"
commitment = "processed"

[program]
rearm_after_claim = true
start_price_lamports = 5000

[reconciler]
poll_interval_secs = 30
"#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.rpc.url, "http://127.0.0.1:8899");
        assert_eq!(config.commitment().unwrap(), CommitmentConfig::processed());
        assert_eq!(
            config.program_config().claim_policy,
            ClaimPolicy::Rearm { start_price: 5000 }
        );

        let reconciler = config.reconciler_config();
        assert_eq!(reconciler.poll_interval, Duration::from_secs(30));
        assert_eq!(reconciler.history_ttl, Duration::from_secs(10));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(matches!(
            Config::from_toml("[rpc]\nurl = \"ftp://nope\""),
            Err(ConfigError::Invalid { field: "rpc.url", .. })
        ));
        assert!(matches!(
            Config::from_toml("[program]\nprogram_id = \"not-a-key\""),
            Err(ConfigError::Invalid { field: "program.program_id", .. })
        ));
        assert!(matches!(
            Config::from_toml("[submission]\nmax_message_len = 64"),
            Err(ConfigError::Invalid { field: "submission.max_message_len", .. })
        ));
        assert!(matches!(
            Config::from_toml("[rpc]\ncommitment = \"eventually\""),
            Err(ConfigError::Invalid { field: "rpc.commitment", .. })
        ));
        assert!(matches!(Config::from_toml("[rpc"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "THRONE_RPC_URL" => Some("http://localhost:8899".to_string()),
            "THRONE_KEYPAIR" => Some("/tmp/id.json".to_string()),
            _ => None,
        });
        assert_eq!(config.rpc.url, "http://localhost:8899");
        assert_eq!(config.rpc.ws_url, default_ws_url());
        assert_eq!(config.keypair_path(), "/tmp/id.json");
        assert!(config.validate().is_ok());
    }
}
