//! Configuration loading and validation

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::consolidation::chain::ConversionDirection;
use crate::consolidation::engine::ConsolidationSettings;
use crate::consolidation::plan::NATIVE_TOKEN;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub wallet: WalletConfig,
    #[serde(default)]
    pub send: SendConfig,
    #[serde(default)]
    pub ocean: OceanConfig,
    #[serde(default)]
    pub wallet_api: WalletApiConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// DeFiChain network the wallet lives on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Regtest,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Address whose funds are consolidated
    pub address: String,
    #[serde(default)]
    pub network: Network,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendConfig {
    /// Destination of consolidated funds; sending is off while unset
    #[serde(default)]
    pub to_address: Option<String>,

    /// Minimum consolidated amount worth sending
    #[serde(default = "default_threshold")]
    pub threshold: Decimal,

    /// Token symbol of the native currency
    #[serde(default = "default_token_symbol")]
    pub token_symbol: String,

    /// Direction of the token conversion step
    #[serde(default)]
    pub conversion_direction: ConversionDirection,

    /// Spend the conversion's unconfirmed output explicitly in the transfer
    #[serde(default = "default_true")]
    pub chain_prevouts: bool,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            to_address: None,
            threshold: default_threshold(),
            token_symbol: default_token_symbol(),
            conversion_direction: ConversionDirection::default(),
            chain_prevouts: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OceanConfig {
    #[serde(default = "default_ocean_url")]
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// How long to wait for the transfer to confirm
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_confirmation_poll_secs")]
    pub confirmation_poll_secs: u64,
}

impl Default for OceanConfig {
    fn default() -> Self {
        Self {
            url: default_ocean_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            confirmation_poll_secs: default_confirmation_poll_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletApiConfig {
    #[serde(default = "default_wallet_api_url")]
    pub url: String,
    /// Signing key; without it chains are handed off for external signing
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for WalletApiConfig {
    fn default() -> Self {
        Self {
            url: default_wallet_api_url(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

impl TelegramConfig {
    /// Telegram needs both a bot token and a chat
    pub fn is_enabled(&self) -> bool {
        matches!((&self.token, &self.chat_id), (Some(t), Some(c)) if !t.is_empty() && !c.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub run_safety_check: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            run_safety_check: true,
        }
    }
}

// Default value functions
fn default_threshold() -> Decimal {
    dec!(1)
}

fn default_token_symbol() -> String {
    NATIVE_TOKEN.to_string()
}

fn default_ocean_url() -> String {
    std::env::var("OCEAN_URL").unwrap_or_else(|_| "https://ocean.defichain.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    3
}

fn default_confirmation_timeout_secs() -> u64 {
    600
}

fn default_confirmation_poll_secs() -> u64 {
    10
}

fn default_wallet_api_url() -> String {
    "http://127.0.0.1:8735".to_string()
}

fn default_interval_secs() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("wallet.network", "mainnet")?
            .set_default("ocean.url", default_ocean_url())?
            .set_default("ocean.timeout_ms", default_timeout_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix CONSOLIDATOR_)
            .add_source(
                config::Environment::with_prefix("CONSOLIDATOR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.wallet.address.trim().is_empty() {
            anyhow::bail!("wallet.address must be set");
        }

        if self.send.threshold <= Decimal::ZERO {
            anyhow::bail!("send.threshold must be positive");
        }

        if self.send.token_symbol.trim().is_empty() {
            anyhow::bail!("send.token_symbol must not be empty");
        }

        if self.schedule.interval_secs == 0 {
            anyhow::bail!("schedule.interval_secs must be positive");
        }

        if self.ocean.confirmation_poll_secs == 0 {
            anyhow::bail!("ocean.confirmation_poll_secs must be positive");
        }

        if self.ocean.confirmation_poll_secs > self.ocean.confirmation_timeout_secs {
            anyhow::bail!(
                "ocean.confirmation_poll_secs ({}) exceeds confirmation_timeout_secs ({})",
                self.ocean.confirmation_poll_secs,
                self.ocean.confirmation_timeout_secs
            );
        }

        if self.destination().is_none() {
            tracing::warn!("send.to_address is not set - consolidation cycles will do nothing");
        }

        Ok(())
    }

    /// Configured destination, treating an empty string as unset
    pub fn destination(&self) -> Option<&str> {
        self.send
            .to_address
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
    }

    /// Immutable settings for the consolidation engine
    pub fn consolidation_settings(&self) -> ConsolidationSettings {
        ConsolidationSettings {
            wallet_address: self.wallet.address.trim().to_string(),
            destination: self.destination().map(str::to_string),
            threshold: self.send.threshold,
            token_symbol: self.send.token_symbol.clone(),
            conversion_direction: self.send.conversion_direction,
            chain_prevouts: self.send.chain_prevouts,
        }
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Wallet:
    address: {}
    network: {}
  Send:
    to_address: {}
    threshold: {} {}
    conversion: {}
    chain_prevouts: {}
  Ocean:
    url: {}
    timeout: {}ms
    confirmation_timeout: {}s
  Wallet API:
    url: {}
    api_key: {}
  Telegram:
    token: {}
    chat_id: {}
  Schedule:
    interval: {}s
    safety_check: {}
"#,
            self.wallet.address,
            self.wallet.network,
            self.destination().unwrap_or("(not set)"),
            self.send.threshold,
            self.send.token_symbol,
            self.send.conversion_direction,
            self.send.chain_prevouts,
            mask_url(&self.ocean.url),
            self.ocean.timeout_ms,
            self.ocean.confirmation_timeout_secs,
            mask_url(&self.wallet_api.url),
            mask_secret(self.wallet_api.api_key.as_deref()),
            mask_secret(self.telegram.token.as_deref()),
            self.telegram.chat_id.as_deref().unwrap_or("(not set)"),
            self.schedule.interval_secs,
            self.schedule.run_safety_check,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

fn mask_secret(secret: Option<&str>) -> &'static str {
    match secret {
        Some(s) if !s.is_empty() => "***",
        _ => "(not set)",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let file = write_config(
            r#"
[wallet]
address = "df1qwallet"
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.wallet.network, Network::Mainnet);
        assert_eq!(config.send.threshold, dec!(1));
        assert_eq!(config.send.token_symbol, "DFI");
        assert!(config.send.chain_prevouts);
        assert!(config.destination().is_none());
        assert!(!config.telegram.is_enabled());
        assert_eq!(config.schedule.interval_secs, 600);
    }

    #[test]
    fn test_load_full_send_section() {
        let file = write_config(
            r#"
[wallet]
address = "tf1qwallet"
network = "testnet"

[send]
to_address = "tf1qdest"
threshold = "2.5"
conversion_direction = "reserve_to_account"
chain_prevouts = false

[telegram]
token = "123:abc"
chat_id = "-10042"
"#,
        );

        let config = Config::load(file.path()).unwrap();
        let settings = config.consolidation_settings();
        assert_eq!(settings.destination.as_deref(), Some("tf1qdest"));
        assert_eq!(settings.threshold, dec!(2.5));
        assert_eq!(
            settings.conversion_direction,
            ConversionDirection::ReserveToAccount
        );
        assert!(!settings.chain_prevouts);
        assert!(config.telegram.is_enabled());
    }

    #[test]
    fn test_empty_destination_is_unset() {
        let file = write_config(
            r#"
[wallet]
address = "df1qwallet"

[send]
to_address = "  "
"#,
        );

        let config = Config::load(file.path()).unwrap();
        assert!(config.consolidation_settings().destination.is_none());
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        let file = write_config(
            r#"
[wallet]
address = "df1qwallet"

[send]
threshold = "0"
"#,
        );

        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_masked_display_hides_secrets() {
        let file = write_config(
            r#"
[wallet]
address = "df1qwallet"

[wallet_api]
api_key = "super-secret"

[telegram]
token = "123:abc"
chat_id = "-10042"
"#,
        );

        let config = Config::load(file.path()).unwrap();
        let display = config.masked_display();
        assert!(!display.contains("super-secret"));
        assert!(!display.contains("123:abc"));
        assert!(display.contains("-10042"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://ocean.example.com?key=secret"),
            "https://ocean.example.com?***"
        );
        assert_eq!(
            mask_url("https://ocean.example.com"),
            "https://ocean.example.com"
        );
    }
}
