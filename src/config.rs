//! Configuration management for txinclude
//!
//! Loads configuration from TOML files with environment variable substitution.

use alloy::primitives::utils::{parse_ether, parse_units};
use alloy::primitives::{Address, Bytes, U256};
use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub include: IncludeConfig,
    pub rpc: RpcConfig,
    pub wallet: WalletConfig,
    pub metrics: MetricsConfig,
    pub transaction: TransactionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncludeConfig {
    pub block_time_ms: u64,
    /// Spending cap in ether, e.g. "0.5"
    pub budget_eth: String,
    #[serde(default)]
    pub op_stack_cost_oracle: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    pub url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionConfig {
    pub to: Address,
    #[serde(default)]
    pub value_eth: Option<String>,
    #[serde(default)]
    pub data: Bytes,
    pub gas_limit: u64,
    pub max_fee_per_gas_gwei: String,
    pub max_priority_fee_per_gas_gwei: String,
}

impl IncludeConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn budget(&self) -> Result<U256> {
        parse_ether(&self.budget_eth)
            .with_context(|| format!("Invalid budget: {}", self.budget_eth))
    }
}

impl RpcConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl TransactionConfig {
    pub fn value(&self) -> Result<U256> {
        match &self.value_eth {
            Some(v) => parse_ether(v).with_context(|| format!("Invalid value: {}", v)),
            None => Ok(U256::ZERO),
        }
    }

    pub fn max_fee_per_gas(&self) -> Result<u128> {
        gwei(&self.max_fee_per_gas_gwei)
    }

    pub fn max_priority_fee_per_gas(&self) -> Result<u128> {
        gwei(&self.max_priority_fee_per_gas_gwei)
    }
}

fn gwei(amount: &str) -> Result<u128> {
    let wei = parse_units(amount, "gwei")
        .with_context(|| format!("Invalid gwei amount: {}", amount))?
        .get_absolute();
    u128::try_from(wei).with_context(|| format!("Fee too large: {} gwei", amount))
}

impl Settings {
    /// Load settings from `TXINCLUDE_CONFIG`, or `config/default.toml`
    pub fn load() -> Result<Self> {
        let config_path = env::var("TXINCLUDE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings = toml::from_str(&config_str)
            .with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.include.block_time_ms == 0 {
            anyhow::bail!("Block time must be positive");
        }
        self.include.budget()?;

        if self.rpc.url.is_empty() {
            anyhow::bail!("No RPC URL configured");
        }
        if self.rpc.request_timeout_ms == 0 {
            anyhow::bail!("Request timeout must be positive");
        }
        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("No private key environment variable configured");
        }

        let tx = &self.transaction;
        tx.value()?;
        if tx.max_priority_fee_per_gas()? > tx.max_fee_per_gas()? {
            anyhow::bail!("Priority fee cap exceeds fee cap");
        }
        if tx.gas_limit == 0 {
            tracing::warn!("Transaction gas limit is zero - the node will reject it");
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR
        .replace_all(input, |cap: &Captures| env::var(&cap[1]).unwrap_or_default())
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CONFIG: &str = r#"
[include]
block_time_ms = 2000
budget_eth = "${TXINCLUDE_TEST_BUDGET}"
op_stack_cost_oracle = true

[rpc]
url = "http://localhost:8545"
request_timeout_ms = 5000

[wallet]
private_key_env = "TXINCLUDE_PRIVATE_KEY"

[metrics]
enabled = false
port = 9090

[transaction]
to = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8"
value_eth = "0.01"
data = "0xdeadbeef"
gas_limit = 21000
max_fee_per_gas_gwei = "1.5"
max_priority_fee_per_gas_gwei = "1"
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        env::set_var("TXINCLUDE_TEST_BUDGET", "0.5");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.include.block_time(), Duration::from_secs(2));
        assert_eq!(
            settings.include.budget().unwrap(),
            U256::from(500_000_000_000_000_000u64)
        );
        assert!(settings.include.op_stack_cost_oracle);
        assert_eq!(settings.rpc.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.transaction.max_fee_per_gas().unwrap(), 1_500_000_000);
        assert_eq!(settings.transaction.data.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            settings.transaction.value().unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
    }

    fn load_err(config: &str) -> String {
        let config = config.replace("${TXINCLUDE_TEST_BUDGET}", "1");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.as_bytes()).unwrap();
        Settings::load_from(file.path()).unwrap_err().to_string()
    }

    #[test]
    fn test_rejects_inverted_fee_caps() {
        let config = CONFIG.replace(
            "max_priority_fee_per_gas_gwei = \"1\"",
            "max_priority_fee_per_gas_gwei = \"2\"",
        );
        assert!(load_err(&config).contains("Priority fee cap"));
    }

    #[test]
    fn test_rejects_zero_request_timeout() {
        let config = CONFIG.replace("request_timeout_ms = 5000", "request_timeout_ms = 0");
        assert!(load_err(&config).contains("Request timeout"));
    }
}
