//! Configuration management for the Meridian Router
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use crate::confirmation::RouterRole;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub router: RouterConfig,
    pub metrics: MetricsConfig,
    pub ledgers: HashMap<String, LedgerConfig>,
    #[serde(default)]
    pub reservations: ReservationConfig,
    #[serde(default)]
    pub swaps: SwapConfig,
    #[serde(default)]
    pub confirmations: ConfirmationConfig,
    #[serde(default)]
    pub authority: AuthorityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Unique identifier of this router instance
    pub router_id: String,
    /// Which confirmation slot this router fills for dual confirmation
    pub role: RouterRole,
    /// Hex-encoded key for signing confirmation records
    pub signing_key: String,
    /// How often this router refreshes its own liveness heartbeat
    pub heartbeat_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    pub ledger_id: String,
    pub name: String,
    /// Adapter kind; only "memory" ships with the core
    pub kind: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReservationConfig {
    /// Age after which the sweep releases an abandoned reservation
    pub timeout_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ReservationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    pub default_timeout_minutes: i64,
    /// Periodic deadline check cadence
    pub liveness_check_secs: u64,
    /// Seconds per block, used when a request carries a block-count hint
    pub block_time_secs: i64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            default_timeout_minutes: 60,
            liveness_check_secs: 30,
            block_time_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfirmationConfig {
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub shutdown_grace_secs: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            batch_size: 5,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            shutdown_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// A primary is considered live if its heartbeat is younger than this
    pub liveness_window_secs: i64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: 30,
        }
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("MERIDIAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from_path(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from_path(config_path: &std::path::Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load settings for a specific environment
    pub fn load_env(env_name: &str) -> Result<Self> {
        let config_path = PathBuf::from(format!("config/{}.toml", env_name));
        env::set_var("MERIDIAN_CONFIG", config_path.to_str().unwrap());
        Self::load()
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.router.router_id.is_empty() {
            anyhow::bail!("router_id must not be empty");
        }

        if hex::decode(&self.router.signing_key).is_err() {
            anyhow::bail!("signing_key must be hex-encoded");
        }

        // At least one ledger must be enabled
        if self.enabled_ledgers().is_empty() {
            anyhow::bail!("At least one ledger must be enabled");
        }

        for (name, ledger) in &self.ledgers {
            if ledger.enabled && ledger.kind != "memory" {
                anyhow::bail!("Ledger {} has unsupported adapter kind {}", name, ledger.kind);
            }
        }

        Ok(())
    }

    /// Get list of enabled ledgers
    pub fn enabled_ledgers(&self) -> Vec<(&String, &LedgerConfig)> {
        self.ledgers.iter().filter(|(_, l)| l.enabled).collect()
    }

    /// Get ledger config by ledger ID
    pub fn get_ledger(&self, ledger_id: &str) -> Option<&LedgerConfig> {
        self.ledgers.values().find(|l| l.ledger_id == ledger_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[router]
router_id = "router-a"
role = "first"
signing_key = "deadbeef"
heartbeat_interval_secs = 10

[metrics]
enabled = false
port = 9090

[ledgers.l1]
ledger_id = "l1"
name = "Ledger One"
kind = "memory"
enabled = true
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(file.path()).unwrap();

        assert_eq!(settings.router.router_id, "router-a");
        assert_eq!(settings.router.role, RouterRole::First);
        assert_eq!(settings.enabled_ledgers().len(), 1);
        // Defaults apply for omitted sections
        assert_eq!(settings.reservations.timeout_secs, 300);
        assert_eq!(settings.confirmations.max_concurrent, 10);
        assert_eq!(settings.authority.liveness_window_secs, 30);
    }

    #[test]
    fn test_rejects_bad_signing_key() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[router]
router_id = "router-a"
role = "second"
signing_key = "not-hex"
heartbeat_interval_secs = 10

[metrics]
enabled = false
port = 9090

[ledgers.l1]
ledger_id = "l1"
name = "Ledger One"
kind = "memory"
enabled = true
"#
        )
        .unwrap();

        let result = Settings::load_from_path(file.path());
        assert!(result.is_err());
    }
}
