//! Configuration file handling.
//!
//! The configuration lives in `~/.web3-state/config.json`. Secrets are never
//! written to it: the local wallet section only names the environment
//! variables that hold them.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::ChainId;
use crate::chains::{evm, flow, solana};
use crate::connector::LocalWalletConnector;
use crate::error::{ConfigError, ConfigResult, ConnectorResult};
use crate::family::{Capabilities, ChainFamily};

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "WEB3_STATE_CONFIG";

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Directory of the persisted provider state.
    pub storage_dir: PathBuf,
    /// EVM family settings.
    pub evm: FamilyConfig,
    /// Flow family settings.
    pub flow: FamilyConfig,
    /// Solana family settings.
    pub solana: FamilyConfig,
    /// In-app EVM wallet.
    pub local_wallet: LocalWalletConfig,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            storage_dir: config_dir().join("storage"),
            evm: FamilyConfig::default(),
            flow: FamilyConfig::default(),
            solana: FamilyConfig::default(),
            local_wallet: LocalWalletConfig::default(),
        }
    }
}

/// Per-family overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyConfig {
    /// Chain selected when nothing is stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_chain_id: Option<ChainId>,
}

impl FamilyConfig {
    /// Apply the overrides to `capabilities`.
    #[must_use]
    pub fn apply<F: ChainFamily>(&self, capabilities: Capabilities<F>) -> Capabilities<F> {
        match self.default_chain_id {
            Some(chain_id) => capabilities.with_default_chain_id(chain_id),
            None => capabilities,
        }
    }
}

/// Where the in-app wallet finds its key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalWalletConfig {
    /// Environment variable holding a BIP39 mnemonic.
    pub mnemonic_env: String,
    /// Environment variable holding a hex private key.
    pub private_key_env: String,
    /// HD derivation index.
    pub index: u32,
}

impl Default for LocalWalletConfig {
    fn default() -> Self {
        Self {
            mnemonic_env: "WEB3_STATE_MNEMONIC".to_owned(),
            private_key_env: "WEB3_STATE_PRIVATE_KEY".to_owned(),
            index: 0,
        }
    }
}

impl LocalWalletConfig {
    fn secret(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.trim().is_empty())
    }

    /// Whether any key material is present in the environment.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        Self::secret(&self.mnemonic_env).is_some() || Self::secret(&self.private_key_env).is_some()
    }

    /// Build the in-app wallet from the environment. The mnemonic wins
    /// over the private key when both are set.
    ///
    /// # Errors
    ///
    /// Fails when the key material is invalid.
    pub fn connector(&self) -> ConnectorResult<Option<LocalWalletConnector>> {
        let builder = if let Some(mnemonic) = Self::secret(&self.mnemonic_env) {
            LocalWalletConnector::builder()
                .mnemonic(mnemonic)
                .index(self.index)
        } else if let Some(key) = Self::secret(&self.private_key_env) {
            LocalWalletConnector::builder().private_key(key)
        } else {
            return Ok(None);
        };
        builder.build().map(Some)
    }
}

/// Severity of a [`ConfigIssue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueLevel {
    /// Usable, but probably not what was meant.
    Warning,
    /// Unusable.
    Error,
}

/// A problem found by [`WalletConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Severity.
    pub level: IssueLevel,
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong.
    pub message: String,
}

impl ConfigIssue {
    fn new(level: IssueLevel, field: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            field: field.to_owned(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            IssueLevel::Warning => "warning",
            IssueLevel::Error => "error",
        };
        write!(f, "{level}: {}: {}", self.field, self.message)
    }
}

impl WalletConfig {
    /// Check the configuration for problems.
    #[must_use]
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.storage_dir.as_os_str().is_empty() {
            issues.push(ConfigIssue::new(IssueLevel::Error, "storage_dir", "must not be empty"));
        } else if self.storage_dir.is_relative() {
            issues.push(ConfigIssue::new(
                IssueLevel::Warning,
                "storage_dir",
                "relative path resolves against the working directory",
            ));
        }

        let families: [(&str, &FamilyConfig, fn(ChainId) -> bool); 3] = [
            ("evm.default_chain_id", &self.evm, evm::is_valid_chain_id),
            ("flow.default_chain_id", &self.flow, flow::is_valid_chain_id),
            ("solana.default_chain_id", &self.solana, solana::is_valid_chain_id),
        ];
        for (field, family, is_valid) in families {
            if let Some(chain_id) = family.default_chain_id
                && !is_valid(chain_id)
            {
                issues.push(ConfigIssue::new(
                    IssueLevel::Error,
                    field,
                    format!("unknown chain id {chain_id}"),
                ));
            }
        }

        let wallet = &self.local_wallet;
        if wallet.mnemonic_env.is_empty() {
            issues.push(ConfigIssue::new(
                IssueLevel::Error,
                "local_wallet.mnemonic_env",
                "must name an environment variable",
            ));
        }
        if wallet.private_key_env.is_empty() {
            issues.push(ConfigIssue::new(
                IssueLevel::Error,
                "local_wallet.private_key_env",
                "must name an environment variable",
            ));
        }
        if !wallet.mnemonic_env.is_empty()
            && LocalWalletConfig::secret(&wallet.mnemonic_env).is_some()
            && LocalWalletConfig::secret(&wallet.private_key_env).is_some()
        {
            issues.push(ConfigIssue::new(
                IssueLevel::Warning,
                "local_wallet",
                "both mnemonic and private key are set; the mnemonic is used",
            ));
        }

        issues
    }

    /// Whether [`validate`](Self::validate) reports any error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.validate()
            .iter()
            .any(|issue| issue.level == IssueLevel::Error)
    }
}

/// Directory holding the configuration and, by default, the storage.
#[must_use]
pub fn config_dir() -> PathBuf {
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".web3-state")
}

/// Default configuration file path.
#[must_use]
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load the configuration at `path`, or the defaults when it does not exist.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub async fn load_config(path: &Path) -> ConfigResult<WalletConfig> {
    if !tokio::fs::try_exists(path).await? {
        debug!(path = %path.display(), "no config file, using defaults");
        return Ok(WalletConfig::default());
    }
    let content = tokio::fs::read_to_string(path).await?;
    let config = serde_json::from_str(&content)?;
    debug!(path = %path.display(), "config loaded");
    Ok(config)
}

/// Write `config` to `path`, creating parent directories.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub async fn save_config(config: &WalletConfig, path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(config)?;
    tokio::fs::write(path, content).await?;
    debug!(path = %path.display(), "config saved");
    Ok(())
}

/// Write the default configuration to `path`.
///
/// # Errors
///
/// Fails with [`ConfigError::Invalid`] when the file exists and `force` is
/// not set, or when it cannot be written.
pub async fn init_config(path: &Path, force: bool) -> ConfigResult<WalletConfig> {
    if !force && tokio::fs::try_exists(path).await? {
        return Err(ConfigError::invalid(format!(
            "{} already exists",
            path.display()
        )));
    }
    let config = WalletConfig::default();
    save_config(&config, path).await?;
    info!(path = %path.display(), "config initialized");
    Ok(config)
}
