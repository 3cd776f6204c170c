use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::chain::ConfirmationPolicy;
use crate::funding::FundingAllotment;
use crate::signing::{self, SigningError};

/// Console configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// RPC endpoint and confirmation settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Lottery manager and token contracts
    #[serde(default)]
    pub contracts: ContractsConfig,

    /// Admin (funding) wallet
    #[serde(default)]
    pub admin: AdminConfig,

    /// Local agent state and funding amounts
    #[serde(default)]
    pub agents: AgentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub infura_api_key: Option<String>,
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractsConfig {
    #[serde(default)]
    pub lottery_manager: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub private_key: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub funding: FundingAllotment,
}

fn default_confirmation_timeout() -> u64 {
    180
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".lottery-console")
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: None,
            infura_api_key: None,
            chain_id: None,
            confirmation_timeout_secs: default_confirmation_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            funding: FundingAllotment::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no RPC endpoint configured (set network.rpc_url or network.infura_api_key)")]
    MissingRpc,
    #[error("lottery manager contract address is not configured")]
    MissingContract,
    #[error("invalid {field} address: {value}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error(transparent)]
    AdminKey(#[from] SigningError),
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!(
            contract = ?config.contracts.lottery_manager,
            state_dir = %config.agents.state_dir.display(),
            "configuration loaded"
        );
        Ok(config)
    }

    /// File (if given) with process environment overrides on top
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply `LOTTERY_*` overrides read through `lookup`
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("LOTTERY_RPC_URL") {
            self.network.rpc_url = Some(v);
        }
        if let Some(v) = get("LOTTERY_INFURA_API_KEY") {
            self.network.infura_api_key = Some(v);
        }
        if let Some(v) = get("LOTTERY_CHAIN_ID") {
            let id = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "LOTTERY_CHAIN_ID",
                value: v.clone(),
            })?;
            self.network.chain_id = Some(id);
        }
        if let Some(v) = get("LOTTERY_CONTRACT_ADDRESS") {
            self.contracts.lottery_manager = Some(v);
        }
        if let Some(v) = get("LOTTERY_TOKEN_ADDRESS") {
            self.contracts.token = Some(v);
        }
        if let Some(v) = get("LOTTERY_ADMIN_PRIVATE_KEY") {
            self.admin.private_key = Some(v);
        }
        if let Some(v) = get("LOTTERY_STATE_DIR") {
            self.agents.state_dir = PathBuf::from(v);
        }
        Ok(self)
    }

    /// Explicit URL, else an Infura Sepolia URL built from the API key
    pub fn rpc_endpoint(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.network.rpc_url {
            return Ok(url.clone());
        }
        self.network
            .infura_api_key
            .as_ref()
            .map(|key| format!("https://sepolia.infura.io/v3/{key}"))
            .ok_or(ConfigError::MissingRpc)
    }

    pub fn contract_address(&self) -> Result<Address, ConfigError> {
        let value = self
            .contracts
            .lottery_manager
            .as_deref()
            .ok_or(ConfigError::MissingContract)?;
        parse_address("lottery manager", value)
    }

    pub fn token_address(&self) -> Result<Option<Address>, ConfigError> {
        self.contracts
            .token
            .as_deref()
            .map(|v| parse_address("token", v))
            .transpose()
    }

    /// Inline key wins over the key file
    pub fn admin_key(&self) -> Result<Option<String>, ConfigError> {
        if let Some(key) = &self.admin.private_key {
            return Ok(Some(key.trim().to_string()));
        }
        match &self.admin.private_key_path {
            Some(path) => Ok(Some(signing::load_private_key(path)?)),
            None => Ok(None),
        }
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            poll_interval: Duration::from_millis(self.network.poll_interval_ms),
            timeout: Duration::from_secs(self.network.confirmation_timeout_secs),
        }
    }

    /// Validate everything a session needs before touching the network
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rpc_endpoint()?;
        self.contract_address()?;
        self.token_address()?;
        Ok(())
    }
}
