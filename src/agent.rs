use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::signing::{self, SigningError};

/// Upper bound on agents created in one call
pub const MAX_AGENTS_PER_BATCH: usize = 10;

/// A locally generated wallet used to simulate a lottery participant.
///
/// `address` is kept exactly as it was created or imported so that it
/// round-trips through the store and CSV unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub address: String,
    pub private_key: String,
    #[serde(alias = "ethBalance", default = "zero")]
    pub native_balance: String,
    #[serde(alias = "usdtBalance", default = "zero")]
    pub token_balance: String,
}

fn zero() -> String {
    "0".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("agent count must be between 1 and {MAX_AGENTS_PER_BATCH}, got {0}")]
    InvalidCount(usize),
    #[error("cannot generate agent keys: {0}")]
    Entropy(#[from] SigningError),
}

impl Agent {
    /// An unfunded agent for an existing key pair
    pub fn new(address: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            private_key: private_key.into(),
            native_balance: zero(),
            token_balance: zero(),
        }
    }

    /// Parsed on-chain address
    pub fn parsed_address(&self) -> Result<Address, alloy_primitives::hex::FromHexError> {
        self.address.trim().parse()
    }

    /// Signer for this agent's own transactions
    pub fn signer(&self) -> Result<PrivateKeySigner, SigningError> {
        signing::parse_signer(&self.private_key)
    }

    /// Case-insensitive address comparison
    pub fn same_address(&self, other: &str) -> bool {
        self.address.trim().eq_ignore_ascii_case(other.trim())
    }

    /// First characters of the address, for status messages
    pub fn short_address(&self) -> &str {
        self.address.get(..8).unwrap_or(&self.address)
    }
}

/// Create `count` fresh agents with random keys and zero balances.
pub fn create(count: usize) -> Result<Vec<Agent>, GenerateError> {
    if count == 0 || count > MAX_AGENTS_PER_BATCH {
        return Err(GenerateError::InvalidCount(count));
    }

    let mut agents = Vec::with_capacity(count);
    for _ in 0..count {
        let private_key = signing::random_private_key()?;
        let address = signing::derive_address(&private_key)?;
        agents.push(Agent::new(address, private_key));
    }

    info!(count = count, "generated agent wallets");
    Ok(agents)
}
