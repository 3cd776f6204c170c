use alloy_primitives::Address;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::chain::{ChainError, Ledger};
use crate::units::{format_amount, NATIVE_DECIMALS};

/// Outcome of a balance refresh
#[derive(Debug)]
pub struct BalanceRefresh {
    /// Same length and order as the input
    pub agents: Vec<Agent>,
    /// Agents whose lookups failed and kept their previous balances
    pub stale: usize,
    /// Set when the token decimals could not be read; nothing was refreshed
    pub decimals_error: Option<ChainError>,
}

impl BalanceRefresh {
    pub fn is_complete(&self) -> bool {
        self.stale == 0 && self.decimals_error.is_none()
    }

    /// Operator-facing description of what went stale, if anything
    pub fn problem(&self) -> Option<String> {
        if let Some(e) = &self.decimals_error {
            return Some(format!(
                "Failed to refresh balances: cannot read token decimals: {e}"
            ));
        }
        (self.stale > 0).then(|| {
            format!(
                "Balances of {}/{} agents could not be refreshed and are stale.",
                self.stale,
                self.agents.len()
            )
        })
    }
}

/// Re-read native and token balances for every agent.
///
/// Agents whose lookups fail come back unchanged, so the output always has
/// the same length and order as the input.
pub async fn refresh(agents: &[Agent], token: Address, ledger: &dyn Ledger) -> BalanceRefresh {
    let decimals = match ledger.token_decimals(token).await {
        Ok(d) => d,
        Err(e) => {
            warn!(
                token = %token,
                error = %e,
                "cannot resolve token decimals, keeping stale balances"
            );
            return BalanceRefresh {
                agents: agents.to_vec(),
                stale: agents.len(),
                decimals_error: Some(e),
            };
        }
    };

    let mut updated = Vec::with_capacity(agents.len());
    let mut stale = 0usize;
    for agent in agents {
        match fetch(agent, token, decimals, ledger).await {
            Ok((native, token_balance)) => updated.push(Agent {
                native_balance: native,
                token_balance,
                ..agent.clone()
            }),
            Err(e) => {
                stale += 1;
                warn!(agent = %agent.address, error = %e, "balance fetch failed");
                updated.push(agent.clone());
            }
        }
    }

    info!(total = agents.len(), stale = stale, "balances refreshed");
    BalanceRefresh {
        agents: updated,
        stale,
        decimals_error: None,
    }
}

async fn fetch(
    agent: &Agent,
    token: Address,
    decimals: u8,
    ledger: &dyn Ledger,
) -> Result<(String, String), ChainError> {
    let owner = agent
        .parsed_address()
        .map_err(|e| ChainError::Decode(format!("bad agent address {}: {e}", agent.address)))?;
    let native = ledger.native_balance(owner).await?;
    let token_balance = ledger.token_balance(token, owner).await?;
    Ok((
        format_amount(native, NATIVE_DECIMALS),
        format_amount(token_balance, decimals),
    ))
}
