use alloy_primitives::{Address, TxHash, U256};
use alloy_signer_local::PrivateKeySigner;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::batch::{AgentResult, FundingResult};
use crate::chain::{ChainError, FailureKind, Ledger};
use crate::units::{parse_amount, NATIVE_DECIMALS};

/// Fixed amounts sent to every new agent, as decimal strings in whole units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingAllotment {
    #[serde(default = "default_native")]
    pub native: String,
    #[serde(default = "default_token")]
    pub token: String,
}

fn default_native() -> String {
    "0.001".to_string()
}

fn default_token() -> String {
    "100".to_string()
}

impl Default for FundingAllotment {
    fn default() -> Self {
        Self {
            native: default_native(),
            token: default_token(),
        }
    }
}

/// Status message for a failed funding step
pub fn describe_failure(e: &ChainError) -> String {
    match e.kind() {
        FailureKind::InsufficientFunds => format!("Admin wallet has insufficient funds: {e}"),
        FailureKind::NetworkUnreachable => {
            format!("Network connection failed, check the RPC endpoint: {e}")
        }
        FailureKind::Generic => e.to_string(),
    }
}

fn fail_all(agents: &[Agent], kind: FailureKind, error: &str) -> Vec<FundingResult> {
    agents
        .iter()
        .map(|a| AgentResult::failed(a.address.clone(), kind, error))
        .collect()
}

/// Send the native and token allotments from `funder` to each agent in turn.
///
/// Agents are funded one at a time so the funder's nonces stay in order; a
/// failure is recorded for that agent and the next one is attempted.
pub async fn fund(
    funder: &PrivateKeySigner,
    agents: &[Agent],
    token: Address,
    allotment: &FundingAllotment,
    ledger: &dyn Ledger,
) -> Vec<FundingResult> {
    let decimals = match ledger.token_decimals(token).await {
        Ok(d) => d,
        Err(e) => {
            warn!(token = %token, error = %e, "cannot resolve token decimals, funding aborted");
            return fail_all(agents, e.kind(), &describe_failure(&e));
        }
    };

    let amounts = parse_amount(&allotment.native, NATIVE_DECIMALS)
        .and_then(|native| Ok((native, parse_amount(&allotment.token, decimals)?)));
    let (native_amount, token_amount) = match amounts {
        Ok(a) => a,
        Err(e) => {
            let error = format!("invalid funding allotment: {e}");
            warn!(error = %error, "funding aborted");
            return fail_all(agents, FailureKind::Generic, &error);
        }
    };

    let mut results = Vec::with_capacity(agents.len());
    for agent in agents {
        let result = match fund_one(funder, agent, token, native_amount, token_amount, ledger).await
        {
            Ok(hash) => {
                info!(agent = %agent.address, tx_hash = %hash, "agent funded");
                AgentResult::success(agent.address.clone(), Some(hash))
            }
            Err(e) => {
                warn!(agent = %agent.address, error = %e, "agent funding failed");
                AgentResult::failed(agent.address.clone(), e.kind(), describe_failure(&e))
            }
        };
        results.push(result);
    }
    results
}

async fn fund_one(
    funder: &PrivateKeySigner,
    agent: &Agent,
    token: Address,
    native_amount: U256,
    token_amount: U256,
    ledger: &dyn Ledger,
) -> Result<TxHash, ChainError> {
    let to = agent
        .parsed_address()
        .map_err(|e| ChainError::Decode(format!("bad agent address {}: {e}", agent.address)))?;
    ledger.transfer_native(funder, to, native_amount).await?;
    ledger.transfer_token(funder, token, to, token_amount).await
}
