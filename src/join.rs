use alloy_primitives::{Address, TxHash, U256};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::batch::{AgentResult, JoinResult};
use crate::chain::{ChainError, Ledger};

/// Target of a join batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub lottery_id: u64,
    pub contract: Address,
    pub token: Address,
    /// Participation fee in the token's smallest unit
    pub fee: U256,
}

/// Enter each agent into the lottery: approve the fee, then enter.
///
/// Each agent signs its own transactions. A failing agent is recorded and
/// the loop moves on.
pub async fn join_batch(
    agents: &[Agent],
    request: &JoinRequest,
    ledger: &dyn Ledger,
) -> Vec<JoinResult> {
    let mut results = Vec::with_capacity(agents.len());
    for agent in agents {
        let result = match join_one(agent, request, ledger).await {
            Ok(hash) => {
                info!(
                    agent = %agent.address,
                    lottery_id = request.lottery_id,
                    tx_hash = %hash,
                    "agent joined lottery"
                );
                AgentResult::success(agent.address.clone(), Some(hash))
            }
            Err(e) => {
                warn!(
                    agent = %agent.address,
                    lottery_id = request.lottery_id,
                    error = %e,
                    "agent failed to join"
                );
                AgentResult::failed(agent.address.clone(), e.kind(), e.to_string())
            }
        };
        results.push(result);
    }
    results
}

async fn join_one(
    agent: &Agent,
    request: &JoinRequest,
    ledger: &dyn Ledger,
) -> Result<TxHash, ChainError> {
    let signer = agent.signer()?;
    ledger
        .approve(&signer, request.token, request.contract, request.fee)
        .await?;
    ledger
        .enter_lottery(&signer, request.contract, U256::from(request.lottery_id))
        .await
}
