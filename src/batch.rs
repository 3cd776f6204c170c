use alloy_primitives::TxHash;
use serde::Serialize;

use crate::chain::FailureKind;

/// Per-agent result of a batch step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        tx_hash: Option<TxHash>,
    },
    Failed {
        kind: FailureKind,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentResult {
    pub address: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

pub type FundingResult = AgentResult;
pub type JoinResult = AgentResult;

impl AgentResult {
    pub fn success(address: impl Into<String>, tx_hash: Option<TxHash>) -> Self {
        Self {
            address: address.into(),
            outcome: Outcome::Success { tx_hash },
        }
    }

    pub fn failed(address: impl Into<String>, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            outcome: Outcome::Failed {
                kind,
                error: error.into(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failed { error, .. } => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

/// Tally over a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn of(results: &[AgentResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
