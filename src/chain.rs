//! JSON-RPC plumbing for an EVM chain: raw transport, transaction signing and
//! confirmation, and the [`Ledger`] operations the orchestrators drive.

use std::time::{Duration, Instant};

use alloy_consensus::TxLegacy;
use alloy_primitives::{Address, Bytes, TxHash, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::lottery::ILotteryManager;
use crate::signing::{self, SigningError};

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
        function decimals() external view returns (uint8);
    }
}

/// Coarse classification of a failed on-chain step, reported per agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientFunds,
    NetworkUnreachable,
    Generic,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("network unreachable: {0}")]
    Network(String),
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("transaction {0} not confirmed within {1:?}")]
    Timeout(TxHash, Duration),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed RPC response: {0}")]
    Decode(String),
    #[error(transparent)]
    Signer(#[from] SigningError),
}

impl ChainError {
    pub fn kind(&self) -> FailureKind {
        match self {
            ChainError::InsufficientFunds(_) => FailureKind::InsufficientFunds,
            ChainError::Network(_) | ChainError::Timeout(..) => FailureKind::NetworkUnreachable,
            ChainError::Reverted(_)
            | ChainError::Rpc { .. }
            | ChainError::Decode(_)
            | ChainError::Signer(_) => FailureKind::Generic,
        }
    }

    /// Classify a JSON-RPC error object returned by a node.
    pub fn from_rpc(code: i64, message: &str, data: Option<&Value>) -> Self {
        let lower = message.to_ascii_lowercase();
        if lower.contains("insufficient funds") {
            return ChainError::InsufficientFunds(message.to_string());
        }
        if code == 3 || lower.contains("execution reverted") {
            let reason = message
                .split_once("execution reverted:")
                .map(|(_, r)| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .or_else(|| data.and_then(decode_revert_data))
                .unwrap_or_else(|| "no reason given".to_string());
            return ChainError::Reverted(reason);
        }
        ChainError::Rpc {
            code,
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ChainError::Decode(e.to_string())
        } else {
            ChainError::Network(e.to_string())
        }
    }
}

fn decode_revert_data(data: &Value) -> Option<String> {
    let bytes: Bytes = serde_json::from_value(data.clone()).ok()?;
    alloy_sol_types::decode_revert_reason(&bytes)
}

fn from_value<T: DeserializeOwned>(value: Value) -> Result<T, ChainError> {
    serde_json::from_value(value).map_err(|e| ChainError::Decode(e.to_string()))
}

/// JSON-RPC request structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    id: u64,
    method: String,
    params: Vec<Value>,
}

/// JSON-RPC response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: u64,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

/// JSON-RPC transport, swapped for a scripted client in tests
#[async_trait]
pub trait RpcClient: Send + Sync {
    /// Call `method`; a `null` result is returned as `Value::Null`.
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainError>;
}

/// Default HTTP-based RPC client using reqwest
pub struct HttpRpcClient {
    client: reqwest::Client,
    url: String,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RpcClient for HttpRpcClient {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, ChainError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: 1,
            method: method.to_string(),
            params,
        };

        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .timeout(Duration::from_secs(15))
            .send()
            .await?
            .error_for_status()?;

        let rpc_resp: JsonRpcResponse = resp.json().await?;

        if let Some(error) = rpc_resp.error {
            return Err(ChainError::from_rpc(
                error.code,
                &error.message,
                error.data.as_ref(),
            ));
        }

        Ok(rpc_resp.result.unwrap_or(Value::Null))
    }
}

/// How long to wait for a receipt and how often to ask
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(180),
        }
    }
}

/// The parts of a transaction receipt we look at
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    #[serde(default)]
    pub status: Option<U256>,
    #[serde(default)]
    pub block_number: Option<U256>,
}

/// EVM client speaking JSON-RPC through a pluggable transport
pub struct EvmClient {
    rpc: Box<dyn RpcClient>,
    chain_id: OnceCell<u64>,
    confirmations: ConfirmationPolicy,
}

impl EvmClient {
    pub fn new(rpc: Box<dyn RpcClient>, confirmations: ConfirmationPolicy) -> Self {
        Self {
            rpc,
            chain_id: OnceCell::new(),
            confirmations,
        }
    }

    pub fn http(url: impl Into<String>, confirmations: ConfirmationPolicy) -> Self {
        Self::new(Box::new(HttpRpcClient::new(url)), confirmations)
    }

    /// Pin the chain id instead of asking the node
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = OnceCell::new_with(Some(chain_id));
        self
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        self.chain_id
            .get_or_try_init(|| async {
                let id: U256 = from_value(self.rpc.call("eth_chainId", vec![]).await?)?;
                u64::try_from(id).map_err(|e| ChainError::Decode(e.to_string()))
            })
            .await
            .copied()
    }

    pub async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        from_value(
            self.rpc
                .call("eth_getBalance", vec![json!(owner), json!("latest")])
                .await?,
        )
    }

    /// Read-only contract call
    pub async fn call<C: SolCall + Send + Sync>(
        &self,
        to: Address,
        call: &C,
    ) -> Result<C::Return, ChainError> {
        let data = Bytes::from(call.abi_encode());
        let result = self
            .rpc
            .call("eth_call", vec![json!({"to": to, "data": data}), json!("latest")])
            .await?;
        let out: Bytes = from_value(result)?;
        C::abi_decode_returns(&out, true).map_err(|e| ChainError::Decode(e.to_string()))
    }

    /// Sign and broadcast a transaction. Returns once the node accepted it.
    pub async fn send_transaction(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<TxHash, ChainError> {
        let from = signer.address();
        let chain_id = self.chain_id().await?;

        let nonce: U256 = from_value(
            self.rpc
                .call("eth_getTransactionCount", vec![json!(from), json!("pending")])
                .await?,
        )?;
        let gas_price: U256 = from_value(self.rpc.call("eth_gasPrice", vec![]).await?)?;
        let estimate: U256 = from_value(
            self.rpc
                .call(
                    "eth_estimateGas",
                    vec![json!({"from": from, "to": to, "value": value, "data": input})],
                )
                .await?,
        )?;

        let estimate = u64::try_from(estimate).unwrap_or(u64::MAX);
        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce: u64::try_from(nonce).map_err(|e| ChainError::Decode(e.to_string()))?,
            gas_price: u128::try_from(gas_price).unwrap_or(u128::MAX),
            // 20% headroom over the estimate
            gas_limit: estimate.saturating_add(estimate / 5),
            to: TxKind::Call(to),
            value,
            input,
        };

        let raw = signing::sign_legacy(signer, tx)?;
        let hash: TxHash = from_value(
            self.rpc
                .call(
                    "eth_sendRawTransaction",
                    vec![json!(format!("0x{}", hex::encode(raw)))],
                )
                .await?,
        )?;

        debug!(from = %from, to = %to, tx_hash = %hash, "transaction broadcast");
        Ok(hash)
    }

    /// Poll until the transaction is mined. A failed status is a revert.
    pub async fn wait_for_receipt(&self, hash: TxHash) -> Result<TxReceipt, ChainError> {
        let started = Instant::now();
        loop {
            let result = self
                .rpc
                .call("eth_getTransactionReceipt", vec![json!(hash)])
                .await?;

            if !result.is_null() {
                let receipt: TxReceipt = from_value(result)?;
                if receipt.status == Some(U256::ZERO) {
                    return Err(ChainError::Reverted(format!("transaction {hash} reverted")));
                }
                return Ok(receipt);
            }

            if started.elapsed() >= self.confirmations.timeout {
                return Err(ChainError::Timeout(hash, self.confirmations.timeout));
            }

            tokio::time::sleep(self.confirmations.poll_interval).await;
        }
    }

    pub async fn send_and_confirm(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        value: U256,
        input: Bytes,
    ) -> Result<TxHash, ChainError> {
        let hash = self.send_transaction(signer, to, value, input).await?;
        let receipt = self.wait_for_receipt(hash).await?;
        info!(
            tx_hash = %hash,
            block = ?receipt.block_number,
            "transaction confirmed"
        );
        Ok(hash)
    }

    /// Send a contract call as a transaction and wait for it
    pub async fn transact<C: SolCall + Send + Sync>(
        &self,
        signer: &PrivateKeySigner,
        to: Address,
        call: &C,
    ) -> Result<TxHash, ChainError> {
        self.send_and_confirm(signer, to, U256::ZERO, Bytes::from(call.abi_encode()))
            .await
    }
}

/// The chain operations agents and the funding wallet need.
///
/// Every transaction method returns only after the transaction is confirmed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError>;

    async fn transfer_native(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    async fn transfer_token(
        &self,
        from: &PrivateKeySigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    async fn enter_lottery(
        &self,
        entrant: &PrivateKeySigner,
        contract: Address,
        lottery_id: U256,
    ) -> Result<TxHash, ChainError>;
}

#[async_trait]
impl Ledger for EvmClient {
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        EvmClient::native_balance(self, owner).await
    }

    async fn token_decimals(&self, token: Address) -> Result<u8, ChainError> {
        Ok(self.call(token, &IERC20::decimalsCall {}).await?._0)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(self
            .call(token, &IERC20::balanceOfCall { account: owner })
            .await?
            ._0)
    }

    async fn transfer_native(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.send_and_confirm(from, to, amount, Bytes::new()).await
    }

    async fn transfer_token(
        &self,
        from: &PrivateKeySigner,
        token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.transact(from, token, &IERC20::transferCall { to, amount })
            .await
    }

    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.transact(owner, token, &IERC20::approveCall { spender, amount })
            .await
    }

    async fn enter_lottery(
        &self,
        entrant: &PrivateKeySigner,
        contract: Address,
        lottery_id: U256,
    ) -> Result<TxHash, ChainError> {
        self.transact(
            entrant,
            contract,
            &ILotteryManager::enterLotteryCall {
                _lotteryId: lottery_id,
            },
        )
        .await
    }
}
