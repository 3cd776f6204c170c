//! Operator session: owns the agent collection, its store, the status log and
//! the chain handles, and runs every console operation against them.

use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use alloy_signer_local::PrivateKeySigner;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::agent::{self, Agent, GenerateError};
use crate::balances::{self, BalanceRefresh};
use crate::batch::{BatchSummary, FundingResult, JoinResult};
use crate::chain::{EvmClient, Ledger};
use crate::config::{Config, ConfigError};
use crate::csv;
use crate::funding;
use crate::join::{self, JoinRequest};
use crate::lottery::{
    CreateLotteryParams, LotteryBoard, LotteryError, LotteryManager, LotterySnapshot,
};
use crate::signing::{self, SigningError};
use crate::status::StatusLog;
use crate::store::AgentStore;
use crate::units;

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("agent store unavailable: {0}")]
    Store(#[from] std::io::Error),
    #[error("no signing method available: admin key is not configured")]
    NoAdminKey,
    #[error("token address is not configured")]
    MissingToken,
    #[error(transparent)]
    Generate(#[from] GenerateError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error(transparent)]
    Lottery(#[from] LotteryError),
    #[error("invalid amount {0}")]
    Amount(String),
    #[error("percentages sum to {0}%, not 100%")]
    UnbalancedSplit(u64),
    #[error("lottery #{0} is not accepting entries")]
    LotteryClosed(u64),
    #[error("no agents selected")]
    NothingSelected,
}

pub struct Console {
    config: Config,
    store: AgentStore,
    agents: Vec<Agent>,
    log: StatusLog,
    ledger: Arc<dyn Ledger>,
    lottery: LotteryManager,
    admin: Option<PrivateKeySigner>,
    token: Option<Address>,
    pending_refresh: Option<JoinHandle<BalanceRefresh>>,
}

impl Console {
    /// Build a session from configuration, talking JSON-RPC over HTTP
    pub fn open(config: Config) -> Result<Self, ConsoleError> {
        config.validate()?;

        let mut client = EvmClient::http(config.rpc_endpoint()?, config.confirmation_policy());
        if let Some(chain_id) = config.network.chain_id {
            client = client.with_chain_id(chain_id);
        }
        let client = Arc::new(client);

        let admin = config
            .admin_key()?
            .map(|key| signing::parse_signer(&key))
            .transpose()?;
        let lottery = LotteryManager::new(
            Arc::clone(&client),
            config.contract_address()?,
            admin.clone(),
        );
        let store = AgentStore::open(&config.agents.state_dir)?;

        Self::new(config, store, client, lottery, admin)
    }

    pub fn new(
        config: Config,
        store: AgentStore,
        ledger: Arc<dyn Ledger>,
        lottery: LotteryManager,
        admin: Option<PrivateKeySigner>,
    ) -> Result<Self, ConsoleError> {
        let token = config.token_address()?;
        let agents = store.load();
        let mut log = StatusLog::new();

        match &admin {
            Some(signer) => log.success(format!("Connected as admin {}", signer.address())),
            None => log.warning(
                "No admin key configured: funding and admin transactions are disabled",
            ),
        }
        if !agents.is_empty() {
            log.info(format!("Loaded {} agents from {}", agents.len(), store.path().display()));
        }

        Ok(Self {
            config,
            store,
            agents,
            log,
            ledger,
            lottery,
            admin,
            token,
            pending_refresh: None,
        })
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn log(&self) -> &StatusLog {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn admin_address(&self) -> Option<Address> {
        self.admin.as_ref().map(|s| s.address())
    }

    pub fn token(&self) -> Option<Address> {
        self.token
    }

    pub fn has_pending_refresh(&self) -> bool {
        self.pending_refresh.is_some()
    }

    fn require_token(&mut self) -> Result<Address, ConsoleError> {
        match self.token {
            Some(token) => Ok(token),
            None => {
                self.log
                    .error("Token address missing: set contracts.token or LOTTERY_TOKEN_ADDRESS");
                Err(ConsoleError::MissingToken)
            }
        }
    }

    fn persist(&mut self) -> Result<(), ConsoleError> {
        self.store.save(&self.agents).map_err(|e| {
            self.log.error(format!("Failed to save agents: {e}"));
            ConsoleError::Store(e)
        })
    }

    /// Generate `count` agents, save them, then fund them from the admin wallet
    pub async fn create_and_fund_agents(
        &mut self,
        count: usize,
    ) -> Result<Vec<FundingResult>, ConsoleError> {
        let Some(admin) = self.admin.clone() else {
            self.log.error("Admin private key not configured. Cannot fund agents automatically.");
            return Err(ConsoleError::NoAdminKey);
        };
        let token = self.require_token()?;

        self.log.info(format!("Creating and funding {count} agents..."));
        let new_agents = match agent::create(count) {
            Ok(agents) => agents,
            Err(e) => {
                self.log.error(format!("Error creating agents: {e}"));
                return Err(e.into());
            }
        };

        // keys are stored before any value is sent to them
        let previous = self.agents.len();
        self.agents.extend(new_agents.iter().cloned());
        if let Err(e) = self.persist() {
            self.agents.truncate(previous);
            self.log.error("Funding aborted: new agent keys could not be saved.");
            return Err(e);
        }

        let results = funding::fund(
            &admin,
            &new_agents,
            token,
            &self.config.agents.funding,
            self.ledger.as_ref(),
        )
        .await;

        for (agent, result) in new_agents.iter().zip(&results) {
            if let Some(error) = result.error() {
                self.log.error(format!(
                    "Agent {}... funding failed: {error}",
                    agent.short_address()
                ));
            }
        }

        let summary = BatchSummary::of(&results);
        let message = format!(
            "Funded {}/{} agents successfully.",
            summary.succeeded, summary.total
        );
        if summary.all_succeeded() {
            self.log.success(message);
        } else {
            self.log.warning(message);
        }

        self.refresh_balances().await;
        Ok(results)
    }

    /// Re-read every agent's balances; failed lookups keep the stored values
    pub async fn refresh_balances(&mut self) {
        let Some(token) = self.token else {
            self.log.error("Cannot refresh: token address missing.");
            return;
        };
        if let Some(pending) = self.pending_refresh.take() {
            pending.abort();
        }

        self.log.info(format!("Refreshing balances for {} agents...", self.agents.len()));
        let refresh = balances::refresh(&self.agents, token, self.ledger.as_ref()).await;
        let problem = refresh.problem();
        self.agents = refresh.agents;
        if self.persist().is_err() {
            return;
        }
        match problem {
            Some(problem) => self.log.warning(problem),
            None => self.log.success("Agent balances updated."),
        }
    }

    /// Append agents from CSV text. Returns how many were added.
    pub async fn import_csv(&mut self, text: &str) -> usize {
        let decoded = csv::decode(text);
        if decoded.is_empty() {
            self.log.warning("No valid agents found in CSV.");
            return 0;
        }

        let mut fresh: Vec<Agent> = Vec::new();
        let mut duplicates = 0usize;
        let mut mismatched = 0usize;
        for candidate in decoded {
            let derived = signing::derive_address(&candidate.private_key).ok();
            if !derived.is_some_and(|d| candidate.same_address(&d)) {
                mismatched += 1;
                continue;
            }
            let known = self
                .agents
                .iter()
                .chain(fresh.iter())
                .any(|a| a.same_address(&candidate.address));
            if known {
                duplicates += 1;
                continue;
            }
            fresh.push(candidate);
        }

        if mismatched > 0 {
            self.log.warning(format!(
                "Skipped {mismatched} rows whose private key does not match the address."
            ));
        }
        if duplicates > 0 {
            self.log.warning(format!("Skipped {duplicates} agents already in the collection."));
        }
        if fresh.is_empty() {
            return 0;
        }

        let imported = fresh.len();
        let previous = self.agents.len();
        self.agents.extend(fresh);
        if self.persist().is_err() {
            self.agents.truncate(previous);
            return 0;
        }
        self.log.success(format!("Imported {imported} agents successfully."));

        self.refresh_balances().await;
        imported
    }

    pub fn export_csv(&mut self) -> Option<String> {
        if self.agents.is_empty() {
            self.log.warning("No agents to export.");
            return None;
        }
        self.log.success(format!("Exported {} agents to CSV.", self.agents.len()));
        Some(csv::encode(&self.agents))
    }

    /// Delete every agent and its keys. Does nothing unless `confirmed`.
    pub fn clear_agents(&mut self, confirmed: bool) -> bool {
        if !confirmed {
            self.log.warning("Clearing agents requires confirmation; nothing was deleted.");
            return false;
        }
        if let Some(pending) = self.pending_refresh.take() {
            pending.abort();
        }
        self.agents.clear();
        if let Err(e) = self.store.clear() {
            self.log.error(format!("Failed to clear agent store: {e}"));
        }
        self.log.info("All agents cleared.");
        true
    }

    pub async fn load_lotteries(&mut self) -> Option<LotteryBoard> {
        match self.lottery.load_board().await {
            Ok(board) => {
                self.log.info(format!(
                    "Loaded {} active and {} drawn lotteries.",
                    board.active.len(),
                    board.drawn.len()
                ));
                Some(board)
            }
            Err(e) => {
                self.log.warning(format!("Error loading lotteries: {e}"));
                None
            }
        }
    }

    pub async fn lottery_info(&mut self, id: u64) -> Result<LotterySnapshot, ConsoleError> {
        self.lottery.lottery_info(id).await.map_err(|e| {
            self.log.warning(format!("Error loading lottery #{id}: {e}"));
            e.into()
        })
    }

    /// Convert a whole-token amount into the token's smallest unit
    pub async fn token_amount(
        &mut self,
        token: Address,
        amount: &str,
    ) -> Result<U256, ConsoleError> {
        let decimals = self.ledger.token_decimals(token).await.map_err(|e| {
            self.log.error(format!("Cannot read token decimals: {e}"));
            ConsoleError::Lottery(e.into())
        })?;
        units::parse_amount(amount, decimals).map_err(|e| {
            self.log.error(format!("Invalid amount {amount}: {e}"));
            ConsoleError::Amount(format!("{amount}: {e}"))
        })
    }

    /// Create a lottery. A split that does not sum to 100 needs `force`.
    pub async fn create_lottery(
        &mut self,
        params: &CreateLotteryParams,
        force: bool,
    ) -> Result<TxHash, ConsoleError> {
        let total = params.percentage_total();
        if total != 100 && !force {
            self.log.warning(format!(
                "Percentages sum to {total}%, not 100%. The contract might reject this."
            ));
            return Err(ConsoleError::UnbalancedSplit(total));
        }

        self.log.info("Creating lottery...");
        match self.lottery.create_lottery(params).await {
            Ok(hash) => {
                self.log.success(format!("Lottery created successfully! ({hash})"));
                Ok(hash)
            }
            Err(e) => {
                self.log.error(format!("Error creating lottery: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn draw_winner(&mut self, id: u64) -> Result<TxHash, ConsoleError> {
        self.log.info(format!("Drawing winner for Lottery #{id}..."));
        match self.lottery.draw_winner(id).await {
            Ok(hash) => {
                self.log.success(format!("Lottery #{id} drawn successfully! ({hash})"));
                Ok(hash)
            }
            Err(e) => {
                self.log.error(format!("Draw failed: {e}"));
                Err(e.into())
            }
        }
    }

    pub async fn cancel_lottery(&mut self, id: u64) -> Result<TxHash, ConsoleError> {
        self.log.info(format!("Cancelling Lottery #{id}..."));
        match self.lottery.cancel_lottery(id).await {
            Ok(hash) => {
                self.log.success(format!("Lottery #{id} cancelled! ({hash})"));
                Ok(hash)
            }
            Err(e) => {
                self.log.error(format!("Cancel failed: {e}"));
                Err(e.into())
            }
        }
    }

    /// Enter the selected agents into `lottery`, one after another.
    ///
    /// Unknown and repeated addresses in `selection` are skipped. A balance
    /// refresh is started in the background; [`Console::settle`] applies it.
    pub async fn join_lottery(
        &mut self,
        lottery: &LotterySnapshot,
        selection: &[String],
    ) -> Result<Vec<JoinResult>, ConsoleError> {
        let mut selected: Vec<Agent> = Vec::new();
        for address in selection {
            if selected.iter().any(|a| a.same_address(address)) {
                continue;
            }
            match self.agents.iter().find(|a| a.same_address(address)) {
                Some(agent) => selected.push(agent.clone()),
                None => self.log.warning(format!("Agent {address} not found, skipped.")),
            }
        }
        if selected.is_empty() {
            self.log.warning("No agents selected.");
            return Err(ConsoleError::NothingSelected);
        }
        if !lottery.accepts_entries() {
            self.log.error(format!("Lottery #{} is not accepting entries.", lottery.id));
            return Err(ConsoleError::LotteryClosed(lottery.id));
        }

        self.log.info(format!(
            "Joining {} agents to Lottery #{}...",
            selected.len(),
            lottery.id
        ));
        let request = JoinRequest {
            lottery_id: lottery.id,
            contract: self.lottery.contract(),
            token: lottery.token_address,
            fee: lottery.participation_fee,
        };
        let results = join::join_batch(&selected, &request, self.ledger.as_ref()).await;

        for (agent, result) in selected.iter().zip(&results) {
            match result.error() {
                None => self.log.success(format!("Agent {}... joined.", agent.short_address())),
                Some(error) => self
                    .log
                    .error(format!("Agent {}... failed: {error}", agent.short_address())),
            }
        }
        let summary = BatchSummary::of(&results);
        self.log.info(format!(
            "Finished joining agents. Success: {}/{}",
            summary.succeeded, summary.total
        ));

        self.spawn_refresh();
        Ok(results)
    }

    fn spawn_refresh(&mut self) {
        let Some(token) = self.token else {
            return;
        };
        if let Some(pending) = self.pending_refresh.take() {
            pending.abort();
        }
        let agents = self.agents.clone();
        let ledger = Arc::clone(&self.ledger);
        self.pending_refresh = Some(tokio::spawn(async move {
            balances::refresh(&agents, token, ledger.as_ref()).await
        }));
        debug!("background balance refresh started");
    }

    /// Wait for a background refresh and merge its balances by address
    pub async fn settle(&mut self) {
        let Some(handle) = self.pending_refresh.take() else {
            return;
        };
        match handle.await {
            Ok(refreshed) => {
                for fresh in &refreshed.agents {
                    let matching = self
                        .agents
                        .iter_mut()
                        .filter(|a| a.same_address(&fresh.address));
                    for agent in matching {
                        agent.native_balance = fresh.native_balance.clone();
                        agent.token_balance = fresh.token_balance.clone();
                    }
                }
                if self.persist().is_err() {
                    return;
                }
                match refreshed.problem() {
                    Some(problem) => self.log.warning(problem),
                    None => self.log.info("Agent balances updated in background."),
                }
            }
            Err(e) => self.log.warning(format!("Background balance refresh failed: {e}")),
        }
    }
}
