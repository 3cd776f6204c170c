use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use alloy_primitives::{Address, TxHash, U256};
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use serde_json::Value;

use lottery_console::agent::Agent;
use lottery_console::chain::{ChainError, ConfirmationPolicy, EvmClient, Ledger, RpcClient};
use lottery_console::config::Config;
use lottery_console::console::{Console, ConsoleError};
use lottery_console::csv;
use lottery_console::lottery::{CreateLotteryParams, LotteryManager, LotterySnapshot};
use lottery_console::signing;
use lottery_console::store::AgentStore;

const ADMIN_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const TOKEN: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const CONTRACT: &str = "0xe7f1725E7734CE288F8367e1Bb143E90bb3F0512";

fn whole(n: u64) -> U256 {
    U256::from(n) * U256::from(10u64).pow(U256::from(18u64))
}

/// In-memory chain: balances move on transfers and entries cost the fee.
#[derive(Default)]
struct ScriptedLedger {
    native: Mutex<HashMap<Address, U256>>,
    token: Mutex<HashMap<Address, U256>>,
    calls: Mutex<Vec<String>>,
    reject_entry: Option<Address>,
    decimals_unavailable: bool,
}

impl ScriptedLedger {
    fn credit_token(&self, owner: Address, amount: U256) {
        *self.token.lock().unwrap().entry(owner).or_default() += amount;
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        Ok(self.native.lock().unwrap().get(&owner).copied().unwrap_or_default())
    }

    async fn token_decimals(&self, _token: Address) -> Result<u8, ChainError> {
        if self.decimals_unavailable {
            return Err(ChainError::Network("connection refused".into()));
        }
        Ok(18)
    }

    async fn token_balance(&self, _token: Address, owner: Address) -> Result<U256, ChainError> {
        Ok(self.token.lock().unwrap().get(&owner).copied().unwrap_or_default())
    }

    async fn transfer_native(
        &self,
        _from: &PrivateKeySigner,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(format!("native {to}"));
        *self.native.lock().unwrap().entry(to).or_default() += amount;
        Ok(TxHash::repeat_byte(0x01))
    }

    async fn transfer_token(
        &self,
        _from: &PrivateKeySigner,
        _token: Address,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(format!("token {to}"));
        self.credit_token(to, amount);
        Ok(TxHash::repeat_byte(0x02))
    }

    async fn approve(
        &self,
        owner: &PrivateKeySigner,
        _token: Address,
        _spender: Address,
        _amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(format!("approve {}", owner.address()));
        Ok(TxHash::repeat_byte(0x03))
    }

    async fn enter_lottery(
        &self,
        entrant: &PrivateKeySigner,
        _contract: Address,
        _lottery_id: U256,
    ) -> Result<TxHash, ChainError> {
        let who = entrant.address();
        self.record(format!("enter {who}"));
        if self.reject_entry == Some(who) {
            return Err(ChainError::Reverted("Already participating".into()));
        }
        let mut balances = self.token.lock().unwrap();
        let balance = balances.entry(who).or_default();
        *balance = balance.saturating_sub(whole(5));
        Ok(TxHash::repeat_byte(0x04))
    }
}

/// Lottery contract reads are never reached in these tests
struct Offline;

#[async_trait]
impl RpcClient for Offline {
    async fn call(&self, method: &str, _params: Vec<Value>) -> Result<Value, ChainError> {
        Err(ChainError::Network(format!("offline: {method}")))
    }
}

fn console(dir: &std::path::Path, ledger: Arc<ScriptedLedger>, admin: Option<&str>) -> Console {
    let mut config = Config::default();
    config.contracts.lottery_manager = Some(CONTRACT.into());
    config.contracts.token = Some(TOKEN.into());
    config.agents.state_dir = dir.to_path_buf();

    let admin = admin.map(|key| signing::parse_signer(key).unwrap());
    let client =
        EvmClient::new(Box::new(Offline), ConfirmationPolicy::default()).with_chain_id(31337);
    let lottery = LotteryManager::new(Arc::new(client), CONTRACT.parse().unwrap(), admin.clone());
    let store = AgentStore::open(dir).unwrap();

    Console::new(config, store, ledger, lottery, admin).unwrap()
}

fn fresh_agent() -> Agent {
    let key = signing::random_private_key().unwrap();
    let address = signing::derive_address(&key).unwrap();
    Agent::new(address, key)
}

fn snapshot(id: u64, active: bool) -> LotterySnapshot {
    LotterySnapshot {
        id,
        token_address: TOKEN.parse().unwrap(),
        participation_fee: whole(5),
        refundable_amount: U256::ZERO,
        max_participants: 10,
        draw_time: 1_700_000_000,
        prize_percentage: 70,
        investment_percentage: 20,
        profit_percentage: 10,
        is_active: active,
        is_drawn: !active,
        is_cancelled: false,
        winner: Address::ZERO,
        vote_count: 0,
        draw_timestamp: 0,
        participants: Vec::new(),
    }
}

#[tokio::test]
async fn test_import_skips_duplicates_and_mismatched_keys() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let mut console = console(dir.path(), Arc::clone(&ledger), None);

    let a = fresh_agent();
    let b = fresh_agent();
    let forged = Agent::new(a.address.clone(), b.private_key.clone());
    let mut text = csv::encode(&[a.clone(), b.clone(), forged]);
    text.push_str(&format!("\n4,{},{},0,0\n", a.address.to_lowercase(), a.private_key));

    assert_eq!(console.import_csv(&text).await, 2);
    assert_eq!(console.agents().len(), 2);
    assert_eq!(console.import_csv(&csv::encode(&[b.clone()])).await, 0);

    let warnings: Vec<String> = console
        .log()
        .entries()
        .map(|e| e.message.clone())
        .filter(|m| m.starts_with("Skipped"))
        .collect();
    // newest first: second import, then the first import's two checks
    assert_eq!(
        warnings,
        vec![
            "Skipped 1 agents already in the collection.",
            "Skipped 1 agents already in the collection.",
            "Skipped 1 rows whose private key does not match the address.",
        ]
    );

    // imported agents were refreshed and persisted
    let stored = AgentStore::open(dir.path()).unwrap().load();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].address, a.address);
    assert_eq!(stored[0].native_balance, "0.0");
}

#[tokio::test]
async fn test_export_round_trips_through_import() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let mut console = console(dir.path(), Arc::clone(&ledger), None);
    assert!(console.export_csv().is_none());

    let agents = vec![fresh_agent(), fresh_agent()];
    console.import_csv(&csv::encode(&agents)).await;
    let exported = console.export_csv().unwrap();
    assert!(exported.starts_with(csv::HEADER));

    let other = tempfile::tempdir().unwrap();
    let mut second = console_in(other.path());
    assert_eq!(second.import_csv(&exported).await, 2);
    assert_eq!(second.agents()[1].private_key, agents[1].private_key);
}

fn console_in(dir: &std::path::Path) -> Console {
    console(dir, Arc::new(ScriptedLedger::default()), None)
}

#[tokio::test]
async fn test_clear_requires_confirmation() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console_in(dir.path());
    console.import_csv(&csv::encode(&[fresh_agent()])).await;

    assert!(!console.clear_agents(false));
    assert_eq!(console.agents().len(), 1);
    assert_eq!(AgentStore::open(dir.path()).unwrap().load().len(), 1);

    assert!(console.clear_agents(true));
    assert!(console.agents().is_empty());
    assert!(AgentStore::open(dir.path()).unwrap().load().is_empty());
}

#[tokio::test]
async fn test_create_without_admin_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let mut console = console(dir.path(), Arc::clone(&ledger), None);

    let result = console.create_and_fund_agents(2).await;
    assert!(matches!(result, Err(ConsoleError::NoAdminKey)));
    assert!(console.agents().is_empty());
    assert!(ledger.calls().is_empty());
}

#[tokio::test]
async fn test_create_and_fund_persists_agents() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let mut console = console(dir.path(), Arc::clone(&ledger), Some(ADMIN_KEY));
    assert!(console.admin_address().is_some());

    let results = console.create_and_fund_agents(2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.is_success()));
    assert_eq!(ledger.calls().len(), 4);
    assert_eq!(
        console.log().entries().find(|e| e.message.starts_with("Funded")).unwrap().message,
        "Funded 2/2 agents successfully."
    );

    let stored = AgentStore::open(dir.path()).unwrap().load();
    assert_eq!(stored.len(), 2);
    for agent in &stored {
        assert_eq!(agent.native_balance, "0.001");
        assert_eq!(agent.token_balance, "100.0");
    }

    assert!(matches!(
        console.create_and_fund_agents(0).await,
        Err(ConsoleError::Generate(_))
    ));
}

#[tokio::test]
async fn test_join_then_settle_updates_store() {
    let dir = tempfile::tempdir().unwrap();
    let agents = vec![fresh_agent(), fresh_agent(), fresh_agent()];
    let rejected = agents[1].parsed_address().unwrap();

    let ledger = Arc::new(ScriptedLedger {
        reject_entry: Some(rejected),
        ..Default::default()
    });
    for agent in &agents {
        ledger.credit_token(agent.parsed_address().unwrap(), whole(100));
    }
    let mut console = console(dir.path(), Arc::clone(&ledger), None);
    console.import_csv(&csv::encode(&agents)).await;

    let selection = vec![
        agents[0].address.clone(),
        agents[1].address.clone(),
        agents[0].address.to_lowercase(),
        "0x000000000000000000000000000000000000dEaD".to_string(),
    ];
    let results = console.join_lottery(&snapshot(3, true), &selection).await.unwrap();

    assert_eq!(results.len(), 2);
    assert!(results[0].is_success());
    assert_eq!(
        results[1].error(),
        Some("execution reverted: Already participating")
    );
    assert!(console.has_pending_refresh());

    console.settle().await;
    assert!(!console.has_pending_refresh());

    let stored = AgentStore::open(dir.path()).unwrap().load();
    assert_eq!(stored[0].token_balance, "95.0");
    assert_eq!(stored[1].token_balance, "100.0");
    assert_eq!(stored[2].token_balance, "100.0");
}

#[tokio::test]
async fn test_join_refuses_closed_lottery() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let agent = fresh_agent();
    let mut console = console(dir.path(), Arc::clone(&ledger), None);
    console.import_csv(&csv::encode(&[agent.clone()])).await;

    let result = console.join_lottery(&snapshot(9, false), &[agent.address.clone()]).await;
    assert!(matches!(result, Err(ConsoleError::LotteryClosed(9))));

    let result = console.join_lottery(&snapshot(9, true), &[]).await;
    assert!(matches!(result, Err(ConsoleError::NothingSelected)));
    assert!(!ledger.calls().iter().any(|c| c.starts_with("approve")));
}

#[tokio::test]
async fn test_unbalanced_split_needs_force() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console_in(dir.path());
    let params = CreateLotteryParams {
        token: TOKEN.parse().unwrap(),
        participation_fee: whole(1),
        max_participants: 10,
        draw_time: 1_900_000_000,
        prize_percentage: 60,
        investment_percentage: 30,
        profit_percentage: 5,
    };

    assert!(matches!(
        console.create_lottery(&params, false).await,
        Err(ConsoleError::UnbalancedSplit(95))
    ));
    // forced through, but there is no admin key to sign with
    let err = console.create_lottery(&params, true).await.unwrap_err();
    assert!(err.to_string().contains("no signing method available"));
}

#[tokio::test]
async fn test_lottery_query_failure_degrades_to_warning() {
    let dir = tempfile::tempdir().unwrap();
    let mut console = console_in(dir.path());

    assert!(console.load_lotteries().await.is_none());
    let latest = console.log().latest().unwrap();
    assert_eq!(latest.level, lottery_console::status::Level::Warning);
    assert!(latest.message.contains("offline"));
}

#[tokio::test]
async fn test_unsaved_keys_are_never_funded() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger::default());
    let mut console = console(dir.path(), Arc::clone(&ledger), Some(ADMIN_KEY));
    // the record path is taken by a directory, so every save fails
    std::fs::create_dir(dir.path().join("lottery_console_agents.json")).unwrap();

    let result = console.create_and_fund_agents(2).await;

    assert!(matches!(result, Err(ConsoleError::Store(_))));
    assert!(ledger.calls().is_empty());
    assert!(console.agents().is_empty());
    assert!(console
        .log()
        .entries()
        .any(|e| e.message == "Funding aborted: new agent keys could not be saved."));
    assert!(!console.log().entries().any(|e| e.message.starts_with("Funded")));
}

#[tokio::test]
async fn test_stale_refresh_is_reported_as_warning() {
    use lottery_console::status::Level;

    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger {
        decimals_unavailable: true,
        ..Default::default()
    });
    let mut console = console(dir.path(), Arc::clone(&ledger), None);
    let agent = fresh_agent();
    console.import_csv(&csv::encode(&[agent.clone()])).await;

    console.refresh_balances().await;

    let latest = console.log().latest().unwrap();
    assert_eq!(latest.level, Level::Warning);
    assert!(latest.message.starts_with("Failed to refresh balances"));
    assert!(!console
        .log()
        .entries()
        .any(|e| e.message == "Agent balances updated."));
    assert_eq!(console.agents()[0], agent);
}

#[tokio::test]
async fn test_stale_background_refresh_is_reported_on_settle() {
    use lottery_console::status::Level;

    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(ScriptedLedger {
        decimals_unavailable: true,
        ..Default::default()
    });
    let mut console = console(dir.path(), Arc::clone(&ledger), None);
    let agent = fresh_agent();
    console.import_csv(&csv::encode(&[agent.clone()])).await;

    console
        .join_lottery(&snapshot(2, true), &[agent.address.clone()])
        .await
        .unwrap();
    console.settle().await;

    let latest = console.log().latest().unwrap();
    assert_eq!(latest.level, Level::Warning);
    assert!(latest.message.starts_with("Failed to refresh balances"));
}
