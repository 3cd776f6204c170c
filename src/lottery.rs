use std::sync::Arc;

use alloy_primitives::{Address, TxHash, U256};
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde::Serialize;
use tracing::{debug, info};

use crate::chain::{ChainError, EvmClient};

sol! {
    interface ILotteryManager {
        struct LotteryInfo {
            address tokenAddress;
            uint256 participationFee;
            uint256 refundableAmount;
            uint256 maxParticipants;
            uint256 drawTime;
            uint256 prizePercentage;
            uint256 investmentPercentage;
            uint256 profitPercentage;
            bool isActive;
            bool isDrawn;
            bool isCancelled;
            address winner;
            uint256 voteCount;
            uint256 drawTimestamp;
            address[] participants;
        }

        function createLottery(
            address _tokenAddress,
            uint256 _participationFee,
            uint256 _maxParticipants,
            uint256 _drawTime,
            uint256 _prizePercentage,
            uint256 _investmentPercentage,
            uint256 _profitPercentage
        ) external;
        function drawWinner(uint256 _lotteryId) external;
        function cancelLottery(uint256 _lotteryId) external;
        function enterLottery(uint256 _lotteryId) external;
        function getActiveLotteries() external view returns (uint256[] memory);
        function getDrawnLotteries() external view returns (uint256[] memory);
        function getLotteryInfo(uint256 _lotteryId) external view returns (LotteryInfo memory info);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LotteryError {
    #[error("no signing method available: admin key is not configured")]
    NoSigner,
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Point-in-time view of one lottery, never written back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotterySnapshot {
    pub id: u64,
    pub token_address: Address,
    pub participation_fee: U256,
    pub refundable_amount: U256,
    pub max_participants: u64,
    pub draw_time: u64,
    pub prize_percentage: u64,
    pub investment_percentage: u64,
    pub profit_percentage: u64,
    pub is_active: bool,
    pub is_drawn: bool,
    pub is_cancelled: bool,
    pub winner: Address,
    pub vote_count: u64,
    pub draw_timestamp: u64,
    pub participants: Vec<Address>,
}

fn saturating_u64(v: U256) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

impl LotterySnapshot {
    pub fn from_info(id: u64, info: ILotteryManager::LotteryInfo) -> Self {
        Self {
            id,
            token_address: info.tokenAddress,
            participation_fee: info.participationFee,
            refundable_amount: info.refundableAmount,
            max_participants: saturating_u64(info.maxParticipants),
            draw_time: saturating_u64(info.drawTime),
            prize_percentage: saturating_u64(info.prizePercentage),
            investment_percentage: saturating_u64(info.investmentPercentage),
            profit_percentage: saturating_u64(info.profitPercentage),
            is_active: info.isActive,
            is_drawn: info.isDrawn,
            is_cancelled: info.isCancelled,
            winner: info.winner,
            vote_count: saturating_u64(info.voteCount),
            draw_timestamp: saturating_u64(info.drawTimestamp),
            participants: info.participants,
        }
    }

    pub fn status_label(&self) -> &'static str {
        if self.is_active {
            "ACTIVE"
        } else if self.is_drawn {
            "DRAWN"
        } else {
            "CANCELLED"
        }
    }

    /// Whether agents may still enter
    pub fn accepts_entries(&self) -> bool {
        self.is_active && !self.is_cancelled
    }

    pub fn is_full(&self) -> bool {
        self.max_participants > 0 && self.participants.len() as u64 >= self.max_participants
    }

    /// Countdown to the draw time, relative to `now` (unix seconds)
    pub fn time_left(&self, now: i64) -> String {
        let diff = self.draw_time as i64 - now;
        if diff <= 0 {
            return "Ready to Draw".to_string();
        }
        format!("{}h {}m {}s", diff / 3600, (diff % 3600) / 60, diff % 60)
    }
}

/// Arguments for `createLottery`; the fee is in the token's smallest unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLotteryParams {
    pub token: Address,
    pub participation_fee: U256,
    pub max_participants: u64,
    pub draw_time: u64,
    pub prize_percentage: u64,
    pub investment_percentage: u64,
    pub profit_percentage: u64,
}

impl CreateLotteryParams {
    pub fn percentage_total(&self) -> u64 {
        self.prize_percentage
            .saturating_add(self.investment_percentage)
            .saturating_add(self.profit_percentage)
    }
}

/// Parse a draw time given as unix seconds, RFC 3339, or local `YYYY-MM-DDTHH:MM`
pub fn parse_draw_time(input: &str) -> Option<u64> {
    let input = input.trim();
    if let Ok(secs) = input.parse::<u64>() {
        return Some(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return u64::try_from(dt.timestamp()).ok();
    }
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M").ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    u64::try_from(local.timestamp()).ok()
}

/// Active and drawn lotteries, newest first
#[derive(Debug, Clone, Default, Serialize)]
pub struct LotteryBoard {
    pub active: Vec<LotterySnapshot>,
    pub drawn: Vec<LotterySnapshot>,
}

/// Client for the lottery manager contract
pub struct LotteryManager {
    client: Arc<EvmClient>,
    contract: Address,
    admin: Option<PrivateKeySigner>,
}

impl LotteryManager {
    pub fn new(client: Arc<EvmClient>, contract: Address, admin: Option<PrivateKeySigner>) -> Self {
        Self {
            client,
            contract,
            admin,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    fn admin(&self) -> Result<&PrivateKeySigner, LotteryError> {
        self.admin.as_ref().ok_or(LotteryError::NoSigner)
    }

    pub async fn active_lotteries(&self) -> Result<Vec<U256>, LotteryError> {
        let ids = self
            .client
            .call(self.contract, &ILotteryManager::getActiveLotteriesCall {})
            .await?;
        Ok(ids._0)
    }

    pub async fn drawn_lotteries(&self) -> Result<Vec<U256>, LotteryError> {
        let ids = self
            .client
            .call(self.contract, &ILotteryManager::getDrawnLotteriesCall {})
            .await?;
        Ok(ids._0)
    }

    pub async fn lottery_info(&self, id: u64) -> Result<LotterySnapshot, LotteryError> {
        let ret = self
            .client
            .call(
                self.contract,
                &ILotteryManager::getLotteryInfoCall {
                    _lotteryId: U256::from(id),
                },
            )
            .await?;
        Ok(LotterySnapshot::from_info(id, ret.info))
    }

    async fn snapshots(&self, ids: Vec<U256>) -> Result<Vec<LotterySnapshot>, LotteryError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.push(self.lottery_info(saturating_u64(id)).await?);
        }
        out.reverse();
        Ok(out)
    }

    /// Fetch both lists with their details
    pub async fn load_board(&self) -> Result<LotteryBoard, LotteryError> {
        let active = self.active_lotteries().await?;
        let drawn = self.drawn_lotteries().await?;
        debug!(active = active.len(), drawn = drawn.len(), "fetched lottery ids");

        Ok(LotteryBoard {
            active: self.snapshots(active).await?,
            drawn: self.snapshots(drawn).await?,
        })
    }

    pub async fn create_lottery(
        &self,
        params: &CreateLotteryParams,
    ) -> Result<TxHash, LotteryError> {
        let call = ILotteryManager::createLotteryCall {
            _tokenAddress: params.token,
            _participationFee: params.participation_fee,
            _maxParticipants: U256::from(params.max_participants),
            _drawTime: U256::from(params.draw_time),
            _prizePercentage: U256::from(params.prize_percentage),
            _investmentPercentage: U256::from(params.investment_percentage),
            _profitPercentage: U256::from(params.profit_percentage),
        };
        let hash = self.client.transact(self.admin()?, self.contract, &call).await?;
        info!(tx_hash = %hash, "lottery created");
        Ok(hash)
    }

    pub async fn draw_winner(&self, id: u64) -> Result<TxHash, LotteryError> {
        let call = ILotteryManager::drawWinnerCall {
            _lotteryId: U256::from(id),
        };
        let hash = self.client.transact(self.admin()?, self.contract, &call).await?;
        info!(lottery_id = id, tx_hash = %hash, "winner drawn");
        Ok(hash)
    }

    pub async fn cancel_lottery(&self, id: u64) -> Result<TxHash, LotteryError> {
        let call = ILotteryManager::cancelLotteryCall {
            _lotteryId: U256::from(id),
        };
        let hash = self.client.transact(self.admin()?, self.contract, &call).await?;
        info!(lottery_id = id, tx_hash = %hash, "lottery cancelled");
        Ok(hash)
    }
}
