//! API Request and Response Models

use crate::games::types::{DrawResult, Round, RoundId, RoundStatus, UserId, Wager, WagerStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResponse {
    pub round_id: RoundId,
    pub issue_number: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub status: RoundStatus,
    pub seconds_remaining: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keno_data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<DrawResult>,
}

impl RoundResponse {
    pub fn from_round(round: Round, now: DateTime<Utc>) -> Self {
        let seconds_remaining = if round.status == RoundStatus::Open {
            round.seconds_remaining(now)
        } else {
            0
        };
        Self {
            round_id: round.id,
            issue_number: round.issue_number,
            open_time: round.open_time,
            close_time: round.close_time,
            status: round.status,
            seconds_remaining,
            keno_data: round.draw,
            result: round.result,
        }
    }
}

/// POST /api/v1/bets
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBetRequest {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub bet_type: String,
    /// Only read for `number` bets
    #[serde(default)]
    pub bet_value: u8,
    /// Decimal stake, e.g. 12.5
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetResponse {
    pub id: u64,
    pub user_id: UserId,
    pub round_id: RoundId,
    pub bet_type: String,
    pub bet_value: u8,
    pub amount: f64,
    pub odds: f64,
    pub status: WagerStatus,
    pub win_amount: f64,
    pub created_at: DateTime<Utc>,
}

impl From<Wager> for BetResponse {
    fn from(wager: Wager) -> Self {
        Self {
            id: wager.id,
            user_id: wager.user_id,
            round_id: wager.round_id,
            bet_type: wager.category.to_string(),
            bet_value: wager.value,
            amount: wager.stake.to_decimal(),
            odds: wager.multiplier.to_decimal(),
            status: wager.status,
            win_amount: wager.win_amount.to_decimal(),
            created_at: wager.placed_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BetsQuery {
    pub user_id: UserId,
    #[serde(default = "default_bets_limit")]
    pub limit: usize,
}

fn default_bets_limit() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}
