//! Wager placement
//!
//! Validates a wager against the open round and hands it to the store, which
//! re-checks the round and debits the stake in the same unit. A wager that
//! loses the race with close is refused there, not here.

use crate::errors::{Pc28Result, PlacementError};
use crate::game_store::{check_round_accepts, RoundStore};
use crate::games::odds::multiplier_for;
use crate::games::types::{Amount, BetCategory, NewWager, RoundId, UserId, Wager};
use crate::metrics::GameMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Highest sum a draw can produce, and so the highest number bet
pub const MAX_NUMBER_VALUE: u8 = 27;

/// A wager as requested by a player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceWager {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub category: String,
    #[serde(default)]
    pub value: u8,
    pub stake: Amount,
}

pub struct WagerDesk {
    store: Arc<dyn RoundStore>,
    metrics: GameMetrics,
    opening_balance: Option<Amount>,
}

impl WagerDesk {
    pub fn new(store: Arc<dyn RoundStore>, metrics: GameMetrics) -> Self {
        Self {
            store,
            metrics,
            opening_balance: None,
        }
    }

    /// Open an account with `balance` for a first-time player, once the
    /// wager has passed validation
    pub fn with_opening_balance(mut self, balance: Amount) -> Self {
        self.opening_balance = Some(balance);
        self
    }

    pub async fn place_wager(&self, request: PlaceWager) -> Pc28Result<Wager> {
        self.place_wager_at(request, Utc::now()).await
    }

    /// Place as of `now`; the multiplier is frozen from the current odds
    pub async fn place_wager_at(&self, request: PlaceWager, now: DateTime<Utc>) -> Pc28Result<Wager> {
        let category = request
            .category
            .parse::<BetCategory>()
            .unwrap_or(BetCategory::Unknown);
        let multiplier = multiplier_for(category)
            .ok_or_else(|| PlacementError::UnknownCategory(request.category.clone()))?;

        let value = if category == BetCategory::Number {
            if request.value > MAX_NUMBER_VALUE {
                return Err(PlacementError::ValueOutOfRange(request.value).into());
            }
            request.value
        } else {
            0
        };

        if !request.stake.is_positive() {
            return Err(PlacementError::NonPositiveStake.into());
        }

        let round = self
            .store
            .find_round(request.round_id)
            .await?
            .ok_or(PlacementError::RoundNotFound(request.round_id))?;
        check_round_accepts(&round, now)?;

        if let Some(balance) = self.opening_balance {
            self.store.ensure_account(request.user_id, balance).await?;
        }

        let wager = self
            .store
            .place_wager(NewWager {
                user_id: request.user_id,
                round_id: round.id,
                category,
                value,
                stake: request.stake,
                multiplier,
                placed_at: now,
            })
            .await
            .map_err(|e| {
                debug!(user_id = request.user_id, round_id = round.id, "wager refused: {}", e);
                e
            })?;

        self.metrics.wagers_placed.inc();
        info!(
            wager_id = wager.id,
            user_id = wager.user_id,
            round_id = wager.round_id,
            category = %wager.category,
            stake = %wager.stake,
            "wager placed"
        );
        Ok(wager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Pc28Error;
    use crate::game_store::conformance::t0;
    use crate::game_store::MemoryStore;
    use crate::games::types::{Multiplier, Round, WagerStatus};
    use chrono::Duration;

    async fn desk_with_round() -> (WagerDesk, Arc<dyn RoundStore>, Round) {
        let store: Arc<dyn RoundStore> = Arc::new(MemoryStore::new());
        let round = store
            .create_round(Round::open_at(t0(), Duration::seconds(55)))
            .await
            .unwrap();
        store.ensure_account(1, Amount::units(100)).await.unwrap();
        let desk = WagerDesk::new(store.clone(), GameMetrics::new().unwrap());
        (desk, store, round)
    }

    fn request(round_id: RoundId, category: &str, value: u8, stake: Amount) -> PlaceWager {
        PlaceWager {
            user_id: 1,
            round_id,
            category: category.to_string(),
            value,
            stake,
        }
    }

    fn rejection(result: Pc28Result<Wager>) -> PlacementError {
        match result {
            Err(Pc28Error::Placement(e)) => e,
            other => panic!("expected placement error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_places_and_freezes_multiplier() {
        let (desk, store, round) = desk_with_round().await;
        let now = t0() + Duration::seconds(10);

        let wager = desk
            .place_wager_at(request(round.id, "big_odd", 5, Amount::units(40)), now)
            .await
            .unwrap();

        assert_eq!(wager.multiplier, Multiplier(370));
        assert_eq!(wager.value, 0);
        assert_eq!(wager.status, WagerStatus::Pending);
        assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(60));
    }

    #[tokio::test]
    async fn test_number_bet_bounds() {
        let (desk, _, round) = desk_with_round().await;
        let now = t0() + Duration::seconds(10);

        let ok = desk
            .place_wager_at(request(round.id, "number", 27, Amount::units(1)), now)
            .await
            .unwrap();
        assert_eq!(ok.value, 27);
        assert_eq!(ok.multiplier, Multiplier(980));

        let err = rejection(
            desk.place_wager_at(request(round.id, "number", 28, Amount::units(1)), now)
                .await,
        );
        assert!(matches!(err, PlacementError::ValueOutOfRange(28)));
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let (desk, store, round) = desk_with_round().await;
        let now = t0() + Duration::seconds(10);

        let err = rejection(
            desk.place_wager_at(request(round.id, "leopard", 0, Amount::units(1)), now)
                .await,
        );
        assert!(matches!(err, PlacementError::UnknownCategory(ref name) if name == "leopard"));

        let err = rejection(desk.place_wager_at(request(round.id, "odd", 0, Amount::ZERO), now).await);
        assert!(matches!(err, PlacementError::NonPositiveStake));

        let err = rejection(desk.place_wager_at(request(77, "odd", 0, Amount::units(1)), now).await);
        assert!(matches!(err, PlacementError::RoundNotFound(77)));

        assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(100));
    }

    #[tokio::test]
    async fn test_opening_balance_only_after_validation() {
        let (desk, store, round) = desk_with_round().await;
        let desk = desk.with_opening_balance(Amount::units(30));
        let now = t0() + Duration::seconds(10);
        let newcomer = |category: &str, stake: Amount, round_id: RoundId| PlaceWager {
            user_id: 8,
            round_id,
            category: category.to_string(),
            value: 0,
            stake,
        };

        assert!(desk.place_wager_at(newcomer("leopard", Amount::units(1), round.id), now).await.is_err());
        assert!(desk.place_wager_at(newcomer("odd", Amount::ZERO, round.id), now).await.is_err());
        assert!(desk.place_wager_at(newcomer("odd", Amount::units(1), 77), now).await.is_err());
        assert!(store.account(8).await.unwrap().is_none());

        desk.place_wager_at(newcomer("odd", Amount::units(10), round.id), now)
            .await
            .unwrap();
        assert_eq!(store.account(8).await.unwrap().unwrap().balance, Amount::units(20));

        // Existing balances are left alone
        desk.place_wager_at(request(round.id, "even", 0, Amount::units(5)), now)
            .await
            .unwrap();
        assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(95));
    }

    #[tokio::test]
    async fn test_rejects_after_close_time() {
        let (desk, _, round) = desk_with_round().await;
        let err = rejection(
            desk.place_wager_at(request(round.id, "odd", 0, Amount::units(1)), round.close_time)
                .await,
        );
        assert!(matches!(err, PlacementError::RoundNotOpen { .. }));
    }
}
