//! Transactional record store for rounds, wagers and balances.
//!
//! The engine only talks to [`RoundStore`]. Every method is atomic on its own;
//! methods that touch several rows (wager + balance, round + result) apply all
//! of their writes or none. Transitions are guarded by the stored status, so a
//! repeated or racing call sees `StorageError::StaleState` instead of writing
//! twice.

pub mod memory;
pub mod rocks;

use crate::errors::{Pc28Error, Pc28Result, PlacementError, StorageError};
use crate::games::types::{
    Account, Amount, NewWager, Round, RoundId, RoundStatus, UserId, Wager, WagerId,
    WagerOutcome, WagerStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use rocks::RocksStore;

/// Store operations consumed by the scheduler, settlement engine and API
#[async_trait]
pub trait RoundStore: Send + Sync {
    /// Insert a new round and assign its id. Fails with `Conflict` if another
    /// round is already open or pending, or the issue number is taken.
    async fn create_round(&self, round: Round) -> Pc28Result<Round>;

    /// Newest round in `open` or `pending` status
    async fn find_open_round(&self) -> Pc28Result<Option<Round>>;

    async fn find_round(&self, round_id: RoundId) -> Pc28Result<Option<Round>>;

    /// Open rounds whose close time is at or before `now`
    async fn find_rounds_past_close_deadline(&self, now: DateTime<Utc>) -> Pc28Result<Vec<Round>>;

    /// Store draw and result and move the round from `open` to `closed`
    async fn update_round_close_result(&self, round: &Round) -> Pc28Result<()>;

    async fn find_closed_unsettled_rounds(&self) -> Pc28Result<Vec<Round>>;

    async fn find_pending_wagers(&self, round_id: RoundId) -> Pc28Result<Vec<Wager>>;

    /// Resolve a pending wager and credit its owner by `credit` in one unit
    async fn update_wager_outcome_and_credit(
        &self,
        wager_id: WagerId,
        outcome: WagerOutcome,
        credit: Amount,
    ) -> Pc28Result<()>;

    /// Move a round from `closed` to `settled`
    async fn mark_round_settled(&self, round_id: RoundId) -> Pc28Result<()>;

    /// Debit the stake and insert a pending wager in one unit. Rejects the
    /// wager if the round is no longer open at `new.placed_at`.
    async fn place_wager(&self, new: NewWager) -> Pc28Result<Wager>;

    /// Void a round that has not settled, refunding each pending wager.
    /// Returns the number of wagers refunded.
    async fn void_round(&self, round_id: RoundId) -> Pc28Result<usize>;

    /// Settled rounds, newest first
    async fn recent_settled_rounds(&self, limit: usize) -> Pc28Result<Vec<Round>>;

    /// A user's wagers, newest first
    async fn wagers_for_user(&self, user_id: UserId, limit: usize) -> Pc28Result<Vec<Wager>>;

    async fn account(&self, user_id: UserId) -> Pc28Result<Option<Account>>;

    /// Create the account with `opening_balance` if missing; existing
    /// accounts are returned untouched
    async fn ensure_account(&self, user_id: UserId, opening_balance: Amount) -> Pc28Result<Account>;
}

pub(crate) fn check_close_transition(stored: &Round, update: &Round) -> Pc28Result<()> {
    if update.status != RoundStatus::Closed || update.result.is_none() {
        return Err(Pc28Error::InvalidInput(format!(
            "round {} close update must carry a result and closed status",
            update.id
        )));
    }
    if stored.status != RoundStatus::Open {
        return Err(StorageError::StaleState(format!(
            "round {} is {}, not open",
            stored.id, stored.status
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn check_settle_transition(stored: &Round) -> Pc28Result<()> {
    if stored.status != RoundStatus::Closed {
        return Err(StorageError::StaleState(format!(
            "round {} is {}, not closed",
            stored.id, stored.status
        ))
        .into());
    }
    Ok(())
}

pub(crate) fn check_wager_pending(wager: &Wager) -> Pc28Result<()> {
    if wager.status != WagerStatus::Pending {
        return Err(StorageError::StaleState(format!(
            "wager {} already {:?}",
            wager.id, wager.status
        ))
        .into());
    }
    Ok(())
}

/// Round must be open at placement time
pub(crate) fn check_round_accepts(round: &Round, at: DateTime<Utc>) -> Pc28Result<()> {
    if !round.is_open_at(at) {
        return Err(PlacementError::RoundNotOpen {
            round_id: round.id,
            status: round.status,
        }
        .into());
    }
    Ok(())
}

pub(crate) fn debit(account: &Account, stake: Amount) -> Pc28Result<Amount> {
    if account.balance < stake {
        return Err(PlacementError::InsufficientBalance {
            need: stake.to_string(),
            available: account.balance.to_string(),
        }
        .into());
    }
    account
        .balance
        .checked_sub(stake)
        .ok_or_else(|| Pc28Error::Overflow(format!("debit {} from {}", stake, account.balance)))
}

pub(crate) fn credit(account: &Account, amount: Amount) -> Pc28Result<Amount> {
    account
        .balance
        .checked_add(amount)
        .ok_or_else(|| Pc28Error::Overflow(format!("credit {} to {}", amount, account.balance)))
}

pub(crate) fn resolved(mut wager: Wager, outcome: WagerOutcome) -> Wager {
    wager.status = outcome.status();
    wager.win_amount = outcome.win_amount();
    wager
}
