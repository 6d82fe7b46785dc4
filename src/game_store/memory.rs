//! In-process store. One write guard covers every multi-row mutation.

use super::{
    check_close_transition, check_round_accepts, check_settle_transition, check_wager_pending,
    credit, debit, resolved, RoundStore,
};
use crate::errors::{Pc28Result, PlacementError, StorageError};
use crate::games::types::{
    Account, Amount, NewWager, Round, RoundId, RoundStatus, UserId, Wager, WagerId,
    WagerOutcome, WagerStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    next_round_id: RoundId,
    next_wager_id: WagerId,
    rounds: BTreeMap<RoundId, Round>,
    wagers: BTreeMap<WagerId, Wager>,
    round_wagers: HashMap<RoundId, Vec<WagerId>>,
    accounts: HashMap<UserId, Account>,
    issue_numbers: HashSet<String>,
}

impl Tables {
    fn round(&self, round_id: RoundId) -> Pc28Result<&Round> {
        self.rounds
            .get(&round_id)
            .ok_or_else(|| StorageError::NotFound(format!("round {}", round_id)).into())
    }

    fn round_mut(&mut self, round_id: RoundId) -> Pc28Result<&mut Round> {
        self.rounds
            .get_mut(&round_id)
            .ok_or_else(|| StorageError::NotFound(format!("round {}", round_id)).into())
    }

    fn pending_wager_ids(&self, round_id: RoundId) -> Vec<WagerId> {
        self.round_wagers
            .get(&round_id)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|id| {
                        self.wagers
                            .get(id)
                            .map_or(false, |w| w.status == WagerStatus::Pending)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve one wager; nothing is written unless every check passes
    fn resolve(&mut self, wager_id: WagerId, outcome: WagerOutcome, amount: Amount) -> Pc28Result<()> {
        let wager = self
            .wagers
            .get(&wager_id)
            .ok_or_else(|| StorageError::NotFound(format!("wager {}", wager_id)))?;
        check_wager_pending(wager)?;

        let account = self.accounts.get(&wager.user_id).ok_or_else(|| {
            StorageError::NotFound(format!("account {} for wager {}", wager.user_id, wager_id))
        })?;
        let new_balance = credit(account, amount)?;
        let updated = resolved(wager.clone(), outcome);
        let user_id = updated.user_id;

        self.wagers.insert(wager_id, updated);
        if let Some(account) = self.accounts.get_mut(&user_id) {
            account.balance = new_balance;
        }
        Ok(())
    }
}

/// Store backed by in-memory maps
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoundStore for MemoryStore {
    async fn create_round(&self, mut round: Round) -> Pc28Result<Round> {
        let mut t = self.tables.write().await;
        if let Some(active) = t.rounds.values().find(|r| r.status.is_active()) {
            return Err(StorageError::Conflict(format!(
                "round {} is still {}",
                active.id, active.status
            ))
            .into());
        }
        if t.issue_numbers.contains(&round.issue_number) {
            return Err(StorageError::Conflict(format!(
                "issue number {} already used",
                round.issue_number
            ))
            .into());
        }

        t.next_round_id += 1;
        round.id = t.next_round_id;
        t.issue_numbers.insert(round.issue_number.clone());
        t.rounds.insert(round.id, round.clone());
        Ok(round)
    }

    async fn find_open_round(&self) -> Pc28Result<Option<Round>> {
        let t = self.tables.read().await;
        Ok(t.rounds.values().rev().find(|r| r.status.is_active()).cloned())
    }

    async fn find_round(&self, round_id: RoundId) -> Pc28Result<Option<Round>> {
        Ok(self.tables.read().await.rounds.get(&round_id).cloned())
    }

    async fn find_rounds_past_close_deadline(&self, now: DateTime<Utc>) -> Pc28Result<Vec<Round>> {
        let t = self.tables.read().await;
        Ok(t.rounds
            .values()
            .filter(|r| r.status == RoundStatus::Open && r.close_time <= now)
            .cloned()
            .collect())
    }

    async fn update_round_close_result(&self, round: &Round) -> Pc28Result<()> {
        let mut t = self.tables.write().await;
        let stored = t.round_mut(round.id)?;
        check_close_transition(stored, round)?;
        stored.draw = round.draw.clone();
        stored.result = round.result;
        stored.status = RoundStatus::Closed;
        Ok(())
    }

    async fn find_closed_unsettled_rounds(&self) -> Pc28Result<Vec<Round>> {
        let t = self.tables.read().await;
        Ok(t.rounds
            .values()
            .filter(|r| r.status == RoundStatus::Closed)
            .cloned()
            .collect())
    }

    async fn find_pending_wagers(&self, round_id: RoundId) -> Pc28Result<Vec<Wager>> {
        let t = self.tables.read().await;
        Ok(t.pending_wager_ids(round_id)
            .into_iter()
            .filter_map(|id| t.wagers.get(&id).cloned())
            .collect())
    }

    async fn update_wager_outcome_and_credit(
        &self,
        wager_id: WagerId,
        outcome: WagerOutcome,
        credit: Amount,
    ) -> Pc28Result<()> {
        self.tables.write().await.resolve(wager_id, outcome, credit)
    }

    async fn mark_round_settled(&self, round_id: RoundId) -> Pc28Result<()> {
        let mut t = self.tables.write().await;
        let stored = t.round_mut(round_id)?;
        check_settle_transition(stored)?;
        stored.status = RoundStatus::Settled;
        Ok(())
    }

    async fn place_wager(&self, new: NewWager) -> Pc28Result<Wager> {
        let mut t = self.tables.write().await;
        let round = t
            .rounds
            .get(&new.round_id)
            .ok_or(PlacementError::RoundNotFound(new.round_id))?;
        check_round_accepts(round, new.placed_at)?;

        let account = t
            .accounts
            .get(&new.user_id)
            .ok_or(PlacementError::AccountNotFound(new.user_id))?;
        let new_balance = debit(account, new.stake)?;

        t.next_wager_id += 1;
        let wager = Wager {
            id: t.next_wager_id,
            user_id: new.user_id,
            round_id: new.round_id,
            category: new.category,
            value: new.value,
            stake: new.stake,
            multiplier: new.multiplier,
            status: WagerStatus::Pending,
            win_amount: Amount::ZERO,
            placed_at: new.placed_at,
        };

        if let Some(account) = t.accounts.get_mut(&new.user_id) {
            account.balance = new_balance;
        }
        t.round_wagers.entry(wager.round_id).or_default().push(wager.id);
        t.wagers.insert(wager.id, wager.clone());
        Ok(wager)
    }

    async fn void_round(&self, round_id: RoundId) -> Pc28Result<usize> {
        let mut t = self.tables.write().await;
        let stored = t.round(round_id)?;
        if !stored.status.can_void() {
            return Err(StorageError::StaleState(format!(
                "round {} is {}, cannot void",
                round_id, stored.status
            ))
            .into());
        }

        let mut refunded = 0;
        for wager_id in t.pending_wager_ids(round_id) {
            let stake = match t.wagers.get(&wager_id) {
                Some(w) => w.stake,
                None => continue,
            };
            t.resolve(wager_id, WagerOutcome::Refunded, stake)?;
            refunded += 1;
        }

        let stored = t.round_mut(round_id)?;
        stored.status = RoundStatus::Void;
        stored.result = None;
        Ok(refunded)
    }

    async fn recent_settled_rounds(&self, limit: usize) -> Pc28Result<Vec<Round>> {
        let t = self.tables.read().await;
        Ok(t.rounds
            .values()
            .rev()
            .filter(|r| r.status == RoundStatus::Settled)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn wagers_for_user(&self, user_id: UserId, limit: usize) -> Pc28Result<Vec<Wager>> {
        let t = self.tables.read().await;
        Ok(t.wagers
            .values()
            .rev()
            .filter(|w| w.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn account(&self, user_id: UserId) -> Pc28Result<Option<Account>> {
        Ok(self.tables.read().await.accounts.get(&user_id).cloned())
    }

    async fn ensure_account(&self, user_id: UserId, opening_balance: Amount) -> Pc28Result<Account> {
        let mut t = self.tables.write().await;
        Ok(t.accounts
            .entry(user_id)
            .or_insert_with(|| Account {
                user_id,
                balance: opening_balance,
            })
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::super::conformance;
    use super::*;

    #[tokio::test]
    async fn test_round_lifecycle() {
        conformance::round_lifecycle(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_wager_settlement() {
        conformance::wager_settlement(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_late_wager_rejected() {
        conformance::late_wager_rejected(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_void_refunds_pending() {
        conformance::void_refunds_pending(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_void_closed_round() {
        conformance::void_closed_round(&MemoryStore::new()).await;
    }

    #[tokio::test]
    async fn test_ensure_account_is_idempotent() {
        conformance::ensure_account_is_idempotent(&MemoryStore::new()).await;
    }
}
