//! Persistent store on RocksDB.
//!
//! Key layout:
//! - `round:{id}` -> Round (json)
//! - `round_status:{status}:{id}` -> empty, one per round
//! - `issue:{issue_number}` -> round id
//! - `wager:{id}` -> Wager (json)
//! - `pending:{round_id}{wager_id}` -> empty while the wager is pending
//! - `user_wagers:{user_id}{wager_id}` -> empty
//! - `account:{user_id}` -> Account (json)
//! - `meta:next_round_id`, `meta:next_wager_id` -> u64
//!
//! Ids are big-endian so prefix scans come back in id order. Mutations hold
//! `write_lock` across their read-check-write sequence and land as one batch.

use super::{
    check_close_transition, check_round_accepts, check_settle_transition, check_wager_pending,
    credit, debit, resolved, RoundStore,
};
use crate::errors::{Pc28Result, PlacementError, StorageError};
use crate::games::types::{
    Account, Amount, NewWager, Round, RoundId, RoundStatus, UserId, Wager, WagerId,
    WagerOutcome, WagerStatus,
};
use crate::storage::{BatchOp, KvStorage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tokio::sync::Mutex;

const ROUND_PREFIX: &[u8] = b"round:";
const ROUND_STATUS_PREFIX: &str = "round_status:";
const ISSUE_PREFIX: &[u8] = b"issue:";
const WAGER_PREFIX: &[u8] = b"wager:";
const PENDING_PREFIX: &[u8] = b"pending:";
const USER_WAGERS_PREFIX: &[u8] = b"user_wagers:";
const ACCOUNT_PREFIX: &[u8] = b"account:";
const NEXT_ROUND_ID: &[u8] = b"meta:next_round_id";
const NEXT_WAGER_ID: &[u8] = b"meta:next_wager_id";

fn key(prefix: &[u8], parts: &[u64]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + parts.len() * 8);
    key.extend_from_slice(prefix);
    for part in parts {
        key.extend_from_slice(&part.to_be_bytes());
    }
    key
}

fn status_prefix(status: RoundStatus) -> Vec<u8> {
    format!("{}{}:", ROUND_STATUS_PREFIX, status).into_bytes()
}

fn status_key(status: RoundStatus, round_id: RoundId) -> Vec<u8> {
    key(&status_prefix(status), &[round_id])
}

fn issue_key(issue_number: &str) -> Vec<u8> {
    let mut key = ISSUE_PREFIX.to_vec();
    key.extend_from_slice(issue_number.as_bytes());
    key
}

/// Trailing u64 of an index key
fn trailing_id(key: &[u8]) -> Pc28Result<u64> {
    let tail = key
        .len()
        .checked_sub(8)
        .map(|start| &key[start..])
        .ok_or_else(|| StorageError::CorruptedData(format!("index key too short: {:?}", key)))?;
    let bytes: [u8; 8] = tail
        .try_into()
        .map_err(|_| StorageError::CorruptedData("index key tail".to_string()))?;
    Ok(u64::from_be_bytes(bytes))
}

fn encode<T: Serialize>(value: &T) -> Pc28Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| StorageError::WriteFailed(e.to_string()).into())
}

fn decode<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Pc28Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| StorageError::CorruptedData(format!("{}: {}", what, e)).into())
}

pub struct RocksStore {
    kv: KvStorage,
    write_lock: Mutex<()>,
}

impl RocksStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Pc28Result<Self> {
        Ok(Self {
            kv: KvStorage::open(path)?,
            write_lock: Mutex::new(()),
        })
    }

    fn read<T: DeserializeOwned>(&self, key: &[u8], what: &str) -> Pc28Result<Option<T>> {
        match self.kv.get(key)? {
            Some(bytes) => decode(what, &bytes).map(Some),
            None => Ok(None),
        }
    }

    fn load_round(&self, round_id: RoundId) -> Pc28Result<Option<Round>> {
        self.read(&key(ROUND_PREFIX, &[round_id]), "round")
    }

    fn require_round(&self, round_id: RoundId) -> Pc28Result<Round> {
        self.load_round(round_id)?
            .ok_or_else(|| StorageError::NotFound(format!("round {}", round_id)).into())
    }

    fn load_wager(&self, wager_id: WagerId) -> Pc28Result<Option<Wager>> {
        self.read(&key(WAGER_PREFIX, &[wager_id]), "wager")
    }

    fn load_account(&self, user_id: UserId) -> Pc28Result<Option<Account>> {
        self.read(&key(ACCOUNT_PREFIX, &[user_id]), "account")
    }

    fn next_id(&self, counter: &[u8]) -> Pc28Result<u64> {
        let current = match self.kv.get(counter)? {
            Some(bytes) => trailing_id(&bytes)?,
            None => 0,
        };
        Ok(current + 1)
    }

    fn rounds_with_status(&self, status: RoundStatus) -> Pc28Result<Vec<Round>> {
        let mut rounds = Vec::new();
        for (k, _) in self.kv.scan_prefix(&status_prefix(status))? {
            let id = trailing_id(&k)?;
            match self.load_round(id)? {
                Some(round) => rounds.push(round),
                None => tracing::warn!(round_id = id, "status index points at missing round"),
            }
        }
        Ok(rounds)
    }

    /// Ops that rewrite a round and move its status index entry
    fn round_ops(&self, previous: RoundStatus, round: &Round) -> Pc28Result<Vec<BatchOp>> {
        let mut ops = vec![BatchOp::Put(key(ROUND_PREFIX, &[round.id]), encode(round)?)];
        if previous != round.status {
            ops.push(BatchOp::Delete(status_key(previous, round.id)));
            ops.push(BatchOp::Put(status_key(round.status, round.id), Vec::new()));
        }
        Ok(ops)
    }

    /// Ops resolving one pending wager and crediting its owner
    fn resolve_ops(&self, wager_id: WagerId, outcome: WagerOutcome, amount: Amount) -> Pc28Result<Vec<BatchOp>> {
        let wager = self
            .load_wager(wager_id)?
            .ok_or_else(|| StorageError::NotFound(format!("wager {}", wager_id)))?;
        check_wager_pending(&wager)?;

        let mut account = self.load_account(wager.user_id)?.ok_or_else(|| {
            StorageError::NotFound(format!("account {} for wager {}", wager.user_id, wager_id))
        })?;
        account.balance = credit(&account, amount)?;

        let updated = resolved(wager, outcome);
        Ok(vec![
            BatchOp::Put(key(WAGER_PREFIX, &[wager_id]), encode(&updated)?),
            BatchOp::Delete(key(PENDING_PREFIX, &[updated.round_id, wager_id])),
            BatchOp::Put(key(ACCOUNT_PREFIX, &[account.user_id]), encode(&account)?),
        ])
    }
}

#[async_trait]
impl RoundStore for RocksStore {
    async fn create_round(&self, mut round: Round) -> Pc28Result<Round> {
        let _guard = self.write_lock.lock().await;

        for status in [RoundStatus::Open, RoundStatus::Pending] {
            if let Some((k, _)) = self.kv.scan_prefix(&status_prefix(status))?.into_iter().next() {
                return Err(StorageError::Conflict(format!(
                    "round {} is still {}",
                    trailing_id(&k)?,
                    status
                ))
                .into());
            }
        }
        if self.kv.get(&issue_key(&round.issue_number))?.is_some() {
            return Err(StorageError::Conflict(format!(
                "issue number {} already used",
                round.issue_number
            ))
            .into());
        }

        round.id = self.next_id(NEXT_ROUND_ID)?;
        self.kv.write(vec![
            BatchOp::Put(NEXT_ROUND_ID.to_vec(), round.id.to_be_bytes().to_vec()),
            BatchOp::Put(key(ROUND_PREFIX, &[round.id]), encode(&round)?),
            BatchOp::Put(status_key(round.status, round.id), Vec::new()),
            BatchOp::Put(issue_key(&round.issue_number), round.id.to_be_bytes().to_vec()),
        ])?;
        Ok(round)
    }

    async fn find_open_round(&self) -> Pc28Result<Option<Round>> {
        let mut active = self.rounds_with_status(RoundStatus::Open)?;
        active.extend(self.rounds_with_status(RoundStatus::Pending)?);
        Ok(active.into_iter().max_by_key(|r| r.id))
    }

    async fn find_round(&self, round_id: RoundId) -> Pc28Result<Option<Round>> {
        self.load_round(round_id)
    }

    async fn find_rounds_past_close_deadline(&self, now: DateTime<Utc>) -> Pc28Result<Vec<Round>> {
        Ok(self
            .rounds_with_status(RoundStatus::Open)?
            .into_iter()
            .filter(|r| r.close_time <= now)
            .collect())
    }

    async fn update_round_close_result(&self, round: &Round) -> Pc28Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.require_round(round.id)?;
        check_close_transition(&stored, round)?;

        stored.draw = round.draw.clone();
        stored.result = round.result;
        stored.status = RoundStatus::Closed;
        self.kv.write(self.round_ops(RoundStatus::Open, &stored)?)
    }

    async fn find_closed_unsettled_rounds(&self) -> Pc28Result<Vec<Round>> {
        self.rounds_with_status(RoundStatus::Closed)
    }

    async fn find_pending_wagers(&self, round_id: RoundId) -> Pc28Result<Vec<Wager>> {
        let mut wagers = Vec::new();
        for (k, _) in self.kv.scan_prefix(&key(PENDING_PREFIX, &[round_id]))? {
            if let Some(wager) = self.load_wager(trailing_id(&k)?)? {
                if wager.status == WagerStatus::Pending {
                    wagers.push(wager);
                }
            }
        }
        Ok(wagers)
    }

    async fn update_wager_outcome_and_credit(
        &self,
        wager_id: WagerId,
        outcome: WagerOutcome,
        credit: Amount,
    ) -> Pc28Result<()> {
        let _guard = self.write_lock.lock().await;
        let ops = self.resolve_ops(wager_id, outcome, credit)?;
        self.kv.write(ops)
    }

    async fn mark_round_settled(&self, round_id: RoundId) -> Pc28Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.require_round(round_id)?;
        check_settle_transition(&stored)?;
        stored.status = RoundStatus::Settled;
        self.kv.write(self.round_ops(RoundStatus::Closed, &stored)?)
    }

    async fn place_wager(&self, new: NewWager) -> Pc28Result<Wager> {
        let _guard = self.write_lock.lock().await;
        let round = self
            .load_round(new.round_id)?
            .ok_or(PlacementError::RoundNotFound(new.round_id))?;
        check_round_accepts(&round, new.placed_at)?;

        let mut account = self
            .load_account(new.user_id)?
            .ok_or(PlacementError::AccountNotFound(new.user_id))?;
        account.balance = debit(&account, new.stake)?;

        let wager = Wager {
            id: self.next_id(NEXT_WAGER_ID)?,
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

        self.kv.write(vec![
            BatchOp::Put(NEXT_WAGER_ID.to_vec(), wager.id.to_be_bytes().to_vec()),
            BatchOp::Put(key(WAGER_PREFIX, &[wager.id]), encode(&wager)?),
            BatchOp::Put(key(PENDING_PREFIX, &[wager.round_id, wager.id]), Vec::new()),
            BatchOp::Put(key(USER_WAGERS_PREFIX, &[wager.user_id, wager.id]), Vec::new()),
            BatchOp::Put(key(ACCOUNT_PREFIX, &[account.user_id]), encode(&account)?),
        ])?;
        Ok(wager)
    }

    async fn void_round(&self, round_id: RoundId) -> Pc28Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut stored = self.require_round(round_id)?;
        if !stored.status.can_void() {
            return Err(StorageError::StaleState(format!(
                "round {} is {}, cannot void",
                round_id, stored.status
            ))
            .into());
        }

        let mut refunded = 0;
        for (k, _) in self.kv.scan_prefix(&key(PENDING_PREFIX, &[round_id]))? {
            let wager_id = trailing_id(&k)?;
            let stake = match self.load_wager(wager_id)? {
                Some(w) => w.stake,
                None => continue,
            };
            self.kv.write(self.resolve_ops(wager_id, WagerOutcome::Refunded, stake)?)?;
            refunded += 1;
        }

        let previous = stored.status;
        stored.status = RoundStatus::Void;
        stored.result = None;
        self.kv.write(self.round_ops(previous, &stored)?)?;
        Ok(refunded)
    }

    async fn recent_settled_rounds(&self, limit: usize) -> Pc28Result<Vec<Round>> {
        let mut rounds = Vec::new();
        for (k, _) in self
            .kv
            .scan_prefix_rev(&status_prefix(RoundStatus::Settled), limit)?
        {
            if let Some(round) = self.load_round(trailing_id(&k)?)? {
                rounds.push(round);
            }
        }
        Ok(rounds)
    }

    async fn wagers_for_user(&self, user_id: UserId, limit: usize) -> Pc28Result<Vec<Wager>> {
        let mut wagers = Vec::new();
        for (k, _) in self
            .kv
            .scan_prefix_rev(&key(USER_WAGERS_PREFIX, &[user_id]), limit)?
        {
            if let Some(wager) = self.load_wager(trailing_id(&k)?)? {
                wagers.push(wager);
            }
        }
        Ok(wagers)
    }

    async fn account(&self, user_id: UserId) -> Pc28Result<Option<Account>> {
        self.load_account(user_id)
    }

    async fn ensure_account(&self, user_id: UserId, opening_balance: Amount) -> Pc28Result<Account> {
        let _guard = self.write_lock.lock().await;
        if let Some(existing) = self.load_account(user_id)? {
            return Ok(existing);
        }
        let account = Account {
            user_id,
            balance: opening_balance,
        };
        self.kv.write(vec![BatchOp::Put(
            key(ACCOUNT_PREFIX, &[user_id]),
            encode(&account)?,
        )])?;
        Ok(account)
    }
}
