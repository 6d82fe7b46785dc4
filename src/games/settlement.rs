//! Settlement engine
//!
//! Grades every pending wager of a closed round and credits winners. Each
//! wager is its own atomic store call, so one failure leaves exactly that
//! wager pending for the next pass while the others proceed. Only pending
//! wagers are read, which makes a repeated pass over the same round a no-op.

use crate::config::SettlementPolicy;
use crate::errors::{Pc28Error, Pc28Result, StorageError};
use crate::game_store::RoundStore;
use crate::games::evaluator::is_winner;
use crate::games::types::{Amount, DrawResult, Round, RoundId, RoundStatus, Wager, WagerOutcome};
use crate::metrics::GameMetrics;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one settlement pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettlementReport {
    pub round_id: RoundId,
    pub won: usize,
    pub lost: usize,
    /// Wagers whose update failed and remain pending
    pub failed: usize,
    pub credited: Amount,
    /// Whether this pass moved the round to `settled`
    pub round_settled: bool,
}

pub struct SettlementEngine {
    store: Arc<dyn RoundStore>,
    policy: SettlementPolicy,
    metrics: GameMetrics,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn RoundStore>, policy: SettlementPolicy, metrics: GameMetrics) -> Self {
        if policy == SettlementPolicy::MarkSettled {
            warn!("settlement policy mark_settled: rounds may settle with wagers still pending");
        }
        Self {
            store,
            policy,
            metrics,
        }
    }

    pub fn policy(&self) -> SettlementPolicy {
        self.policy
    }

    /// Settle a closed round. Fails only if the round is malformed or the
    /// pending-wager read fails; per-wager failures are counted in the report.
    pub async fn settle_round(&self, round: &Round) -> Pc28Result<SettlementReport> {
        if round.status != RoundStatus::Closed {
            return Err(Pc28Error::InvalidInput(format!(
                "round {} is {}, only closed rounds settle",
                round.id, round.status
            )));
        }
        let result = round.result.ok_or_else(|| {
            Pc28Error::InvalidInput(format!("closed round {} has no result", round.id))
        })?;

        let mut report = SettlementReport {
            round_id: round.id,
            ..Default::default()
        };

        let wagers = self.store.find_pending_wagers(round.id).await?;
        for wager in &wagers {
            self.settle_wager(wager, &result, &mut report).await;
        }

        let remaining = match self.policy {
            SettlementPolicy::DeferUntilDrained => self.store.find_pending_wagers(round.id).await?.len(),
            SettlementPolicy::MarkSettled => report.failed,
        };
        if remaining > 0 {
            if self.policy == SettlementPolicy::DeferUntilDrained {
                warn!(
                    round_id = round.id,
                    issue = %round.issue_number,
                    remaining,
                    "settlement deferred, wagers still pending"
                );
                self.metrics.settlements_deferred.inc();
                return Ok(report);
            }
            warn!(
                round_id = round.id,
                issue = %round.issue_number,
                remaining,
                "marking round settled with wagers still pending"
            );
        }

        match self.store.mark_round_settled(round.id).await {
            Ok(()) => {
                report.round_settled = true;
                self.metrics.rounds_settled.inc();
                info!(
                    round_id = round.id,
                    issue = %round.issue_number,
                    sum = result.sum,
                    won = report.won,
                    lost = report.lost,
                    credited = %report.credited,
                    "round settled"
                );
            }
            Err(Pc28Error::Storage(StorageError::StaleState(reason))) => {
                debug!(round_id = round.id, %reason, "round already settled elsewhere");
            }
            Err(e) => return Err(e),
        }

        Ok(report)
    }

    async fn settle_wager(&self, wager: &Wager, result: &DrawResult, report: &mut SettlementReport) {
        let outcome = match grade(wager, result) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(wager_id = wager.id, "cannot grade wager: {}", e);
                report.failed += 1;
                self.metrics.wagers_failed.inc();
                return;
            }
        };
        let credit = outcome.win_amount();

        match self
            .store
            .update_wager_outcome_and_credit(wager.id, outcome, credit)
            .await
        {
            Ok(()) => match outcome {
                WagerOutcome::Won { win_amount } => {
                    report.won += 1;
                    report.credited = report.credited.checked_add(win_amount).unwrap_or(report.credited);
                    self.metrics.wagers_won.inc();
                    self.metrics.amount_credited.inc_by(win_amount.minor().max(0) as u64);
                    debug!(wager_id = wager.id, user_id = wager.user_id, win = %win_amount, "wager won");
                }
                _ => {
                    report.lost += 1;
                    self.metrics.wagers_lost.inc();
                }
            },
            Err(Pc28Error::Storage(StorageError::StaleState(reason))) => {
                // Resolved by a concurrent pass; nothing left to do
                debug!(wager_id = wager.id, %reason, "wager already resolved");
            }
            Err(e) => {
                warn!(
                    wager_id = wager.id,
                    round_id = wager.round_id,
                    "wager settlement failed, left pending: {}",
                    e
                );
                report.failed += 1;
                self.metrics.wagers_failed.inc();
            }
        }
    }
}

/// Outcome of a wager against a result, paid at its frozen multiplier
pub fn grade(wager: &Wager, result: &DrawResult) -> Pc28Result<WagerOutcome> {
    if is_winner(wager.category, wager.value, result) {
        Ok(WagerOutcome::Won {
            win_amount: wager.stake.times(wager.multiplier)?,
        })
    } else {
        Ok(WagerOutcome::Lost)
    }
}
