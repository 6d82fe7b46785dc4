//! Round lifecycle scheduler
//!
//! Two independent timers share nothing but the store. The lifecycle timer
//! settles closed rounds, closes overdue ones and opens a new round when none
//! is active, in that order. The countdown timer only reads. A failing step
//! is logged and counted; the next tick retries it.

use crate::config::GameConfig;
use crate::errors::{Pc28Error, Pc28Result, StorageError};
use crate::game_store::RoundStore;
use crate::games::draw::{compute_result, DrawSource};
use crate::games::settlement::SettlementEngine;
use crate::games::types::{Round, RoundId, RoundStatus};
use crate::hub::{Hub, HubEvent};
use crate::metrics::GameMetrics;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// What one lifecycle tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub settled: Vec<RoundId>,
    pub closed: Vec<RoundId>,
    pub created: Option<RoundId>,
    pub failures: usize,
}

pub struct RoundScheduler {
    store: Arc<dyn RoundStore>,
    draws: Arc<dyn DrawSource>,
    settlement: SettlementEngine,
    hub: Hub,
    config: GameConfig,
    metrics: GameMetrics,
}

impl RoundScheduler {
    pub fn new(
        store: Arc<dyn RoundStore>,
        draws: Arc<dyn DrawSource>,
        hub: Hub,
        config: GameConfig,
        metrics: GameMetrics,
    ) -> Self {
        let settlement = SettlementEngine::new(store.clone(), config.settlement_policy, metrics.clone());
        Self {
            store,
            draws,
            settlement,
            hub,
            config,
            metrics,
        }
    }

    /// Settle, then close, then open
    pub async fn lifecycle_tick(&self, now: DateTime<Utc>) -> TickSummary {
        let mut summary = TickSummary::default();
        self.settle_closed_rounds(&mut summary).await;
        self.close_overdue_rounds(now, &mut summary).await;
        self.open_round_if_idle(now, &mut summary).await;
        summary
    }

    /// Broadcast the seconds left in the open round, if there is one
    pub async fn countdown_tick(&self, now: DateTime<Utc>) -> Option<u64> {
        let round = match self.store.find_open_round().await {
            Ok(Some(round)) if round.status == RoundStatus::Open => round,
            Ok(_) => return None,
            Err(e) => {
                debug!("countdown skipped: {}", e);
                return None;
            }
        };
        let seconds = round.seconds_remaining(now);
        self.hub.publish(HubEvent::countdown(seconds)).await;
        Some(seconds)
    }

    /// Void a round short of settlement and refund its pending wagers
    pub async fn void_round(&self, round_id: RoundId) -> Pc28Result<usize> {
        let refunded = self.store.void_round(round_id).await?;
        self.metrics.rounds_voided.inc();
        info!(round_id, refunded, "round voided");
        if let Some(round) = self.store.find_round(round_id).await? {
            self.hub.publish(HubEvent::round_update(&round)).await;
        }
        Ok(refunded)
    }

    async fn settle_closed_rounds(&self, summary: &mut TickSummary) {
        let rounds = match self.store.find_closed_unsettled_rounds().await {
            Ok(rounds) => rounds,
            Err(e) => return self.step_failed("settle", None, &e, summary),
        };
        for round in rounds {
            match self.settlement.settle_round(&round).await {
                Ok(report) if report.round_settled => summary.settled.push(round.id),
                Ok(_) => {}
                Err(e) => self.step_failed("settle", Some(&round), &e, summary),
            }
        }
    }

    async fn close_overdue_rounds(&self, now: DateTime<Utc>, summary: &mut TickSummary) {
        let rounds = match self.store.find_rounds_past_close_deadline(now).await {
            Ok(rounds) => rounds,
            Err(e) => return self.step_failed("close", None, &e, summary),
        };
        for mut round in rounds {
            let draw = self.draws.generate_draw();
            let result = match compute_result(&draw) {
                Ok(result) => result,
                Err(e) => {
                    self.step_failed("close", Some(&round), &e, summary);
                    continue;
                }
            };
            round.draw = draw;
            round.result = Some(result);
            round.status = RoundStatus::Closed;

            match self.store.update_round_close_result(&round).await {
                Ok(()) => {
                    self.metrics.rounds_closed.inc();
                    info!(
                        round_id = round.id,
                        issue = %round.issue_number,
                        a = result.a,
                        b = result.b,
                        c = result.c,
                        sum = result.sum,
                        "round closed"
                    );
                    summary.closed.push(round.id);
                    if let Some(event) = HubEvent::result(&round) {
                        self.hub.publish(event).await;
                    }
                }
                Err(Pc28Error::Storage(StorageError::StaleState(reason))) => {
                    debug!(round_id = round.id, %reason, "round closed concurrently");
                }
                Err(e) => self.step_failed("close", Some(&round), &e, summary),
            }
        }
    }

    async fn open_round_if_idle(&self, now: DateTime<Utc>, summary: &mut TickSummary) {
        match self.store.find_open_round().await {
            Ok(Some(active)) => {
                debug!(round_id = active.id, status = %active.status, "round still active, not opening");
                return;
            }
            Ok(None) => {}
            Err(e) => return self.step_failed("open", None, &e, summary),
        }

        match self
            .store
            .create_round(Round::open_at(now, self.config.betting_window()))
            .await
        {
            Ok(round) => {
                self.metrics.rounds_created.inc();
                info!(
                    round_id = round.id,
                    issue = %round.issue_number,
                    close_time = %round.close_time,
                    "round opened"
                );
                summary.created = Some(round.id);
                self.hub.publish(HubEvent::round_update(&round)).await;
            }
            Err(Pc28Error::Storage(StorageError::Conflict(reason))) => {
                debug!(%reason, "round not opened");
            }
            Err(e) => self.step_failed("open", None, &e, summary),
        }
    }

    fn step_failed(&self, step: &'static str, round: Option<&Round>, e: &Pc28Error, summary: &mut TickSummary) {
        summary.failures += 1;
        self.metrics.tick_failures.inc();
        let round_id = round.map(|r| r.id);
        if e.is_transient() {
            warn!(step, ?round_id, "lifecycle step failed, retrying next tick: {}", e);
        } else {
            error!(step, ?round_id, "lifecycle step failed: {}", e);
        }
    }

    /// Start both timers. The first lifecycle tick lands on the next
    /// multiple of the lifecycle interval when wall-clock alignment is on.
    pub fn spawn(self: Arc<Self>) -> SchedulerHandle {
        let (shutdown, _) = watch::channel(false);

        let lifecycle_period = self.config.lifecycle_interval();
        let lifecycle_start = if self.config.align_to_wall_clock {
            Instant::now() + delay_until_boundary(Utc::now(), lifecycle_period)
        } else {
            Instant::now()
        };
        let lifecycle = {
            let scheduler = self.clone();
            let mut stop = shutdown.subscribe();
            tokio::spawn(async move {
                let mut ticker = interval_at(lifecycle_start, lifecycle_period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.changed() => break,
                        _ = ticker.tick() => {
                            let summary = scheduler.lifecycle_tick(Utc::now()).await;
                            debug!(?summary, "lifecycle tick");
                        }
                    }
                }
                info!("lifecycle timer stopped");
            })
        };

        let countdown = {
            let scheduler = self.clone();
            let mut stop = shutdown.subscribe();
            let period = self.config.countdown_interval();
            tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop.changed() => break,
                        _ = ticker.tick() => {
                            scheduler.countdown_tick(Utc::now()).await;
                        }
                    }
                }
                info!("countdown timer stopped");
            })
        };

        info!(
            lifecycle_secs = lifecycle_period.as_secs(),
            window_secs = self.config.betting_window_secs,
            "scheduler started"
        );
        SchedulerHandle {
            shutdown,
            tasks: vec![lifecycle, countdown],
        }
    }
}

/// Stops both timers; a tick already running finishes first
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("scheduler task ended abnormally: {}", e);
            }
        }
        info!("scheduler stopped");
    }
}

/// Time until the next multiple of `period` since the Unix epoch
pub fn delay_until_boundary(now: DateTime<Utc>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms <= 0 {
        return Duration::ZERO;
    }
    let rem = now.timestamp_millis().rem_euclid(period_ms);
    if rem == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - rem) as u64)
    }
}
