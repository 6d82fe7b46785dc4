//! Engine counters exported in Prometheus text format

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};

/// Shared handles; clones update the same series
#[derive(Clone)]
pub struct GameMetrics {
    registry: Registry,
    pub rounds_created: IntCounter,
    pub rounds_closed: IntCounter,
    pub rounds_settled: IntCounter,
    pub settlements_deferred: IntCounter,
    pub rounds_voided: IntCounter,
    pub wagers_placed: IntCounter,
    pub wagers_won: IntCounter,
    pub wagers_lost: IntCounter,
    pub wagers_failed: IntCounter,
    /// Minor units credited to winners
    pub amount_credited: IntCounter,
    pub tick_failures: IntCounter,
    pub events_published: IntCounter,
    pub subscribers_dropped: IntCounter,
    pub subscribers_active: IntGauge,
}

impl GameMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("pc28".to_string()), None)?;

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let c = IntCounter::new(name, help)?;
            registry.register(Box::new(c.clone()))?;
            Ok(c)
        };

        let subscribers_active = IntGauge::new("subscribers_active", "Live hub subscribers")?;
        registry.register(Box::new(subscribers_active.clone()))?;

        Ok(Self {
            rounds_created: counter("rounds_created_total", "Rounds opened")?,
            rounds_closed: counter("rounds_closed_total", "Rounds drawn and closed")?,
            rounds_settled: counter("rounds_settled_total", "Rounds marked settled")?,
            settlements_deferred: counter(
                "settlements_deferred_total",
                "Settlement passes that left pending wagers behind",
            )?,
            rounds_voided: counter("rounds_voided_total", "Rounds voided with stakes refunded")?,
            wagers_placed: counter("wagers_placed_total", "Wagers accepted")?,
            wagers_won: counter("wagers_won_total", "Wagers settled as won")?,
            wagers_lost: counter("wagers_lost_total", "Wagers settled as lost")?,
            wagers_failed: counter(
                "wagers_failed_total",
                "Wager settlements that failed and stay pending",
            )?,
            amount_credited: counter("amount_credited_minor_total", "Winnings credited, minor units")?,
            tick_failures: counter("tick_failures_total", "Scheduler steps abandoned on error")?,
            events_published: counter("events_published_total", "Events fanned out by the hub")?,
            subscribers_dropped: counter(
                "subscribers_dropped_total",
                "Subscribers dropped because their queue was full",
            )?,
            subscribers_active,
            registry,
        })
    }

    /// Prometheus text exposition of every series
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
