//! Broadcast hub
//!
//! One actor task owns the subscriber set. Register, unregister and publish
//! all arrive on the same command queue, so fan-out never races a mutation.
//! Delivery is at-most-once: a subscriber whose queue is full is dropped on
//! the spot instead of holding up everyone else.

use crate::config::HubConfig;
use crate::games::types::{Round, RoundId, RoundStatus};
use crate::metrics::GameMetrics;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events pushed to live subscribers, serialized as `{"type": .., "payload": ..}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum HubEvent {
    RoundUpdate {
        round_id: RoundId,
        issue_number: String,
        open_time: DateTime<Utc>,
        close_time: DateTime<Utc>,
        status: RoundStatus,
    },
    Countdown {
        seconds: u64,
    },
    #[serde(rename = "result")]
    RoundResult {
        round_id: RoundId,
        issue_number: String,
        keno_data: Vec<u8>,
        result_a: u8,
        result_b: u8,
        result_c: u8,
        sum: u8,
    },
}

impl HubEvent {
    pub fn round_update(round: &Round) -> Self {
        HubEvent::RoundUpdate {
            round_id: round.id,
            issue_number: round.issue_number.clone(),
            open_time: round.open_time,
            close_time: round.close_time,
            status: round.status,
        }
    }

    pub fn countdown(seconds: u64) -> Self {
        HubEvent::Countdown { seconds }
    }

    /// `None` until the round carries a result
    pub fn result(round: &Round) -> Option<Self> {
        round.result.map(|r| HubEvent::RoundResult {
            round_id: round.id,
            issue_number: round.issue_number.clone(),
            keno_data: round.draw.clone(),
            result_a: r.a,
            result_b: r.b,
            result_c: r.c,
            sum: r.sum,
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            HubEvent::RoundUpdate { .. } => "round_update",
            HubEvent::Countdown { .. } => "countdown",
            HubEvent::RoundResult { .. } => "result",
        }
    }
}

type SubscriberId = u64;

enum Command {
    Register {
        id: SubscriberId,
        tx: mpsc::Sender<Arc<HubEvent>>,
    },
    Unregister(SubscriberId),
    Publish(Arc<HubEvent>),
    Count(oneshot::Sender<usize>),
    Shutdown,
}

/// Cheap, cloneable handle for publishers and subscribers
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
    next_id: Arc<AtomicU64>,
    subscriber_buffer: usize,
}

/// Owner handle used to stop the actor
pub struct HubHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

impl Hub {
    /// Spawn the actor on the current runtime
    pub fn start(config: &HubConfig, metrics: GameMetrics) -> (Hub, HubHandle) {
        let (commands, rx) = mpsc::channel(config.command_buffer);
        let task = tokio::spawn(run(rx, metrics));

        let hub = Hub {
            commands: commands.clone(),
            next_id: Arc::new(AtomicU64::new(1)),
            subscriber_buffer: config.subscriber_buffer,
        };
        (hub, HubHandle { commands, task })
    }

    /// Register a new subscriber. Events published after this returns are
    /// delivered to it; nothing earlier is replayed.
    pub async fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);
        if self.commands.send(Command::Register { id, tx }).await.is_err() {
            debug!(subscriber = id, "hub stopped, subscription closed immediately");
        }
        Subscription {
            id,
            rx,
            commands: self.commands.clone(),
        }
    }

    /// Queue an event for fan-out. Silently dropped once the hub has stopped.
    pub async fn publish(&self, event: HubEvent) {
        let kind = event.kind();
        if self.commands.send(Command::Publish(Arc::new(event))).await.is_err() {
            debug!(event = kind, "hub stopped, event discarded");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Count(tx)).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

impl HubHandle {
    /// Close every subscriber stream and wait for the actor to exit
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            warn!("hub task ended abnormally: {}", e);
        }
    }
}

/// Stream of events for one subscriber; unregisters itself on drop
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<Arc<HubEvent>>,
    commands: mpsc::Sender<Command>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the hub dropped this subscriber or stopped
    pub async fn recv(&mut self) -> Option<Arc<HubEvent>> {
        self.rx.recv().await
    }
}

impl Stream for Subscription {
    type Item = Arc<HubEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // A full command queue is fine: the next publish sees the closed
        // receiver and removes the entry anyway.
        let _ = self.commands.try_send(Command::Unregister(self.id));
    }
}

async fn run(mut commands: mpsc::Receiver<Command>, metrics: GameMetrics) {
    let mut subscribers: HashMap<SubscriberId, mpsc::Sender<Arc<HubEvent>>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, tx } => {
                subscribers.insert(id, tx);
                debug!(subscriber = id, total = subscribers.len(), "subscriber registered");
            }
            Command::Unregister(id) => {
                if subscribers.remove(&id).is_some() {
                    debug!(subscriber = id, total = subscribers.len(), "subscriber unregistered");
                }
            }
            Command::Publish(event) => {
                fan_out(&mut subscribers, &event, &metrics);
                metrics.events_published.inc();
            }
            Command::Count(reply) => {
                let _ = reply.send(subscribers.len());
            }
            Command::Shutdown => {
                info!(remaining = subscribers.len(), "hub shutting down");
                break;
            }
        }
        metrics.subscribers_active.set(subscribers.len() as i64);
    }

    subscribers.clear();
    metrics.subscribers_active.set(0);
}

fn fan_out(
    subscribers: &mut HashMap<SubscriberId, mpsc::Sender<Arc<HubEvent>>>,
    event: &Arc<HubEvent>,
    metrics: &GameMetrics,
) {
    subscribers.retain(|id, tx| match tx.try_send(Arc::clone(event)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(subscriber = *id, event = event.kind(), "subscriber queue full, dropping");
            metrics.subscribers_dropped.inc();
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(subscriber = *id, "subscriber went away");
            false
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::types::DrawResult;
    use chrono::TimeZone;
    use futures::StreamExt;

    fn start(buffer: usize) -> (Hub, HubHandle, GameMetrics) {
        let metrics = GameMetrics::new().unwrap();
        let config = HubConfig {
            subscriber_buffer: buffer,
            command_buffer: 64,
        };
        let (hub, handle) = Hub::start(&config, metrics.clone());
        (hub, handle, metrics)
    }

    #[test]
    fn test_wire_shape() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut round = Round::open_at(t, chrono::Duration::seconds(55));
        round.id = 9;

        let json = serde_json::to_value(HubEvent::round_update(&round)).unwrap();
        assert_eq!(json["type"], "round_update");
        assert_eq!(json["payload"]["round_id"], 9);
        assert_eq!(json["payload"]["issue_number"], "20240301120000");
        assert_eq!(json["payload"]["status"], "open");

        let json = serde_json::to_value(HubEvent::countdown(42)).unwrap();
        assert_eq!(json, serde_json::json!({"type": "countdown", "payload": {"seconds": 42}}));

        assert!(HubEvent::result(&round).is_none());
        round.draw = (1..=20).collect();
        round.result = Some(DrawResult { a: 1, b: 7, c: 3, sum: 11 });
        let json = serde_json::to_value(HubEvent::result(&round).unwrap()).unwrap();
        assert_eq!(json["type"], "result");
        assert_eq!(json["payload"]["keno_data"].as_array().unwrap().len(), 20);
        assert_eq!(json["payload"]["result_b"], 7);
        assert_eq!(json["payload"]["sum"], 11);
    }

    #[tokio::test]
    async fn test_fan_out_to_every_subscriber() {
        let (hub, handle, metrics) = start(8);
        let mut a = hub.subscribe().await;
        let mut b = hub.subscribe().await;

        hub.publish(HubEvent::countdown(3)).await;

        assert_eq!(*a.recv().await.unwrap(), HubEvent::countdown(3));
        assert_eq!(*b.recv().await.unwrap(), HubEvent::countdown(3));
        assert_eq!(hub.subscriber_count().await, 2);
        assert_eq!(metrics.events_published.get(), 1);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_subscriber_gets_no_replay() {
        let (hub, handle, _) = start(8);
        let mut early = hub.subscribe().await;
        hub.publish(HubEvent::countdown(10)).await;
        let mut late = hub.subscribe().await;
        hub.publish(HubEvent::countdown(9)).await;

        assert_eq!(*early.recv().await.unwrap(), HubEvent::countdown(10));
        assert_eq!(*late.recv().await.unwrap(), HubEvent::countdown(9));
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_stalled_subscriber_does_not_starve_others() {
        let (hub, handle, metrics) = start(4);
        let mut stalled = hub.subscribe().await;
        let mut healthy = hub.subscribe().await;

        for n in 0..10u64 {
            hub.publish(HubEvent::countdown(n)).await;
            assert_eq!(*healthy.recv().await.unwrap(), HubEvent::countdown(n));
        }

        assert_eq!(hub.subscriber_count().await, 1);
        assert_eq!(metrics.subscribers_dropped.get(), 1);

        // The stalled stream keeps what was buffered, then ends
        let buffered: Vec<_> = (&mut stalled).collect().await;
        assert_eq!(buffered.len(), 4);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_drop_unregisters() {
        let (hub, handle, metrics) = start(8);
        let sub = hub.subscribe().await;
        assert_eq!(hub.subscriber_count().await, 1);
        drop(sub);
        assert_eq!(hub.subscriber_count().await, 0);
        assert_eq!(metrics.subscribers_active.get(), 0);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let (hub, handle, _) = start(8);
        let mut sub = hub.subscribe().await;
        handle.shutdown().await;

        assert!(sub.recv().await.is_none());
        // Publishing after shutdown is a no-op, not an error
        hub.publish(HubEvent::countdown(1)).await;
        assert_eq!(hub.subscriber_count().await, 0);
    }
}
