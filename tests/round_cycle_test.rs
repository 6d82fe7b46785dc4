//! End-to-end round cycles against both stores

use chrono::{DateTime, Duration, TimeZone, Utc};
use pc28::config::{GameConfig, HubConfig};
use pc28::game_store::{MemoryStore, RocksStore, RoundStore};
use pc28::games::draw::ScriptedDraw;
use pc28::games::placement::{PlaceWager, WagerDesk};
use pc28::games::types::{Amount, RoundStatus, WagerStatus};
use pc28::hub::{Hub, HubEvent};
use pc28::metrics::GameMetrics;
use pc28::scheduler::RoundScheduler;
use std::sync::Arc;

fn minute(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(n)
}

fn bet(user_id: u64, round_id: u64, category: &str, value: u8, units: i64) -> PlaceWager {
    PlaceWager {
        user_id,
        round_id,
        category: category.to_string(),
        value,
        stake: Amount::units(units),
    }
}

async fn run_cycle(store: Arc<dyn RoundStore>) {
    let metrics = GameMetrics::new().unwrap();
    let (hub, hub_handle) = Hub::start(&HubConfig::default(), metrics.clone());
    let scheduler = RoundScheduler::new(
        store.clone(),
        Arc::new(ScriptedDraw::repeating((1..=20).collect())),
        hub.clone(),
        GameConfig::default(),
        metrics.clone(),
    );
    let desk = WagerDesk::new(store.clone(), metrics.clone());
    let mut events = hub.subscribe().await;

    let round_id = scheduler.lifecycle_tick(minute(0)).await.created.unwrap();
    assert!(matches!(*events.recv().await.unwrap(), HubEvent::RoundUpdate { .. }));

    store.ensure_account(1, Amount::units(1_000)).await.unwrap();
    store.ensure_account(2, Amount::units(1_000)).await.unwrap();
    let at = minute(0) + Duration::seconds(20);
    desk.place_wager_at(bet(1, round_id, "odd", 0, 100), at).await.unwrap();
    desk.place_wager_at(bet(1, round_id, "small_odd", 0, 10), at).await.unwrap();
    desk.place_wager_at(bet(2, round_id, "big", 0, 100), at).await.unwrap();
    desk.place_wager_at(bet(2, round_id, "number", 11, 10), at).await.unwrap();

    // Close: draw 1..=20 gives 1 + 7 + 3 = 11
    let tick = scheduler.lifecycle_tick(minute(1)).await;
    assert_eq!(tick.closed, vec![round_id]);
    match &*events.recv().await.unwrap() {
        HubEvent::RoundResult {
            round_id: id,
            keno_data,
            result_a,
            result_b,
            result_c,
            sum,
            ..
        } => {
            assert_eq!(*id, round_id);
            assert_eq!(keno_data.len(), 20);
            assert_eq!((*result_a, *result_b, *result_c, *sum), (1, 7, 3, 11));
        }
        other => panic!("expected result event, got {:?}", other),
    }

    // Settle on the next tick
    let tick = scheduler.lifecycle_tick(minute(2)).await;
    assert_eq!(tick.settled, vec![round_id]);
    assert_eq!(tick.failures, 0);

    // user 1: 1000 - 110 + 195 + 37
    assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(1_122));
    // user 2: 1000 - 110 + 98
    assert_eq!(store.account(2).await.unwrap().unwrap().balance, Amount::units(988));

    let user_two = store.wagers_for_user(2, 10).await.unwrap();
    let statuses: Vec<_> = user_two.iter().map(|w| w.status).collect();
    assert_eq!(statuses, vec![WagerStatus::Won, WagerStatus::Lost]);

    let history = store.recent_settled_rounds(20).await.unwrap();
    assert_eq!(history[0].id, round_id);
    assert_eq!(history[0].status, RoundStatus::Settled);

    // A repeated settlement pass finds nothing left to pay
    let tick = scheduler.lifecycle_tick(minute(2) + Duration::seconds(1)).await;
    assert!(!tick.settled.contains(&round_id));
    assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(1_122));

    hub_handle.shutdown().await;
}

#[tokio::test]
async fn test_round_cycle_in_memory() {
    run_cycle(Arc::new(MemoryStore::new())).await;
}

#[tokio::test]
async fn test_round_cycle_on_rocksdb() {
    let dir = tempfile::tempdir().unwrap();
    run_cycle(Arc::new(RocksStore::open(dir.path()).unwrap())).await;

    // Everything written survives a reopen
    let store = RocksStore::open(dir.path()).unwrap();
    assert_eq!(store.recent_settled_rounds(5).await.unwrap().len(), 2);
    assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(1_122));
    assert!(store.find_open_round().await.unwrap().is_some());
}

#[tokio::test]
async fn test_late_wager_loses_race_with_close() {
    let store: Arc<dyn RoundStore> = Arc::new(MemoryStore::new());
    let metrics = GameMetrics::new().unwrap();
    let (hub, hub_handle) = Hub::start(&HubConfig::default(), metrics.clone());
    let scheduler = RoundScheduler::new(
        store.clone(),
        Arc::new(ScriptedDraw::repeating((1..=20).collect())),
        hub,
        GameConfig::default(),
        metrics.clone(),
    );
    let desk = WagerDesk::new(store.clone(), metrics);
    store.ensure_account(1, Amount::units(10)).await.unwrap();

    let round_id = scheduler.lifecycle_tick(minute(0)).await.created.unwrap();
    scheduler.lifecycle_tick(minute(1)).await;

    // A clock still inside the window does not reopen a closed round
    let late = desk
        .place_wager_at(bet(1, round_id, "odd", 0, 5), minute(0) + Duration::seconds(30))
        .await;
    assert!(late.is_err());
    assert_eq!(store.account(1).await.unwrap().unwrap().balance, Amount::units(10));
    hub_handle.shutdown().await;
}
