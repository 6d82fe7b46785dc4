//! PC28 - timed draw-based betting rounds
//!
//! A round opens on the minute, takes wagers for a fixed window, closes on a
//! 20-value keno-style draw and settles every pending wager against the sum
//! of three derived digits. Progress is fanned out to live subscribers
//! through a single broadcast hub.

pub mod api;
pub mod config;
pub mod errors;
pub mod game_store;
pub mod games;
pub mod hub;
pub mod metrics;
pub mod scheduler;
pub mod storage;

pub use config::{ConfigLoader, Pc28Config, SettlementPolicy};
pub use errors::{Pc28Error, Pc28Result};
pub use game_store::{MemoryStore, RocksStore, RoundStore};
pub use hub::{Hub, HubEvent, HubHandle, Subscription};
pub use metrics::GameMetrics;
pub use scheduler::{RoundScheduler, SchedulerHandle};
