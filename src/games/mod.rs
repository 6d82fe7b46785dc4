pub mod draw;
pub mod evaluator;
pub mod odds;
pub mod placement;
pub mod settlement;
pub mod types;

pub use draw::{compute_result, DrawSource, RandomDraw};
pub use evaluator::is_winner;
pub use odds::{multiplier_for, odds_sheet, OddsSheet};
pub use placement::{PlaceWager, WagerDesk};
pub use settlement::{SettlementEngine, SettlementReport};
pub use types::*;
