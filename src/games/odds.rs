//! Static payout table

use crate::games::types::{BetCategory, Multiplier};
use serde::Serialize;
use std::collections::BTreeMap;

/// Multiplier paid for a winning bet of `category`, or `None` if the
/// category cannot be bet on.
pub fn multiplier_for(category: BetCategory) -> Option<Multiplier> {
    let hundredths = match category {
        BetCategory::Number => 980,
        BetCategory::Big | BetCategory::Small | BetCategory::Odd | BetCategory::Even => 195,
        BetCategory::BigOdd
        | BetCategory::BigEven
        | BetCategory::SmallOdd
        | BetCategory::SmallEven => 370,
        BetCategory::Unknown => return None,
    };
    Some(Multiplier(hundredths))
}

/// Odds keyed by category name, as decimals for display
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct OddsSheet(pub BTreeMap<&'static str, f64>);

pub fn odds_sheet() -> OddsSheet {
    OddsSheet(
        BetCategory::all()
            .into_iter()
            .filter_map(|c| multiplier_for(c).map(|m| (c.as_str(), m.to_decimal())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_known_category_is_priced() {
        for category in BetCategory::all() {
            assert!(multiplier_for(category).is_some(), "{}", category);
        }
        assert_eq!(multiplier_for(BetCategory::Unknown), None);
    }

    #[test]
    fn test_sheet_values() {
        let sheet = odds_sheet();
        assert_eq!(sheet.0.len(), 9);
        assert_eq!(sheet.0["odd"], 1.95);
        assert_eq!(sheet.0["number"], 9.8);
        assert_eq!(sheet.0["small_even"], 3.7);
    }
}
