use crate::games::types::{BetCategory, DrawResult};

/// Lowest "big" sum
pub const BIG_MIN: u8 = 14;

/// Whether a bet of `category` (with `value` for number bets) wins on `result`.
/// Only `result.sum` is consulted. `Unknown` always loses.
pub fn is_winner(category: BetCategory, value: u8, result: &DrawResult) -> bool {
    let sum = result.sum;
    let big = (BIG_MIN..=27).contains(&sum);
    let small = sum < BIG_MIN;
    let odd = sum % 2 == 1;

    match category {
        BetCategory::Number => value == sum,
        BetCategory::Big => big,
        BetCategory::Small => small,
        BetCategory::Odd => odd,
        BetCategory::Even => !odd,
        BetCategory::BigOdd => big && odd,
        BetCategory::BigEven => big && !odd,
        BetCategory::SmallOdd => small && odd,
        BetCategory::SmallEven => small && !odd,
        BetCategory::Unknown => false,
    }
}
