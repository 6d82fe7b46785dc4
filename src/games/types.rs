use crate::errors::{Pc28Error, Pc28Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type RoundId = u64;
pub type WagerId = u64;
pub type UserId = u64;

/// Money in minor units (hundredths)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(pub i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Build from whole units, e.g. `Amount::units(100)` is 100.00
    pub fn units(units: i64) -> Self {
        Amount(units * 100)
    }

    /// `units` without the overflow panic
    pub fn checked_units(units: i64) -> Option<Self> {
        units.checked_mul(100).map(Amount)
    }

    pub fn minor(self) -> i64 {
        self.0
    }

    /// From a decimal such as `12.5`, rounded to the nearest minor unit
    pub fn from_decimal(value: f64) -> Option<Amount> {
        let minor = (value * 100.0).round();
        if !minor.is_finite() || minor.abs() >= i64::MAX as f64 {
            return None;
        }
        Some(Amount(minor as i64))
    }

    pub fn to_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Payout for this stake at a frozen multiplier, truncated to the minor unit
    pub fn times(self, multiplier: Multiplier) -> Pc28Result<Amount> {
        let product = i128::from(self.0) * i128::from(multiplier.0) / 100;
        i64::try_from(product)
            .map(Amount)
            .map_err(|_| Pc28Error::Overflow(format!("{} x {}", self, multiplier)))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Payout multiplier in hundredths (1.95 is `Multiplier(195)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(pub u32);

impl Multiplier {
    pub fn to_decimal(self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Round lifecycle status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RoundStatus {
    Pending,
    Open,
    Closed,
    Settled,
    Void,
}

impl RoundStatus {
    /// Open or about to open
    pub fn is_active(self) -> bool {
        matches!(self, RoundStatus::Pending | RoundStatus::Open)
    }

    /// Void is reachable from any state short of settled
    pub fn can_void(self) -> bool {
        !matches!(self, RoundStatus::Settled | RoundStatus::Void)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoundStatus::Pending => "pending",
            RoundStatus::Open => "open",
            RoundStatus::Closed => "closed",
            RoundStatus::Settled => "settled",
            RoundStatus::Void => "void",
        }
    }

    pub fn all() -> [RoundStatus; 5] {
        [
            RoundStatus::Pending,
            RoundStatus::Open,
            RoundStatus::Closed,
            RoundStatus::Settled,
            RoundStatus::Void,
        ]
    }
}

impl fmt::Display for RoundStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Three sub-digits derived from a draw and their sum
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawResult {
    pub a: u8,
    pub b: u8,
    pub c: u8,
    pub sum: u8,
}

impl DrawResult {
    /// Result with only the sum set, which is all the evaluator reads
    pub fn from_sum(sum: u8) -> Self {
        Self { a: 0, b: 0, c: 0, sum }
    }
}

/// One timed betting round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Round {
    pub id: RoundId,
    pub issue_number: String,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub status: RoundStatus,
    /// Raw draw values; empty until closed
    #[serde(default)]
    pub draw: Vec<u8>,
    /// Populated iff status is closed or settled
    #[serde(default)]
    pub result: Option<DrawResult>,
}

impl Round {
    /// New open round; the store assigns the id
    pub fn open_at(open_time: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            id: 0,
            issue_number: issue_number_for(open_time),
            open_time,
            close_time: open_time + window,
            status: RoundStatus::Open,
            draw: Vec::new(),
            result: None,
        }
    }

    /// Accepting wagers at `now`
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.status == RoundStatus::Open && now < self.close_time
    }

    /// Whole seconds left until close, floored at zero
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> u64 {
        (self.close_time - now).num_seconds().max(0) as u64
    }
}

/// Issue number as `YYYYMMDDHHMMSS` in UTC
pub fn issue_number_for(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d%H%M%S").to_string()
}

/// Bet categories
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BetCategory {
    Number,
    Big,
    Small,
    Odd,
    Even,
    BigOdd,
    BigEven,
    SmallOdd,
    SmallEven,
    /// Anything unrecognised in a stored record; never wins
    #[serde(other)]
    Unknown,
}

impl BetCategory {
    pub fn all() -> [BetCategory; 9] {
        [
            BetCategory::Number,
            BetCategory::Big,
            BetCategory::Small,
            BetCategory::Odd,
            BetCategory::Even,
            BetCategory::BigOdd,
            BetCategory::BigEven,
            BetCategory::SmallOdd,
            BetCategory::SmallEven,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BetCategory::Number => "number",
            BetCategory::Big => "big",
            BetCategory::Small => "small",
            BetCategory::Odd => "odd",
            BetCategory::Even => "even",
            BetCategory::BigOdd => "big_odd",
            BetCategory::BigEven => "big_even",
            BetCategory::SmallOdd => "small_odd",
            BetCategory::SmallEven => "small_even",
            BetCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for BetCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BetCategory {
    type Err = std::convert::Infallible;

    /// Never fails; unrecognised names map to `Unknown`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(BetCategory::all()
            .into_iter()
            .find(|c| c.as_str() == s)
            .unwrap_or(BetCategory::Unknown))
    }
}

/// Wager status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Refunded,
}

/// A single bet against a round
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Wager {
    pub id: WagerId,
    pub user_id: UserId,
    pub round_id: RoundId,
    pub category: BetCategory,
    /// Only meaningful for `BetCategory::Number`
    #[serde(default)]
    pub value: u8,
    pub stake: Amount,
    /// Frozen at placement
    pub multiplier: Multiplier,
    pub status: WagerStatus,
    #[serde(default)]
    pub win_amount: Amount,
    pub placed_at: DateTime<Utc>,
}

/// Wager as submitted, before the store assigns an id
#[derive(Debug, Clone, PartialEq)]
pub struct NewWager {
    pub user_id: UserId,
    pub round_id: RoundId,
    pub category: BetCategory,
    pub value: u8,
    pub stake: Amount,
    pub multiplier: Multiplier,
    pub placed_at: DateTime<Utc>,
}

/// Terminal state written by settlement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WagerOutcome {
    Won { win_amount: Amount },
    Lost,
    Refunded,
}

impl WagerOutcome {
    pub fn status(self) -> WagerStatus {
        match self {
            WagerOutcome::Won { .. } => WagerStatus::Won,
            WagerOutcome::Lost => WagerStatus::Lost,
            WagerOutcome::Refunded => WagerStatus::Refunded,
        }
    }

    pub fn win_amount(self) -> Amount {
        match self {
            WagerOutcome::Won { win_amount } => win_amount,
            _ => Amount::ZERO,
        }
    }
}

/// Player balance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub user_id: UserId,
    pub balance: Amount,
}
