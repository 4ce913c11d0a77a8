use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    error::DataError, impl_abs_primitive, impl_from_primitive, impl_neg_primitive,
    impl_wrapper_arith,
};

// ================================================================================================
// Domain Strong Types (NewTypes)
// ================================================================================================

/// Represents a price level in the quote currency.
///
/// Used for: bid, ask, last trade, fill prices, entry prices, and limits.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Price(pub f64);
impl_from_primitive!(Price, f64);
impl_wrapper_arith!(Price, f64);
impl_neg_primitive!(Price, f64);
impl_abs_primitive!(Price, f64);

/// Represents an amount of the traded asset: order sizes, fill sizes, and
/// quoted depth. Wraps `f64` to support fractional lots while keeping sizes
/// from mixing with prices.
///
/// # Semantics
/// - Negative values never appear in orders or quotes; they only occur in
///   signed position arithmetic, which uses bare `f64`.
/// - Precision follows standard `f64` IEEE-754 semantics.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Qty(pub f64);
impl_from_primitive!(Qty, f64);
impl_wrapper_arith!(Qty, f64);
impl_abs_primitive!(Qty, f64);

impl Qty {
    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

/// Direction of market exposure. Maps to the `d ∈ {+1, -1}` factor in the
/// P&L formulas.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    /// Direction of a signed position size. Zero is treated as long; callers
    /// guard the flat case before asking.
    pub fn of(signed_size: f64) -> Self {
        if signed_size < 0.0 {
            Direction::Short
        } else {
            Direction::Long
        }
    }
}

// ================================================================================================
// Tick
// ================================================================================================

/// A single top-of-book quote at a point in time.
///
/// The `sequence` number is assigned at ingest by the feed: 0-based, strictly
/// increasing, without gaps. Timestamps are monotonic within a stream but the
/// kernel does not fail on violations; the validator flags them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub bid: Price,
    pub ask: Price,
    pub bid_qty: Qty,
    pub ask_qty: Qty,
    pub last_price: Price,
    pub volume: Qty,
    pub sequence: u64,
}

impl Tick {
    /// Midpoint between bid and ask.
    pub fn mid(&self) -> Price {
        Price((self.bid.0 + self.ask.0) / 2.0)
    }

    /// Quoted spread, `ask - bid`.
    pub fn spread(&self) -> f64 {
        self.ask.0 - self.bid.0
    }

    /// Top-of-book depth available to either side, `min(bid_qty, ask_qty)`.
    pub fn available_depth(&self) -> Qty {
        self.bid_qty.min(self.ask_qty)
    }
}

// ================================================================================================
// Tick Validation
// ================================================================================================

/// Emit-time quote validation. Enabled by default; the spread and depth
/// thresholds are opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickValidator {
    pub enabled: bool,
    /// Reject quotes whose `ask - bid` exceeds this many price units.
    pub max_spread: Option<f64>,
    /// Reject quotes whose available depth falls below this quantity.
    pub min_depth: Option<f64>,
}

impl Default for TickValidator {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spread: None,
            min_depth: None,
        }
    }
}

impl TickValidator {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Checks a quote against the structural invariants and the configured
    /// thresholds. Returns the first violated rule.
    pub fn validate(&self, tick: &Tick) -> Result<(), DataError> {
        if !self.enabled {
            return Ok(());
        }

        if !(tick.bid.0 > 0.0) {
            return Err(DataError::InvalidQuote(format!(
                "bid must be positive, got {}",
                tick.bid.0
            )));
        }
        if tick.ask.0 < tick.bid.0 {
            return Err(DataError::InvalidQuote(format!(
                "ask {} below bid {}",
                tick.ask.0, tick.bid.0
            )));
        }
        if tick.bid_qty.0 < 0.0 || tick.ask_qty.0 < 0.0 {
            return Err(DataError::InvalidQuote("negative quoted quantity".to_string()));
        }
        if tick.last_price.0 < 0.0 {
            return Err(DataError::InvalidQuote("negative last price".to_string()));
        }
        if tick.volume.0 < 0.0 {
            return Err(DataError::InvalidQuote("negative volume".to_string()));
        }

        if let Some(max_spread) = self.max_spread
            && tick.spread() > max_spread
        {
            return Err(DataError::InvalidQuote(format!(
                "spread {} above threshold {max_spread}",
                tick.spread()
            )));
        }

        if let Some(min_depth) = self.min_depth
            && tick.available_depth().0 < min_depth
        {
            return Err(DataError::InvalidQuote(format!(
                "depth {} below threshold {min_depth}",
                tick.available_depth().0
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn quote(bid: f64, ask: f64) -> Tick {
        Tick {
            timestamp: ts("2025-06-02T09:30:00Z"),
            bid: Price(bid),
            ask: Price(ask),
            bid_qty: Qty(1_000_000.0),
            ask_qty: Qty(500_000.0),
            last_price: Price((bid + ask) / 2.0),
            volume: Qty(250_000.0),
            sequence: 0,
        }
    }

    #[test]
    fn test_derived_quote_fields() {
        let tick = quote(1.1000, 1.1002);
        assert!((tick.mid().0 - 1.1001).abs() < 1e-12);
        assert!((tick.spread() - 0.0002).abs() < 1e-12);
        assert_eq!(tick.available_depth(), Qty(500_000.0));
    }

    #[test]
    fn test_validator_rejects_crossed_quotes() {
        let validator = TickValidator::default();
        assert!(validator.validate(&quote(1.1000, 1.1002)).is_ok());
        assert!(validator.validate(&quote(1.1002, 1.1000)).is_err());
        assert!(validator.validate(&quote(0.0, 1.1000)).is_err());
    }

    #[test]
    fn test_validator_thresholds_are_opt_in() {
        let wide = quote(1.1000, 1.2000);
        assert!(TickValidator::default().validate(&wide).is_ok());

        let strict = TickValidator {
            max_spread: Some(0.001),
            ..TickValidator::default()
        };
        assert!(strict.validate(&wide).is_err());

        let thin = TickValidator {
            min_depth: Some(600_000.0),
            ..TickValidator::default()
        };
        assert!(thin.validate(&quote(1.1000, 1.1002)).is_err());
    }

    #[test]
    fn test_disabled_validator_accepts_anything() {
        let validator = TickValidator::disabled();
        assert!(validator.validate(&quote(1.2, 1.1)).is_ok());
    }

    #[test]
    fn test_direction_sign_of_signed_size() {
        assert_eq!(Direction::of(2.5), Direction::Long);
        assert_eq!(Direction::of(-0.1), Direction::Short);
        assert_eq!(Direction::Long.sign(), 1.0);
        assert_eq!(Direction::Short.sign(), -1.0);
    }
}
