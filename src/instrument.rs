use serde::{Deserialize, Serialize};
use strum::{Display, EnumCount, EnumIter, EnumString, IntoStaticStr};

use crate::{
    domain::{Direction, Price, Qty},
    error::{ErrorCode, OrderError},
    exec::friction::MomentumBand,
};

/// Floor applied to quoted depth before it divides anything. Depth of zero
/// means the venue published no size, not infinite impact.
pub const MIN_DEPTH: f64 = 1e-9;

/// Interbank FX depth is quoted per million units of base currency.
const FOREX_DEPTH_UNIT: f64 = 1_000_000.0;

// ================================================================================================
// Asset Classes
// ================================================================================================

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
    EnumCount,
    Display,
    IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Forex,
    Stocks,
    Commodities,
    Crypto,
}

/// How commission is charged for one side of a fill.
///
/// The fill side is accepted by [`Instrument::commission`] for future
/// asymmetric schemes; the current schemes charge both sides identically.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", content = "value", rename_all = "snake_case")]
pub enum CommissionScheme {
    /// Notional-based: `(notional / 1_000_000) × rate`.
    PerMillion(f64),
    /// `size × rate`.
    PerShare(f64),
    /// `size × rate`.
    PerLot(f64),
    /// Notional-based: `notional × rate`.
    Percentage(f64),
}

// ================================================================================================
// Instrument Descriptor
// ================================================================================================

/// The numeric profile of one tradeable asset. Immutable for the lifetime of
/// a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub decimal_places: u32,
    /// Smallest quoted price unit (a pip for FX, a cent for stocks).
    pub pip_value: f64,
    /// Units of the underlying per lot.
    pub contract_size: f64,
    pub min_lot_size: f64,
    pub tick_size: f64,
    pub commission: CommissionScheme,
    /// Typical per-tick price movement; scales the slippage estimate.
    pub typical_volatility: f64,
}

/// A tradeable asset with its asset-class arithmetic.
///
/// Dispatch over kinds is closed: the simulation understands exactly these
/// four asset classes, each carrying its own [`InstrumentSpec`]. All
/// operations are pure and stable across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Instrument {
    Forex(InstrumentSpec),
    Stocks(InstrumentSpec),
    Commodities(InstrumentSpec),
    Crypto(InstrumentSpec),
}

impl Instrument {
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Forex(_) => InstrumentKind::Forex,
            Instrument::Stocks(_) => InstrumentKind::Stocks,
            Instrument::Commodities(_) => InstrumentKind::Commodities,
            Instrument::Crypto(_) => InstrumentKind::Crypto,
        }
    }

    pub fn spec(&self) -> &InstrumentSpec {
        match self {
            Instrument::Forex(spec)
            | Instrument::Stocks(spec)
            | Instrument::Commodities(spec)
            | Instrument::Crypto(spec) => spec,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.spec().symbol
    }

    /// Builds an instrument of the given kind around a spec record.
    pub fn from_parts(kind: InstrumentKind, spec: InstrumentSpec) -> Self {
        match kind {
            InstrumentKind::Forex => Instrument::Forex(spec),
            InstrumentKind::Stocks => Instrument::Stocks(spec),
            InstrumentKind::Commodities => Instrument::Commodities(spec),
            InstrumentKind::Crypto => Instrument::Crypto(spec),
        }
    }

    // ============================================================================================
    // Built-in profiles
    // ============================================================================================

    /// A major FX pair: 5 decimals, standard 100k lot, per-million commission.
    pub fn forex(symbol: impl Into<String>) -> Self {
        Instrument::Forex(InstrumentSpec {
            symbol: symbol.into(),
            decimal_places: 5,
            pip_value: 0.0001,
            contract_size: 100_000.0,
            min_lot_size: 0.01,
            tick_size: 0.00001,
            commission: CommissionScheme::PerMillion(50.0),
            typical_volatility: 0.0001,
        })
    }

    /// A listed equity: cents, single-share contracts, per-share commission.
    pub fn stocks(symbol: impl Into<String>) -> Self {
        Instrument::Stocks(InstrumentSpec {
            symbol: symbol.into(),
            decimal_places: 2,
            pip_value: 0.01,
            contract_size: 1.0,
            min_lot_size: 1.0,
            tick_size: 0.01,
            commission: CommissionScheme::PerShare(0.005),
            typical_volatility: 0.05,
        })
    }

    /// An exchange-traded commodity contract with per-lot commission.
    pub fn commodities(symbol: impl Into<String>) -> Self {
        Instrument::Commodities(InstrumentSpec {
            symbol: symbol.into(),
            decimal_places: 2,
            pip_value: 0.01,
            contract_size: 100.0,
            min_lot_size: 1.0,
            tick_size: 0.01,
            commission: CommissionScheme::PerLot(2.5),
            typical_volatility: 0.25,
        })
    }

    /// A crypto pair: fractional sizes, percentage commission.
    pub fn crypto(symbol: impl Into<String>) -> Self {
        Instrument::Crypto(InstrumentSpec {
            symbol: symbol.into(),
            decimal_places: 2,
            pip_value: 0.01,
            contract_size: 1.0,
            min_lot_size: 0.001,
            tick_size: 0.01,
            commission: CommissionScheme::Percentage(0.001),
            typical_volatility: 25.0,
        })
    }

    // ============================================================================================
    // Arithmetic capabilities
    // ============================================================================================

    /// P&L in account currency for a closed quantity.
    ///
    /// FX scales the price distance by the contract size; the other classes
    /// settle directly in price points per unit of size.
    pub fn pnl(&self, entry: Price, exit: Price, size: Qty, direction: Direction) -> f64 {
        let distance = (exit.0 - entry.0) * direction.sign();
        match self {
            Instrument::Forex(spec) => distance * size.0 * spec.contract_size,
            Instrument::Stocks(_) | Instrument::Commodities(_) | Instrument::Crypto(_) => {
                distance * size.0
            }
        }
    }

    /// Notional face value of a quantity at a price.
    pub fn notional(&self, price: Price, size: Qty) -> f64 {
        price.0 * size.0 * self.spec().contract_size
    }

    /// Commission for one side of a fill. `_side` is accepted for future
    /// asymmetry; the current schemes ignore it.
    pub fn commission(&self, price: Price, size: Qty, _side: Direction) -> f64 {
        match self.spec().commission {
            CommissionScheme::PerMillion(rate) => self.notional(price, size) / 1_000_000.0 * rate,
            CommissionScheme::PerShare(rate) | CommissionScheme::PerLot(rate) => size.0 * rate,
            CommissionScheme::Percentage(rate) => self.notional(price, size) * rate,
        }
    }

    /// Expected slippage in price units for a fill of `size` against
    /// `depth` (already converted by [`Instrument::depth_in_units`]),
    /// scaled by the prevailing momentum band.
    pub fn slippage_units(&self, size: Qty, depth: Qty, band: MomentumBand) -> f64 {
        let spec = self.spec();
        let impact_scale = match self {
            Instrument::Forex(spec) => spec.contract_size,
            _ => 1.0,
        };
        let base = size.0 / depth.0.max(MIN_DEPTH) * spec.typical_volatility * impact_scale;
        base * band.multiplier()
    }

    /// Converts raw quoted depth into order-size units. FX depth arrives in
    /// units of base currency quoted per million; the other classes quote
    /// depth directly in tradeable units.
    pub fn depth_in_units(&self, raw_depth: Qty) -> Qty {
        match self {
            Instrument::Forex(_) => Qty(raw_depth.0 / FOREX_DEPTH_UNIT),
            _ => raw_depth,
        }
    }

    /// Minimum-size check. Upper bounds are the session's responsibility.
    pub fn validate_size(&self, size: Qty) -> Result<(), OrderError> {
        let min = self.spec().min_lot_size;
        if size.0 < min {
            return Err(OrderError::rejected(
                ErrorCode::InvalidOrderSize,
                format!("size {} below minimum lot size {min}", size.0),
            ));
        }
        Ok(())
    }

    /// Limit prices must be positive; exchange-traded classes additionally
    /// require alignment to the instrument's tick grid.
    pub fn validate_limit_price(&self, price: Price) -> Result<(), OrderError> {
        if !(price.0 > 0.0) {
            return Err(OrderError::rejected(
                ErrorCode::InvalidLimitPrice,
                format!("limit price must be positive, got {}", price.0),
            ));
        }

        if matches!(self, Instrument::Stocks(_) | Instrument::Commodities(_)) {
            let tick = self.spec().tick_size;
            let steps = price.0 / tick;
            if (steps - steps.round()).abs() > 1e-6 {
                return Err(OrderError::rejected(
                    ErrorCode::InvalidLimitPrice,
                    format!("limit price {} not aligned to tick size {tick}", price.0),
                ));
            }
        }

        Ok(())
    }

    /// Renders a price at the instrument's quoted precision.
    pub fn format_price(&self, price: Price) -> String {
        format!("{:.*}", self.spec().decimal_places as usize, price.0)
    }
}
