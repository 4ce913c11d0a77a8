use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    domain::{Direction, Price, Qty},
    instrument::Instrument,
};

/// Window length for the momentum estimate: mean absolute mid-price delta
/// over the most recent ticks.
pub const MOMENTUM_WINDOW: usize = 20;

// ================================================================================================
// Momentum
// ================================================================================================

/// Market regime derived from recent mid-price movement, relative to the
/// instrument's typical volatility.
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
    Default,
)]
#[strum(serialize_all = "lowercase")]
pub enum MomentumBand {
    Weak,
    #[default]
    Normal,
    Strong,
}

impl MomentumBand {
    /// Slippage scaling for the band.
    pub fn multiplier(&self) -> f64 {
        match self {
            MomentumBand::Weak => 0.5,
            MomentumBand::Normal => 1.0,
            MomentumBand::Strong => 1.5,
        }
    }
}

/// Rolling window over mid-price deltas; classifies the current regime.
///
/// Until two mids have been observed there is no delta to judge, so the
/// tracker reports `Normal`.
#[derive(Debug, Clone, Default)]
pub struct MomentumTracker {
    deltas: VecDeque<f64>,
    last_mid: Option<f64>,
}

impl MomentumTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, mid: Price) {
        if let Some(last) = self.last_mid {
            if self.deltas.len() == MOMENTUM_WINDOW {
                self.deltas.pop_front();
            }
            self.deltas.push_back((mid.0 - last).abs());
        }
        self.last_mid = Some(mid.0);
    }

    pub fn band(&self, typical_volatility: f64) -> MomentumBand {
        if self.deltas.is_empty() {
            return MomentumBand::Normal;
        }
        let mean = self.deltas.iter().sum::<f64>() / self.deltas.len() as f64;
        if mean < 0.5 * typical_volatility {
            MomentumBand::Weak
        } else if mean > 1.5 * typical_volatility {
            MomentumBand::Strong
        } else {
            MomentumBand::Normal
        }
    }

    pub fn clear(&mut self) {
        self.deltas.clear();
        self.last_mid = None;
    }
}

// ================================================================================================
// Volume Bands
// ================================================================================================

/// Tick-volume regime used to scale partial fills. Thin tape fills less.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolumeBand {
    UpTo250k,
    UpTo500k,
    UpTo1M,
    UpTo2M,
    Above2M,
}

impl VolumeBand {
    /// Classifies a tick's traded volume. Zero or unreported volume lands in
    /// the thinnest band.
    pub fn from_volume(volume: Qty) -> Self {
        let v = volume.0;
        if v <= 250_000.0 {
            VolumeBand::UpTo250k
        } else if v <= 500_000.0 {
            VolumeBand::UpTo500k
        } else if v <= 1_000_000.0 {
            VolumeBand::UpTo1M
        } else if v <= 2_000_000.0 {
            VolumeBand::UpTo2M
        } else {
            VolumeBand::Above2M
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            VolumeBand::UpTo250k => 0.5,
            VolumeBand::UpTo500k => 0.7,
            VolumeBand::UpTo1M => 0.8,
            VolumeBand::UpTo2M => 0.9,
            VolumeBand::Above2M => 1.0,
        }
    }
}

// ================================================================================================
// Slippage Models
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
    Display,
    IntoStaticStr,
    Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SlippageModel {
    /// Size-over-depth impact without regime scaling.
    Depth,
    /// Size-over-depth impact scaled by the momentum band.
    #[default]
    Momentum,
    /// A constant one price unit per fill.
    Fixed,
    /// No slippage.
    None,
}

/// Which liquidity signal caps partial fills.
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
    Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PartialFillBasis {
    /// Depth cap, then scaled down by the tick's volume band.
    #[default]
    VolumeMomentum,
    /// Depth cap only.
    Depth,
    /// No cap.
    None,
}

// ================================================================================================
// Friction Model
// ================================================================================================

/// The three independent execution-friction calculators composed by the
/// resolver. Each can be switched off, in which case it degrades to a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrictionModel {
    pub slippage_enabled: bool,
    pub slippage_model: SlippageModel,
    pub commission_enabled: bool,
    pub partial_fills_enabled: bool,
    pub partial_fill_basis: PartialFillBasis,
}

impl Default for FrictionModel {
    fn default() -> Self {
        Self {
            slippage_enabled: true,
            slippage_model: SlippageModel::Momentum,
            commission_enabled: true,
            partial_fills_enabled: true,
            partial_fill_basis: PartialFillBasis::VolumeMomentum,
        }
    }
}

impl FrictionModel {
    /// Everything off: fills at the touch, free of charge, in full.
    pub fn frictionless() -> Self {
        Self {
            slippage_enabled: false,
            slippage_model: SlippageModel::None,
            commission_enabled: false,
            partial_fills_enabled: false,
            partial_fill_basis: PartialFillBasis::None,
        }
    }

    /// Commission for a fill, zero when disabled.
    pub fn commission(
        &self,
        instrument: &Instrument,
        price: Price,
        size: Qty,
        side: Direction,
    ) -> f64 {
        if !self.commission_enabled {
            return 0.0;
        }
        instrument.commission(price, size, side)
    }

    /// Slippage in price units for a fill, zero when disabled. `depth` is
    /// already converted to order-size units.
    pub fn slippage_units(
        &self,
        instrument: &Instrument,
        size: Qty,
        depth: Qty,
        band: MomentumBand,
    ) -> f64 {
        if !self.slippage_enabled {
            return 0.0;
        }
        match self.slippage_model {
            SlippageModel::None => 0.0,
            SlippageModel::Fixed => 1.0,
            SlippageModel::Depth => instrument.slippage_units(size, depth, MomentumBand::Normal),
            SlippageModel::Momentum => instrument.slippage_units(size, depth, band),
        }
    }

    /// Quantity that actually fills, given quoted depth (in order-size
    /// units) and the tick's volume band.
    pub fn fill_size(&self, requested: Qty, depth: Qty, volume: Qty) -> Qty {
        if !self.partial_fills_enabled {
            return requested;
        }
        match self.partial_fill_basis {
            PartialFillBasis::None => requested,
            PartialFillBasis::Depth => requested.min(depth),
            PartialFillBasis::VolumeMomentum => {
                let capped = requested.min(depth);
                capped * VolumeBand::from_volume(volume).multiplier()
            }
        }
    }
}
