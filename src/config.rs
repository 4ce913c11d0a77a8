use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{
    domain::TickValidator,
    error::{ConfigError, SimResult},
    exec::{
        friction::{FrictionModel, PartialFillBasis, SlippageModel},
        order::OrderType,
    },
    feed::{csv::ColumnMap, timestamp::TimestampParser, CsvFeed},
    instrument::{CommissionScheme, Instrument, InstrumentKind},
};

/// The full configuration surface for one backtest session, shaped for
/// direct deserialization from a nested document.
///
/// Every leaf has a default, so a minimal configuration is just a data path
/// and an instrument; `validate()` enforces the cross-field constraints and
/// is run by the session builder before anything starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub data: DataConfig,
    pub instrument: InstrumentConfig,
    pub account: AccountConfig,
    pub execution: ExecutionConfig,
    pub order_types: OrderTypesConfig,
    pub speed: SpeedConfig,
    pub session: SessionConfig,
}

impl SimConfig {
    /// Start-time validation. The first failing check fails the session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.format != "csv" {
            return Err(ConfigError::UnsupportedFormat(self.data.format.clone()));
        }
        if !(self.account.initial_balance > 0.0) {
            return Err(invalid(
                "account.initial_balance",
                "must be positive",
            ));
        }
        if self.account.leverage < 1.0 {
            return Err(invalid("account.leverage", "must be at least 1"));
        }
        if !(self.account.max_position_size > 0.0) {
            return Err(invalid("account.max_position_size", "must be positive"));
        }
        if !(self.account.max_drawdown_percent > 0.0)
            || self.account.max_drawdown_percent > 100.0
        {
            return Err(invalid(
                "account.max_drawdown_percent",
                "must be in (0, 100]",
            ));
        }
        if let Some(max_order) = self.session.max_order_size
            && !(max_order > 0.0)
        {
            return Err(invalid("session.max_order_size", "must be positive"));
        }
        if !(0.1..=10_000.0).contains(&self.speed.multiplier) {
            return Err(ConfigError::SpeedOutOfRange(self.speed.multiplier));
        }
        if self.order_types.supported.is_empty()
            || !self.order_types.supported.contains(&self.order_types.default)
        {
            return Err(ConfigError::InvalidOrderTypes);
        }
        Ok(())
    }
}

fn invalid(option: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        reason: reason.to_string(),
    }
}

// ================================================================================================
// Data
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Path to the quote file. Required unless a feed is injected directly.
    pub path: String,
    pub format: String,
    pub skip_header: bool,
    pub column_map: ColumnMap,
    /// `"auto"` or an explicit chrono pattern.
    pub timestamp_format: String,
    pub validation: ValidationConfig,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            format: "csv".to_string(),
            skip_header: true,
            column_map: ColumnMap::default(),
            timestamp_format: "auto".to_string(),
            validation: ValidationConfig::default(),
        }
    }
}

impl DataConfig {
    pub fn validator(&self) -> TickValidator {
        TickValidator {
            enabled: self.validation.enabled,
            max_spread: self.validation.max_spread,
            min_depth: self.validation.min_depth,
        }
    }

    fn timestamps(&self) -> TimestampParser {
        if self.timestamp_format.eq_ignore_ascii_case("auto") {
            TimestampParser::auto()
        } else {
            TimestampParser::with_format(self.timestamp_format.clone())
        }
    }

    /// Opens the configured CSV source.
    pub fn open_csv(&self) -> SimResult<CsvFeed> {
        if self.path.is_empty() {
            return Err(ConfigError::MissingOption("data.path".to_string()).into());
        }
        Ok(CsvFeed::open(&self.path)?
            .with_columns(self.column_map)
            .with_skip_header(self.skip_header)
            .with_timestamps(self.timestamps())
            .with_validator(self.validator()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    pub enabled: bool,
    pub max_spread: Option<f64>,
    pub min_depth: Option<f64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_spread: None,
            min_depth: None,
        }
    }
}

// ================================================================================================
// Instrument
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    pub kind: InstrumentKind,
    pub symbol: String,
    pub decimal_places: Option<u32>,
    pub pip_value: Option<f64>,
    pub contract_size: Option<f64>,
    pub min_lot_size: Option<f64>,
    pub tick_size: Option<f64>,
    pub commission: Option<CommissionConfig>,
    pub typical_volatility: Option<f64>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            kind: InstrumentKind::Forex,
            symbol: "EUR/USD".to_string(),
            decimal_places: None,
            pip_value: None,
            contract_size: None,
            min_lot_size: None,
            tick_size: None,
            commission: None,
            typical_volatility: None,
        }
    }
}

impl InstrumentConfig {
    /// The built-in profile for the kind, with any configured overrides
    /// applied on top.
    pub fn build(&self) -> Instrument {
        let mut instrument = match self.kind {
            InstrumentKind::Forex => Instrument::forex(self.symbol.clone()),
            InstrumentKind::Stocks => Instrument::stocks(self.symbol.clone()),
            InstrumentKind::Commodities => Instrument::commodities(self.symbol.clone()),
            InstrumentKind::Crypto => Instrument::crypto(self.symbol.clone()),
        };

        let spec = match &mut instrument {
            Instrument::Forex(spec)
            | Instrument::Stocks(spec)
            | Instrument::Commodities(spec)
            | Instrument::Crypto(spec) => spec,
        };
        if let Some(v) = self.decimal_places {
            spec.decimal_places = v;
        }
        if let Some(v) = self.pip_value {
            spec.pip_value = v;
        }
        if let Some(v) = self.contract_size {
            spec.contract_size = v;
        }
        if let Some(v) = self.min_lot_size {
            spec.min_lot_size = v;
        }
        if let Some(v) = self.tick_size {
            spec.tick_size = v;
        }
        if let Some(v) = self.typical_volatility {
            spec.typical_volatility = v;
        }
        if let Some(commission) = &self.commission {
            spec.commission = commission.build();
        }

        instrument
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CommissionConfig {
    pub scheme: CommissionSchemeKind,
    pub value: f64,
}

impl CommissionConfig {
    fn build(&self) -> CommissionScheme {
        match self.scheme {
            CommissionSchemeKind::PerMillion => CommissionScheme::PerMillion(self.value),
            CommissionSchemeKind::PerShare => CommissionScheme::PerShare(self.value),
            CommissionSchemeKind::PerLot => CommissionScheme::PerLot(self.value),
            CommissionSchemeKind::Percentage => CommissionScheme::Percentage(self.value),
        }
    }
}

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
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommissionSchemeKind {
    PerMillion,
    PerShare,
    PerLot,
    Percentage,
}

// ================================================================================================
// Account
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub initial_balance: f64,
    pub currency: String,
    pub leverage: f64,
    pub max_position_size: f64,
    pub max_drawdown_percent: f64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            initial_balance: 100_000.0,
            currency: "USD".to_string(),
            leverage: 1.0,
            max_position_size: 100.0,
            max_drawdown_percent: 100.0,
        }
    }
}

// ================================================================================================
// Execution
// ================================================================================================

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub slippage: SlippageConfig,
    pub latency: LatencyConfig,
    pub commission: CommissionToggle,
    pub partial_fills: PartialFillsConfig,
}

impl ExecutionConfig {
    pub fn friction(&self) -> FrictionModel {
        FrictionModel {
            slippage_enabled: self.slippage.enabled,
            slippage_model: self.slippage.model,
            commission_enabled: self.commission.enabled,
            partial_fills_enabled: self.partial_fills.enabled,
            partial_fill_basis: self.partial_fills.basis,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SlippageConfig {
    pub enabled: bool,
    pub model: SlippageModel,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: SlippageModel::Momentum,
        }
    }
}

/// Order latency knob. Carried and validated for the wider toolchain;
/// resolution in this kernel is always against the submitting tick.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    pub enabled: bool,
    pub ms: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionToggle {
    pub enabled: bool,
}

impl Default for CommissionToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PartialFillsConfig {
    pub enabled: bool,
    pub basis: PartialFillBasis,
}

impl Default for PartialFillsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            basis: PartialFillBasis::VolumeMomentum,
        }
    }
}

// ================================================================================================
// Order types, speed, session
// ================================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderTypesConfig {
    pub supported: Vec<OrderType>,
    pub default: OrderType,
}

impl Default for OrderTypesConfig {
    fn default() -> Self {
        Self {
            supported: vec![OrderType::Market, OrderType::Limit],
            default: OrderType::Market,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Replay pacing divisor over real inter-tick gaps; values at or above
    /// 1000 replay as fast as the machine allows.
    pub multiplier: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self { multiplier: 1000.0 }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Flatten any open position through the normal execution path when the
    /// session ends.
    pub close_positions_at_end: bool,
    /// Per-order size cap; defaults to `account.max_position_size`.
    pub max_order_size: Option<f64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_positions_at_end: true,
            max_order_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_constraint_violations_are_caught() {
        let mut config = SimConfig::default();
        config.account.initial_balance = 0.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.account.leverage = 0.5;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.account.max_drawdown_percent = 120.0;
        assert!(config.validate().is_err());

        let mut config = SimConfig::default();
        config.speed.multiplier = 0.01;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpeedOutOfRange(_))
        ));

        let mut config = SimConfig::default();
        config.data.format = "parquet".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnsupportedFormat(_))
        ));

        let mut config = SimConfig::default();
        config.order_types.supported = vec![OrderType::Limit];
        config.order_types.default = OrderType::Market;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidOrderTypes)
        ));
    }

    #[test]
    fn test_deserializes_from_nested_document() {
        let raw = serde_json::json!({
            "data": {
                "path": "ticks.csv",
                "skip_header": false,
                "column_map": { "timestamp": 1, "bid": 0 }
            },
            "instrument": {
                "kind": "crypto",
                "symbol": "BTC/USDT",
                "min_lot_size": 0.01,
                "commission": { "scheme": "percentage", "value": 0.002 }
            },
            "account": { "initial_balance": 25000.0, "leverage": 5.0 },
            "execution": {
                "slippage": { "enabled": false, "model": "none" },
                "partial_fills": { "enabled": true, "basis": "depth" }
            },
            "speed": { "multiplier": 2.0 }
        });
        let config: SimConfig = serde_json::from_value(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.data.column_map.timestamp, 1);
        assert_eq!(config.data.column_map.bid, 0);
        assert_eq!(config.data.column_map.ask, 2);
        assert!(!config.data.skip_header);
        assert_eq!(config.instrument.kind, InstrumentKind::Crypto);
        assert_eq!(config.speed.multiplier, 2.0);

        let friction = config.execution.friction();
        assert!(!friction.slippage_enabled);
        assert_eq!(friction.partial_fill_basis, PartialFillBasis::Depth);
    }

    #[test]
    fn test_instrument_overrides_apply() {
        let config = InstrumentConfig {
            kind: InstrumentKind::Forex,
            symbol: "GBP/USD".to_string(),
            pip_value: Some(0.0002),
            min_lot_size: Some(0.1),
            commission: Some(CommissionConfig {
                scheme: CommissionSchemeKind::PerMillion,
                value: 25.0,
            }),
            ..InstrumentConfig::default()
        };
        let instrument = config.build();
        assert_eq!(instrument.symbol(), "GBP/USD");
        assert_eq!(instrument.spec().pip_value, 0.0002);
        assert_eq!(instrument.spec().min_lot_size, 0.1);
        assert_eq!(
            instrument.spec().commission,
            CommissionScheme::PerMillion(25.0)
        );
        // Untouched fields keep the profile values.
        assert_eq!(instrument.spec().contract_size, 100_000.0);
    }
}
