//! Backtest configuration and the report produced after a run.

use std::collections::BTreeMap;

use mqk_execution::DealPriceDecider;
use mqk_schemas::InstrumentId;

use crate::corporate_actions::CorporateActionPolicy;

/// Which deal price a bar is matched against, and whether orders submitted
/// mid-bar are eligible to fill against that same bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchingMode {
    /// Orders may fill against the bar they were submitted in, priced at
    /// that bar's close.
    CurrentBarClose,
    /// Orders always wait for the next bar, priced at that bar's open.
    NextBarOpen,
}

impl MatchingMode {
    pub fn deal_price_decider(self) -> DealPriceDecider {
        match self {
            MatchingMode::CurrentBarClose => DealPriceDecider::CurrentBarClose,
            MatchingMode::NextBarOpen => DealPriceDecider::NextBarOpen,
        }
    }
}

/// Top-level backtest configuration. Plain, `serde`-deserializable so a run
/// can be driven from a config file rather than hand-assembled in code.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct BacktestConfig {
    pub matching_mode: MatchingModeConfig,
    /// True for a daily-bar run (one bar per instrument per day); false for
    /// an intraday/minute-frequency run. Determines whether orders submitted
    /// mid-day can still match today or must always wait for tomorrow.
    pub daily_frequency: bool,
    /// Whether limit-up/limit-down blocks market orders on the wrong side.
    /// True for A-share-style stock markets; commodity futures generally
    /// don't apply this restriction the same way.
    pub bar_limit: bool,
    /// Fraction of a bar's reported volume a single account may consume.
    pub volume_percent: f64,
    pub stock_starting_cash_micros: i64,
    pub future_starting_cash_micros: i64,
    pub future_margin_rate_bps: i64,
    pub future_contract_multiplier: i64,
    pub benchmark_instrument_id: Option<InstrumentId>,
    pub benchmark_starting_cash_micros: i64,
    /// Whether splits effective on a trading day are applied to positions.
    /// When false, split entries in a `TradingDay` are ignored (the caller
    /// is expected to have pre-adjusted the bar series instead).
    #[serde(default = "default_handle_split")]
    pub handle_split: bool,
    #[serde(default)]
    pub corporate_action_policy: CorporateActionPolicySerde,
}

fn default_handle_split() -> bool {
    true
}

/// `serde`-friendly mirror of [`DealPriceDecider`]/[`MatchingMode`]; config
/// files name the matching mode as a string rather than a Rust enum literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingModeConfig {
    CurrentBarClose,
    NextBarOpen,
}

impl From<MatchingModeConfig> for MatchingMode {
    fn from(c: MatchingModeConfig) -> Self {
        match c {
            MatchingModeConfig::CurrentBarClose => MatchingMode::CurrentBarClose,
            MatchingModeConfig::NextBarOpen => MatchingMode::NextBarOpen,
        }
    }
}

/// `CorporateActionPolicy` has no default `serde` derive (its `ForbidEntry`
/// carries `chrono::DateTime` pairs); config files opt into enforcement by
/// naming `forbid_periods` explicitly, or omit the key entirely for `Allow`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorporateActionPolicySerde {
    #[default]
    Allow,
}

impl From<CorporateActionPolicySerde> for CorporateActionPolicy {
    fn from(c: CorporateActionPolicySerde) -> Self {
        match c {
            CorporateActionPolicySerde::Allow => CorporateActionPolicy::Allow,
        }
    }
}

impl BacktestConfig {
    /// Reasonable defaults for a daily A-share-style equities backtest.
    pub fn daily_equity_defaults(stock_starting_cash_micros: i64) -> Self {
        Self {
            matching_mode: MatchingModeConfig::CurrentBarClose,
            daily_frequency: true,
            bar_limit: true,
            volume_percent: mqk_execution::DEFAULT_VOLUME_PERCENT,
            stock_starting_cash_micros,
            future_starting_cash_micros: 0,
            future_margin_rate_bps: 0,
            future_contract_multiplier: 1,
            benchmark_instrument_id: None,
            benchmark_starting_cash_micros: 0,
            handle_split: true,
            corporate_action_policy: CorporateActionPolicySerde::Allow,
        }
    }
}

/// Snapshot of account equity at the end of one trading day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EquitySnapshot {
    pub stock_equity_micros: Option<i64>,
    pub future_equity_micros: Option<i64>,
    pub benchmark_equity_micros: Option<i64>,
}

/// The outcome of a full backtest run.
#[derive(Debug, Clone, Default)]
pub struct BacktestReport {
    pub halted: bool,
    pub halt_reason: Option<String>,
    /// (trading day index, equity snapshot) pairs, one per day simulated.
    pub equity_curve: Vec<(usize, EquitySnapshot)>,
    pub last_prices: BTreeMap<InstrumentId, i64>,
}
