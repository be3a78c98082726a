//! mqk-backtest
//!
//! The simulation driver: iterates trading days, drives the broker's
//! resting-order matching against each day's bars, applies corporate
//! actions, and publishes every lifecycle event onto a typed bus. Ties
//! together `mqk-schemas`, `mqk-execution`, `mqk-portfolio`, and
//! `mqk-broker` into one runnable backtest.

mod corporate_actions;
mod driver;
mod events;
pub mod loader;
mod types;

pub use corporate_actions::{CorporateActionPolicy, ForbidEntry};
pub use driver::{BacktestError, SimulationDriver, TradingDay};
pub use events::{Event, EventBus, EventKind};
pub use types::{
    BacktestConfig, BacktestReport, CorporateActionPolicySerde, EquitySnapshot, MatchingMode, MatchingModeConfig,
};

use std::collections::BTreeMap;

use mqk_broker::Broker;
use mqk_execution::DealPriceDecider;
use mqk_portfolio::{BenchmarkAccount, FutureAccount, StockAccount};
use mqk_schemas::{Instrument, InstrumentId};

/// Build a [`Broker`] from a [`BacktestConfig`], wiring up whichever
/// accounts the config calls for. The caller attaches deciders afterward
/// via `StockAccount::with_deciders`/`FutureAccount::with_deciders` before
/// handing the broker to [`SimulationDriver`], since decider construction
/// is venue/instrument-specific and out of this crate's scope.
pub fn broker_from_config(config: &BacktestConfig) -> Broker {
    let deal_price_decider: DealPriceDecider = MatchingMode::from(config.matching_mode).deal_price_decider();
    let mut broker = Broker::new(deal_price_decider, config.bar_limit, config.volume_percent, config.daily_frequency);

    if config.stock_starting_cash_micros > 0 {
        broker = broker.with_stock_account(StockAccount::new(config.stock_starting_cash_micros));
    }
    if config.future_starting_cash_micros > 0 {
        broker = broker.with_future_account(FutureAccount::new(
            config.future_starting_cash_micros,
            config.future_margin_rate_bps,
        ));
    }
    broker
}

pub fn benchmark_from_config(config: &BacktestConfig) -> Option<BenchmarkAccount> {
    config
        .benchmark_instrument_id
        .as_ref()
        .map(|id| BenchmarkAccount::new(id.clone(), config.benchmark_starting_cash_micros))
}

/// Assemble a ready-to-run [`SimulationDriver`] from a [`BacktestConfig`]:
/// builds the broker and optional benchmark account via
/// [`broker_from_config`]/[`benchmark_from_config`] and carries through
/// `handle_split` and the corporate-action policy.
pub fn driver_from_config(
    config: &BacktestConfig,
    instruments: BTreeMap<InstrumentId, Instrument>,
) -> SimulationDriver {
    let broker = broker_from_config(config);
    let mut driver = SimulationDriver::new(broker, instruments, config.future_contract_multiplier)
        .with_handle_split(config.handle_split)
        .with_corporate_action_policy(config.corporate_action_policy.clone().into());
    if let Some(benchmark) = benchmark_from_config(config) {
        driver = driver.with_benchmark(benchmark);
    }
    driver
}

/// Top-level programmatic entry point (spec.md §6: "the core is driven by
/// a programmatic entry `run(config, source_code) -> result`"). `on_bar` is
/// the strategy hook — this crate has no notion of "source code" to load,
/// so callers pass their own order-submission closure directly rather than
/// a plugin path. Returns `anyhow::Result` since this is the outermost
/// boundary an external caller consumes, the same convention the
/// workspace's process-hosting binaries use for their entry points.
pub fn run(
    config: &BacktestConfig,
    instruments: BTreeMap<InstrumentId, Instrument>,
    days: &[TradingDay],
    on_bar: impl FnMut(&mut Broker, &TradingDay) -> Vec<mqk_broker::BrokerEvent>,
) -> anyhow::Result<BacktestReport> {
    let mut driver = driver_from_config(config, instruments);
    driver.run(days, on_bar).map_err(anyhow::Error::from)
}

/// Install a `tracing` subscriber reading its filter from `RUST_LOG`
/// (defaulting to `"info"`), the same bootstrap shape the workspace's
/// process-hosting binaries use. The simulation core itself never calls
/// this — it only emits `tracing` events — so embedding binaries opt in
/// explicitly.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
