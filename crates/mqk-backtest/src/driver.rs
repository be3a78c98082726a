//! Simulation driver: iterates trading days, publishing the lifecycle
//! events a bar-based backtest goes through — before-trading, bar-by-bar
//! matching, after-trading, settlement — and applying dividends/splits to
//! the accounts it owns. Grounded on `simulation_broker.py`'s
//! `before_trading`/`bar`/`after_trading` sequence plus the daily mark-to-
//! market settlement pass from the futures account module.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use mqk_broker::Broker;
use mqk_portfolio::BenchmarkAccount;
use mqk_schemas::{Bar, Dividend, Instrument, InstrumentId};

use crate::corporate_actions::CorporateActionPolicy;
use crate::events::{Event, EventBus};
use crate::types::{BacktestReport, EquitySnapshot};

/// One trading day's worth of input: a bar per instrument that traded, plus
/// whatever corporate actions take effect today.
#[derive(Debug, Clone, Default)]
pub struct TradingDay {
    pub trading_dt: DateTime<Utc>,
    pub calendar_dt: DateTime<Utc>,
    pub bars: BTreeMap<InstrumentId, Bar>,
    /// Instruments going ex-dividend today (entitlement recorded against
    /// today's held quantity).
    pub dividends_ex: Vec<Dividend>,
    /// Instruments whose previously-recorded entitlement is payable today.
    pub dividends_payable: Vec<InstrumentId>,
    /// (instrument, numerator, denominator) splits effective today.
    pub splits: Vec<(InstrumentId, i64, i64)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BacktestError {
    CorporateActionExclusion { instrument_id: InstrumentId, day_index: usize },
    /// Unrecoverable invariant violation: cash went negative with shorting
    /// disabled. Per the core's error-handling design this aborts the run
    /// rather than being treated as order-level data.
    NegativeCash { day_index: usize, cash_micros: i64 },
}

impl std::fmt::Display for BacktestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BacktestError::CorporateActionExclusion { instrument_id, day_index } => write!(
                f,
                "corporate action exclusion: {} on trading day {}",
                instrument_id, day_index
            ),
            BacktestError::NegativeCash { day_index, cash_micros } => write!(
                f,
                "fatal: cash went negative ({cash_micros} micros) on trading day {day_index}"
            ),
        }
    }
}

impl std::error::Error for BacktestError {}

/// Drives a full backtest over a sequence of trading days, wiring the
/// broker's resting-order machinery to the account controllers and
/// publishing every lifecycle event onto an [`EventBus`] the caller can
/// subscribe to ahead of time.
pub struct SimulationDriver {
    broker: Broker,
    instruments: BTreeMap<InstrumentId, Instrument>,
    contract_multiplier: i64,
    benchmark: Option<BenchmarkAccount>,
    corporate_action_policy: CorporateActionPolicy,
    /// Whether splits effective on a trading day are applied to positions
    /// (`base.handle_split` per spec.md §6). When false, `TradingDay::splits`
    /// entries are ignored — the caller is expected to have pre-adjusted the
    /// bar series instead.
    handle_split: bool,
    bus: EventBus,
    last_prices: BTreeMap<InstrumentId, i64>,
}

impl SimulationDriver {
    pub fn new(broker: Broker, instruments: BTreeMap<InstrumentId, Instrument>, contract_multiplier: i64) -> Self {
        Self {
            broker,
            instruments,
            contract_multiplier,
            benchmark: None,
            corporate_action_policy: CorporateActionPolicy::Allow,
            handle_split: true,
            bus: EventBus::new(),
            last_prices: BTreeMap::new(),
        }
    }

    pub fn with_benchmark(mut self, account: BenchmarkAccount) -> Self {
        self.benchmark = Some(account);
        self
    }

    pub fn with_corporate_action_policy(mut self, policy: CorporateActionPolicy) -> Self {
        self.corporate_action_policy = policy;
        self
    }

    pub fn with_handle_split(mut self, handle_split: bool) -> Self {
        self.handle_split = handle_split;
        self
    }

    pub fn bus_mut(&mut self) -> &mut EventBus {
        &mut self.bus
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    pub fn broker_mut(&mut self) -> &mut Broker {
        &mut self.broker
    }

    pub fn benchmark(&self) -> Option<&BenchmarkAccount> {
        self.benchmark.as_ref()
    }

    /// Run the whole sequence. `on_bar` is invoked once per day, after
    /// splits are applied and before matching, with mutable access to the
    /// broker so the caller can submit or cancel orders; it returns the
    /// broker events those calls produced so the driver can publish them in
    /// order alongside the matching events. Ex-dividend entitlements are
    /// booked after matching, against the end-of-day holding.
    pub fn run(
        &mut self,
        days: &[TradingDay],
        mut on_bar: impl FnMut(&mut Broker, &TradingDay) -> Vec<mqk_broker::BrokerEvent>,
    ) -> Result<BacktestReport, BacktestError> {
        let mut equity_curve = Vec::with_capacity(days.len());

        for (day_index, day) in days.iter().enumerate() {
            for instrument_id in day.bars.keys() {
                if self.corporate_action_policy.is_excluded(instrument_id, day.trading_dt) {
                    tracing::error!(instrument_id, day_index, "halting run: corporate action exclusion window");
                    return Err(BacktestError::CorporateActionExclusion {
                        instrument_id: instrument_id.clone(),
                        day_index,
                    });
                }
            }

            let next_opens = days
                .get(day_index + 1)
                .map(|next| next.bars.iter().map(|(id, b)| (id.clone(), b.open)).collect::<HashMap<_, _>>())
                .unwrap_or_default();

            let snapshot = self.run_day(day, &next_opens, &mut on_bar);
            equity_curve.push((day_index, snapshot));

            // Shorting isn't supported by `StockAccount` (sells are capped at
            // sellable quantity), so negative cash here is always a fatal
            // invariant violation rather than expected short-account state.
            if let Some(account) = self.broker.stock_account() {
                if account.cash_micros < 0 {
                    tracing::error!(day_index, cash_micros = account.cash_micros, "halting run: cash went negative");
                    return Err(BacktestError::NegativeCash {
                        day_index,
                        cash_micros: account.cash_micros,
                    });
                }
            }
        }

        Ok(BacktestReport {
            halted: false,
            halt_reason: None,
            equity_curve,
            last_prices: self.last_prices.clone(),
        })
    }

    fn run_day(
        &mut self,
        day: &TradingDay,
        next_opens: &HashMap<InstrumentId, i64>,
        on_bar: &mut impl FnMut(&mut Broker, &TradingDay) -> Vec<mqk_broker::BrokerEvent>,
    ) -> EquitySnapshot {
        tracing::debug!(trading_dt = %day.trading_dt, bars = day.bars.len(), "before_trading");
        self.bus.publish(Event::BeforeTrading);
        let before_events = self.broker.before_trading();
        self.bus.publish_all(before_events);

        if self.handle_split {
            for (instrument_id, num, den) in &day.splits {
                if let Some(account) = self.broker.stock_account_mut() {
                    account.handle_split(instrument_id, *num, *den);
                }
            }
        }

        let strategy_events = on_bar(&mut self.broker, day);
        self.bus.publish_all(strategy_events);

        self.broker.start_bar();
        let match_events = self.broker.match_bar(
            &day.bars,
            &self.instruments,
            day.trading_dt,
            day.calendar_dt,
            next_opens,
            self.contract_multiplier,
        );
        self.bus.publish_all(match_events);
        self.bus.publish(Event::Bar);

        // Ex-dividend entitlement is booked against the end-of-day holding,
        // after matching, so a same-day buy on the ex-date is counted.
        for dividend in &day.dividends_ex {
            if let Some(account) = self.broker.stock_account_mut() {
                account.handle_dividend_ex_dividend(dividend.clone());
            } else {
                tracing::warn!(instrument_id = %dividend.instrument_id, "dividend declared but no stock account to book it against");
            }
        }

        for instrument_id in &day.dividends_payable {
            if let Some(account) = self.broker.stock_account_mut() {
                account.handle_dividend_payable(instrument_id);
            }
        }

        for (instrument_id, bar) in &day.bars {
            self.last_prices.insert(instrument_id.clone(), bar.close);
        }

        self.bus.publish(Event::AfterTrading);
        let after_events = self.broker.after_trading(|id| self.instruments.get(id));
        for event in &after_events {
            if let mqk_broker::BrokerEvent::OrderUnsolicitedUpdate(order) = event {
                tracing::info!(order_id = %order.order_id, reason = ?order.rejection_reason, "order swept at market close");
            }
        }
        self.bus.publish_all(after_events);
        if let Some(account) = self.broker.stock_account_mut() {
            let delisted: Vec<&InstrumentId> = account
                .positions
                .keys()
                .filter(|id| self.instruments.get(*id).map(|i| i.is_delisted_by(day.trading_dt)).unwrap_or(false))
                .collect();
            for instrument_id in delisted {
                tracing::warn!(instrument_id, "sweeping position in delisted instrument to cash");
            }
            let last_prices = &self.last_prices;
            account.after_trading(&self.instruments, day.trading_dt, |id| last_prices.get(id).copied());
        }

        self.bus.publish(Event::Settlement);
        let marks: BTreeMap<String, i64> = day.bars.iter().map(|(id, b)| (id.clone(), b.close)).collect();
        if let Some(account) = self.broker.future_account_mut() {
            account.mark_to_market(&marks, self.contract_multiplier);
        }

        if let Some(benchmark) = self.benchmark.as_mut() {
            if let Some(bar) = day.bars.get(&benchmark.instrument_id) {
                benchmark.on_bar(bar.close, bar.is_nan);
            }
        }

        EquitySnapshot {
            stock_equity_micros: self.broker.stock_account().map(|a| a.equity(&marks)),
            future_equity_micros: self.broker.future_account().map(|a| a.equity()),
            benchmark_equity_micros: self.benchmark.as_ref().and_then(|b| {
                day.bars.get(&b.instrument_id).map(|bar| b.equity(bar.close))
            }),
        }
    }
}
