//! Account controllers: Stock, Future, Benchmark.
//!
//! Each wraps cash plus a set of positions and reacts to trades, dividends,
//! splits, and delistings. These carry the account-level bookkeeping a
//! simulation needs: frozen cash for resting buy orders, T+1 holding
//! discipline, and the two-phase dividend lifecycle (ex-dividend
//! entitlement, then payable cash credit).

use std::collections::BTreeMap;

use mqk_execution::{CommissionDecider, SlippageDecider, TaxDecider, ZeroDeciders};
use mqk_schemas::{Dividend, Instrument, InstrumentId, Order, OrderStatus, Side, Trade};

use crate::position::StockPosition;

/// ETF instruments exempt from T+1 holding discipline — same-day buys may be
/// sold same-day. Treated as policy data (a closed literal set), not sourced
/// from instrument reference data.
pub const T1_EXEMPT_INSTRUMENTS: &[&str] = &[
    "510900.XSHG",
    "513030.XSHG",
    "513100.XSHG",
    "513500.XSHG",
];

pub fn is_t1_exempt(instrument_id: &str) -> bool {
    T1_EXEMPT_INSTRUMENTS.contains(&instrument_id)
}

impl std::fmt::Debug for StockAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockAccount")
            .field("cash_micros", &self.cash_micros)
            .field("frozen_cash_micros", &self.frozen_cash_micros)
            .field("positions", &self.positions)
            .field("dividend_info", &self.dividend_info)
            .field("dividend_receivable_micros", &self.dividend_receivable_micros)
            .finish_non_exhaustive()
    }
}

/// A stock (or index) account: cash, per-instrument positions, frozen cash
/// reserved by resting buy orders, and per-instrument dividend entitlements.
pub struct StockAccount {
    pub cash_micros: i64,
    pub frozen_cash_micros: i64,
    pub positions: BTreeMap<InstrumentId, StockPosition>,
    pub dividend_info: BTreeMap<InstrumentId, Dividend>,
    /// Sum of booked-but-not-yet-paid dividend entitlements (§3 Portfolio's
    /// `dividend_receivable`): incremented on ex-dividend booking, decremented
    /// when the matching payable entry is credited to cash.
    pub dividend_receivable_micros: i64,
    pub total_commission_micros: i64,
    pub total_tax_micros: i64,
    pub slippage_decider: Box<dyn SlippageDecider>,
    pub commission_decider: Box<dyn CommissionDecider>,
    pub tax_decider: Box<dyn TaxDecider>,
}

impl StockAccount {
    pub fn new(starting_cash_micros: i64) -> Self {
        Self {
            cash_micros: starting_cash_micros,
            frozen_cash_micros: 0,
            positions: BTreeMap::new(),
            dividend_info: BTreeMap::new(),
            dividend_receivable_micros: 0,
            total_commission_micros: 0,
            total_tax_micros: 0,
            slippage_decider: Box::new(ZeroDeciders),
            commission_decider: Box::new(ZeroDeciders),
            tax_decider: Box::new(ZeroDeciders),
        }
    }

    pub fn with_deciders(
        mut self,
        slippage: Box<dyn SlippageDecider>,
        commission: Box<dyn CommissionDecider>,
        tax: Box<dyn TaxDecider>,
    ) -> Self {
        self.slippage_decider = slippage;
        self.commission_decider = commission;
        self.tax_decider = tax;
        self
    }

    fn position_mut(&mut self, instrument_id: &str) -> &mut StockPosition {
        self.positions
            .entry(instrument_id.to_string())
            .or_insert_with(|| StockPosition::new(instrument_id))
    }

    /// Freeze cash against a newly-accepted buy order (`frozen_price * qty`).
    pub fn freeze_cash_for_order(&mut self, order: &Order) {
        if order.side == Side::Buy {
            let amount = order.frozen_price * order.quantity;
            self.cash_micros -= amount;
            self.frozen_cash_micros += amount;
        } else {
            self.position_mut(&order.instrument_id).frozen_quantity += order.quantity;
        }
    }

    /// Release frozen cash/quantity no longer needed: on a fill, release the
    /// frozen amount proportional to the filled quantity; on cancel/reject,
    /// release whatever remains of the order's unfilled quantity.
    pub fn release_frozen(&mut self, order: &Order, released_qty: i64) {
        if released_qty <= 0 {
            return;
        }
        if order.side == Side::Buy {
            let amount = order.frozen_price * released_qty;
            self.frozen_cash_micros -= amount;
            self.cash_micros += amount;
        } else {
            self.position_mut(&order.instrument_id).frozen_quantity -= released_qty;
        }
    }

    /// Apply a trade fill: move cash, update the average-cost position.
    pub fn on_trade(&mut self, trade: &Trade) {
        let gross = trade.price * trade.amount;
        let pos = self.position_mut(&trade.instrument_id);
        match trade.side {
            Side::Buy => {
                pos.apply_buy_trade(trade.amount, trade.price);
                self.frozen_cash_micros -= gross;
                self.cash_micros -= trade.commission + trade.tax;
            }
            Side::Sell => {
                pos.apply_sell_trade(trade.amount);
                pos.frozen_quantity -= trade.amount;
                self.cash_micros += gross - trade.commission - trade.tax;
            }
        }
        self.total_commission_micros += trade.commission;
        self.total_tax_micros += trade.tax;
        if self.positions.get(&trade.instrument_id).map(|p| p.is_flat()).unwrap_or(false) {
            self.positions.remove(&trade.instrument_id);
        }
    }

    pub fn close_today_amount(&self, instrument_id: &str, fill_qty: i64) -> i64 {
        self.positions
            .get(instrument_id)
            .map(|p| p.close_today_amount(fill_qty))
            .unwrap_or(0)
    }

    pub fn sellable_quantity(&self, instrument_id: &str) -> i64 {
        self.positions
            .get(instrument_id)
            .map(|p| p.sellable_quantity(is_t1_exempt(instrument_id)))
            .unwrap_or(0)
    }

    /// Roll same-day holdings into freely-sellable quantity for every
    /// position. Called once per trading day before the first bar.
    pub fn before_trading(&mut self) {
        for pos in self.positions.values_mut() {
            pos.roll_today_quantity();
        }
    }

    /// Sweep positions in delisted instruments: liquidate at the instrument's
    /// last known price and remove them from the book.
    pub fn after_trading(&mut self, instruments: &BTreeMap<InstrumentId, Instrument>, now: chrono::DateTime<chrono::Utc>, last_price: impl Fn(&str) -> Option<i64>) {
        let delisted: Vec<InstrumentId> = self
            .positions
            .keys()
            .filter(|id| {
                instruments
                    .get(*id)
                    .map(|i| i.is_delisted_by(now))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        for id in delisted {
            if let Some(pos) = self.positions.remove(&id) {
                let price = last_price(&id).unwrap_or(pos.avg_price_micros);
                self.cash_micros += pos.quantity * price;
            }
        }
    }

    /// Record a book-closure entitlement (the instrument goes ex-dividend).
    /// `quantity_at_record` is fixed at this moment regardless of later trading.
    pub fn handle_dividend_ex_dividend(&mut self, mut dividend: Dividend) {
        dividend.quantity_at_record = self
            .positions
            .get(&dividend.instrument_id)
            .map(|p| p.quantity)
            .unwrap_or(0);
        dividend.ex_dividend_booked = true;
        self.dividend_receivable_micros += dividend.receivable_micros();
        self.dividend_info.insert(dividend.instrument_id.clone(), dividend);
    }

    /// Credit the entitlement's cash on its payable date; the entry is then
    /// cleared from `dividend_info`.
    pub fn handle_dividend_payable(&mut self, instrument_id: &str) {
        if let Some(dividend) = self.dividend_info.get_mut(instrument_id) {
            if dividend.ex_dividend_booked && !dividend.payable_booked {
                self.cash_micros += dividend.receivable_micros();
                self.dividend_receivable_micros -= dividend.receivable_micros();
                dividend.payable_booked = true;
            }
        }
        self.dividend_info.retain(|_, d| !d.payable_booked);
    }

    pub fn handle_split(&mut self, instrument_id: &str, num: i64, den: i64) {
        if let Some(pos) = self.positions.get_mut(instrument_id) {
            pos.apply_split(num, den);
        }
    }

    pub fn market_value(&self, marks: &BTreeMap<String, i64>) -> i64 {
        self.positions
            .values()
            .map(|p| p.market_value(*marks.get(&p.instrument_id).unwrap_or(&p.avg_price_micros)))
            .sum()
    }

    pub fn equity(&self, marks: &BTreeMap<String, i64>) -> i64 {
        self.cash_micros + self.frozen_cash_micros + self.market_value(marks) + self.dividend_receivable_micros
    }
}

/// A futures account: signed positions, margin posted per contract, daily
/// mark-to-market PnL realization against the prior settlement price.
///
/// This is a conventional reference implementation (no complete margin
/// algorithm was present in the source material this crate is grounded on)
/// rather than an authoritative venue-specific rule — see DESIGN.md.
pub struct FutureAccount {
    pub cash_micros: i64,
    pub margin_rate_bps: i64,
    pub positions: BTreeMap<InstrumentId, crate::position::FuturePosition>,
    pub slippage_decider: Box<dyn SlippageDecider>,
    pub commission_decider: Box<dyn CommissionDecider>,
    pub tax_decider: Box<dyn TaxDecider>,
}

impl std::fmt::Debug for FutureAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FutureAccount")
            .field("cash_micros", &self.cash_micros)
            .field("margin_rate_bps", &self.margin_rate_bps)
            .field("positions", &self.positions)
            .finish_non_exhaustive()
    }
}

impl FutureAccount {
    pub fn new(starting_cash_micros: i64, margin_rate_bps: i64) -> Self {
        Self {
            cash_micros: starting_cash_micros,
            margin_rate_bps,
            positions: BTreeMap::new(),
            slippage_decider: Box::new(ZeroDeciders),
            commission_decider: Box::new(ZeroDeciders),
            tax_decider: Box::new(ZeroDeciders),
        }
    }

    pub fn with_deciders(
        mut self,
        slippage: Box<dyn SlippageDecider>,
        commission: Box<dyn CommissionDecider>,
        tax: Box<dyn TaxDecider>,
    ) -> Self {
        self.slippage_decider = slippage;
        self.commission_decider = commission;
        self.tax_decider = tax;
        self
    }

    pub fn on_trade(&mut self, trade: &Trade, contract_multiplier: i64) {
        let pos = self
            .positions
            .entry(trade.instrument_id.clone())
            .or_insert_with(|| crate::position::FuturePosition::new(trade.instrument_id.clone()));

        let notional = trade.price * trade.amount * contract_multiplier;
        let margin_delta = notional * self.margin_rate_bps / 10_000;

        match trade.side {
            Side::Buy => pos.quantity_signed += trade.amount,
            Side::Sell => pos.quantity_signed -= trade.amount,
        }
        pos.margin_micros += margin_delta;
        self.cash_micros -= margin_delta + trade.commission + trade.tax;
        if pos.last_settle_price_micros == 0 {
            pos.last_settle_price_micros = trade.price;
        }

        if pos.is_flat() {
            self.cash_micros += pos.margin_micros;
            self.positions.remove(&trade.instrument_id);
        }
    }

    /// Daily settlement: realize PnL against the prior settle price and
    /// update each open position's settle price to today's mark.
    pub fn mark_to_market(&mut self, marks: &BTreeMap<String, i64>, contract_multiplier: i64) {
        for pos in self.positions.values_mut() {
            let mark = *marks.get(&pos.instrument_id).unwrap_or(&pos.last_settle_price_micros);
            let pnl = (mark - pos.last_settle_price_micros) * pos.quantity_signed * contract_multiplier;
            self.cash_micros += pnl;
            pos.last_settle_price_micros = mark;
        }
    }

    pub fn equity(&self) -> i64 {
        self.cash_micros + self.positions.values().map(|p| p.margin_micros).sum::<i64>()
    }
}

/// A passive benchmark account: seeds a single buy on the first valid bar,
/// then holds. NaN/suspended bars are skipped rather than treated as an error.
#[derive(Debug, Clone)]
pub struct BenchmarkAccount {
    pub instrument_id: InstrumentId,
    pub cash_micros: i64,
    pub position: Option<StockPosition>,
    pub seeded: bool,
}

/// Commission rate applied to the benchmark's single seed trade, carried
/// over verbatim from the reference Python implementation's constant.
pub const BENCHMARK_COMMISSION_RATE_BPS: i64 = 8; // 0.0008 == 8 bps.

impl BenchmarkAccount {
    pub fn new(instrument_id: impl Into<String>, starting_cash_micros: i64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            cash_micros: starting_cash_micros,
            position: None,
            seeded: false,
        }
    }

    /// `close_price_micros` is ignored (and the call is a no-op) when
    /// `is_nan` is true, mirroring the reference implementation's NaN skip.
    pub fn on_bar(&mut self, close_price_micros: i64, is_nan: bool) {
        if is_nan || self.seeded {
            return;
        }
        if close_price_micros <= 0 {
            return;
        }
        let qty = self.cash_micros / close_price_micros;
        if qty > 0 {
            // 0.0008 * qty * price, expressed without floating point.
            let notional = qty * close_price_micros;
            let commission = notional * BENCHMARK_COMMISSION_RATE_BPS / 10_000;
            self.cash_micros -= notional + commission;
            let mut pos = StockPosition::new(self.instrument_id.clone());
            pos.apply_buy_trade(qty, close_price_micros);
            self.position = Some(pos);
        }
        self.seeded = true;
    }

    pub fn handle_dividend_ex_dividend(&mut self, dividend: &mut Dividend) {
        dividend.quantity_at_record = self.position.as_ref().map(|p| p.quantity).unwrap_or(0);
        dividend.ex_dividend_booked = true;
    }

    pub fn handle_dividend_payable(&mut self, dividend: &mut Dividend) {
        if dividend.ex_dividend_booked && !dividend.payable_booked {
            self.cash_micros += dividend.receivable_micros();
            dividend.payable_booked = true;
        }
    }

    pub fn equity(&self, close_price_micros: i64) -> i64 {
        self.cash_micros + self.position.as_ref().map(|p| p.market_value(close_price_micros)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(instrument_id: &str, side: Side, price: i64, amount: i64) -> Trade {
        Trade {
            exec_id: "e1".into(),
            order_id: "o1".into(),
            instrument_id: instrument_id.into(),
            side,
            price,
            amount,
            commission: 0,
            tax: 0,
            calendar_dt: Utc::now(),
            trading_dt: Utc::now(),
            close_today_amount: 0,
        }
    }

    #[test]
    fn buy_then_sell_nets_cash_change() {
        let mut acc = StockAccount::new(100_000 * mqk_schemas::MICROS_SCALE);
        let order = Order {
            order_id: "o1".into(),
            instrument_id: "000001.XSHE".into(),
            side: Side::Buy,
            order_type: mqk_schemas::OrderType::Market,
            price: 0,
            frozen_price: 10_000_000,
            quantity: 100,
            filled_quantity: 0,
            status: OrderStatus::Active,
            creation_time: Utc::now(),
            rejection_reason: None,
        };
        acc.freeze_cash_for_order(&order);
        assert_eq!(acc.frozen_cash_micros, 1_000_000_000);

        acc.on_trade(&trade("000001.XSHE", Side::Buy, 10_000_000, 100));
        assert_eq!(acc.frozen_cash_micros, 0);
        assert_eq!(acc.positions["000001.XSHE"].quantity, 100);
    }

    #[test]
    fn dividend_two_phase_credits_cash_on_payable() {
        let mut acc = StockAccount::new(10_000 * mqk_schemas::MICROS_SCALE);
        acc.on_trade(&trade("000001.XSHE", Side::Buy, 10_000_000, 100));

        let dividend = Dividend {
            instrument_id: "000001.XSHE".into(),
            book_closure_date: Utc::now(),
            ex_dividend_date: Utc::now(),
            payable_date: Utc::now(),
            cash_per_share: 500_000,
            quantity_at_record: 0,
            ex_dividend_booked: false,
            payable_booked: false,
        };
        acc.handle_dividend_ex_dividend(dividend);
        assert_eq!(acc.dividend_info["000001.XSHE"].quantity_at_record, 100);
        assert_eq!(acc.dividend_receivable_micros, 50_000_000);

        let cash_before = acc.cash_micros;
        acc.handle_dividend_payable("000001.XSHE");
        assert_eq!(acc.cash_micros, cash_before + 50_000_000);
        assert_eq!(acc.dividend_receivable_micros, 0);
        assert!(!acc.dividend_info.contains_key("000001.XSHE"));
    }

    #[test]
    fn benchmark_seeds_once_and_skips_nan_bars() {
        let mut bench = BenchmarkAccount::new("000300.XSHG", 100_000 * mqk_schemas::MICROS_SCALE);
        bench.on_bar(0, true); // NaN bar: no-op
        assert!(!bench.seeded);
        bench.on_bar(10_000_000, false);
        assert!(bench.seeded);
        let qty = bench.position.as_ref().unwrap().quantity;
        assert_eq!(qty, 10_000);
        // Second call is a no-op even with a valid price.
        bench.on_bar(20_000_000, false);
        assert_eq!(bench.position.as_ref().unwrap().quantity, qty);
    }
}
