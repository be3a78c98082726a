//! mqk-broker
//!
//! In-process simulation broker: owns the resting-order queues, drives the
//! bar-based [`mqk_execution::Matcher`] against them, and applies the
//! resulting trades/rejections to the stock and/or future accounts it holds.
//! Grounded on `SimulationBroker` from the reference implementation's
//! `simulation_broker.py` — order submission/cancellation publish a sequence
//! of bus events rather than mutating shared state directly, so the caller
//! (the backtest driver) stays in control of the actual event bus.

mod events;
mod order_queue;
mod state;

pub use events::BrokerEvent;
pub use state::BrokerState;

use std::collections::HashMap;

use mqk_execution::{DealPriceDecider, MatchOutcome, Matcher};
use mqk_portfolio::{FutureAccount, StockAccount};
use mqk_schemas::{Bar, Instrument, InstrumentType, Order, OrderStatus, RejectionReason, Side};

/// The in-process broker for one simulation run. Holds both account
/// controllers directly (there is exactly one stock account and one future
/// account per backtest, matching the reference implementation's account
/// dict keyed by account type) rather than a generic registry, since Rust's
/// static typing makes a `Box<dyn Account>` seam awkward for the
/// account-type-specific APIs (dividends, splits, margin) each one exposes.
pub struct Broker {
    matcher: Matcher,
    /// True when orders submitted mid-bar should be matched against the same
    /// bar they were submitted in (current-bar-close matching, or any
    /// intraday/minute-frequency run). False defers every order to the
    /// delayed queue until the next bar.
    match_immediately: bool,
    open_orders: Vec<Order>,
    delayed_orders: Vec<Order>,
    stock_account: Option<StockAccount>,
    future_account: Option<FutureAccount>,
}

impl Broker {
    pub fn new(deal_price_decider: DealPriceDecider, bar_limit: bool, volume_percent: f64, daily_frequency: bool) -> Self {
        let match_immediately = !daily_frequency || matches!(deal_price_decider, DealPriceDecider::CurrentBarClose);
        Self {
            matcher: Matcher::new(deal_price_decider, bar_limit, volume_percent),
            match_immediately,
            open_orders: Vec::new(),
            delayed_orders: Vec::new(),
            stock_account: None,
            future_account: None,
        }
    }

    pub fn with_stock_account(mut self, account: StockAccount) -> Self {
        self.stock_account = Some(account);
        self
    }

    pub fn with_future_account(mut self, account: FutureAccount) -> Self {
        self.future_account = Some(account);
        self
    }

    pub fn stock_account(&self) -> Option<&StockAccount> {
        self.stock_account.as_ref()
    }

    pub fn stock_account_mut(&mut self) -> Option<&mut StockAccount> {
        self.stock_account.as_mut()
    }

    pub fn future_account(&self) -> Option<&FutureAccount> {
        self.future_account.as_ref()
    }

    pub fn future_account_mut(&mut self) -> Option<&mut FutureAccount> {
        self.future_account.as_mut()
    }

    pub fn matches_immediately(&self) -> bool {
        self.match_immediately
    }

    pub fn open_orders(&self) -> &[Order] {
        &self.open_orders
    }

    pub fn delayed_orders(&self) -> &[Order] {
        &self.delayed_orders
    }

    /// Capture the resting-order queues for persistence. Account state is
    /// snapshotted separately by the caller (the accounts it owns are plain
    /// data already).
    pub fn get_state(&self) -> BrokerState {
        BrokerState {
            open_orders: self.open_orders.clone(),
            delayed_orders: self.delayed_orders.clone(),
        }
    }

    pub fn set_state(&mut self, state: BrokerState) {
        self.open_orders = state.open_orders;
        self.delayed_orders = state.delayed_orders;
    }

    /// Validate and queue a new order. Returns the sequence of events the
    /// caller should publish: always `OrderPendingNew`, then either
    /// `OrderCreationReject` (order was rejected outright, nothing queued)
    /// or, for an order eligible to match this session, `OrderCreationPass`.
    /// An order that lands in the delayed queue (daily frequency, next-bar-
    /// open matching) gets no `OrderCreationPass` at submission time — it's
    /// re-announced by [`Broker::before_trading`] once `after_trading` has
    /// promoted it into tomorrow's open queue, matching the reference
    /// implementation's "append to delayed_orders; stop" step. No bar is
    /// matched here — call [`Broker::match_bar`] right after this for
    /// current-bar-close matching to actually fill the order.
    pub fn submit_order(&mut self, mut order: Order, instrument: &Instrument) -> Vec<BrokerEvent> {
        let mut events = vec![BrokerEvent::OrderPendingNew(order.clone())];

        if let Some(reason) = self.validate(&order, instrument) {
            order.status = OrderStatus::Rejected;
            order.rejection_reason = Some(reason);
            tracing::info!(order_id = %order.order_id, instrument_id = %order.instrument_id, ?reason, "order rejected pre-trade");
            events.push(BrokerEvent::OrderCreationReject(order));
            return events;
        }

        self.freeze(&order, instrument.instrument_type);

        if self.match_immediately {
            order.status = OrderStatus::Active;
            events.push(BrokerEvent::OrderCreationPass(order.clone()));
            self.open_orders.push(order);
        } else {
            self.delayed_orders.push(order);
        }
        events
    }

    fn validate(&self, order: &Order, instrument: &Instrument) -> Option<RejectionReason> {
        if order.quantity <= 0 || order.quantity % instrument.round_lot.max(1) != 0 {
            return Some(RejectionReason::RoundLotViolation);
        }
        if !instrument.is_listed {
            return Some(RejectionReason::InstrumentNotListed);
        }
        if instrument.is_delisted_by(order.creation_time) {
            return Some(RejectionReason::InstrumentDelisted);
        }
        match instrument.instrument_type {
            InstrumentType::Stock | InstrumentType::Index => {
                let account = self.stock_account.as_ref()?;
                match order.side {
                    Side::Buy => {
                        let required = order.frozen_price * order.quantity;
                        if required > account.cash_micros {
                            return Some(RejectionReason::CashInsufficient);
                        }
                    }
                    Side::Sell => {
                        if order.quantity > account.sellable_quantity(&order.instrument_id) {
                            return Some(RejectionReason::PositionInsufficient);
                        }
                    }
                }
                None
            }
            InstrumentType::Future => {
                self.future_account.as_ref()?;
                None
            }
        }
    }

    fn freeze(&mut self, order: &Order, instrument_type: InstrumentType) {
        if matches!(instrument_type, InstrumentType::Stock | InstrumentType::Index) {
            if let Some(account) = self.stock_account.as_mut() {
                account.freeze_cash_for_order(order);
            }
        }
    }

    /// Cancel a resting order, wherever it sits (open or delayed queue).
    pub fn cancel_order(&mut self, order_id: &str, instrument: &Instrument) -> Vec<BrokerEvent> {
        let slot = order_queue::take(&mut self.open_orders, order_id)
            .or_else(|| order_queue::take(&mut self.delayed_orders, order_id));

        let Some(mut order) = slot else {
            let mut stub = Order {
                order_id: order_id.to_string(),
                instrument_id: instrument.id.clone(),
                side: Side::Buy,
                order_type: mqk_schemas::OrderType::Market,
                price: 0,
                frozen_price: 0,
                quantity: 0,
                filled_quantity: 0,
                status: OrderStatus::Rejected,
                creation_time: chrono::Utc::now(),
                rejection_reason: None,
            };
            stub.status = OrderStatus::Rejected;
            return vec![BrokerEvent::OrderCancellationReject(stub)];
        };

        let mut events = vec![BrokerEvent::OrderPendingCancel(order.clone())];
        if order.is_final() {
            events.push(BrokerEvent::OrderCancellationReject(order));
            return events;
        }

        let released = order.unfilled_quantity();
        self.release(&order, instrument.instrument_type, released);
        order.status = OrderStatus::Cancelled;
        events.push(BrokerEvent::OrderCancellationPass(order));
        events
    }

    fn release(&mut self, order: &Order, instrument_type: InstrumentType, qty: i64) {
        if matches!(instrument_type, InstrumentType::Stock | InstrumentType::Index) {
            if let Some(account) = self.stock_account.as_mut() {
                account.release_frozen(order, qty);
            }
        }
    }

    /// Re-announce every order still resting in the open queue (these
    /// survived from a prior day without being matched, including orders
    /// just promoted out of yesterday's delayed queue and therefore still
    /// `PendingNew`), and roll the stock account's same-day holdings into
    /// freely-sellable quantity. Called once at the start of each trading
    /// day, before the first bar.
    pub fn before_trading(&mut self) -> Vec<BrokerEvent> {
        if let Some(account) = self.stock_account.as_mut() {
            account.before_trading();
        }
        for order in self.open_orders.iter_mut() {
            order.status = OrderStatus::Active;
        }
        self.open_orders
            .iter()
            .cloned()
            .map(BrokerEvent::OrderCreationPass)
            .collect()
    }

    /// Reject everything still resting in the open queue ("market close"),
    /// release whatever cash/quantity they had frozen, then promote the
    /// delayed queue (orders submitted too late to match today) into
    /// tomorrow's open queue.
    pub fn after_trading<'a>(&mut self, instruments: impl Fn(&str) -> Option<&'a Instrument>) -> Vec<BrokerEvent> {
        let mut events = Vec::new();
        for mut order in std::mem::take(&mut self.open_orders) {
            let Some(instrument) = instruments(&order.instrument_id) else {
                continue;
            };
            self.release(&order, instrument.instrument_type, order.unfilled_quantity());
            order.status = OrderStatus::Rejected;
            order.rejection_reason = Some(RejectionReason::NoMarketData);
            events.push(BrokerEvent::OrderUnsolicitedUpdate(order));
        }
        self.open_orders = std::mem::take(&mut self.delayed_orders);
        events
    }

    /// Reset the matcher's per-bar turnover tracking. Call once per bar
    /// before [`Broker::match_bar`].
    pub fn start_bar(&mut self) {
        self.matcher.start_bar();
    }

    /// Tick-level matching is out of scope: bar-based simulation only
    /// observes OHLCV bars, never individual ticks.
    pub fn tick(&self) {}

    /// Match every open order whose instrument has a bar this period.
    /// Contract-multiplier lookups and deciders are read from whichever
    /// account owns the order (stock vs future); the future contract
    /// multiplier defaults to 1 when the instrument doesn't specify one,
    /// since `Instrument` carries no futures-specific fields.
    #[allow(clippy::too_many_arguments)]
    pub fn match_bar(
        &mut self,
        bars: &HashMap<String, Bar>,
        instruments: &HashMap<String, Instrument>,
        trading_dt: chrono::DateTime<chrono::Utc>,
        calendar_dt: chrono::DateTime<chrono::Utc>,
        next_bar_opens: &HashMap<String, i64>,
        contract_multiplier: i64,
    ) -> Vec<BrokerEvent> {
        let mut events = Vec::new();
        let mut still_open = Vec::with_capacity(self.open_orders.len());

        for mut order in std::mem::take(&mut self.open_orders) {
            let Some(bar) = bars.get(&order.instrument_id) else {
                still_open.push(order);
                continue;
            };
            let Some(instrument) = instruments.get(&order.instrument_id) else {
                still_open.push(order);
                continue;
            };
            let next_open = next_bar_opens.get(&order.instrument_id).copied();

            let outcome = match instrument.instrument_type {
                InstrumentType::Stock | InstrumentType::Index => {
                    let Some(account) = self.stock_account.as_mut() else {
                        still_open.push(order);
                        continue;
                    };
                    let close_today = |fill_qty: i64| account.close_today_amount(&order.instrument_id, fill_qty);
                    let outcome = self.matcher.match_order(
                        &mut order,
                        instrument,
                        bar,
                        trading_dt,
                        calendar_dt,
                        close_today,
                        account.slippage_decider.as_ref(),
                        account.commission_decider.as_ref(),
                        account.tax_decider.as_ref(),
                        next_open,
                    );
                    if let MatchOutcome::Traded(trade) = &outcome {
                        account.on_trade(trade);
                    }
                    // A volume-capped market order can come back `Traded` (it
                    // got a partial fill) with `order.status` already flipped
                    // to `Cancelled` by the matcher's cancel-the-rest policy —
                    // check the order's own terminal status, not just the
                    // `Rejected`/`Cancelled` outcome variants, or the unfilled
                    // remainder's frozen reservation never comes back.
                    if order.is_final() {
                        account.release_frozen(&order, order.unfilled_quantity());
                    }
                    outcome
                }
                InstrumentType::Future => {
                    let Some(account) = self.future_account.as_mut() else {
                        still_open.push(order);
                        continue;
                    };
                    let outcome = self.matcher.match_order(
                        &mut order,
                        instrument,
                        bar,
                        trading_dt,
                        calendar_dt,
                        |_| 0,
                        account.slippage_decider.as_ref(),
                        account.commission_decider.as_ref(),
                        account.tax_decider.as_ref(),
                        next_open,
                    );
                    if let MatchOutcome::Traded(trade) = &outcome {
                        account.on_trade(trade, contract_multiplier);
                    }
                    outcome
                }
            };

            match outcome {
                MatchOutcome::Traded(trade) => {
                    events.push(BrokerEvent::Trade(trade));
                    if order.is_final() {
                        tracing::debug!(order_id = %order.order_id, filled = order.filled_quantity, "order filled");
                        events.push(BrokerEvent::OrderUnsolicitedUpdate(order));
                    } else {
                        still_open.push(order);
                    }
                }
                MatchOutcome::Rejected | MatchOutcome::Cancelled => {
                    tracing::info!(order_id = %order.order_id, reason = ?order.rejection_reason, status = ?order.status, "order rejected or cancelled at match time");
                    events.push(BrokerEvent::OrderUnsolicitedUpdate(order));
                }
                MatchOutcome::NoFill => {
                    still_open.push(order);
                }
            }
        }

        self.open_orders = still_open;
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mqk_schemas::{BarStatus, OrderType};

    fn instrument() -> Instrument {
        Instrument {
            id: "000001.XSHE".into(),
            symbol: "PINGAN".into(),
            instrument_type: InstrumentType::Stock,
            exchange: "XSHE".into(),
            listed_date: "2000-01-01T00:00:00Z".parse().unwrap(),
            de_listed_date: None,
            round_lot: 100,
            is_listed: true,
        }
    }

    fn bar(close: i64, volume: i64) -> Bar {
        Bar {
            instrument_id: "000001.XSHE".into(),
            datetime: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            limit_up: close + 2_000_000,
            limit_down: close - 2_000_000,
            status: BarStatus::Ok,
            is_nan: false,
        }
    }

    fn market_buy(qty: i64) -> Order {
        Order {
            order_id: "o1".into(),
            instrument_id: "000001.XSHE".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            price: 0,
            frozen_price: 10_000_000,
            quantity: qty,
            filled_quantity: 0,
            status: OrderStatus::PendingNew,
            creation_time: Utc::now(),
            rejection_reason: None,
        }
    }

    fn broker() -> Broker {
        Broker::new(DealPriceDecider::CurrentBarClose, true, 0.25, false)
            .with_stock_account(StockAccount::new(1_000_000 * mqk_schemas::MICROS_SCALE))
    }

    #[test]
    fn submit_then_match_fills_and_updates_cash() {
        let mut b = broker();
        let inst = instrument();
        let events = b.submit_order(market_buy(100), &inst);
        assert!(matches!(events[1], BrokerEvent::OrderCreationPass(_)));
        assert_eq!(b.open_orders().len(), 1);

        let cash_before = b.stock_account().unwrap().cash_micros;
        b.start_bar();
        let mut bars = HashMap::new();
        bars.insert("000001.XSHE".into(), bar(10_000_000, 10_000));
        let mut instruments = HashMap::new();
        instruments.insert("000001.XSHE".into(), inst);
        let events = b.match_bar(&bars, &instruments, Utc::now(), Utc::now(), &HashMap::new(), 1);
        assert!(events.iter().any(|e| matches!(e, BrokerEvent::Trade(_))));
        assert!(b.open_orders().is_empty());
        assert_eq!(b.stock_account().unwrap().positions["000001.XSHE"].quantity, 100);
        assert!(b.stock_account().unwrap().cash_micros < cash_before);
    }

    #[test]
    fn cash_insufficient_rejects_at_submission() {
        let mut b = Broker::new(DealPriceDecider::CurrentBarClose, true, 0.25, false)
            .with_stock_account(StockAccount::new(1));
        let inst = instrument();
        let events = b.submit_order(market_buy(100), &inst);
        assert!(matches!(events[1], BrokerEvent::OrderCreationReject(_)));
        assert!(b.open_orders().is_empty());
    }

    #[test]
    fn cancel_releases_frozen_cash() {
        let mut b = broker();
        let inst = instrument();
        b.submit_order(market_buy(100), &inst);
        let frozen = b.stock_account().unwrap().frozen_cash_micros;
        assert!(frozen > 0);

        let events = b.cancel_order("o1", &inst);
        assert!(matches!(events.last().unwrap(), BrokerEvent::OrderCancellationPass(_)));
        assert_eq!(b.stock_account().unwrap().frozen_cash_micros, 0);
        assert!(b.open_orders().is_empty());
    }

    #[test]
    fn after_trading_rejects_stale_open_orders_and_promotes_delayed() {
        let mut b = Broker::new(DealPriceDecider::NextBarOpen, true, 0.25, true)
            .with_stock_account(StockAccount::new(1_000_000 * mqk_schemas::MICROS_SCALE));
        assert!(!b.matches_immediately());
        let inst = instrument();
        b.submit_order(market_buy(100), &inst);
        assert_eq!(b.delayed_orders().len(), 1);
        assert!(b.open_orders().is_empty());

        let instruments_map = HashMap::from([(inst.id.clone(), inst.clone())]);
        let events = b.after_trading(|id| instruments_map.get(id));
        assert!(events.is_empty(), "nothing was open yet, only delayed");
        assert_eq!(b.open_orders().len(), 1, "delayed queue promoted to open");
        assert!(b.delayed_orders().is_empty());
    }

    #[test]
    fn state_round_trips_resting_orders() {
        let mut b = broker();
        let inst = instrument();
        b.submit_order(market_buy(100), &inst);
        let snapshot = b.get_state();

        let mut restored = broker();
        restored.set_state(snapshot);
        assert_eq!(restored.open_orders().len(), 1);
        assert_eq!(restored.open_orders()[0].order_id, "o1");
    }
}
