//! Bar-based matching engine.
//!
//! Matches resting orders against one OHLCV bar per instrument per call to
//! [`Matcher::match_order`]. There is no limit order book: a limit order
//! either crosses the bar's deal price or it doesn't, and a market order
//! fills up to a volume cap derived from the bar's reported volume.

use mqk_schemas::{Bar, BarStatus, Instrument, Order, OrderStatus, OrderType, RejectionReason, Side, Trade};
use std::collections::HashMap;

use crate::types::{CommissionDecider, DealPriceDecider, SlippageDecider, TaxDecider};

/// Fraction of a bar's reported volume a single account may consume across
/// all its orders against that instrument within one bar. rqalpha's default.
pub const DEFAULT_VOLUME_PERCENT: f64 = 0.25;

/// Outcome of matching a single order against a single bar.
#[derive(Debug)]
pub enum MatchOutcome {
    /// The order crossed and produced a trade. The order may still have
    /// `unfilled_quantity() > 0` if the volume cap limited the fill.
    Traded(Trade),
    /// The order was rejected outright (bad price, missing data, ...). The
    /// order's `status`/`rejection_reason` fields have already been set.
    Rejected,
    /// A market order was cancelled because no volume was available, or
    /// because it could only be partially filled (cancel-the-rest policy).
    Cancelled,
    /// Limit order did not cross this bar, or bar is limit-up/down against
    /// this order's side; the order keeps resting.
    NoFill,
}

/// Deterministic per-bar matcher. One instance is reused across an entire
/// backtest; `update` resets the per-bar turnover counters.
pub struct Matcher {
    turnover: HashMap<String, i64>,
    deal_price_decider: DealPriceDecider,
    /// Whether limit-up/limit-down blocks market orders on the wrong side
    /// (true for stocks; futures markets generally allow it, see account
    /// controller config).
    bar_limit: bool,
    volume_percent: f64,
}

impl Matcher {
    pub fn new(deal_price_decider: DealPriceDecider, bar_limit: bool, volume_percent: f64) -> Self {
        Self {
            turnover: HashMap::new(),
            deal_price_decider,
            bar_limit,
            volume_percent,
        }
    }

    /// Reset per-bar turnover tracking. Must be called once per trading
    /// period before the first `match_order` call for that period.
    pub fn start_bar(&mut self) {
        self.turnover.clear();
    }

    /// Attempt to match `order` against `bar`. Mutates `order`'s status,
    /// `filled_quantity`, and `rejection_reason` in place; returns the
    /// outcome so the caller (the broker) can publish the right bus event
    /// and update account state.
    #[allow(clippy::too_many_arguments)]
    pub fn match_order(
        &mut self,
        order: &mut Order,
        instrument: &Instrument,
        bar: &Bar,
        trading_dt: chrono::DateTime<chrono::Utc>,
        calendar_dt: chrono::DateTime<chrono::Utc>,
        close_today_amount: impl FnOnce(i64) -> i64,
        slippage: &dyn SlippageDecider,
        commission: &dyn CommissionDecider,
        tax: &dyn TaxDecider,
        next_bar_open: Option<i64>,
    ) -> MatchOutcome {
        if matches!(bar.status, BarStatus::Error) {
            let reason = if instrument.listed_date.date_naive() == trading_dt.date_naive() {
                RejectionReason::InstrumentNotListed
            } else {
                RejectionReason::NoMarketData
            };
            order.status = OrderStatus::Rejected;
            order.rejection_reason = Some(reason);
            return MatchOutcome::Rejected;
        }

        let deal_price = self.deal_price_decider.deal_price(bar, next_bar_open);

        match order.order_type {
            OrderType::Limit => {
                if order.price > bar.limit_up {
                    order.status = OrderStatus::Rejected;
                    order.rejection_reason = Some(RejectionReason::LimitUpNoLiquidity);
                    return MatchOutcome::Rejected;
                }
                if order.price < bar.limit_down {
                    order.status = OrderStatus::Rejected;
                    order.rejection_reason = Some(RejectionReason::LimitDownNoLiquidity);
                    return MatchOutcome::Rejected;
                }
                match order.side {
                    Side::Buy if order.price < deal_price => return MatchOutcome::NoFill,
                    Side::Sell if order.price > deal_price => return MatchOutcome::NoFill,
                    _ => {}
                }
            }
            OrderType::Market => {
                if self.bar_limit && order.side == Side::Buy && matches!(bar.status, BarStatus::LimitUp) {
                    order.status = OrderStatus::Rejected;
                    order.rejection_reason = Some(RejectionReason::LimitUpNoLiquidity);
                    return MatchOutcome::Rejected;
                }
                if self.bar_limit && order.side == Side::Sell && matches!(bar.status, BarStatus::LimitDown) {
                    order.status = OrderStatus::Rejected;
                    order.rejection_reason = Some(RejectionReason::LimitDownNoLiquidity);
                    return MatchOutcome::Rejected;
                }
            }
        }

        if self.bar_limit {
            if order.side == Side::Buy && matches!(bar.status, BarStatus::LimitUp) {
                return MatchOutcome::NoFill;
            }
            if order.side == Side::Sell && matches!(bar.status, BarStatus::LimitDown) {
                return MatchOutcome::NoFill;
            }
        }

        let already_used = *self.turnover.get(&order.instrument_id).unwrap_or(&0);
        let raw_limit = (bar.volume as f64 * self.volume_percent).round() as i64 - already_used;
        let round_lot = instrument.round_lot.max(1);
        let volume_limit = (raw_limit / round_lot) * round_lot;

        if volume_limit <= 0 {
            if matches!(order.order_type, OrderType::Market) {
                order.status = OrderStatus::Cancelled;
                return MatchOutcome::Cancelled;
            }
            return MatchOutcome::NoFill;
        }

        let unfilled = order.unfilled_quantity();
        let fill = unfilled.min(volume_limit);
        let ct_amount = close_today_amount(fill);
        let price = slippage.get_trade_price(order.side, deal_price);

        let mut trade = Trade {
            exec_id: format!("{}-{}", order.order_id, order.filled_quantity + fill),
            order_id: order.order_id.clone(),
            instrument_id: order.instrument_id.clone(),
            side: order.side,
            price,
            amount: fill,
            commission: 0,
            tax: 0,
            calendar_dt,
            trading_dt,
            close_today_amount: ct_amount,
        };
        trade.commission = commission.get_commission(&trade);
        trade.tax = tax.get_tax(&trade);

        order.filled_quantity += fill;
        order.status = if order.unfilled_quantity() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::Active
        };
        *self.turnover.entry(order.instrument_id.clone()).or_insert(0) += fill;

        if matches!(order.order_type, OrderType::Market) && order.unfilled_quantity() != 0 {
            order.status = OrderStatus::Cancelled;
        }

        MatchOutcome::Traded(trade)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mqk_schemas::InstrumentType;

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

    fn bar(status: BarStatus, close: i64, volume: i64) -> Bar {
        Bar {
            instrument_id: "000001.XSHE".into(),
            datetime: Utc::now(),
            open: close,
            high: close,
            low: close,
            close,
            volume,
            limit_up: close + 1_000_000,
            limit_down: close - 1_000_000,
            status,
            is_nan: false,
        }
    }

    fn market_order(side: Side, qty: i64) -> Order {
        Order {
            order_id: "o1".into(),
            instrument_id: "000001.XSHE".into(),
            side,
            order_type: OrderType::Market,
            price: 0,
            frozen_price: 10_000_000,
            quantity: qty,
            filled_quantity: 0,
            status: OrderStatus::Active,
            creation_time: Utc::now(),
            rejection_reason: None,
        }
    }

    #[test]
    fn market_buy_capped_by_volume_percent() {
        let mut matcher = Matcher::new(DealPriceDecider::CurrentBarClose, true, DEFAULT_VOLUME_PERCENT);
        matcher.start_bar();
        let inst = instrument();
        let b = bar(BarStatus::Ok, 10_000_000, 1000); // 25% of 1000 = 250, rounds to 200 (round_lot 100)
        let mut order = market_order(Side::Buy, 1000);
        let outcome = matcher.match_order(
            &mut order,
            &inst,
            &b,
            Utc::now(),
            Utc::now(),
            |_| 0,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            None,
        );
        assert!(matches!(outcome, MatchOutcome::Traded(_)));
        assert_eq!(order.filled_quantity, 200);
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[test]
    fn limit_up_rejects_market_buy() {
        let mut matcher = Matcher::new(DealPriceDecider::CurrentBarClose, true, DEFAULT_VOLUME_PERCENT);
        matcher.start_bar();
        let inst = instrument();
        let b = bar(BarStatus::LimitUp, 10_000_000, 1000);
        let mut order = market_order(Side::Buy, 100);
        let outcome = matcher.match_order(
            &mut order,
            &inst,
            &b,
            Utc::now(),
            Utc::now(),
            |_| 0,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            None,
        );
        assert!(matches!(outcome, MatchOutcome::Rejected));
        assert_eq!(order.status, OrderStatus::Rejected);
    }

    #[test]
    fn limit_order_defers_until_price_crosses() {
        let mut matcher = Matcher::new(DealPriceDecider::CurrentBarClose, true, DEFAULT_VOLUME_PERCENT);
        matcher.start_bar();
        let inst = instrument();
        let b = bar(BarStatus::Ok, 10_000_000, 1000);
        let mut order = Order {
            order_type: OrderType::Limit,
            price: 9_000_000,
            ..market_order(Side::Buy, 100)
        };
        let outcome = matcher.match_order(
            &mut order,
            &inst,
            &b,
            Utc::now(),
            Utc::now(),
            |_| 0,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            &crate::types::ZeroDeciders,
            None,
        );
        assert!(matches!(outcome, MatchOutcome::NoFill));
        assert_eq!(order.filled_quantity, 0);
    }
}
