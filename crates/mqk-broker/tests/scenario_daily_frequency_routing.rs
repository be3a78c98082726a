use std::collections::HashMap;

use chrono::Utc;
use mqk_broker::{Broker, BrokerEvent};
use mqk_execution::DealPriceDecider;
use mqk_portfolio::StockAccount;
use mqk_schemas::{Bar, BarStatus, Instrument, InstrumentType, Order, OrderStatus, OrderType, Side};

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

fn bar(close: i64) -> Bar {
    Bar {
        instrument_id: "000001.XSHE".into(),
        datetime: Utc::now(),
        open: close,
        high: close,
        low: close,
        close,
        volume: 10_000,
        limit_up: close + 2_000_000,
        limit_down: close - 2_000_000,
        status: BarStatus::Ok,
        is_nan: false,
    }
}

fn order(id: &str, qty: i64) -> Order {
    Order {
        order_id: id.into(),
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

/// Next-bar-open matching on a daily-frequency run defers every order
/// submitted today to the delayed queue; it only becomes matchable once
/// `after_trading` promotes it into tomorrow's open queue.
#[test]
fn daily_next_bar_open_defers_to_tomorrow() {
    let mut broker = Broker::new(DealPriceDecider::NextBarOpen, true, 0.25, true)
        .with_stock_account(StockAccount::new(1_000_000 * mqk_schemas::MICROS_SCALE));
    assert!(!broker.matches_immediately());

    let inst = instrument();
    let events = broker.submit_order(order("o1", 100), &inst);
    // No `OrderCreationPass` at submission time for a delayed order — only
    // `OrderPendingNew`. The pass is re-emitted by `before_trading` once
    // `after_trading` promotes it into tomorrow's open queue.
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], BrokerEvent::OrderPendingNew(_)));
    assert_eq!(broker.delayed_orders().len(), 1);
    assert!(broker.open_orders().is_empty());

    let instruments = HashMap::from([(inst.id.clone(), inst.clone())]);
    broker.after_trading(|id| instruments.get(id));
    assert_eq!(broker.open_orders().len(), 1);
    assert!(broker.delayed_orders().is_empty());

    let before_events = broker.before_trading();
    assert_eq!(before_events.len(), 1);
    assert!(matches!(before_events[0], BrokerEvent::OrderCreationPass(_)));

    broker.start_bar();
    let bars = HashMap::from([(inst.id.clone(), bar(10_000_000))]);
    let instruments_map = HashMap::from([(inst.id.clone(), inst)]);
    let match_events = broker.match_bar(&bars, &instruments_map, Utc::now(), Utc::now(), &HashMap::new(), 1);
    assert!(match_events.iter().any(|e| matches!(e, BrokerEvent::Trade(_))));
    assert!(broker.open_orders().is_empty());
}
