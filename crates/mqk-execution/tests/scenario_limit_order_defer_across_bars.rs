use chrono::Utc;
use mqk_execution::{DealPriceDecider, Matcher, ZeroDeciders};
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

fn limit_order(price: i64) -> Order {
    Order {
        order_id: "o1".into(),
        instrument_id: "000001.XSHE".into(),
        side: Side::Buy,
        order_type: OrderType::Limit,
        price,
        frozen_price: price,
        quantity: 100,
        filled_quantity: 0,
        status: OrderStatus::Active,
        creation_time: Utc::now(),
        rejection_reason: None,
    }
}

/// A resting limit buy below the first bar's deal price stays unfilled, then
/// fills once a later bar's close drops to meet it — the broker is expected
/// to re-present the same order to the matcher on each subsequent bar.
#[test]
fn limit_order_fills_on_a_later_bar() {
    let inst = instrument();
    let mut matcher = Matcher::new(DealPriceDecider::CurrentBarClose, true, 0.25);
    let mut order = limit_order(9_500_000);

    matcher.start_bar();
    let day1 = bar(10_000_000);
    let outcome1 = matcher.match_order(
        &mut order,
        &inst,
        &day1,
        Utc::now(),
        Utc::now(),
        |_| 0,
        &ZeroDeciders,
        &ZeroDeciders,
        &ZeroDeciders,
        None,
    );
    assert!(matches!(outcome1, mqk_execution::MatchOutcome::NoFill));
    assert_eq!(order.status, OrderStatus::Active);

    matcher.start_bar();
    let day2 = bar(9_400_000);
    let outcome2 = matcher.match_order(
        &mut order,
        &inst,
        &day2,
        Utc::now(),
        Utc::now(),
        |_| 0,
        &ZeroDeciders,
        &ZeroDeciders,
        &ZeroDeciders,
        None,
    );
    assert!(matches!(outcome2, mqk_execution::MatchOutcome::Traded(_)));
    assert_eq!(order.status, OrderStatus::Filled);
}
