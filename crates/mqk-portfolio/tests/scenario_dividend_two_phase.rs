//! Scenario 4 from the simulation core's testable-property list: a cash
//! dividend books an entitlement against the position held on the
//! ex-dividend date, then credits cash on the payable date and clears.

use chrono::Utc;
use mqk_portfolio::StockAccount;
use mqk_schemas::{Dividend, Side, Trade, MICROS_SCALE};

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
fn dividend_books_on_ex_date_and_pays_on_payable_date() {
    let mut acc = StockAccount::new(1_000_000 * MICROS_SCALE);
    acc.on_trade(&trade("600000.XSHG", Side::Buy, 10 * MICROS_SCALE, 1_000));

    // Day D: ex-dividend. 0.1/share on 1000 shares held of record.
    let dividend = Dividend {
        instrument_id: "600000.XSHG".into(),
        book_closure_date: Utc::now(),
        ex_dividend_date: Utc::now(),
        payable_date: Utc::now(),
        cash_per_share: MICROS_SCALE / 10,
        quantity_at_record: 0,
        ex_dividend_booked: false,
        payable_booked: false,
    };
    acc.handle_dividend_ex_dividend(dividend);
    let entry = &acc.dividend_info["600000.XSHG"];
    assert_eq!(entry.quantity_at_record, 1_000);
    assert_eq!(entry.receivable_micros(), 100 * MICROS_SCALE);
    assert_eq!(acc.dividend_receivable_micros, 100 * MICROS_SCALE);

    // Trading in between does not change the fixed entitlement.
    acc.on_trade(&trade("600000.XSHG", Side::Sell, 10 * MICROS_SCALE, 500));
    assert_eq!(acc.dividend_info["600000.XSHG"].quantity_at_record, 1_000);
    assert_eq!(acc.dividend_receivable_micros, 100 * MICROS_SCALE);

    // Day E: payable. Cash credited once, entry discarded, receivable cleared.
    let cash_before = acc.cash_micros;
    acc.handle_dividend_payable("600000.XSHG");
    assert_eq!(acc.cash_micros, cash_before + 100 * MICROS_SCALE);
    assert!(!acc.dividend_info.contains_key("600000.XSHG"));
    assert_eq!(acc.dividend_receivable_micros, 0);

    // A second call (e.g. idempotent re-delivery) is a no-op.
    let cash_after_first_pay = acc.cash_micros;
    acc.handle_dividend_payable("600000.XSHG");
    assert_eq!(acc.cash_micros, cash_after_first_pay);
    assert_eq!(acc.dividend_receivable_micros, 0);
}
