//! Data model shared across the simulation crates.
//!
//! These are plain, serde-friendly structs describing the world the
//! matching engine, accounts, and broker all reason about: instruments,
//! bars, orders, trades, and dividends. Money fields use a 1e-6 fixed-point
//! representation (`i64`, scale `MICROS_SCALE`) rather than floating point,
//! the convention already used across this workspace's accounting code.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 1 unit of currency = 1_000_000 micros.
pub const MICROS_SCALE: i64 = 1_000_000;

pub type InstrumentId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstrumentType {
    Stock,
    Index,
    Future,
}

/// Tradable instrument reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,
    pub instrument_type: InstrumentType,
    pub exchange: String,
    pub listed_date: DateTime<Utc>,
    pub de_listed_date: Option<DateTime<Utc>>,
    /// Minimum tradable lot size; orders must be an integer multiple of this.
    pub round_lot: i64,
    pub is_listed: bool,
}

impl Instrument {
    pub fn is_delisted_by(&self, dt: DateTime<Utc>) -> bool {
        match self.de_listed_date {
            Some(d) => dt >= d,
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarStatus {
    /// Normal trading bar with real volume/price data.
    Ok,
    /// Close == limit-up price for this instrument/day.
    LimitUp,
    /// Close == limit-down price for this instrument/day.
    LimitDown,
    /// No trading occurred (e.g. suspended) — price fields carry the last
    /// known settle value but must not be treated as a fresh quote.
    Error,
}

/// A single OHLCV bar for one instrument over one trading period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub instrument_id: InstrumentId,
    pub datetime: DateTime<Utc>,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
    pub limit_up: i64,
    pub limit_down: i64,
    pub status: BarStatus,
    /// True when this bar is a filled-forward placeholder (no trade data);
    /// callers must treat price fields as stale.
    pub is_nan: bool,
}

impl Bar {
    pub fn is_trading_suspended(&self) -> bool {
        self.is_nan || matches!(self.status, BarStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    PendingNew,
    Active,
    Filled,
    Cancelled,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    NoMarketData,
    InstrumentSuspended,
    InstrumentNotListed,
    InstrumentDelisted,
    LimitUpNoLiquidity,
    LimitDownNoLiquidity,
    CashInsufficient,
    PositionInsufficient,
    InvalidQuantity,
    RoundLotViolation,
}

/// An order submitted to the simulation broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub order_type: OrderType,
    /// Limit price in micros; ignored for market orders.
    pub price: i64,
    /// Price frozen at submission time for cash-freeze accounting
    /// (the close of the bar the order was submitted against).
    pub frozen_price: i64,
    pub quantity: i64,
    pub filled_quantity: i64,
    pub status: OrderStatus,
    pub creation_time: DateTime<Utc>,
    pub rejection_reason: Option<RejectionReason>,
}

impl Order {
    pub fn unfilled_quantity(&self) -> i64 {
        self.quantity - self.filled_quantity
    }

    pub fn is_final(&self) -> bool {
        matches!(
            self.status,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// A single fill produced by the matching engine against an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub exec_id: String,
    pub order_id: String,
    pub instrument_id: InstrumentId,
    pub side: Side,
    pub price: i64,
    pub amount: i64,
    pub commission: i64,
    pub tax: i64,
    pub calendar_dt: DateTime<Utc>,
    pub trading_dt: DateTime<Utc>,
    /// Quantity of this fill that is same-day (T+0) closing volume, relevant
    /// for instruments exempt from T+1 holding (e.g. certain ETFs).
    pub close_today_amount: i64,
}

/// A per-instrument, per-record-date dividend entitlement, tracked through
/// its two-phase lifecycle: declared (ex-dividend, entitlement recorded) and
/// payable (cash actually credited).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dividend {
    pub instrument_id: InstrumentId,
    pub book_closure_date: DateTime<Utc>,
    pub ex_dividend_date: DateTime<Utc>,
    pub payable_date: DateTime<Utc>,
    /// Cash dividend per held share, in micros.
    pub cash_per_share: i64,
    /// Quantity held of record on the book-closure date; fixed once
    /// observed, independent of later trading.
    pub quantity_at_record: i64,
    pub ex_dividend_booked: bool,
    pub payable_booked: bool,
}

impl Dividend {
    pub fn receivable_micros(&self) -> i64 {
        self.cash_per_share * self.quantity_at_record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inst() -> Instrument {
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

    #[test]
    fn delisting_boundary_is_inclusive() {
        let mut i = inst();
        i.de_listed_date = Some("2020-01-01T00:00:00Z".parse().unwrap());
        assert!(i.is_delisted_by("2020-01-01T00:00:00Z".parse().unwrap()));
        assert!(!i.is_delisted_by("2019-12-31T00:00:00Z".parse().unwrap()));
    }

    #[test]
    fn order_unfilled_quantity() {
        let o = Order {
            order_id: "1".into(),
            instrument_id: "000001.XSHE".into(),
            side: Side::Buy,
            order_type: OrderType::Limit,
            price: 10_000_000,
            frozen_price: 10_000_000,
            quantity: 300,
            filled_quantity: 100,
            status: OrderStatus::Active,
            creation_time: Utc::now(),
            rejection_reason: None,
        };
        assert_eq!(o.unfilled_quantity(), 200);
        assert!(!o.is_final());
    }
}
