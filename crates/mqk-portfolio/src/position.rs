//! Per-instrument position state used by the account controllers.
//!
//! Average-cost accounting, not FIFO lots: these track the quantities an
//! account controller needs directly — average cost, same-day ("today")
//! acquired quantity for T+1 holding discipline, and frozen quantity
//! reserved by resting sell orders.

/// A stock/index position tracked with average-cost accounting, the
/// convention `stock_account.py` uses (as opposed to the ledger's FIFO lots).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPosition {
    pub instrument_id: String,
    /// Total held quantity (buy_trade_quantity - sell_trade_quantity, cumulative).
    pub quantity: i64,
    /// Quantity acquired by trades that settled *today*; not sellable unless
    /// the instrument is T+1-exempt. Reset to 0 at the next `before_trading`.
    pub today_quantity: i64,
    /// Quantity reserved by resting sell orders (can't be sold twice).
    pub frozen_quantity: i64,
    pub avg_price_micros: i64,
}

impl StockPosition {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            quantity: 0,
            today_quantity: 0,
            frozen_quantity: 0,
            avg_price_micros: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Quantity available to sell right now, given whether this instrument
    /// is exempt from T+1 holding.
    pub fn sellable_quantity(&self, t1_exempt: bool) -> i64 {
        let held_eligible = if t1_exempt {
            self.quantity
        } else {
            self.quantity - self.today_quantity
        };
        (held_eligible - self.frozen_quantity).max(0)
    }

    /// Weighted-average cost update on a buy fill.
    pub fn apply_buy_trade(&mut self, qty: i64, price_micros: i64) {
        debug_assert!(qty > 0);
        let prior_cost = self.avg_price_micros as i128 * self.quantity as i128;
        let trade_cost = price_micros as i128 * qty as i128;
        self.quantity += qty;
        self.today_quantity += qty;
        self.avg_price_micros = if self.quantity > 0 {
            ((prior_cost + trade_cost) / self.quantity as i128) as i64
        } else {
            0
        };
    }

    /// A sell fill reduces quantity; average cost is unchanged (realized PnL
    /// is the account controller's concern, computed against `avg_price_micros`
    /// at the moment of the sell).
    pub fn apply_sell_trade(&mut self, qty: i64) {
        debug_assert!(qty <= self.quantity, "cannot sell more than is held");
        self.quantity -= qty;
    }

    /// Quantity of a sell fill that is same-day (T+0) closing, used by the
    /// matching engine to populate `Trade::close_today_amount`.
    pub fn close_today_amount(&self, fill_qty: i64) -> i64 {
        fill_qty.min(self.today_quantity)
    }

    /// Scale quantities by a `num/den` split ratio (e.g. a 2-for-1 split is
    /// `num=2, den=1`). Average price scales inversely so market value is
    /// unaffected by the adjustment.
    pub fn apply_split(&mut self, num: i64, den: i64) {
        debug_assert!(num > 0 && den > 0);
        self.quantity = (self.quantity as i128 * num as i128 / den as i128) as i64;
        self.today_quantity = (self.today_quantity as i128 * num as i128 / den as i128) as i64;
        self.frozen_quantity = (self.frozen_quantity as i128 * num as i128 / den as i128) as i64;
        self.avg_price_micros = (self.avg_price_micros as i128 * den as i128 / num as i128) as i64;
    }

    /// Roll same-day acquisitions into freely-sellable holdings. Called once
    /// per trading day, before the first bar is matched.
    pub fn roll_today_quantity(&mut self) {
        self.today_quantity = 0;
    }

    pub fn market_value(&self, close_price_micros: i64) -> i64 {
        self.quantity * close_price_micros
    }
}

/// A futures position, tracked with a signed quantity (long positive, short
/// negative) and the margin currently posted against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuturePosition {
    pub instrument_id: String,
    pub quantity_signed: i64,
    pub margin_micros: i64,
    pub last_settle_price_micros: i64,
}

impl FuturePosition {
    pub fn new(instrument_id: impl Into<String>) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            quantity_signed: 0,
            margin_micros: 0,
            last_settle_price_micros: 0,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity_signed == 0
    }
}
