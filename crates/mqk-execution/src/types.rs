//! External collider interfaces the matching engine calls into per trade:
//! slippage, commission, and tax. Each account wires its own deciders in;
//! the matcher itself stays free of venue/instrument-specific pricing rules.

use mqk_schemas::{Bar, Side, Trade};

pub trait SlippageDecider: Send + Sync {
    /// Adjust the raw deal price for market impact. Called once per trade,
    /// after the deal price has been decided but before commission/tax.
    fn get_trade_price(&self, side: Side, deal_price: i64) -> i64;
}

pub trait CommissionDecider: Send + Sync {
    fn get_commission(&self, trade: &Trade) -> i64;
}

pub trait TaxDecider: Send + Sync {
    fn get_tax(&self, trade: &Trade) -> i64;
}

/// No slippage, commission, or tax — useful for unit tests and for a
/// benchmark account that only ever needs a seed trade.
pub struct ZeroDeciders;

impl SlippageDecider for ZeroDeciders {
    fn get_trade_price(&self, _side: Side, deal_price: i64) -> i64 {
        deal_price
    }
}

impl CommissionDecider for ZeroDeciders {
    fn get_commission(&self, _trade: &Trade) -> i64 {
        0
    }
}

impl TaxDecider for ZeroDeciders {
    fn get_tax(&self, _trade: &Trade) -> i64 {
        0
    }
}

/// Which bar price is used as the baseline deal price before slippage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealPriceDecider {
    CurrentBarClose,
    NextBarOpen,
}

impl DealPriceDecider {
    pub fn deal_price(self, bar: &Bar, next_bar_open: Option<i64>) -> i64 {
        match self {
            DealPriceDecider::CurrentBarClose => bar.close,
            DealPriceDecider::NextBarOpen => next_bar_open.unwrap_or(bar.close),
        }
    }
}
