//! mqk-execution
//!
//! Bar-based matching engine and order lifecycle state machine. Matches
//! resting orders against one OHLCV bar at a time, applying the slippage,
//! commission, and tax deciders an account wires in. Pure deterministic
//! logic — no IO, no wall-clock time, no broker/network wiring.

mod matching;
mod types;

pub use matching::{MatchOutcome, Matcher, DEFAULT_VOLUME_PERCENT};
pub use types::{CommissionDecider, DealPriceDecider, SlippageDecider, TaxDecider, ZeroDeciders};
