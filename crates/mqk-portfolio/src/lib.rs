//! mqk-portfolio
//!
//! Account controllers (Stock / Future / Benchmark): average-cost position
//! tracking, T+1 holding discipline, two-phase dividend bookkeeping, split
//! adjustment, delisting sweep, and futures margin/mark-to-market. Pure
//! deterministic logic driven entirely by the trade/lifecycle calls the
//! broker and simulation driver make — no IO, no ambient clock.

mod account;
mod position;

pub use account::{BenchmarkAccount, FutureAccount, StockAccount, T1_EXEMPT_INSTRUMENTS};
pub use position::{FuturePosition, StockPosition};

/// Price/cash scale: micros (1e-6).
pub const MICROS_SCALE: i64 = 1_000_000;
