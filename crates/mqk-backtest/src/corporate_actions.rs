//! Corporate-action data-quality policy.
//!
//! Splits, dividends, and delistings are applied directly by the account
//! controllers (see `mqk_portfolio::StockAccount`) from events the driver
//! feeds in. This policy guards a separate concern: bars for a symbol whose
//! *price series itself* is unadjusted across a known corporate action
//! (a raw, un-backadjusted split shows up as a fake overnight 50% drop) are
//! contaminated input, not a simulation event — the driver should refuse to
//! run a strategy against them rather than silently produce biased results.
//!
//! - [`CorporateActionPolicy::Allow`] — no enforcement; the caller
//!   guarantees the bar series is already adjusted.
//! - [`CorporateActionPolicy::ForbidPeriods`] — halt immediately when a bar
//!   arrives inside a declared (symbol, period) exclusion window.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForbidEntry {
    pub instrument_id: String,
    pub start_ts: chrono::DateTime<chrono::Utc>,
    pub end_ts: chrono::DateTime<chrono::Utc>,
}

impl ForbidEntry {
    pub fn new(
        instrument_id: impl Into<String>,
        start_ts: chrono::DateTime<chrono::Utc>,
        end_ts: chrono::DateTime<chrono::Utc>,
    ) -> Self {
        debug_assert!(end_ts >= start_ts, "end_ts must be >= start_ts");
        Self {
            instrument_id: instrument_id.into(),
            start_ts,
            end_ts,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorporateActionPolicy {
    /// No enforcement: all bars processed regardless of corporate actions.
    Allow,
    /// Halt on any bar that falls within a declared exclusion period.
    ForbidPeriods(Vec<ForbidEntry>),
}

impl CorporateActionPolicy {
    pub fn is_excluded(&self, instrument_id: &str, bar_dt: chrono::DateTime<chrono::Utc>) -> bool {
        match self {
            CorporateActionPolicy::Allow => false,
            CorporateActionPolicy::ForbidPeriods(entries) => entries
                .iter()
                .any(|e| e.instrument_id == instrument_id && bar_dt >= e.start_ts && bar_dt <= e.end_ts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn allow_never_excludes() {
        assert!(!CorporateActionPolicy::Allow.is_excluded("000001.XSHE", Utc::now()));
    }

    #[test]
    fn forbid_period_excludes_inside_window_only() {
        let start = "2024-01-01T00:00:00Z".parse().unwrap();
        let end = "2024-01-05T00:00:00Z".parse().unwrap();
        let policy = CorporateActionPolicy::ForbidPeriods(vec![ForbidEntry::new("000001.XSHE", start, end)]);
        assert!(policy.is_excluded("000001.XSHE", "2024-01-03T00:00:00Z".parse().unwrap()));
        assert!(!policy.is_excluded("000001.XSHE", "2024-01-10T00:00:00Z".parse().unwrap()));
        assert!(!policy.is_excluded("000002.XSHE", "2024-01-03T00:00:00Z".parse().unwrap()));
    }
}
