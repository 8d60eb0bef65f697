// src/market/guard.rs
//! Batch level sanity check for scraped market data.
//!
//! Shortly before the market opens the source has been seen to serve tables
//! where a large share of rows carry the same daily change of `0.43`. A batch
//! where more than 20% of rows carry exactly that value is rejected. This is
//! a best-effort heuristic, not an integrity check: a corrupted batch with a
//! different sentinel passes, and a genuine market move to 0.43 on many rows
//! is rejected.

use super::MarketRecord;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const SENTINEL_DAILY_CHANGE: Decimal = dec!(0.43);

/// Largest accepted share of sentinel rows, in percent. The bound is
/// inclusive: exactly 20% is accepted.
pub const MAX_SENTINEL_SHARE_PCT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Rejected { sentinel_rows: usize, total: usize },
}

impl Verdict {
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved)
    }
}

/// Counts over the records as given, so callers pass one record per symbol.
/// Callers reject empty batches before asking; an empty batch is approved
/// here since it has no sentinel rows.
pub fn inspect<'a, R: MarketRecord>(records: impl IntoIterator<Item = &'a R>) -> Verdict {
    let (total, sentinel_rows) = records.into_iter().fold((0, 0), |(total, sentinel), r| {
        let hit = r.daily_change_pct() == SENTINEL_DAILY_CHANGE;
        (total + 1, sentinel + usize::from(hit))
    });

    // (sentinel / total) * 100 > 20, kept in integers
    if sentinel_rows * 100 > MAX_SENTINEL_SHARE_PCT * total {
        Verdict::Rejected {
            sentinel_rows,
            total,
        }
    } else {
        Verdict::Approved
    }
}
