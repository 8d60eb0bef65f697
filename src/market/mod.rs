// src/market/mod.rs
//! Market data ingestion and lookup.
//!
//! Write path, one task per kind: `scheduler` fires, `scrape` fetches the
//! document and extracts table rows, `parser` types them, `guard` vets the
//! batch and `snapshot` publishes it. Read path: `lookup` answers symbol
//! queries against the latest published snapshot.

pub mod guard;
pub mod lookup;
pub mod parser;
pub mod scheduler;
pub mod scrape;
pub mod snapshot;

use crate::models::MarketKind;
use parser::{ParseError, RawRow};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record type the ingestion pipeline can be instantiated for.
pub trait MarketRecord: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    const KIND: MarketKind;

    fn symbol(&self) -> &str;

    /// Latest price for stocks, latest value for indexes.
    fn latest_value(&self) -> Decimal;

    fn daily_change_pct(&self) -> Decimal;

    fn display_name(&self) -> Option<&str> {
        None
    }

    /// Builds a record from one table row. Pure, no I/O.
    fn parse_row(row: &RawRow) -> Result<Self, ParseError>;
}
