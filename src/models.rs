// src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// The two kinds of scraped market data. Each kind has its own source,
/// snapshot, lookup endpoints and watchlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    Stocks,
    Indexes,
}

impl MarketKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketKind::Stocks => "stocks",
            MarketKind::Indexes => "indexes",
        }
    }

    /// Singular noun used in user facing messages ("'X' is not valid stock symbol.").
    pub fn noun(&self) -> &'static str {
        match self {
            MarketKind::Stocks => "stock",
            MarketKind::Indexes => "index",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            MarketKind::Stocks => "Stocks",
            MarketKind::Indexes => "Indexes",
        }
    }

    /// JSON field carrying the symbol in watchlist payloads.
    pub fn symbol_field(&self) -> &'static str {
        match self {
            MarketKind::Stocks => "stockSymbol",
            MarketKind::Indexes => "indexSymbol",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stock {
    #[serde(rename = "stockSymbol")]
    pub symbol: String,
    pub latest_price: Decimal,
    pub daily_change_pct: Decimal,
    #[serde(rename = "dailyChangeInTL")]
    pub daily_change_in_tl: Decimal,
    #[serde(rename = "tradingVolumeTL")]
    pub trading_volume_tl: Decimal,
    pub trade_volume_count: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    pub symbol: String,
    pub name: String,
    pub latest_value: Decimal,
    pub daily_change_pct: Decimal,
    pub weekly_change_pct: Decimal,
    pub monthly_change_pct: Decimal,
    pub yearly_change_pct: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    pub date: NaiveDate,
    pub stock_symbol: String,
    pub quantity: i64,
    pub price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub date: NaiveDate,
    pub stock_symbol: String,
    pub quantity: i64,
    pub price: Decimal,
}

/// Aggregate position in one symbol, derived from a user's transactions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistEntry {
    pub user_id: String,
    pub kind: MarketKind,
    pub symbol: String,
}

/// A holding joined with live market data. Computed per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioPosition {
    pub stock_symbol: String,
    pub latest_price: Decimal,
    pub daily_change_pct: Decimal,
    #[serde(rename = "dailyChangeInTL")]
    pub daily_change_in_tl: Decimal,
    pub average_cost: Decimal,
    /// `None` when the average cost is zero.
    pub profit_loss_pct: Option<Decimal>,
    #[serde(rename = "profitLossInTL")]
    pub profit_loss_in_tl: Decimal,
    pub quantity: Decimal,
}

/// A watchlist symbol with whatever market data the lookup service had for it.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistQuote {
    pub kind: MarketKind,
    pub symbol: String,
    pub latest_value: Option<Decimal>,
    pub daily_change_pct: Option<Decimal>,
}

impl Serialize for WatchlistQuote {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("WatchlistQuote", 3)?;
        state.serialize_field(self.kind.symbol_field(), &self.symbol)?;
        state.serialize_field("latestValue", &self.latest_value)?;
        state.serialize_field("dailyChangePct", &self.daily_change_pct)?;
        state.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultStatus {
    Success,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Success => "success",
            ResultStatus::Failed => "failed",
        }
    }
}

/// Outcome of adding or removing one watchlist symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolResult {
    pub kind: MarketKind,
    pub symbol: String,
    pub status: ResultStatus,
    pub error: Option<String>,
}

impl SymbolResult {
    pub fn success(kind: MarketKind, symbol: &str) -> Self {
        SymbolResult {
            kind,
            symbol: symbol.to_string(),
            status: ResultStatus::Success,
            error: None,
        }
    }

    pub fn with_note(kind: MarketKind, symbol: &str, note: impl Into<String>) -> Self {
        SymbolResult {
            error: Some(note.into()),
            ..SymbolResult::success(kind, symbol)
        }
    }

    pub fn failed(kind: MarketKind, symbol: &str, error: impl Into<String>) -> Self {
        SymbolResult {
            kind,
            symbol: symbol.to_string(),
            status: ResultStatus::Failed,
            error: Some(error.into()),
        }
    }
}

impl Serialize for SymbolResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("SymbolResult", 3)?;
        state.serialize_field(self.kind.symbol_field(), &self.symbol)?;
        state.serialize_field("status", self.status.as_str())?;
        state.serialize_field("error", &self.error)?;
        state.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub status: u16,
    pub message: String,
    pub path: String,
}

/// Envelope shared by every endpoint, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub status: u16,
    pub message: String,
    pub data: Option<T>,
    #[serde(default)]
    pub errors: Vec<ErrorDetails>,
    #[serde(default)]
    pub path: String,
}

impl<T> ApiResponse<T> {
    pub fn ok(status: u16, message: impl Into<String>, data: T, path: &str) -> Self {
        ApiResponse {
            timestamp: Utc::now(),
            success: true,
            status,
            message: message.into(),
            data: Some(data),
            errors: Vec::new(),
            path: path.to_string(),
        }
    }

    pub fn failure(status: u16, message: impl Into<String>, path: &str) -> Self {
        let message = message.into();
        ApiResponse {
            timestamp: Utc::now(),
            success: false,
            status,
            errors: vec![ErrorDetails {
                status,
                message: message.clone(),
                path: path.to_string(),
            }],
            message,
            data: None,
            path: path.to_string(),
        }
    }

    pub fn with_error(mut self, status: u16, message: impl Into<String>) -> Self {
        self.errors.push(ErrorDetails {
            status,
            message: message.into(),
            path: self.path.clone(),
        });
        self
    }
}
