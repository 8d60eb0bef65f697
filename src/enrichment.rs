// src/enrichment.rs
//! Joins ownership data with live market data.
use crate::error::AppError;
use crate::market::MarketRecord;
use crate::models::{Holding, MarketKind, PortfolioPosition, Stock, WatchlistQuote};
use crate::paging::SortFields;
use rust_decimal::{Decimal, RoundingStrategy};
use std::cmp::Ordering;
use std::collections::HashMap;

const HALF_UP: RoundingStrategy = RoundingStrategy::MidpointAwayFromZero;

/// `round2((latest / avg_cost rounded to 4 places - 1) * 100)`, half-up.
/// `None` for a zero average cost or a ratio too large to represent.
pub fn profit_loss_pct(latest_price: Decimal, average_cost: Decimal) -> Option<Decimal> {
    let ratio = latest_price
        .checked_div(average_cost)?
        .round_dp_with_strategy(4, HALF_UP);
    let pct = ratio
        .checked_sub(Decimal::ONE)?
        .checked_mul(Decimal::ONE_HUNDRED)?;
    Some(pct.round_dp_with_strategy(2, HALF_UP))
}

/// `None` on overflow.
pub fn profit_loss_amount(
    latest_price: Decimal,
    average_cost: Decimal,
    quantity: Decimal,
) -> Option<Decimal> {
    latest_price.checked_sub(average_cost)?.checked_mul(quantity)
}

fn position(holding: &Holding, stock: &Stock) -> Result<PortfolioPosition, AppError> {
    let profit_loss_in_tl =
        profit_loss_amount(stock.latest_price, holding.average_cost, holding.quantity)
            .ok_or_else(|| AppError::ValueOutOfRange(holding.symbol.clone()))?;
    Ok(PortfolioPosition {
        stock_symbol: holding.symbol.clone(),
        latest_price: stock.latest_price,
        daily_change_pct: stock.daily_change_pct,
        daily_change_in_tl: stock.daily_change_in_tl,
        average_cost: holding.average_cost,
        profit_loss_pct: profit_loss_pct(stock.latest_price, holding.average_cost),
        profit_loss_in_tl,
        quantity: holding.quantity,
    })
}

/// One position per holding that has market data; the rest are dropped.
pub fn enrich_holdings(
    holdings: &[Holding],
    market: &HashMap<String, Stock>,
) -> Result<Vec<PortfolioPosition>, AppError> {
    holdings
        .iter()
        .filter_map(|holding| {
            let stock = market.get(&holding.symbol)?;
            Some(position(holding, stock))
        })
        .collect()
}

/// One quote per symbol. Symbols without market data keep empty values.
pub fn enrich_watchlist<R: MarketRecord>(
    symbols: &[String],
    market: &HashMap<String, R>,
) -> Vec<WatchlistQuote> {
    symbols
        .iter()
        .map(|symbol| {
            let record = market.get(symbol);
            WatchlistQuote {
                kind: R::KIND,
                symbol: symbol.clone(),
                latest_value: record.map(R::latest_value),
                daily_change_pct: record.map(R::daily_change_pct),
            }
        })
        .collect()
}

fn position_symbol(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.stock_symbol.cmp(&b.stock_symbol)
}

fn position_latest_price(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.latest_price.cmp(&b.latest_price)
}

fn position_daily_change(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.daily_change_pct.cmp(&b.daily_change_pct)
}

fn position_average_cost(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.average_cost.cmp(&b.average_cost)
}

fn position_profit_loss_pct(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.profit_loss_pct.cmp(&b.profit_loss_pct)
}

fn position_profit_loss_amount(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.profit_loss_in_tl.cmp(&b.profit_loss_in_tl)
}

fn position_quantity(a: &PortfolioPosition, b: &PortfolioPosition) -> Ordering {
    a.quantity.cmp(&b.quantity)
}

pub const POSITION_SORT_FIELDS: SortFields<PortfolioPosition> = &[
    ("stockSymbol", position_symbol),
    ("latestPrice", position_latest_price),
    ("dailyChangePct", position_daily_change),
    ("averageCost", position_average_cost),
    ("profitLossPct", position_profit_loss_pct),
    ("profitLossInTL", position_profit_loss_amount),
    ("quantity", position_quantity),
];

fn quote_symbol(a: &WatchlistQuote, b: &WatchlistQuote) -> Ordering {
    a.symbol.cmp(&b.symbol)
}

fn quote_latest_value(a: &WatchlistQuote, b: &WatchlistQuote) -> Ordering {
    a.latest_value.cmp(&b.latest_value)
}

fn quote_daily_change(a: &WatchlistQuote, b: &WatchlistQuote) -> Ordering {
    a.daily_change_pct.cmp(&b.daily_change_pct)
}

const STOCK_QUOTE_SORT_FIELDS: SortFields<WatchlistQuote> = &[
    ("stockSymbol", quote_symbol),
    ("latestValue", quote_latest_value),
    ("dailyChangePct", quote_daily_change),
];

const INDEX_QUOTE_SORT_FIELDS: SortFields<WatchlistQuote> = &[
    ("indexSymbol", quote_symbol),
    ("latestValue", quote_latest_value),
    ("dailyChangePct", quote_daily_change),
];

/// Quotes without a value sort before priced ones.
pub fn quote_sort_fields(kind: MarketKind) -> SortFields<WatchlistQuote> {
    match kind {
        MarketKind::Stocks => STOCK_QUOTE_SORT_FIELDS,
        MarketKind::Indexes => INDEX_QUOTE_SORT_FIELDS,
    }
}
