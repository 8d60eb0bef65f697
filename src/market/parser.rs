// src/market/parser.rs
use super::MarketRecord;
use crate::models::{Index, MarketKind, Stock};
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Class marking the numeric cells of the stocks table.
const NUMERIC_CELL_CLASS: &str = "text-right";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("row has no {0} symbol")]
    MissingSymbol(&'static str),

    #[error("cell '{0}' is missing")]
    MissingCell(&'static str),

    #[error("value is empty for decimal parsing")]
    Empty,

    #[error("failed to parse decimal from value: {0}")]
    NotNumeric(String),
}

/// One `<td>` of the source table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCell {
    pub text: String,
    pub classes: Vec<String>,
    pub title: Option<String>,
    pub link_text: Option<String>,
}

impl RawCell {
    pub fn text(text: &str) -> Self {
        RawCell {
            text: text.to_string(),
            ..RawCell::default()
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// One `<tr>` of the source table, reduced to what the parsers read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub cells: Vec<RawCell>,
}

impl RawRow {
    pub fn new(cells: Vec<RawCell>) -> Self {
        RawRow { cells }
    }

    fn cell(&self, index: usize, name: &'static str) -> Result<&RawCell, ParseError> {
        self.cells.get(index).ok_or(ParseError::MissingCell(name))
    }

    fn first_link_text(&self) -> Option<&str> {
        self.cells
            .iter()
            .find_map(|c| c.link_text.as_deref())
            .map(str::trim)
    }

    fn first_title(&self) -> Option<&str> {
        self.cells.iter().find_map(|c| c.title.as_deref())
    }

    /// Cell texts joined for log lines.
    pub fn summary(&self) -> String {
        self.cells
            .iter()
            .map(|c| c.text.trim())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// Rewrites a `1.234,56` style number into `1234.56`.
pub fn normalize_number(value: &str) -> String {
    value.trim().replace('.', "").replace(',', ".")
}

pub fn parse_decimal(value: &str) -> Result<Decimal, ParseError> {
    if value.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    Decimal::from_str(&normalize_number(value))
        .map_err(|_| ParseError::NotNumeric(value.to_string()))
}

fn decimal_cell(cell: Option<&RawCell>, name: &'static str) -> Result<Decimal, ParseError> {
    let cell = cell.ok_or(ParseError::MissingCell(name))?;
    parse_decimal(&cell.text)
}

impl MarketRecord for Stock {
    const KIND: MarketKind = MarketKind::Stocks;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn latest_value(&self) -> Decimal {
        self.latest_price
    }

    fn daily_change_pct(&self) -> Decimal {
        self.daily_change_pct
    }

    /// Symbol is the first link text; numbers are the right aligned cells, in
    /// column order.
    fn parse_row(row: &RawRow) -> Result<Self, ParseError> {
        let symbol = row
            .first_link_text()
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingSymbol("stock"))?;

        let numeric: Vec<&RawCell> = row
            .cells
            .iter()
            .filter(|c| c.has_class(NUMERIC_CELL_CLASS))
            .collect();
        let at = |i: usize| numeric.get(i).copied();

        Ok(Stock {
            symbol: symbol.to_string(),
            latest_price: decimal_cell(at(0), "latestPrice")?,
            daily_change_pct: decimal_cell(at(1), "dailyChangePct")?,
            daily_change_in_tl: decimal_cell(at(2), "dailyChangeInTL")?,
            trading_volume_tl: decimal_cell(at(3), "tradingVolumeTL")?,
            trade_volume_count: decimal_cell(at(4), "tradeVolumeCount")?,
        })
    }
}

impl MarketRecord for Index {
    const KIND: MarketKind = MarketKind::Indexes;

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn latest_value(&self) -> Decimal {
        self.latest_value
    }

    fn daily_change_pct(&self) -> Decimal {
        self.daily_change_pct
    }

    fn display_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    /// Symbol lives in the `title` attribute; the first cell is the display
    /// name, followed by five numeric cells.
    fn parse_row(row: &RawRow) -> Result<Self, ParseError> {
        let symbol = row
            .first_title()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ParseError::MissingSymbol("index"))?;

        Ok(Index {
            symbol: symbol.to_string(),
            name: row.cell(0, "name")?.text.trim().to_string(),
            latest_value: decimal_cell(row.cells.get(1), "latestValue")?,
            daily_change_pct: decimal_cell(row.cells.get(2), "dailyChangePct")?,
            weekly_change_pct: decimal_cell(row.cells.get(3), "weeklyChangePct")?,
            monthly_change_pct: decimal_cell(row.cells.get(4), "monthlyChangePct")?,
            yearly_change_pct: decimal_cell(row.cells.get(5), "yearlyChangePct")?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn numeric(text: &str) -> RawCell {
        RawCell {
            text: text.to_string(),
            classes: vec![NUMERIC_CELL_CLASS.to_string()],
            ..RawCell::default()
        }
    }

    pub(crate) fn stock_row(symbol: &str, price: &str, daily: &str) -> RawRow {
        RawRow::new(vec![
            RawCell {
                text: format!("{} Company", symbol),
                link_text: Some(format!(" {} ", symbol)),
                ..RawCell::default()
            },
            numeric(price),
            numeric(daily),
            numeric("1,20"),
            numeric("1.250.000,00"),
            numeric("3.412"),
        ])
    }

    pub(crate) fn index_row(symbol: &str, name: &str, value: &str) -> RawRow {
        RawRow::new(vec![
            RawCell {
                text: name.to_string(),
                title: Some(symbol.to_string()),
                ..RawCell::default()
            },
            RawCell::text(value),
            RawCell::text("0,85"),
            RawCell::text("-1,10"),
            RawCell::text("4,05"),
            RawCell::text("38,70"),
        ])
    }

    #[test]
    fn decimal_uses_dot_for_thousands_and_comma_for_fraction() {
        assert_eq!(parse_decimal("1.234,56").unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal(" -0,43 ").unwrap(), dec!(-0.43));
        assert_eq!(parse_decimal("12").unwrap(), dec!(12));
    }

    #[test]
    fn decimal_fields_round_trip_to_normalized_text() {
        for raw in ["1.234,50", "0,43", "-12,0700", "9.876.543,21", "100"] {
            let parsed = parse_decimal(raw).unwrap();
            assert_eq!(parsed.to_string(), normalize_number(raw), "value {}", raw);
        }
    }

    #[test]
    fn decimal_rejects_empty_and_garbage() {
        assert_eq!(parse_decimal("  "), Err(ParseError::Empty));
        assert!(matches!(parse_decimal("n/a"), Err(ParseError::NotNumeric(_))));
        assert!(matches!(parse_decimal("%1,2"), Err(ParseError::NotNumeric(_))));
    }

    #[test]
    fn parses_stock_row_by_position() {
        let stock = Stock::parse_row(&stock_row("THYAO", "287,25", "1,50")).unwrap();
        assert_eq!(stock.symbol, "THYAO");
        assert_eq!(stock.latest_price, dec!(287.25));
        assert_eq!(stock.daily_change_pct, dec!(1.50));
        assert_eq!(stock.daily_change_in_tl, dec!(1.20));
        assert_eq!(stock.trading_volume_tl, dec!(1250000.00));
        assert_eq!(stock.trade_volume_count, dec!(3412));
    }

    #[test]
    fn stock_row_missing_numeric_cell_fails() {
        let mut row = stock_row("THYAO", "287,25", "1,50");
        row.cells.pop();
        assert_eq!(
            Stock::parse_row(&row),
            Err(ParseError::MissingCell("tradeVolumeCount"))
        );
    }

    #[test]
    fn stock_row_without_link_has_no_symbol() {
        let mut row = stock_row("THYAO", "287,25", "1,50");
        row.cells[0].link_text = None;
        assert_eq!(Stock::parse_row(&row), Err(ParseError::MissingSymbol("stock")));
    }

    #[test]
    fn parses_index_row_with_title_symbol() {
        let index = Index::parse_row(&index_row("XU100", "BIST 100", "9.812,44")).unwrap();
        assert_eq!(index.symbol, "XU100");
        assert_eq!(index.name, "BIST 100");
        assert_eq!(index.latest_value, dec!(9812.44));
        assert_eq!(index.weekly_change_pct, dec!(-1.10));
        assert_eq!(index.display_name(), Some("BIST 100"));
    }

    #[test]
    fn index_row_with_empty_cell_fails() {
        let mut row = index_row("XU100", "BIST 100", "9.812,44");
        row.cells[3].text = String::new();
        assert_eq!(Index::parse_row(&row), Err(ParseError::Empty));
    }
}
