// src/portfolio.rs
use crate::db::Repository;
use crate::enrichment::{enrich_holdings, POSITION_SORT_FIELDS};
use crate::error::AppError;
use crate::market_client::{ClientError, MarketDataPort};
use crate::models::{Holding, PortfolioPosition, Transaction, TransactionRequest};
use crate::paging::{sort_and_page, Page, PageRequest, SortFields};
use log::{info, warn};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

fn transaction_id(a: &Transaction, b: &Transaction) -> Ordering {
    a.id.cmp(&b.id)
}

fn transaction_date(a: &Transaction, b: &Transaction) -> Ordering {
    a.date.cmp(&b.date)
}

fn transaction_symbol(a: &Transaction, b: &Transaction) -> Ordering {
    a.stock_symbol.cmp(&b.stock_symbol)
}

fn transaction_quantity(a: &Transaction, b: &Transaction) -> Ordering {
    a.quantity.cmp(&b.quantity)
}

fn transaction_price(a: &Transaction, b: &Transaction) -> Ordering {
    a.price.cmp(&b.price)
}

/// Upper bounds for a single transaction. Aggregates of many bounded rows
/// are still checked for overflow.
pub const MAX_QUANTITY: i64 = 1_000_000_000_000;
pub const MAX_PRICE: Decimal = dec!(1000000000000);

pub const TRANSACTION_SORT_FIELDS: SortFields<Transaction> = &[
    ("id", transaction_id),
    ("date", transaction_date),
    ("stockSymbol", transaction_symbol),
    ("quantity", transaction_quantity),
    ("price", transaction_price),
];

/// Groups transactions by symbol. The average cost is the quantity weighted
/// price, rounded half-up to two places.
pub fn aggregate_holdings(transactions: &[Transaction]) -> Result<Vec<Holding>, AppError> {
    let mut totals: BTreeMap<&str, (i64, Decimal)> = BTreeMap::new();
    for t in transactions {
        let entry = totals.entry(t.stock_symbol.as_str()).or_default();
        let quantity = entry.0.checked_add(t.quantity);
        let cost = t
            .price
            .checked_mul(Decimal::from(t.quantity))
            .and_then(|cost| entry.1.checked_add(cost));
        match (quantity, cost) {
            (Some(quantity), Some(cost)) => *entry = (quantity, cost),
            _ => return Err(AppError::ValueOutOfRange(t.stock_symbol.clone())),
        }
    }

    Ok(totals
        .into_iter()
        .filter_map(|(symbol, (quantity, cost))| {
            let quantity = Decimal::from(quantity);
            let average_cost = cost
                .checked_div(quantity)?
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            Some(Holding {
                symbol: symbol.to_string(),
                quantity,
                average_cost,
            })
        })
        .collect())
}

#[derive(Clone)]
pub struct PortfolioService {
    repo: Arc<dyn Repository>,
    market: Arc<dyn MarketDataPort>,
}

impl PortfolioService {
    pub fn new(repo: Arc<dyn Repository>, market: Arc<dyn MarketDataPort>) -> Self {
        PortfolioService { repo, market }
    }

    pub async fn save_transaction(
        &self,
        user_id: &str,
        request: TransactionRequest,
    ) -> Result<Transaction, AppError> {
        if request.quantity <= 0 {
            return Err(AppError::BadRequest(
                "Quantity must be greater than 0".to_string(),
            ));
        }
        if request.quantity > MAX_QUANTITY {
            return Err(AppError::BadRequest(format!(
                "Quantity must not exceed {}",
                MAX_QUANTITY
            )));
        }
        if request.price < Decimal::ZERO {
            return Err(AppError::BadRequest(
                "Price must be zero or positive".to_string(),
            ));
        }
        if request.price > MAX_PRICE {
            return Err(AppError::BadRequest(format!(
                "Price must not exceed {}",
                MAX_PRICE
            )));
        }

        let symbols = self.market.stock_symbols().await?;
        if !symbols.contains(&request.stock_symbol) {
            return Err(AppError::InvalidSymbols(request.stock_symbol));
        }

        let transaction = Transaction {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            date: request.date,
            stock_symbol: request.stock_symbol,
            quantity: request.quantity,
            price: request.price,
        };
        self.repo.save_transaction(&transaction).await?;
        info!(
            "Transaction '{}' saved for user '{}'",
            transaction.id, user_id
        );
        Ok(transaction)
    }

    pub async fn list_transactions(
        &self,
        user_id: &str,
        request: &PageRequest,
    ) -> Result<Page<Transaction>, AppError> {
        let transactions = self.repo.transactions(user_id).await?;
        if transactions.is_empty() {
            return Err(AppError::not_found("Transactions", "userId", user_id));
        }
        Ok(sort_and_page(transactions, request, TRANSACTION_SORT_FIELDS)?)
    }

    pub async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), AppError> {
        let key = format!("{}/{}", user_id, id);
        if !self.repo.transaction_exists(user_id, id).await? {
            return Err(AppError::not_found("Transaction", "userId/transactionId", key));
        }
        self.repo.delete_transaction(user_id, id).await?;
        if self.repo.transaction_exists(user_id, id).await? {
            return Err(AppError::not_deleted("Transaction", "userId/transactionId", key));
        }
        Ok(())
    }

    pub async fn delete_symbol_transactions(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> Result<(), AppError> {
        let key = format!("{}/{}", user_id, symbol);
        if !self.repo.symbol_exists(user_id, symbol).await? {
            return Err(AppError::not_found("Stock Symbol", "userId/stockSymbol", key));
        }
        self.repo.delete_symbol_transactions(user_id, symbol).await?;
        if self.repo.symbol_exists(user_id, symbol).await? {
            return Err(AppError::not_deleted("Stock Symbol", "userId/stockSymbol", key));
        }
        Ok(())
    }

    pub async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>, AppError> {
        let transactions = self.repo.transactions(user_id).await?;
        aggregate_holdings(&transactions)
    }

    /// Holdings joined with live prices, then sorted and paged. Holdings the
    /// market data service has no price for are left out.
    pub async fn portfolio_positions(
        &self,
        user_id: &str,
        request: &PageRequest,
    ) -> Result<Page<PortfolioPosition>, AppError> {
        let holdings = self.holdings(user_id).await?;
        if holdings.is_empty() {
            return Err(AppError::not_found("Stocks", "userId", user_id));
        }

        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let market = match self.market.stock_quotes(&symbols).await {
            Ok(market) => market,
            Err(ClientError::InvalidSymbols(given)) => {
                warn!("No market data for any holding of user '{}': {}", user_id, given);
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        let positions = enrich_holdings(&holdings, &market)?;
        Ok(sort_and_page(positions, request, POSITION_SORT_FIELDS)?)
    }
}
