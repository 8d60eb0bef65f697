// src/db.rs
use crate::models::{MarketKind, Transaction, WatchlistEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{error, info};
use rust_decimal::Decimal;
use scylla::{frame::response::result::CqlValue, frame::response::result::Row, query::Query};
use scylla::{Session, SessionBuilder};
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to connect to ScyllaDB: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("stored row is malformed: {0}")]
    Malformed(String),
}

fn query_failed(err: impl Display) -> StorageError {
    StorageError::Query(err.to_string())
}

/// Transactions and watchlist rows, keyed by user.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), StorageError>;

    async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError>;

    async fn transaction_exists(&self, user_id: &str, id: &str) -> Result<bool, StorageError>;

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), StorageError>;

    async fn symbol_exists(&self, user_id: &str, symbol: &str) -> Result<bool, StorageError>;

    async fn delete_symbol_transactions(&self, user_id: &str, symbol: &str)
        -> Result<(), StorageError>;

    async fn watchlist(&self, user_id: &str, kind: MarketKind) -> Result<Vec<String>, StorageError>;

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError>;

    async fn remove_from_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError>;
}

/// Process local storage. Data is lost on restart.
#[derive(Default)]
pub struct MemoryRepository {
    transactions: RwLock<HashMap<String, Vec<Transaction>>>,
    watchlists: RwLock<HashMap<(String, MarketKind), Vec<String>>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        MemoryRepository::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
        let mut transactions = self.transactions.write().await;
        let rows = transactions.entry(transaction.user_id.clone()).or_default();
        rows.retain(|t| t.id != transaction.id);
        rows.push(transaction.clone());
        Ok(())
    }

    async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(user_id).cloned().unwrap_or_default())
    }

    async fn transaction_exists(&self, user_id: &str, id: &str) -> Result<bool, StorageError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .get(user_id)
            .map_or(false, |rows| rows.iter().any(|t| t.id == id)))
    }

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), StorageError> {
        let mut transactions = self.transactions.write().await;
        if let Some(rows) = transactions.get_mut(user_id) {
            rows.retain(|t| t.id != id);
        }
        Ok(())
    }

    async fn symbol_exists(&self, user_id: &str, symbol: &str) -> Result<bool, StorageError> {
        let transactions = self.transactions.read().await;
        Ok(transactions
            .get(user_id)
            .map_or(false, |rows| rows.iter().any(|t| t.stock_symbol == symbol)))
    }

    async fn delete_symbol_transactions(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> Result<(), StorageError> {
        let mut transactions = self.transactions.write().await;
        if let Some(rows) = transactions.get_mut(user_id) {
            rows.retain(|t| t.stock_symbol != symbol);
        }
        Ok(())
    }

    async fn watchlist(&self, user_id: &str, kind: MarketKind) -> Result<Vec<String>, StorageError> {
        let watchlists = self.watchlists.read().await;
        Ok(watchlists
            .get(&(user_id.to_string(), kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError> {
        let mut watchlists = self.watchlists.write().await;
        let symbols = watchlists
            .entry((entry.user_id.clone(), entry.kind))
            .or_default();
        if !symbols.contains(&entry.symbol) {
            symbols.push(entry.symbol.clone());
        }
        Ok(())
    }

    async fn remove_from_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError> {
        let mut watchlists = self.watchlists.write().await;
        if let Some(symbols) = watchlists.get_mut(&(entry.user_id.clone(), entry.kind)) {
            symbols.retain(|s| s != &entry.symbol);
        }
        Ok(())
    }
}

/// ScyllaDB backed storage in the `portfolio_tracker` keyspace. Prices are
/// stored as text to keep their exact decimal value.
pub struct ScyllaRepository {
    session: Session,
}

impl ScyllaRepository {
    pub async fn connect(uri: &str) -> Result<Self, StorageError> {
        let session = SessionBuilder::new()
            .known_node(uri)
            .build()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        session.query("CREATE KEYSPACE IF NOT EXISTS portfolio_tracker WITH REPLICATION = {'class': 'SimpleStrategy', 'replication_factor': 1}", &[]).await.map_err(query_failed)?;
        session.query("CREATE TABLE IF NOT EXISTS portfolio_tracker.transactions (user_id TEXT, id TEXT, date TEXT, stock_symbol TEXT, quantity BIGINT, price TEXT, PRIMARY KEY (user_id, id))", &[]).await.map_err(query_failed)?;
        session.query("CREATE TABLE IF NOT EXISTS portfolio_tracker.watchlist (user_id TEXT, kind TEXT, symbol TEXT, PRIMARY KEY ((user_id, kind), symbol))", &[]).await.map_err(query_failed)?;

        info!("Successfully connected to ScyllaDB at {}.", uri);
        Ok(ScyllaRepository { session })
    }

    async fn rows(
        &self,
        cql: &str,
        values: (&str, &str),
    ) -> Result<Vec<Row>, StorageError> {
        let result = self
            .session
            .query(Query::new(cql), values)
            .await
            .map_err(query_failed)?;
        Ok(result.rows.unwrap_or_default())
    }

    async fn user_rows(&self, cql: &str, user_id: &str) -> Result<Vec<Row>, StorageError> {
        let result = self
            .session
            .query(Query::new(cql), (user_id,))
            .await
            .map_err(query_failed)?;
        Ok(result.rows.unwrap_or_default())
    }
}

fn column<'a>(row: &'a Row, index: usize, name: &str) -> Result<&'a CqlValue, StorageError> {
    row.columns
        .get(index)
        .and_then(|c| c.as_ref())
        .ok_or_else(|| StorageError::Malformed(format!("column '{}' is null", name)))
}

fn text_column(row: &Row, index: usize, name: &str) -> Result<String, StorageError> {
    column(row, index, name)?
        .as_text()
        .cloned()
        .ok_or_else(|| StorageError::Malformed(format!("column '{}' is not text", name)))
}

fn transaction_from_row(user_id: &str, row: &Row) -> Result<Transaction, StorageError> {
    let date = text_column(row, 1, "date")?;
    let price = text_column(row, 4, "price")?;
    Ok(Transaction {
        id: text_column(row, 0, "id")?,
        user_id: user_id.to_string(),
        date: NaiveDate::from_str(&date)
            .map_err(|e| StorageError::Malformed(format!("date '{}': {}", date, e)))?,
        stock_symbol: text_column(row, 2, "stock_symbol")?,
        quantity: column(row, 3, "quantity")?
            .as_bigint()
            .ok_or_else(|| StorageError::Malformed("column 'quantity' is not bigint".into()))?,
        price: Decimal::from_str(&price)
            .map_err(|e| StorageError::Malformed(format!("price '{}': {}", price, e)))?,
    })
}

#[async_trait]
impl Repository for ScyllaRepository {
    async fn save_transaction(&self, transaction: &Transaction) -> Result<(), StorageError> {
        let query = Query::new("INSERT INTO portfolio_tracker.transactions (user_id, id, date, stock_symbol, quantity, price) VALUES (?, ?, ?, ?, ?, ?)");
        self.session
            .query(
                query,
                (
                    transaction.user_id.as_str(),
                    transaction.id.as_str(),
                    transaction.date.to_string(),
                    transaction.stock_symbol.as_str(),
                    transaction.quantity,
                    transaction.price.to_string(),
                ),
            )
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn transactions(&self, user_id: &str) -> Result<Vec<Transaction>, StorageError> {
        let rows = self
            .user_rows(
                "SELECT id, date, stock_symbol, quantity, price FROM portfolio_tracker.transactions WHERE user_id = ?",
                user_id,
            )
            .await?;
        let mut transactions = Vec::with_capacity(rows.len());
        for row in &rows {
            match transaction_from_row(user_id, row) {
                Ok(transaction) => transactions.push(transaction),
                Err(e) => error!("Skipping transaction of user '{}': {}", user_id, e),
            }
        }
        Ok(transactions)
    }

    async fn transaction_exists(&self, user_id: &str, id: &str) -> Result<bool, StorageError> {
        let rows = self
            .rows(
                "SELECT id FROM portfolio_tracker.transactions WHERE user_id = ? AND id = ?",
                (user_id, id),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn delete_transaction(&self, user_id: &str, id: &str) -> Result<(), StorageError> {
        self.rows(
            "DELETE FROM portfolio_tracker.transactions WHERE user_id = ? AND id = ?",
            (user_id, id),
        )
        .await?;
        Ok(())
    }

    async fn symbol_exists(&self, user_id: &str, symbol: &str) -> Result<bool, StorageError> {
        let rows = self
            .rows(
                "SELECT id FROM portfolio_tracker.transactions WHERE user_id = ? AND stock_symbol = ? ALLOW FILTERING",
                (user_id, symbol),
            )
            .await?;
        Ok(!rows.is_empty())
    }

    async fn delete_symbol_transactions(
        &self,
        user_id: &str,
        symbol: &str,
    ) -> Result<(), StorageError> {
        let rows = self
            .rows(
                "SELECT id FROM portfolio_tracker.transactions WHERE user_id = ? AND stock_symbol = ? ALLOW FILTERING",
                (user_id, symbol),
            )
            .await?;
        for row in &rows {
            let id = text_column(row, 0, "id")?;
            self.delete_transaction(user_id, &id).await?;
        }
        Ok(())
    }

    async fn watchlist(&self, user_id: &str, kind: MarketKind) -> Result<Vec<String>, StorageError> {
        let rows = self
            .rows(
                "SELECT symbol FROM portfolio_tracker.watchlist WHERE user_id = ? AND kind = ?",
                (user_id, kind.as_str()),
            )
            .await?;
        rows.iter().map(|row| text_column(row, 0, "symbol")).collect()
    }

    async fn add_to_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError> {
        let query = Query::new(
            "INSERT INTO portfolio_tracker.watchlist (user_id, kind, symbol) VALUES (?, ?, ?)",
        );
        self.session
            .query(
                query,
                (entry.user_id.as_str(), entry.kind.as_str(), entry.symbol.as_str()),
            )
            .await
            .map_err(query_failed)?;
        Ok(())
    }

    async fn remove_from_watchlist(&self, entry: &WatchlistEntry) -> Result<(), StorageError> {
        let query = Query::new(
            "DELETE FROM portfolio_tracker.watchlist WHERE user_id = ? AND kind = ? AND symbol = ?",
        );
        self.session
            .query(
                query,
                (entry.user_id.as_str(), entry.kind.as_str(), entry.symbol.as_str()),
            )
            .await
            .map_err(query_failed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn transaction(id: &str, user: &str, symbol: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            user_id: user.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            stock_symbol: symbol.to_string(),
            quantity: 10,
            price: dec!(12.5),
        }
    }

    fn entry(user: &str, kind: MarketKind, symbol: &str) -> WatchlistEntry {
        WatchlistEntry {
            user_id: user.to_string(),
            kind,
            symbol: symbol.to_string(),
        }
    }

    #[tokio::test]
    async fn transactions_are_scoped_to_their_user() {
        let repo = MemoryRepository::new();
        repo.save_transaction(&transaction("t1", "alice", "THYAO")).await.unwrap();
        repo.save_transaction(&transaction("t2", "bob", "THYAO")).await.unwrap();

        assert_eq!(repo.transactions("alice").await.unwrap().len(), 1);
        assert!(repo.transaction_exists("alice", "t1").await.unwrap());
        assert!(!repo.transaction_exists("alice", "t2").await.unwrap());

        repo.delete_transaction("alice", "t2").await.unwrap();
        assert!(repo.transaction_exists("bob", "t2").await.unwrap());
    }

    #[tokio::test]
    async fn symbol_delete_removes_every_matching_row() {
        let repo = MemoryRepository::new();
        repo.save_transaction(&transaction("t1", "alice", "THYAO")).await.unwrap();
        repo.save_transaction(&transaction("t2", "alice", "THYAO")).await.unwrap();
        repo.save_transaction(&transaction("t3", "alice", "GARAN")).await.unwrap();

        repo.delete_symbol_transactions("alice", "THYAO").await.unwrap();
        assert!(!repo.symbol_exists("alice", "THYAO").await.unwrap());
        assert!(repo.symbol_exists("alice", "GARAN").await.unwrap());
    }

    #[tokio::test]
    async fn watchlists_are_kept_per_kind_without_duplicates() {
        let repo = MemoryRepository::new();
        repo.add_to_watchlist(&entry("alice", MarketKind::Stocks, "THYAO")).await.unwrap();
        repo.add_to_watchlist(&entry("alice", MarketKind::Stocks, "THYAO")).await.unwrap();
        repo.add_to_watchlist(&entry("alice", MarketKind::Indexes, "XU100")).await.unwrap();

        assert_eq!(
            repo.watchlist("alice", MarketKind::Stocks).await.unwrap(),
            vec!["THYAO".to_string()]
        );
        repo.remove_from_watchlist(&entry("alice", MarketKind::Stocks, "THYAO")).await.unwrap();
        assert!(repo.watchlist("alice", MarketKind::Stocks).await.unwrap().is_empty());
        assert_eq!(repo.watchlist("alice", MarketKind::Indexes).await.unwrap().len(), 1);
    }
}
