// src/market/scrape.rs
use super::parser::{RawCell, RawRow};
use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use thiserror::Error;

const ROW_SELECTOR: &str = "table.dataTable tbody tr";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("source responded with HTTP {0}")]
    Status(u16),
}

/// Where the market table document comes from.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpSource { client })
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        info!("Fetching market data from {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Extracts every body row of the market table.
pub fn extract_rows(html: &str) -> Vec<RawRow> {
    let (Ok(rows), Ok(cells), Ok(links)) = (
        Selector::parse(ROW_SELECTOR),
        Selector::parse("td"),
        Selector::parse("a"),
    ) else {
        error!("Invalid market table selectors");
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&rows)
        .map(|row| RawRow::new(row.select(&cells).map(|td| raw_cell(td, &links)).collect()))
        .collect()
}

fn raw_cell(td: ElementRef<'_>, links: &Selector) -> RawCell {
    RawCell {
        text: td.text().collect::<String>().trim().to_string(),
        classes: td.value().classes().map(str::to_string).collect(),
        title: td.value().attr("title").map(str::to_string),
        link_text: td
            .select(links)
            .next()
            .map(|a| a.text().collect::<String>().trim().to_string()),
    }
}
