// src/market/scheduler.rs
use super::guard::{self, Verdict};
use super::parser::RawRow;
use super::scrape::{extract_rows, DocumentSource};
use super::snapshot::{MarketSnapshot, SnapshotStore};
use super::MarketRecord;
use crate::models::MarketKind;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use log::{error, info, warn};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::time;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("source URL for {0} market data is null or empty")]
    MissingSourceUrl(MarketKind),

    #[error("failed to fetch {kind} data from {url}: {reason}")]
    FetchFailure {
        kind: MarketKind,
        url: String,
        reason: String,
    },

    #[error("no {0} data rows found in the source table")]
    NoRows(MarketKind),

    #[error("{kind} batch looks corrupted: {sentinel_rows} of {total} rows carry the sentinel daily change")]
    CorruptBatch {
        kind: MarketKind,
        sentinel_rows: usize,
        total: usize,
    },
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression '{expr}': {reason}")]
    Cron { expr: String, reason: String },

    #[error("unknown timezone '{0}'")]
    Timezone(String),
}

/// Calendar trigger: a seconds-first cron expression evaluated in a fixed
/// timezone.
#[derive(Debug, Clone)]
pub struct ScrapeSchedule {
    schedule: Schedule,
    timezone: Tz,
}

impl ScrapeSchedule {
    pub fn new(expr: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let schedule = Schedule::from_str(expr).map_err(|e| ScheduleError::Cron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })?;
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::Timezone(timezone.to_string()))?;
        Ok(ScrapeSchedule { schedule, timezone })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&now.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Parses every row, skipping (and logging) the ones that fail.
pub fn parse_batch<R: MarketRecord>(rows: &[RawRow]) -> Vec<R> {
    rows.iter()
        .filter_map(|row| match R::parse_row(row) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("Error processing {} row [{}]: {}", R::KIND, row.summary(), e);
                None
            }
        })
        .collect()
}

/// One fetch, parse, guard, publish cycle for a single market kind.
pub struct IngestJob<R> {
    source_url: Option<String>,
    source: Arc<dyn DocumentSource>,
    store: Arc<SnapshotStore<R>>,
}

impl<R: MarketRecord> IngestJob<R> {
    pub fn new(
        source_url: Option<String>,
        source: Arc<dyn DocumentSource>,
        store: Arc<SnapshotStore<R>>,
    ) -> Self {
        IngestJob {
            source_url,
            source,
            store,
        }
    }

    /// Returns the number of records published. On any error the current
    /// snapshot is left untouched.
    pub async fn run_cycle(&self) -> Result<usize, IngestError> {
        let url = self
            .source_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(IngestError::MissingSourceUrl(R::KIND))?;

        let document = self
            .source
            .fetch(url)
            .await
            .map_err(|e| IngestError::FetchFailure {
                kind: R::KIND,
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        info!("Successfully fetched {} data from {}", R::KIND, url);

        let rows = extract_rows(&document);
        if rows.is_empty() {
            return Err(IngestError::NoRows(R::KIND));
        }

        let batch = parse_batch::<R>(&rows);
        if batch.is_empty() {
            return Err(IngestError::NoRows(R::KIND));
        }
        info!("Parsed {} of {} {} rows", batch.len(), rows.len(), R::KIND);

        let snapshot = MarketSnapshot::from_records(batch, Utc::now());
        if let Verdict::Rejected {
            sentinel_rows,
            total,
        } = guard::inspect(snapshot.records())
        {
            return Err(IngestError::CorruptBatch {
                kind: R::KIND,
                sentinel_rows,
                total,
            });
        }

        let published = snapshot.len();
        self.store.replace(snapshot);
        Ok(published)
    }

    async fn run_logged(&self) {
        match self.run_cycle().await {
            Ok(count) => info!("Published {} {} records", count, R::KIND),
            Err(e @ IngestError::NoRows(_)) | Err(e @ IngestError::CorruptBatch { .. }) => {
                warn!("{}. Keeping previous snapshot.", e)
            }
            Err(e) => error!("{}", e),
        }
    }
}

/// Runs one cycle immediately, then one per schedule firing. Cycles run to
/// completion before the next wait starts, so they never overlap.
pub async fn run_schedule<R: MarketRecord>(job: IngestJob<R>, schedule: ScrapeSchedule) {
    job.run_logged().await;
    loop {
        let now = Utc::now();
        let Some(next) = schedule.next_after(now) else {
            warn!("{} scrape schedule has no upcoming firing, stopping", R::KIND);
            return;
        };
        info!("Next {} scrape at {}", R::KIND, next.with_timezone(&schedule.timezone()));
        let wait = (next - now).to_std().unwrap_or_default();
        time::sleep(wait).await;
        job.run_logged().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::scrape::tests::stock_table;
    use crate::market::scrape::FetchError;
    use crate::models::Stock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Timelike};
    use rust_decimal_macros::dec;

    struct StaticSource(Result<String, u16>);

    #[async_trait]
    impl DocumentSource for StaticSource {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            self.0.clone().map_err(FetchError::Status)
        }
    }

    fn job(doc: Result<String, u16>, store: Arc<SnapshotStore<Stock>>) -> IngestJob<Stock> {
        IngestJob::new(
            Some("http://source.test/stocks".to_string()),
            Arc::new(StaticSource(doc)),
            store,
        )
    }

    fn seeded_store() -> Arc<SnapshotStore<Stock>> {
        let store = Arc::new(SnapshotStore::new());
        store.replace(MarketSnapshot::from_records(
            parse_batch(&extract_rows(&stock_table(&[("OLD", "1,00", "2,00")]))),
            Utc::now(),
        ));
        store
    }

    #[tokio::test]
    async fn publishes_parsed_batch() {
        let store = Arc::new(SnapshotStore::new());
        let html = stock_table(&[("THYAO", "287,25", "1,50"), ("GARAN", "98,10", "-0,25")]);
        let published = job(Ok(html), store.clone()).run_cycle().await.unwrap();
        assert_eq!(published, 2);
        assert_eq!(
            store.get().get("THYAO").map(|s| s.latest_price),
            Some(dec!(287.25))
        );
    }

    #[tokio::test]
    async fn bad_rows_are_skipped() {
        let store = Arc::new(SnapshotStore::new());
        let html = stock_table(&[("THYAO", "287,25", "1,50"), ("BROKEN", "", "1,00")]);
        let published = job(Ok(html), store.clone()).run_cycle().await.unwrap();
        assert_eq!(published, 1);
        assert!(!store.get().contains("BROKEN"));
    }

    #[tokio::test]
    async fn corrupt_batch_keeps_previous_snapshot() {
        let store = seeded_store();
        let html = stock_table(&[("A", "1,00", "0,43"), ("B", "2,00", "0,43"), ("C", "3,00", "1,00")]);
        let err = job(Ok(html), store.clone()).run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::CorruptBatch {
                sentinel_rows: 2,
                total: 3,
                ..
            }
        ));
        assert!(store.get().contains("OLD"));
        assert_eq!(store.get().len(), 1);
    }

    #[tokio::test]
    async fn guard_counts_one_row_per_symbol() {
        let store = Arc::new(SnapshotStore::new());
        // the repeated symbol ends on a normal value, so no sentinel survives
        let html = stock_table(&[
            ("A", "1,00", "0,43"),
            ("A", "1,00", "0,43"),
            ("A", "1,00", "1,00"),
            ("B", "2,00", "1,00"),
            ("C", "3,00", "1,00"),
            ("D", "4,00", "1,00"),
        ]);
        let published = job(Ok(html), store.clone()).run_cycle().await.unwrap();
        assert_eq!(published, 4);
        assert_eq!(
            store.get().get("A").map(|s| s.daily_change_pct),
            Some(dec!(1.00))
        );
    }

    #[tokio::test]
    async fn fetch_failure_keeps_previous_snapshot() {
        let store = seeded_store();
        let err = job(Err(503), store.clone()).run_cycle().await.unwrap_err();
        assert!(matches!(err, IngestError::FetchFailure { .. }));
        assert!(store.get().contains("OLD"));
    }

    #[tokio::test]
    async fn empty_table_keeps_previous_snapshot() {
        let store = seeded_store();
        let err = job(Ok(stock_table(&[])), store.clone()).run_cycle().await.unwrap_err();
        assert!(matches!(err, IngestError::NoRows(MarketKind::Stocks)));
        assert!(store.get().contains("OLD"));
    }

    #[tokio::test]
    async fn missing_url_skips_cycle() {
        let store = Arc::new(SnapshotStore::<Stock>::new());
        let job = IngestJob::new(
            Some("  ".to_string()),
            Arc::new(StaticSource(Ok(String::new()))),
            store.clone(),
        );
        assert!(matches!(
            job.run_cycle().await,
            Err(IngestError::MissingSourceUrl(MarketKind::Stocks))
        ));
        assert!(store.get().is_empty());
    }

    #[test]
    fn schedule_respects_trading_window_and_timezone() {
        let schedule = ScrapeSchedule::new("0 */3 8-21 * * *", "Europe/Istanbul").unwrap();
        // 22:00 Istanbul (UTC+3) is outside the window, next firing is 08:00 next day
        let now = Utc.with_ymd_and_hms(2024, 3, 4, 19, 0, 0).unwrap();
        let next = schedule.next_after(now).unwrap();
        let local = next.with_timezone(&schedule.timezone());
        assert_eq!((local.hour(), local.minute()), (8, 0));

        let now = Utc.with_ymd_and_hms(2024, 3, 4, 7, 1, 30).unwrap();
        let next = schedule.next_after(now).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 4, 7, 3, 0).unwrap());
    }

    #[test]
    fn schedule_rejects_bad_input() {
        assert!(matches!(
            ScrapeSchedule::new("every minute", "Europe/Istanbul"),
            Err(ScheduleError::Cron { .. })
        ));
        assert!(matches!(
            ScrapeSchedule::new("0 */3 8-21 * * *", "Mars/Olympus"),
            Err(ScheduleError::Timezone(_))
        ));
    }
}
