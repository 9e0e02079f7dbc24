//! Forex ingestion (`raw.historical_forex`) and the date-aligned,
//! forward-filled matrix (`clean.historical_forex_full`) every downstream
//! FX conversion reads from.

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use fmp_client::{FmpClient, ForexPairListing};
use futures_util::future::join_all;
use market_core::{EtlError, EtlResult, ForexFullRow, ForexQuote};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::time::Instant;

pub const FOREX_START_DATE: &str = "2013-12-01";
const PAIR_BATCH_SIZE: usize = 100;

const CREATE_RAW_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.historical_forex (
        date DATE,
        forex_pair VARCHAR(20),
        price DECIMAL(20, 6),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        PRIMARY KEY (date, forex_pair)
    )";

const CREATE_FULL_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS clean.historical_forex_full (
        date DATE,
        forex_pair VARCHAR(20),
        ccy_left VARCHAR(3),
        ccy_right VARCHAR(3),
        price NUMERIC(20, 6),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

pub struct HistoricalForexManager {
    store: PgStore,
    fmp: FmpClient,
    start_date: String,
    end_date: String,
}

impl HistoricalForexManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self::with_range(
            store,
            fmp,
            FOREX_START_DATE.to_string(),
            yesterday().format("%Y-%m-%d").to_string(),
        )
    }

    pub fn with_range(store: PgStore, fmp: FmpClient, start_date: String, end_date: String) -> Self {
        Self {
            store,
            fmp,
            start_date,
            end_date,
        }
    }

    /// Provider pair catalog filtered to the EUR- and USD-prefixed pairs
    /// the conversion layer can use, EUR first.
    pub async fn get_forex_pairs(&self) -> EtlResult<Vec<String>> {
        let listings = self.fmp.get_forex_pairs().await?;
        let symbol_of = |l: &ForexPairListing| l.symbol.clone().unwrap_or_default();

        let eur: Vec<String> = listings
            .iter()
            .map(symbol_of)
            .filter(|s| s.starts_with("EUR"))
            .collect();
        let usd: Vec<String> = listings
            .iter()
            .map(symbol_of)
            .filter(|s| s.starts_with("USD"))
            .collect();
        tracing::info!("Found {} EUR pairs and {} USD pairs", eur.len(), usd.len());

        Ok(eur.into_iter().chain(usd).collect())
    }

    async fn create_table(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store
            .recreate("raw.historical_forex", CREATE_RAW_TABLE)
            .await
    }

    /// Fetch one batch of pairs concurrently and COPY the validated quotes.
    pub async fn process_forex_batch(&self, pairs: &[String]) -> EtlResult<()> {
        let results = join_all(pairs.iter().map(|pair| {
            self.fmp
                .get_historical_forex(pair, &self.start_date, &self.end_date)
        }))
        .await;

        let mut buf = CopyBuffer::new();
        let mut count = 0usize;
        for (pair, result) in pairs.iter().zip(results) {
            let bars = match result {
                Ok(bars) => bars,
                Err(e) => {
                    tracing::error!("Error fetching data for {pair}: {e}");
                    continue;
                }
            };
            if bars.is_empty() {
                tracing::warn!("No historical data found for {pair}");
                continue;
            }
            for bar in bars {
                let Some(date) = bar
                    .date_str()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                else {
                    tracing::warn!("Validation failed for {pair}: bad date, dropping row");
                    continue;
                };
                let price = bar.close_value().unwrap_or(0.0);
                buf.push_date(date);
                buf.push_str(pair);
                buf.push_f64(price);
                buf.end_row();
                count += 1;
            }
        }

        if count > 0 {
            self.store
                .copy_direct(
                    "raw.historical_forex",
                    &["date", "forex_pair", "price"],
                    buf,
                )
                .await?;
            tracing::info!(
                "Successfully stored {count} historical prices for batch of {} forex pairs",
                pairs.len()
            );
        }
        Ok(())
    }

    /// Full-history reload of every EUR/USD pair from the fixed start date.
    pub async fn save_historical_forex(&self) -> EtlResult<bool> {
        tracing::info!(
            "######################### Step 3 - HistoricalForexManager ({} to {})",
            self.start_date,
            self.end_date
        );

        self.create_table().await?;
        if self.store.has_rows("raw.historical_forex").await? {
            tracing::warn!("Historical forex table already contains data. Aborting save operation.");
            return Ok(false);
        }

        let pairs = self.get_forex_pairs().await?;
        if pairs.is_empty() {
            tracing::error!("No forex pairs found");
            return Ok(false);
        }

        let total_batches = pairs.len().div_ceil(PAIR_BATCH_SIZE);
        for (batch_num, batch) in pairs.chunks(PAIR_BATCH_SIZE).enumerate() {
            let started = Instant::now();
            tracing::info!("Processing batch {}/{}", batch_num + 1, total_batches);
            self.process_forex_batch(batch).await?;
            tracing::info!(
                "Batch {} took {:.2}s",
                batch_num + 1,
                started.elapsed().as_secs_f64()
            );
            if (batch_num + 1) * PAIR_BATCH_SIZE < pairs.len() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }

        tracing::info!("Historical forex data collection completed");
        Ok(true)
    }
}

pub struct DailyForexManager {
    store: PgStore,
    fmp: FmpClient,
}

impl DailyForexManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    /// Delete and refetch the last 7 days for every pair.
    pub async fn refresh_last_7_days(&self) -> EtlResult<bool> {
        let end_date = yesterday();
        let start_date = end_date - ChronoDuration::days(6);
        tracing::info!(
            "######################### Step 1 - DailyForexManager ({start_date} to {end_date})"
        );

        let manager = HistoricalForexManager::with_range(
            self.store.clone(),
            self.fmp.clone(),
            start_date.format("%Y-%m-%d").to_string(),
            end_date.format("%Y-%m-%d").to_string(),
        );

        let pairs = manager.get_forex_pairs().await?;
        if pairs.is_empty() {
            tracing::error!("No forex pairs found for update");
            return Ok(false);
        }

        let deleted = sqlx::query("DELETE FROM raw.historical_forex WHERE date BETWEEN $1 AND $2")
            .bind(start_date)
            .bind(end_date)
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?
            .rows_affected();
        tracing::info!(
            "Deleted {deleted} records from raw.historical_forex for dates {start_date} to {end_date}"
        );

        for batch in pairs.chunks(PAIR_BATCH_SIZE) {
            manager.process_forex_batch(batch).await?;
        }
        tracing::info!("Successfully refreshed forex data for {start_date} to {end_date}");
        Ok(true)
    }
}

/// Materialize (trading date × observed pair), synthesize EUREUR/USDUSD at
/// price 1, forward-fill gaps within each pair and split the currency legs.
/// Rows before a pair's first quote stay absent.
pub fn build_full_matrix(quotes: &[ForexQuote]) -> Vec<ForexFullRow> {
    if quotes.is_empty() {
        return Vec::new();
    }

    let min_date = quotes.iter().map(|q| q.date).min().unwrap_or_default();
    let max_date = quotes.iter().map(|q| q.date).max().unwrap_or_default();

    let mut by_pair: BTreeMap<String, BTreeMap<NaiveDate, f64>> = BTreeMap::new();
    for quote in quotes {
        by_pair
            .entry(quote.forex_pair.clone())
            .or_default()
            .insert(quote.date, quote.price);
    }

    let mut all_dates = Vec::new();
    let mut d = min_date;
    while d <= max_date {
        all_dates.push(d);
        d += ChronoDuration::days(1);
    }

    for identity in ["EUREUR", "USDUSD"] {
        let series = by_pair.entry(identity.to_string()).or_default();
        for date in &all_dates {
            series.insert(*date, 1.0);
        }
    }

    let pairs: BTreeSet<String> = by_pair.keys().cloned().collect();
    let mut rows = Vec::new();
    for date in &all_dates {
        for pair in &pairs {
            let series = &by_pair[pair];
            // Last quote at or before this date within the pair.
            let price = series.range(..=*date).next_back().map(|(_, p)| *p);
            let Some(price) = price else { continue };
            rows.push(ForexFullRow {
                date: *date,
                forex_pair: pair.clone(),
                ccy_left: pair.chars().take(3).collect(),
                ccy_right: pair.chars().skip(pair.chars().count().saturating_sub(3)).collect(),
                price,
            });
        }
    }
    rows
}

pub struct FullForexManager {
    store: PgStore,
}

impl FullForexManager {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    /// Rebuild `clean.historical_forex_full` from the raw quotes.
    pub async fn run(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 4 - FullForexManager");

        self.store.ensure_schemas().await?;

        let rows = sqlx::query(
            "SELECT date, forex_pair, price::float8 AS price FROM raw.historical_forex",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        if rows.is_empty() {
            tracing::warn!("No data found in raw.historical_forex table");
            return Ok(false);
        }
        tracing::info!("Read {} records from raw.historical_forex", rows.len());

        let mut quotes = Vec::with_capacity(rows.len());
        for row in rows {
            quotes.push(ForexQuote {
                date: row
                    .try_get("date")
                    .map_err(|e| EtlError::Database(e.to_string()))?,
                forex_pair: row
                    .try_get("forex_pair")
                    .map_err(|e| EtlError::Database(e.to_string()))?,
                price: row
                    .try_get("price")
                    .map_err(|e| EtlError::Database(e.to_string()))?,
            });
        }

        let full = build_full_matrix(&quotes);
        tracing::info!(
            "Processed {} forex pairs into {} gap-filled rows",
            quotes.len(),
            full.len()
        );

        self.store
            .recreate("clean.historical_forex_full", CREATE_FULL_TABLE)
            .await?;

        let mut buf = CopyBuffer::new();
        for row in &full {
            buf.push_date(row.date);
            buf.push_str(&row.forex_pair);
            buf.push_str(&row.ccy_left);
            buf.push_str(&row.ccy_right);
            buf.push_f64(row.price);
            buf.end_row();
        }
        self.store
            .copy_direct(
                "clean.historical_forex_full",
                &["date", "forex_pair", "ccy_left", "ccy_right", "price"],
                buf,
            )
            .await?;

        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_historical_forex_full_date_ccyleft_ccyright \
                 ON clean.historical_forex_full (date, ccy_left, ccy_right)",
            )
            .await?;
        tracing::info!(
            "Successfully processed and saved {} records to clean.historical_forex_full",
            full.len()
        );
        Ok(true)
    }
}

fn yesterday() -> NaiveDate {
    Local::now().date_naive() - ChronoDuration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn q(date: NaiveDate, pair: &str, price: f64) -> ForexQuote {
        ForexQuote {
            date,
            forex_pair: pair.to_string(),
            price,
        }
    }

    fn find<'a>(rows: &'a [ForexFullRow], date: NaiveDate, pair: &str) -> Option<&'a ForexFullRow> {
        rows.iter().find(|r| r.date == date && r.forex_pair == pair)
    }

    #[test]
    fn gaps_are_forward_filled_within_pair() {
        let quotes = vec![
            q(d(2014, 1, 2), "EURUSD", 1.36),
            q(d(2014, 1, 3), "EURUSD", 1.37),
            q(d(2014, 1, 6), "EURGBP", 0.83),
        ];
        let rows = build_full_matrix(&quotes);

        assert_eq!(find(&rows, d(2014, 1, 2), "EURUSD").unwrap().price, 1.36);
        assert_eq!(find(&rows, d(2014, 1, 3), "EURUSD").unwrap().price, 1.37);
        // The 4th-6th carry the last observed EURUSD quote forward.
        assert_eq!(find(&rows, d(2014, 1, 6), "EURUSD").unwrap().price, 1.37);
        assert_eq!(find(&rows, d(2014, 1, 6), "EURGBP").unwrap().price, 0.83);
        // EURGBP was never quoted before the 6th, so earlier dates have no row.
        assert!(find(&rows, d(2014, 1, 3), "EURGBP").is_none());
    }

    #[test]
    fn identity_pairs_cover_every_date_at_one() {
        let quotes = vec![
            q(d(2014, 1, 2), "EURUSD", 1.36),
            q(d(2014, 1, 6), "EURUSD", 1.37),
        ];
        let rows = build_full_matrix(&quotes);

        let mut date = d(2014, 1, 2);
        while date <= d(2014, 1, 6) {
            for pair in ["EUREUR", "USDUSD"] {
                let row = find(&rows, date, pair).unwrap();
                assert_eq!(row.price, 1.0);
            }
            date += ChronoDuration::days(1);
        }
    }

    #[test]
    fn exactly_one_row_per_date_and_quoted_pair() {
        let quotes = vec![
            q(d(2014, 1, 2), "EURUSD", 1.36),
            q(d(2014, 1, 5), "EURUSD", 1.38),
            q(d(2014, 1, 2), "USDJPY", 104.2),
        ];
        let rows = build_full_matrix(&quotes);

        let mut date = d(2014, 1, 2);
        while date <= d(2014, 1, 5) {
            for pair in ["EURUSD", "USDJPY"] {
                let matches = rows
                    .iter()
                    .filter(|r| r.date == date && r.forex_pair == pair)
                    .count();
                assert_eq!(matches, 1, "{pair} on {date}");
            }
            date += ChronoDuration::days(1);
        }
    }

    #[test]
    fn currency_legs_are_split_from_the_pair() {
        let rows = build_full_matrix(&[q(d(2014, 1, 2), "USDJPY", 104.2)]);
        let row = find(&rows, d(2014, 1, 2), "USDJPY").unwrap();
        assert_eq!(row.ccy_left, "USD");
        assert_eq!(row.ccy_right, "JPY");
    }

    #[test]
    fn empty_input_yields_empty_matrix() {
        assert!(build_full_matrix(&[]).is_empty());
    }
}
