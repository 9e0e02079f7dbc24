//! Market capitalization ingestion: per-symbol history, the daily batch
//! refresh with most-frequent-date consensus, and EUR/USD conversion.

use crate::driver::{run_retry_loop, BatchJob, RetryConfig};
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Local, Months, NaiveDate};
use fmp_client::{FmpClient, McapPoint};
use market_core::validate::coerce_large;
use market_core::{tag_quarters, EtlError, EtlResult, MarketCapRow, SymbolCurrency};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const MCAP_START_DATE: &str = "2014-01-01";
const DAILY_BATCH_SIZE: usize = 1000;
const DAILY_CONCURRENCY: usize = 5;

const CREATE_RAW_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.historical_market_cap (
        date DATE,
        symbol VARCHAR(100),
        currency VARCHAR(10),
        market_cap NUMERIC(30, 0),
        year INT,
        quarter VARCHAR(2),
        last_quarter_date BOOLEAN
    )";

const CREATE_STAGE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS stage.historical_market_cap_stage (
        date DATE,
        symbol VARCHAR(100),
        currency VARCHAR(10),
        market_cap NUMERIC(30, 0),
        year INT,
        quarter VARCHAR(2),
        last_quarter_date BOOLEAN
    )";

const STAGE_COLUMNS: &[&str] = &[
    "date",
    "symbol",
    "currency",
    "market_cap",
    "year",
    "quarter",
    "last_quarter_date",
];

const PROMOTE_SQL: &str = "
    INSERT INTO raw.historical_market_cap
        (date, symbol, currency, market_cap, year, quarter, last_quarter_date)
    SELECT date, symbol, currency, market_cap, year, quarter, last_quarter_date
    FROM stage.historical_market_cap_stage";

pub struct HistoricalMcapManager {
    store: PgStore,
    fmp: FmpClient,
    start_date: String,
    end_date: String,
    config: RetryConfig,
}

impl HistoricalMcapManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self {
            store,
            fmp,
            start_date: MCAP_START_DATE.to_string(),
            end_date: (Local::now().date_naive() - ChronoDuration::days(1))
                .format("%Y-%m-%d")
                .to_string(),
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    async fn create_tables(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store.execute(CREATE_RAW_TABLE).await?;
        self.store.execute(CREATE_STAGE_TABLE).await?;
        let deleted = self
            .store
            .execute("DELETE FROM raw.historical_market_cap")
            .await?;
        if deleted > 0 {
            tracing::info!("Cleared {deleted} rows from raw.historical_market_cap");
        }
        Ok(())
    }

    /// The mcap universe is whatever made it into price/volume.
    async fn symbols_from_price_volume(&self) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol, currency FROM raw.historical_price_volume",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        tracing::info!(
            "Retrieved {} unique symbols from historical_price_volume table",
            rows.len()
        );
        Ok(rows
            .iter()
            .map(|r| SymbolCurrency::new(r.get::<String, _>("symbol"), r.get("currency")))
            .collect())
    }

    async fn drop_indexes(&self) -> EtlResult<()> {
        self.store
            .execute("DROP INDEX IF EXISTS raw.idx_historical_market_cap_symbol")
            .await?;
        self.store
            .execute("DROP INDEX IF EXISTS raw.idx_historical_market_cap_symbol_date_desc")
            .await?;
        tracing::info!("Dropped market cap indexes");
        Ok(())
    }

    async fn create_indexes(&self) -> EtlResult<()> {
        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_historical_market_cap_symbol \
                 ON raw.historical_market_cap (symbol)",
            )
            .await?;
        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_historical_market_cap_symbol_date_desc \
                 ON raw.historical_market_cap (symbol, date DESC)",
            )
            .await?;
        tracing::info!("Recreated market cap indexes");
        Ok(())
    }

    pub async fn save_historical_market_cap(&self) -> EtlResult<bool> {
        tracing::info!(
            "######################### Step 9 - HistoricalMcapManager ({} to {})",
            self.start_date,
            self.end_date
        );

        self.create_tables().await?;
        if self.store.has_rows("raw.historical_market_cap").await? {
            tracing::warn!(
                "Historical market cap table already contains data. Aborting save operation."
            );
            return Ok(false);
        }

        let symbols = self.symbols_from_price_volume().await?;
        if symbols.is_empty() {
            tracing::error!("No symbols found in database. Run the price/volume backfill first.");
            return Ok(false);
        }

        self.drop_indexes().await?;
        run_retry_loop(self, symbols, &self.config).await?;
        self.create_indexes().await?;
        tracing::info!("Historical market cap data collection completed");
        Ok(true)
    }
}

#[async_trait]
impl BatchJob for HistoricalMcapManager {
    type Row = MarketCapRow;

    fn name(&self) -> &str {
        "historical_market_cap"
    }

    async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<MarketCapRow>> {
        let points = self
            .fmp
            .get_historical_mcap(&item.symbol, &self.start_date, &self.end_date)
            .await?;

        let mut dated: Vec<(NaiveDate, f64)> = Vec::with_capacity(points.len());
        for point in &points {
            let Some(date) = point
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let Some(raw_mcap) = point.market_cap else {
                tracing::warn!("Missing marketCap for {} on {date}", item.symbol);
                continue;
            };
            dated.push((date, coerce_large(raw_mcap)));
        }

        let dates: Vec<NaiveDate> = dated.iter().map(|(d, _)| *d).collect();
        let tags = tag_quarters(&dates, Local::now().date_naive());

        Ok(dated
            .into_iter()
            .zip(tags)
            .map(|((date, market_cap), (year, quarter, last_quarter_date))| MarketCapRow {
                date,
                symbol: item.symbol.clone(),
                currency: item.currency.clone(),
                market_cap,
                year,
                quarter,
                last_quarter_date,
            })
            .collect())
    }

    async fn promote(&self, rows: Vec<MarketCapRow>) -> EtlResult<()> {
        let mut buf = CopyBuffer::new();
        for row in &rows {
            buf.push_date(row.date);
            buf.push_str(&row.symbol);
            buf.push_opt_str(row.currency.as_deref());
            buf.push_i64(row.market_cap.round() as i64);
            buf.push_i64(row.year as i64);
            buf.push_str(&row.quarter);
            buf.push_bool(row.last_quarter_date);
            buf.end_row();
        }
        self.store
            .bulk_copy(
                "stage.historical_market_cap_stage",
                STAGE_COLUMNS,
                buf,
                PROMOTE_SQL,
            )
            .await
    }

    async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol, currency
             FROM raw.historical_market_cap
             WHERE date >= $1::date AND date <= $2::date",
        )
        .bind(&self.start_date)
        .bind(&self.end_date)
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        let present: HashSet<(String, Option<String>)> = rows
            .iter()
            .map(|r| (r.get::<String, _>("symbol"), r.get("currency")))
            .collect();
        Ok(items
            .iter()
            .filter(|i| !present.contains(&(i.symbol.clone(), i.currency.clone())))
            .cloned()
            .collect())
    }
}

/// Dates observed in a batch of provider rows, most frequent first.
/// Provider "as-of" dates disagree across symbols, so the daily loader
/// keeps only the consensus date.
pub fn date_frequencies(points: &[(NaiveDate, String, f64)]) -> Vec<(NaiveDate, usize)> {
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    for (date, _, _) in points {
        *counts.entry(*date).or_insert(0) += 1;
    }
    let mut sorted: Vec<(NaiveDate, usize)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted
}

pub struct DailyMcapManager {
    store: PgStore,
    fmp: FmpClient,
}

impl DailyMcapManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    async fn symbols_from_db(&self) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol, currency FROM raw.historical_market_cap",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        tracing::info!("Retrieved {} symbols from historical_market_cap", rows.len());
        Ok(rows
            .iter()
            .map(|r| SymbolCurrency::new(r.get::<String, _>("symbol"), r.get("currency")))
            .collect())
    }

    fn collect_batch(
        points: Vec<McapPoint>,
        currencies: &HashMap<String, Option<String>>,
    ) -> Vec<(NaiveDate, String, f64)> {
        let mut rows = Vec::with_capacity(points.len());
        for point in points {
            let Some(symbol) = point.symbol.filter(|s| !s.is_empty()) else {
                continue;
            };
            let Some(date) = point
                .date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let Some(mcap) = point.market_cap else { continue };
            if !currencies.contains_key(&symbol) {
                continue;
            }
            rows.push((date, symbol, coerce_large(mcap)));
        }
        rows
    }

    /// Refresh every symbol's current market cap on its consensus date.
    pub async fn run_daily_update(&self) -> EtlResult<()> {
        tracing::info!("######################### Step 5 - DailyMcapManager");

        let symbols_with_currency = self.symbols_from_db().await?;
        if symbols_with_currency.is_empty() {
            tracing::error!("No symbols found in database");
            return Ok(());
        }

        let currencies: HashMap<String, Option<String>> = symbols_with_currency
            .iter()
            .map(|s| (s.symbol.clone(), s.currency.clone()))
            .collect();
        let symbols: Vec<String> = symbols_with_currency
            .iter()
            .map(|s| s.symbol.clone())
            .collect();

        tracing::info!(
            "Processing {} symbols in batches of {DAILY_BATCH_SIZE} with {DAILY_CONCURRENCY} parallel requests",
            symbols.len()
        );

        let semaphore = Arc::new(Semaphore::new(DAILY_CONCURRENCY));
        let mut handles = Vec::new();
        for (batch_num, batch) in symbols.chunks(DAILY_BATCH_SIZE).enumerate() {
            let fmp = self.fmp.clone();
            let batch: Vec<String> = batch.to_vec();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                tracing::info!("Processing batch {} with {} symbols", batch_num + 1, batch.len());
                fmp.get_market_cap_batch(&batch).await
            }));
        }

        let mut all_points = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(points)) => all_points.extend(points),
                Ok(Err(e)) => tracing::error!("Batch processing error: {e}"),
                Err(e) => tracing::error!("Batch task panicked: {e}"),
            }
        }

        let rows = Self::collect_batch(all_points, &currencies);
        if rows.is_empty() {
            tracing::warn!("No market cap data fetched");
            return Ok(());
        }

        let frequencies = date_frequencies(&rows);
        let Some(&(mode_date, mode_count)) = frequencies.first() else {
            tracing::warn!("No valid dates found in market cap data");
            return Ok(());
        };

        let mut log_message =
            format!("Most frequent date: {mode_date} with {mode_count} records");
        for (rank, (date, count)) in frequencies.iter().enumerate().skip(1).take(2) {
            log_message.push_str(&format!(
                ", {} most frequent: {date} with {count} records",
                if rank == 1 { "2nd" } else { "3rd" }
            ));
        }
        tracing::info!("{log_message}");

        let filtered: Vec<&(NaiveDate, String, f64)> =
            rows.iter().filter(|(d, _, _)| *d == mode_date).collect();
        tracing::info!(
            "Filtered to {} records for date {mode_date} (removed {} records with other dates)",
            filtered.len(),
            rows.len() - filtered.len()
        );

        let deleted = sqlx::query("DELETE FROM raw.historical_market_cap WHERE date = $1")
            .bind(mode_date)
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?
            .rows_affected();
        if deleted > 0 {
            tracing::info!("Deleted {deleted} existing market cap records for date {mode_date}");
        }

        let mut buf = CopyBuffer::new();
        for (date, symbol, mcap) in &filtered {
            buf.push_date(*date);
            buf.push_str(symbol);
            buf.push_opt_str(currencies.get(symbol).and_then(|c| c.as_deref()));
            buf.push_i64(mcap.round() as i64);
            buf.end_row();
        }
        let count = filtered.len();
        self.store
            .copy_direct(
                "raw.historical_market_cap",
                &["date", "symbol", "currency", "market_cap"],
                buf,
            )
            .await?;
        tracing::info!("Successfully stored {count} market cap records for date {mode_date}");
        Ok(())
    }
}

/// Conversion statement; the daily variant binds one date and skips the
/// zero-mcap guard so freshly inserted slices convert even when a zero
/// landed upstream.
fn fx_conversion_sql(single_date: bool) -> String {
    let (outer_pred, inner_pred) = if single_date {
        ("hmc.date = $1", "mem.date = $1")
    } else {
        (
            "hmc.date >= $1 AND hmc.date < $2",
            "mem.date >= $1 AND mem.date < $2",
        )
    };
    let (eur_guard, usd_guard) = if single_date {
        ("", "")
    } else {
        (
            "hmc.market_cap = 0 OR hmc.market_cap IS NULL OR ",
            "mem.market_cap = 0 OR mem.market_cap IS NULL OR ",
        )
    };

    format!(
        "WITH forex_eur AS (
             SELECT * FROM clean.historical_forex_full WHERE ccy_left = 'EUR'
         ),
         forex_usd AS (
             SELECT * FROM clean.historical_forex_full WHERE ccy_left = 'USD'
         ),
         mcap_eur_merge AS (
             SELECT
                 hmc.symbol,
                 hmc.date,
                 hmc.currency,
                 hmc.market_cap,
                 CASE
                     WHEN {eur_guard}fe.price IS NULL OR fe.price < 1e-6 THEN 0
                     ELSE ROUND((hmc.market_cap / fe.price)::numeric, 0)
                 END AS market_cap_eur
             FROM raw.historical_market_cap hmc
             LEFT JOIN forex_eur fe
               ON hmc.date = fe.date AND hmc.currency = fe.ccy_right
             WHERE {outer_pred}
         ),
         mcap_eur_usd_merge AS (
             SELECT
                 mem.symbol,
                 mem.date,
                 mem.currency,
                 mem.market_cap_eur,
                 CASE
                     WHEN {usd_guard}fu.price IS NULL OR fu.price < 1e-6 THEN 0
                     ELSE ROUND((mem.market_cap / fu.price)::numeric, 0)
                 END AS market_cap_usd
             FROM mcap_eur_merge mem
             LEFT JOIN forex_usd fu
               ON mem.date = fu.date AND mem.currency = fu.ccy_right
             WHERE {inner_pred}
         )
         UPDATE raw.historical_market_cap hmc
         SET
             market_cap_eur = merged.market_cap_eur,
             market_cap_usd = merged.market_cap_usd,
             created_at = NOW()
         FROM mcap_eur_usd_merge merged
         WHERE
             hmc.symbol = merged.symbol AND
             hmc.date = merged.date AND
             hmc.currency = merged.currency"
    )
}

pub struct McapFxConverter {
    store: PgStore,
}

impl McapFxConverter {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    async fn add_derived_columns(&self) -> EtlResult<()> {
        self.store
            .execute(
                "ALTER TABLE raw.historical_market_cap \
                 ADD COLUMN IF NOT EXISTS market_cap_eur NUMERIC(30, 0), \
                 ADD COLUMN IF NOT EXISTS market_cap_usd NUMERIC(30, 0), \
                 ADD COLUMN IF NOT EXISTS created_at TIMESTAMP DEFAULT NOW()",
            )
            .await?;
        Ok(())
    }

    pub async fn run_conversion(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 10 - McapFxConverter");
        self.add_derived_columns().await?;

        let sql = fx_conversion_sql(false);
        let mut d_start = NaiveDate::from_ymd_opt(2014, 1, 1)
            .ok_or_else(|| EtlError::Config("invalid conversion start date".to_string()))?;
        let d_end = Local::now().date_naive();

        let mut batch_num = 1u32;
        while d_start < d_end {
            let d_next = d_start
                .checked_add_months(Months::new(1))
                .unwrap_or(d_end);
            sqlx::query(&sql)
                .bind(d_start)
                .bind(d_next)
                .execute(self.store.pool())
                .await
                .map_err(|e| EtlError::Database(e.to_string()))?;
            tracing::info!("Completed conversion batch {batch_num}: {d_start} to {d_next}");
            d_start = d_next;
            batch_num += 1;
        }

        tracing::info!("Historical market cap currency conversion completed successfully");
        Ok(true)
    }

    async fn missing_fx_dates(&self) -> EtlResult<Vec<NaiveDate>> {
        let end_date = Local::now().date_naive();
        let start_date = end_date - ChronoDuration::days(5);

        let rows = sqlx::query(
            "SELECT DISTINCT date
             FROM raw.historical_market_cap
             WHERE (market_cap_eur = 0
                OR market_cap_eur IS NULL
                OR market_cap_usd = 0
                OR market_cap_usd IS NULL)
               AND date >= $1 AND date <= $2
             ORDER BY date",
        )
        .bind(start_date)
        .bind(end_date)
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        Ok(rows.iter().map(|r| r.get::<NaiveDate, _>("date")).collect())
    }

    pub async fn run_daily_fx_conversion(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 6 - DailyMcapFxConverter");
        self.add_derived_columns().await?;

        let dates = self.missing_fx_dates().await?;
        if dates.is_empty() {
            tracing::info!("No dates need FX conversion");
            return Ok(true);
        }
        tracing::info!("Found {} dates needing FX conversion in the last 5 days", dates.len());

        let sql = fx_conversion_sql(true);
        for date in &dates {
            sqlx::query(&sql)
                .bind(date)
                .execute(self.store.pool())
                .await
                .map_err(|e| EtlError::Database(e.to_string()))?;
            tracing::info!("Completed FX conversion for date {date}");
        }

        tracing::info!("Successfully processed FX conversion for {} dates", dates.len());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn point(date: NaiveDate, symbol: &str) -> (NaiveDate, String, f64) {
        (date, symbol.to_string(), 1.0e9)
    }

    #[test]
    fn mode_date_wins_over_stragglers() {
        let mut rows = Vec::new();
        for i in 0..800 {
            rows.push(point(d(2024, 5, 10), &format!("S{i}")));
        }
        for i in 0..40 {
            rows.push(point(d(2024, 5, 9), &format!("T{i}")));
        }

        let freq = date_frequencies(&rows);
        assert_eq!(freq[0], (d(2024, 5, 10), 800));
        assert_eq!(freq[1], (d(2024, 5, 9), 40));

        let kept: Vec<_> = rows.iter().filter(|(date, _, _)| *date == freq[0].0).collect();
        assert_eq!(kept.len(), 800);
    }

    #[test]
    fn frequency_ties_break_on_earlier_date() {
        let rows = vec![point(d(2024, 5, 10), "A"), point(d(2024, 5, 9), "B")];
        let freq = date_frequencies(&rows);
        assert_eq!(freq[0].0, d(2024, 5, 9));
    }

    #[test]
    fn daily_fx_sql_drops_the_zero_guard() {
        let monthly = fx_conversion_sql(false);
        let daily = fx_conversion_sql(true);
        assert!(monthly.contains("hmc.market_cap = 0 OR hmc.market_cap IS NULL"));
        assert!(!daily.contains("hmc.market_cap = 0"));
        assert!(daily.contains("hmc.date = $1"));
    }
}
