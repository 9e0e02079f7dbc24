//! Price/volume ingestion: per-symbol historical backfill, the daily
//! EOD-bulk refresh and the EUR/USD conversion of both.

use crate::driver::{run_retry_loop, BatchJob, RetryConfig};
use async_trait::async_trait;
use chrono::{Datelike, Duration as ChronoDuration, Local, Months, NaiveDate, Weekday};
use fmp_client::FmpClient;
use market_core::validate::{coerce_close, coerce_large};
use market_core::{tag_quarters, EtlError, EtlResult, PriceVolumeRow, SymbolCurrency};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::{HashMap, HashSet};

pub const PRICE_VOLUME_START_DATE: &str = "2013-12-01";

const CREATE_RAW_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.historical_price_volume (
        date DATE,
        symbol VARCHAR(100),
        currency VARCHAR(10),
        close DECIMAL(20, 4),
        volume NUMERIC(30, 4),
        year INT,
        quarter VARCHAR(2),
        last_quarter_date BOOLEAN
    )";

const CREATE_STAGE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS stage.historical_price_volume_stage (
        date DATE,
        symbol VARCHAR(100),
        currency VARCHAR(10),
        close DECIMAL(20, 4),
        volume NUMERIC(30, 4),
        year INT,
        quarter VARCHAR(2),
        last_quarter_date BOOLEAN
    )";

const STAGE_COLUMNS: &[&str] = &[
    "date",
    "symbol",
    "currency",
    "close",
    "volume",
    "year",
    "quarter",
    "last_quarter_date",
];

const PROMOTE_SQL: &str = "
    INSERT INTO raw.historical_price_volume
        (date, symbol, currency, close, volume, year, quarter, last_quarter_date)
    SELECT date, symbol, currency, close, volume, year, quarter, last_quarter_date
    FROM stage.historical_price_volume_stage";

pub struct HistoricalPriceVolumeManager {
    store: PgStore,
    fmp: FmpClient,
    start_date: String,
    end_date: String,
    config: RetryConfig,
}

impl HistoricalPriceVolumeManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self {
            store,
            fmp,
            start_date: PRICE_VOLUME_START_DATE.to_string(),
            end_date: yesterday().format("%Y-%m-%d").to_string(),
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
            .execute("DELETE FROM raw.historical_price_volume")
            .await?;
        if deleted > 0 {
            tracing::info!("Cleared {deleted} rows from raw.historical_price_volume");
        }
        Ok(())
    }

    async fn relevant_symbols(&self) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT symbol, currency FROM raw.stock_info WHERE relevant = TRUE",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| SymbolCurrency::new(r.get::<String, _>("symbol"), r.get("currency")))
            .collect())
    }

    async fn drop_indexes(&self) -> EtlResult<()> {
        self.store
            .execute("DROP INDEX IF EXISTS raw.idx_hpv_symbol_year_quarter")
            .await?;
        self.store
            .execute("DROP INDEX IF EXISTS raw.idx_hpv_volume_eur")
            .await?;
        tracing::info!("Dropped price/volume indexes");
        Ok(())
    }

    async fn create_indexes(&self) -> EtlResult<()> {
        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_hpv_symbol_year_quarter \
                 ON raw.historical_price_volume (symbol, year, quarter)",
            )
            .await?;
        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_hpv_volume_eur \
                 ON raw.historical_price_volume (volume_eur)",
            )
            .await?;
        tracing::info!("Recreated price/volume indexes");
        Ok(())
    }

    /// Full-history backfill over the relevant symbol universe.
    pub async fn save_historical_price_volume(&self) -> EtlResult<bool> {
        tracing::info!(
            "######################### Step 7 - HistoricalPriceVolumeManager ({} to {})",
            self.start_date,
            self.end_date
        );

        self.create_tables().await?;
        if self.store.has_rows("raw.historical_price_volume").await? {
            tracing::warn!("Data already exists. Aborting.");
            return Ok(false);
        }

        let symbols = self.relevant_symbols().await?;
        if symbols.is_empty() {
            tracing::error!("No symbols found.");
            return Ok(false);
        }

        self.drop_indexes().await?;
        run_retry_loop(self, symbols, &self.config).await?;
        self.create_indexes().await?;
        tracing::info!("Historical price volume ingestion complete.");
        Ok(true)
    }
}

#[async_trait]
impl BatchJob for HistoricalPriceVolumeManager {
    type Row = PriceVolumeRow;

    fn name(&self) -> &str {
        "historical_price_volume"
    }

    async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<PriceVolumeRow>> {
        let bars = self
            .fmp
            .get_historical_price(&item.symbol, &self.start_date, &self.end_date)
            .await?;

        let mut dated: Vec<(NaiveDate, f64, f64)> = Vec::with_capacity(bars.len());
        for bar in &bars {
            let Some(date) = bar
                .date_str()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            let close = coerce_close(bar.close_value().unwrap_or(0.0));
            let volume = coerce_large(bar.volume.unwrap_or(0.0));
            dated.push((date, close, volume));
        }

        let dates: Vec<NaiveDate> = dated.iter().map(|(d, _, _)| *d).collect();
        let tags = tag_quarters(&dates, Local::now().date_naive());

        Ok(dated
            .into_iter()
            .zip(tags)
            .map(|((date, close, volume), (year, quarter, last_quarter_date))| PriceVolumeRow {
                date,
                symbol: item.symbol.clone(),
                currency: item.currency.clone(),
                close,
                volume,
                year,
                quarter,
                last_quarter_date,
            })
            .collect())
    }

    async fn promote(&self, rows: Vec<PriceVolumeRow>) -> EtlResult<()> {
        let mut buf = CopyBuffer::new();
        for row in &rows {
            buf.push_date(row.date);
            buf.push_str(&row.symbol);
            buf.push_opt_str(row.currency.as_deref());
            buf.push_f64(row.close);
            buf.push_f64(row.volume);
            buf.push_i64(row.year as i64);
            buf.push_str(&row.quarter);
            buf.push_bool(row.last_quarter_date);
            buf.end_row();
        }
        self.store
            .bulk_copy(
                "stage.historical_price_volume_stage",
                STAGE_COLUMNS,
                buf,
                PROMOTE_SQL,
            )
            .await
    }

    async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT DISTINCT symbol, currency
             FROM raw.historical_price_volume
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

/// Calendar weekdays strictly after `last_date` up to and including
/// `yesterday`; the daily loader's catch-up window.
pub fn missing_weekdays(last_date: NaiveDate, yesterday: NaiveDate) -> Vec<NaiveDate> {
    let mut dates = Vec::new();
    let mut current = last_date + ChronoDuration::days(1);
    while current <= yesterday {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(current);
        }
        current += ChronoDuration::days(1);
    }
    dates
}

/// Parse the EOD bulk CSV into symbol → (close, volume).
pub fn parse_eod_bulk(csv_text: &str) -> HashMap<String, (f64, f64)> {
    let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
    let headers = match reader.headers() {
        Ok(h) => h.clone(),
        Err(e) => {
            tracing::error!("Unreadable EOD bulk header: {e}");
            return HashMap::new();
        }
    };
    let position = |name: &str| headers.iter().position(|h| h == name);
    let (Some(sym_idx), Some(close_idx), Some(vol_idx)) =
        (position("symbol"), position("close"), position("volume"))
    else {
        tracing::error!("EOD bulk body missing symbol/close/volume columns");
        return HashMap::new();
    };

    let mut prices = HashMap::new();
    for record in reader.records() {
        let Ok(record) = record else { continue };
        let Some(symbol) = record.get(sym_idx).filter(|s| !s.is_empty()) else {
            continue;
        };
        let Some(close) = record.get(close_idx).and_then(|v| v.parse::<f64>().ok()) else {
            continue;
        };
        let volume = record
            .get(vol_idx)
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(0.0);
        prices.insert(symbol.to_string(), (close, volume));
    }
    prices
}

pub struct DailyPriceVolumeManager {
    store: PgStore,
    fmp: FmpClient,
}

impl DailyPriceVolumeManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    async fn missing_dates(&self) -> EtlResult<Vec<NaiveDate>> {
        let row = sqlx::query("SELECT MAX(date) AS last_date FROM raw.historical_price_volume")
            .fetch_one(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        let last_date: Option<NaiveDate> = row
            .try_get("last_date")
            .map_err(|e| EtlError::Database(e.to_string()))?;
        let last_date = last_date.ok_or_else(|| {
            EtlError::MissingData("No data found in historical_price_volume table".to_string())
        })?;

        let dates = missing_weekdays(last_date, yesterday());
        tracing::info!(
            "Found {} missing dates after {last_date}",
            dates.len()
        );
        Ok(dates)
    }

    async fn existing_symbols(&self) -> EtlResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM raw.historical_price_volume")
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>("symbol")).collect())
    }

    async fn symbol_currencies(&self, symbols: &[String]) -> EtlResult<HashMap<String, Option<String>>> {
        let rows = sqlx::query(
            "SELECT symbol, currency FROM raw.stock_info WHERE symbol = ANY($1)",
        )
        .bind(symbols)
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("symbol"), r.get("currency")))
            .collect())
    }

    async fn save_for_date(
        &self,
        date: NaiveDate,
        prices: &HashMap<String, (f64, f64)>,
        symbols: &[String],
        currencies: &HashMap<String, Option<String>>,
    ) -> EtlResult<()> {
        // Delete-then-insert keeps the slice idempotent without UPSERT.
        let deleted = sqlx::query("DELETE FROM raw.historical_price_volume WHERE date = $1")
            .bind(date)
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?
            .rows_affected();
        if deleted > 0 {
            tracing::info!("Deleted {deleted} existing price/volume records for {date}");
        }

        let mut buf = CopyBuffer::new();
        let mut count = 0usize;
        for symbol in symbols {
            let Some((close, volume)) = prices.get(symbol) else {
                continue;
            };
            let close = coerce_close(*close);
            let volume = coerce_large(*volume);
            buf.push_date(date);
            buf.push_str(symbol);
            buf.push_opt_str(currencies.get(symbol).and_then(|c| c.as_deref()));
            buf.push_f64(close);
            buf.push_f64(volume);
            buf.end_row();
            count += 1;
        }

        if count == 0 {
            tracing::warn!("No valid prices to save for date {date}");
            return Ok(());
        }

        self.store
            .copy_direct(
                "raw.historical_price_volume",
                &["date", "symbol", "currency", "close", "volume"],
                buf,
            )
            .await?;
        tracing::info!("Successfully saved {count} prices for date {date}");
        Ok(())
    }

    /// Load every missing weekday, or re-load yesterday when up to date.
    pub async fn run_daily_update(&self) -> EtlResult<()> {
        tracing::info!("######################### Step 3 - DailyPriceVolumeManager");

        let mut dates = self.missing_dates().await?;
        let symbols = self.existing_symbols().await?;
        if symbols.is_empty() {
            tracing::warn!("No existing symbols found");
            return Ok(());
        }
        tracing::info!("Found {} existing symbols", symbols.len());

        if dates.is_empty() {
            tracing::info!("No missing dates found, processing yesterday's data");
            dates = vec![yesterday()];
        }

        let currencies = self.symbol_currencies(&symbols).await?;

        for date in dates {
            tracing::info!("Processing date: {date}");
            let body = self.fmp.get_eod_bulk(&date.format("%Y-%m-%d").to_string()).await?;
            let prices = parse_eod_bulk(&body);
            tracing::info!("Successfully retrieved {} daily price records", prices.len());
            self.save_for_date(date, &prices, &symbols, &currencies).await?;
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        }

        tracing::info!("Historical prices update completed");
        Ok(())
    }
}

/// The conversion statement. The historical path narrows by month window,
/// the daily path by a single date; the predicate is parameterized so both
/// run the same SQL.
fn fx_conversion_sql(single_date: bool) -> String {
    let (outer_pred, inner_pred) = if single_date {
        ("hpv.date = $1", "pve.date = $1")
    } else {
        (
            "hpv.date >= $1 AND hpv.date < $2",
            "pve.date >= $1 AND pve.date < $2",
        )
    };

    format!(
        "WITH forex_eur AS (
             SELECT * FROM clean.historical_forex_full WHERE ccy_left = 'EUR'
         ),
         forex_usd AS (
             SELECT * FROM clean.historical_forex_full WHERE ccy_left = 'USD'
         ),
         price_vol_eur_merge AS (
             SELECT
                 hpv.symbol,
                 hpv.date,
                 hpv.currency,
                 hpv.close,
                 hpv.volume,
                 CASE
                     WHEN hpv.close = 0 OR hpv.close IS NULL OR hpv.volume = 0
                          OR hpv.volume IS NULL OR fe.price IS NULL OR fe.price < 1e-6 THEN 0
                     ELSE ROUND((hpv.close / NULLIF(fe.price, 0))::numeric, 4)
                 END AS close_eur,
                 CASE
                     WHEN hpv.close = 0 OR hpv.close IS NULL OR hpv.volume = 0
                          OR hpv.volume IS NULL OR fe.price IS NULL OR fe.price < 1e-6 THEN 0
                     ELSE ROUND((hpv.volume / NULLIF(fe.price, 0))::numeric, 0)
                 END AS volume_eur
             FROM raw.historical_price_volume hpv
             LEFT JOIN forex_eur fe
               ON hpv.date = fe.date AND hpv.currency = fe.ccy_right
             WHERE {outer_pred}
         ),
         price_vol_eur_usd_merge AS (
             SELECT
                 pve.symbol,
                 pve.date,
                 pve.currency,
                 pve.close_eur,
                 pve.volume_eur,
                 CASE
                     WHEN pve.close_eur = 0 OR pve.close IS NULL OR pve.volume = 0
                          OR pve.volume IS NULL OR fu.price IS NULL OR fu.price < 1e-6 THEN 0
                     ELSE ROUND((pve.close / fu.price)::numeric, 4)
                 END AS close_usd,
                 CASE
                     WHEN pve.close_eur = 0 OR pve.close IS NULL OR pve.volume = 0
                          OR pve.volume IS NULL OR fu.price IS NULL OR fu.price < 1e-6 THEN 0
                     ELSE ROUND((pve.volume / fu.price)::numeric, 0)
                 END AS volume_usd
             FROM price_vol_eur_merge pve
             LEFT JOIN forex_usd fu
               ON pve.date = fu.date AND pve.currency = fu.ccy_right
             WHERE {inner_pred}
         )
         UPDATE raw.historical_price_volume hpv
         SET
             close_eur = merged.close_eur,
             volume_eur = merged.volume_eur,
             close_usd = merged.close_usd,
             volume_usd = merged.volume_usd,
             created_at = NOW()
         FROM price_vol_eur_usd_merge merged
         WHERE
             hpv.symbol = merged.symbol AND
             hpv.date = merged.date AND
             hpv.currency = merged.currency"
    )
}

pub struct PriceVolumeFxConverter {
    store: PgStore,
}

impl PriceVolumeFxConverter {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    async fn add_derived_columns(&self) -> EtlResult<()> {
        self.store
            .execute(
                "ALTER TABLE raw.historical_price_volume \
                 ADD COLUMN IF NOT EXISTS close_eur NUMERIC(20, 4), \
                 ADD COLUMN IF NOT EXISTS volume_eur NUMERIC, \
                 ADD COLUMN IF NOT EXISTS close_usd NUMERIC(20, 4), \
                 ADD COLUMN IF NOT EXISTS volume_usd NUMERIC, \
                 ADD COLUMN IF NOT EXISTS created_at TIMESTAMP DEFAULT NOW()",
            )
            .await?;
        Ok(())
    }

    /// Monthly-windowed conversion over the whole backfill range.
    pub async fn run_conversion(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 8 - PriceVolumeFxConverter");
        self.add_derived_columns().await?;

        let sql = fx_conversion_sql(false);
        let mut d_start = NaiveDate::from_ymd_opt(2013, 12, 1)
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

        tracing::info!("Historical price volume currency conversion completed successfully");
        Ok(true)
    }

    /// Dates within the last 7 days still missing a derived column.
    async fn missing_fx_dates(&self) -> EtlResult<Vec<NaiveDate>> {
        let end_date = Local::now().date_naive();
        let start_date = end_date - ChronoDuration::days(7);

        let rows = sqlx::query(
            "SELECT DISTINCT date
             FROM raw.historical_price_volume
             WHERE (close_eur IS NULL
                OR close_usd IS NULL
                OR volume_eur IS NULL
                OR volume_usd IS NULL)
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

    /// Single-date conversions for the recent window; the same SQL the
    /// historical path runs, bound to one date.
    pub async fn run_daily_fx_conversion(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 4 - DailyPriceVolumeFxConverter");
        self.add_derived_columns().await?;

        let dates = self.missing_fx_dates().await?;
        if dates.is_empty() {
            tracing::info!("No dates need FX conversion");
            return Ok(true);
        }
        tracing::info!("Found {} dates needing FX conversion in the last 7 days", dates.len());

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

fn yesterday() -> NaiveDate {
    Local::now().date_naive() - ChronoDuration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn missing_weekdays_skips_weekends() {
        // 2024-05-10 is a Friday; the gap to Wednesday spans a weekend.
        let dates = missing_weekdays(d(2024, 5, 10), d(2024, 5, 15));
        assert_eq!(dates, vec![d(2024, 5, 13), d(2024, 5, 14), d(2024, 5, 15)]);
    }

    #[test]
    fn missing_weekdays_empty_when_caught_up() {
        assert!(missing_weekdays(d(2024, 5, 10), d(2024, 5, 10)).is_empty());
        assert!(missing_weekdays(d(2024, 5, 10), d(2024, 5, 9)).is_empty());
    }

    #[test]
    fn eod_bulk_parsing_tolerates_junk_rows() {
        let body = "symbol,date,open,low,high,close,adjClose,volume\n\
                    AAPL,2024-05-10,182,181,184,183.05,183.05,48089800\n\
                    ,2024-05-10,1,1,1,1,1,100\n\
                    MSFT,2024-05-10,410,408,416,bad,414.74,18612100\n\
                    SAP.DE,2024-05-10,172,171,175,174.10,174.10,\n";
        let prices = parse_eod_bulk(body);

        assert_eq!(prices.len(), 2);
        assert_eq!(prices["AAPL"], (183.05, 48089800.0));
        // Missing volume parses as zero rather than dropping the close.
        assert_eq!(prices["SAP.DE"], (174.10, 0.0));
        assert!(!prices.contains_key("MSFT"));
    }

    #[test]
    fn eod_bulk_parsing_handles_missing_columns() {
        assert!(parse_eod_bulk("a,b,c\n1,2,3\n").is_empty());
        assert!(parse_eod_bulk("").is_empty());
    }

    #[test]
    fn conversion_sql_variants_differ_only_in_predicate() {
        let monthly = fx_conversion_sql(false);
        let daily = fx_conversion_sql(true);
        assert!(monthly.contains("hpv.date >= $1 AND hpv.date < $2"));
        assert!(daily.contains("hpv.date = $1"));

        let strip = |s: &str| {
            s.replace("hpv.date >= $1 AND hpv.date < $2", "@")
                .replace("pve.date >= $1 AND pve.date < $2", "@")
                .replace("hpv.date = $1", "@")
                .replace("pve.date = $1", "@")
        };
        // Identical plans modulo the date predicate.
        assert_eq!(strip(&monthly), strip(&daily));
    }
}
