//! Company profile ingestion (`raw.stock_info`), trading-volume currency
//! normalization and relevance selection.

use chrono::NaiveDate;
use fmp_client::FmpClient;
use futures_util::future::join_all;
use market_core::validate::{
    clean_string, json_f64, json_string, normalize_currency, parse_bool,
};
use market_core::{EtlError, EtlResult, StockInfoRow};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

const PROFILE_CHUNK: usize = 500;
const PARALLEL_CHUNKS: usize = 5;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.stock_info (
        symbol VARCHAR(20) PRIMARY KEY,
        price DECIMAL(20, 4),
        beta DECIMAL(20, 4),
        vol_avg DECIMAL(20, 4),
        mkt_cap DECIMAL(30, 4),
        last_div DECIMAL(20, 4),
        range VARCHAR(50),
        changes DECIMAL(20, 4),
        company_name VARCHAR(255),
        currency VARCHAR(10),
        cik VARCHAR(20),
        isin VARCHAR(20),
        cusip VARCHAR(20),
        exchange VARCHAR(50),
        exchange_short_name VARCHAR(20),
        industry VARCHAR(100),
        website VARCHAR(255),
        description TEXT,
        ceo VARCHAR(100),
        sector VARCHAR(100),
        country VARCHAR(100),
        full_time_employees INTEGER,
        phone VARCHAR(50),
        address TEXT,
        city VARCHAR(100),
        state VARCHAR(100),
        zip VARCHAR(20),
        dcf_diff DECIMAL(20, 4),
        dcf DECIMAL(20, 4),
        image VARCHAR(255),
        ipo_date DATE,
        default_image BOOLEAN,
        is_etf BOOLEAN,
        is_actively_trading BOOLEAN,
        is_adr BOOLEAN,
        is_fund BOOLEAN,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
        updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

const COPY_COLUMNS: &[&str] = &[
    "symbol",
    "price",
    "beta",
    "vol_avg",
    "mkt_cap",
    "last_div",
    "range",
    "changes",
    "company_name",
    "currency",
    "cik",
    "isin",
    "cusip",
    "exchange",
    "exchange_short_name",
    "industry",
    "website",
    "description",
    "ceo",
    "sector",
    "country",
    "full_time_employees",
    "phone",
    "address",
    "city",
    "state",
    "zip",
    "dcf_diff",
    "dcf",
    "image",
    "ipo_date",
    "default_image",
    "is_etf",
    "is_actively_trading",
    "is_adr",
    "is_fund",
];

/// Map one raw profile payload into a canonical row. Returns None when the
/// record fails structural validation (missing or oversized symbol).
pub fn parse_profile(profile: &serde_json::Value) -> Option<StockInfoRow> {
    let symbol = clean_string(json_string(profile.get("symbol")).as_deref(), 20)?;

    let currency = json_string(profile.get("currency"))
        .as_deref()
        .and_then(normalize_currency);

    let ipo_date = json_string(profile.get("ipoDate"))
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok());

    let bool_field = |key: &str| profile.get(key).and_then(parse_bool);
    let str_field = |key: &str, max: usize| clean_string(json_string(profile.get(key)).as_deref(), max);

    Some(StockInfoRow {
        symbol,
        price: json_f64(profile.get("price")),
        beta: json_f64(profile.get("beta")),
        vol_avg: json_f64(profile.get("volAvg")),
        mkt_cap: json_f64(profile.get("mktCap")),
        last_div: json_f64(profile.get("lastDiv")),
        range: str_field("range", 50),
        changes: json_f64(profile.get("changes")),
        company_name: str_field("companyName", 255),
        currency,
        cik: str_field("cik", 20),
        isin: str_field("isin", 20),
        cusip: str_field("cusip", 20),
        exchange: str_field("exchange", 50),
        exchange_short_name: str_field("exchangeShortName", 20),
        industry: str_field("industry", 100),
        website: str_field("website", 255),
        description: json_string(profile.get("description")),
        ceo: str_field("ceo", 100),
        sector: str_field("sector", 100),
        country: str_field("country", 100),
        full_time_employees: json_f64(profile.get("fullTimeEmployees")).map(|v| v as i64),
        phone: str_field("phone", 50),
        address: json_string(profile.get("address")),
        city: str_field("city", 100),
        state: str_field("state", 100),
        zip: str_field("zip", 20),
        dcf_diff: json_f64(profile.get("dcfDiff")),
        dcf: json_f64(profile.get("dcf")),
        image: str_field("image", 255),
        ipo_date,
        default_image: bool_field("defaultImage"),
        is_etf: bool_field("isEtf"),
        is_actively_trading: bool_field("isActivelyTrading"),
        is_adr: bool_field("isAdr"),
        is_fund: bool_field("isFund"),
    })
}

fn render_rows(rows: &[StockInfoRow]) -> CopyBuffer {
    let mut buf = CopyBuffer::new();
    for row in rows {
        buf.push_str(&row.symbol);
        buf.push_opt_f64(row.price);
        buf.push_opt_f64(row.beta);
        buf.push_opt_f64(row.vol_avg);
        buf.push_opt_f64(row.mkt_cap);
        buf.push_opt_f64(row.last_div);
        buf.push_opt_str(row.range.as_deref());
        buf.push_opt_f64(row.changes);
        buf.push_opt_str(row.company_name.as_deref());
        buf.push_opt_str(row.currency.as_deref());
        buf.push_opt_str(row.cik.as_deref());
        buf.push_opt_str(row.isin.as_deref());
        buf.push_opt_str(row.cusip.as_deref());
        buf.push_opt_str(row.exchange.as_deref());
        buf.push_opt_str(row.exchange_short_name.as_deref());
        buf.push_opt_str(row.industry.as_deref());
        buf.push_opt_str(row.website.as_deref());
        buf.push_opt_str(row.description.as_deref());
        buf.push_opt_str(row.ceo.as_deref());
        buf.push_opt_str(row.sector.as_deref());
        buf.push_opt_str(row.country.as_deref());
        buf.push_opt_i64(row.full_time_employees);
        buf.push_opt_str(row.phone.as_deref());
        buf.push_opt_str(row.address.as_deref());
        buf.push_opt_str(row.city.as_deref());
        buf.push_opt_str(row.state.as_deref());
        buf.push_opt_str(row.zip.as_deref());
        buf.push_opt_f64(row.dcf_diff);
        buf.push_opt_f64(row.dcf);
        buf.push_opt_str(row.image.as_deref());
        buf.push_opt_date(row.ipo_date);
        buf.push_opt_bool(row.default_image);
        buf.push_opt_bool(row.is_etf);
        buf.push_opt_bool(row.is_actively_trading);
        buf.push_opt_bool(row.is_adr);
        buf.push_opt_bool(row.is_fund);
        buf.end_row();
    }
    buf
}

pub struct StockInfoManager {
    store: PgStore,
    fmp: FmpClient,
}

impl StockInfoManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    async fn create_table(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store.execute(CREATE_TABLE).await?;
        let deleted = self.store.execute("DELETE FROM raw.stock_info").await?;
        if deleted > 0 {
            tracing::info!("Cleared {deleted} rows from raw.stock_info");
        }
        Ok(())
    }

    async fn symbols_from_db(&self) -> EtlResult<Vec<String>> {
        let rows = sqlx::query("SELECT symbol FROM raw.stock_symbols")
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(rows.iter().map(|r| r.get::<String, _>("symbol")).collect())
    }

    async fn process_batch(&self, symbols: &[String]) -> EtlResult<()> {
        let chunks: Vec<Vec<String>> = symbols
            .chunks(PROFILE_CHUNK)
            .map(|c| c.to_vec())
            .collect();

        let results = join_all(chunks.iter().map(|chunk| self.fmp.get_stock_info(chunk))).await;

        let mut rows = Vec::new();
        let mut dropped = 0usize;
        for profiles in results {
            for profile in &profiles {
                match parse_profile(profile) {
                    Some(row) => rows.push(row),
                    None => {
                        dropped += 1;
                        tracing::warn!("Validation failed for profile record, dropping");
                    }
                }
            }
        }
        if dropped > 0 {
            tracing::warn!("Dropped {dropped} invalid profile records in batch");
        }
        if rows.is_empty() {
            tracing::warn!("No valid profiles in batch");
            return Ok(());
        }

        // Re-delete the batch's symbols so a rerun stays idempotent, then
        // COPY the fresh rows in.
        let symbols_to_update: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
        sqlx::query("DELETE FROM raw.stock_info WHERE symbol = ANY($1)")
            .bind(&symbols_to_update)
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;

        let count = rows.len();
        self.store
            .copy_direct("raw.stock_info", COPY_COLUMNS, render_rows(&rows))
            .await?;
        tracing::info!("Successfully stored/updated {count} stock info records");
        Ok(())
    }

    /// Refresh profiles for every cataloged symbol, 2500 per batch as five
    /// parallel 500-symbol calls.
    pub async fn update_stock_info(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 2 - StockInfoManager");
        self.create_table().await?;

        let symbols = self.symbols_from_db().await?;
        if symbols.is_empty() {
            tracing::error!("No symbols found in database");
            return Ok(false);
        }

        let batch_size = PROFILE_CHUNK * PARALLEL_CHUNKS;
        let total_batches = symbols.len().div_ceil(batch_size);
        let budget = Duration::from_secs_f64(60.0 / (750.0 / PARALLEL_CHUNKS as f64));

        for (batch_num, batch) in symbols.chunks(batch_size).enumerate() {
            tracing::info!("Processing profile batch {}/{total_batches}", batch_num + 1);
            let started = Instant::now();
            self.process_batch(batch).await?;
            let duration = started.elapsed();
            tracing::info!(
                "Profile batch {} took {:.2}s",
                batch_num + 1,
                duration.as_secs_f64()
            );

            let is_last = (batch_num + 1) * batch_size >= symbols.len();
            if !is_last && duration < budget {
                let sleep = Duration::from_secs(1) + budget - duration;
                tracing::info!("Sleeping for {:.2}s", sleep.as_secs_f64());
                tokio::time::sleep(sleep).await;
            }
        }

        tracing::info!("Stock info update completed successfully");
        Ok(true)
    }
}

/// Convert `amount` from `from_currency` into `to_currency` using the pair
/// `<target><source>`: rates are "1 left = p right", so a value in the
/// right currency divides by p.
pub fn convert_vol_avg(
    amount: f64,
    from_currency: &str,
    to_currency: &str,
    rates: &HashMap<String, f64>,
) -> Option<i64> {
    if from_currency == to_currency {
        return Some(amount.round() as i64);
    }
    let pair = format!("{to_currency}{from_currency}");
    match rates.get(&pair) {
        Some(rate) => Some((amount / rate).round() as i64),
        None => {
            tracing::warn!("No forex rate found for pair {pair}");
            None
        }
    }
}

pub struct VolAvgManager {
    store: PgStore,
}

impl VolAvgManager {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    /// The most recent forex date covering enough pairs to convert the
    /// whole symbol table in one snapshot.
    async fn latest_forex_date_with_sufficient_pairs(&self) -> EtlResult<Option<NaiveDate>> {
        let row = sqlx::query(
            "WITH date_counts AS (
                 SELECT date, COUNT(DISTINCT forex_pair) AS pair_count
                 FROM raw.historical_forex
                 GROUP BY date
                 HAVING COUNT(DISTINCT forex_pair) >= 200
             )
             SELECT date, pair_count
             FROM date_counts
             ORDER BY date DESC
             LIMIT 1",
        )
        .fetch_optional(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        match row {
            Some(row) => {
                let date: NaiveDate = row
                    .try_get("date")
                    .map_err(|e| EtlError::Database(e.to_string()))?;
                let pairs: i64 = row
                    .try_get("pair_count")
                    .map_err(|e| EtlError::Database(e.to_string()))?;
                tracing::info!("Found latest date {date} with {pairs} forex pairs");
                Ok(Some(date))
            }
            None => {
                tracing::warn!("No date found with at least 200 forex pairs");
                Ok(None)
            }
        }
    }

    async fn forex_rates_for_date(&self, date: NaiveDate) -> EtlResult<HashMap<String, f64>> {
        let rows = sqlx::query(
            "SELECT forex_pair, price::float8 AS price
             FROM raw.historical_forex
             WHERE date = $1",
        )
        .bind(date)
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        let mut rates = HashMap::new();
        for row in rows {
            let pair: String = row
                .try_get("forex_pair")
                .map_err(|e| EtlError::Database(e.to_string()))?;
            let price: f64 = row
                .try_get("price")
                .map_err(|e| EtlError::Database(e.to_string()))?;
            rates.insert(pair, price);
        }
        tracing::info!("Retrieved {} forex rates for date {date}", rates.len());
        Ok(rates)
    }

    /// Populate `vol_avg_eur` / `vol_avg_usd` for every symbol that carries
    /// a volume and a currency.
    pub async fn run_update(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 5 - VolAvgManager");

        let Some(date) = self.latest_forex_date_with_sufficient_pairs().await? else {
            tracing::error!("Cannot proceed without sufficient forex data");
            return Ok(false);
        };
        let rates = self.forex_rates_for_date(date).await?;
        if rates.is_empty() {
            tracing::error!("No forex rates found for the selected date");
            return Ok(false);
        }

        self.store
            .execute(
                "ALTER TABLE raw.stock_info \
                 ADD COLUMN IF NOT EXISTS vol_avg_eur BIGINT, \
                 ADD COLUMN IF NOT EXISTS vol_avg_usd BIGINT",
            )
            .await?;

        let records = sqlx::query(
            "SELECT symbol, vol_avg::float8 AS vol_avg, currency
             FROM raw.stock_info
             WHERE vol_avg IS NOT NULL AND currency IS NOT NULL",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        tracing::info!("Processing {} stock records for currency conversion", records.len());

        let mut updated = 0usize;
        for record in records {
            let symbol: String = record
                .try_get("symbol")
                .map_err(|e| EtlError::Database(e.to_string()))?;
            let vol_avg: f64 = record
                .try_get("vol_avg")
                .map_err(|e| EtlError::Database(e.to_string()))?;
            let currency: String = record
                .try_get("currency")
                .map_err(|e| EtlError::Database(e.to_string()))?;

            let eur = convert_vol_avg(vol_avg, &currency, "EUR", &rates);
            let usd = convert_vol_avg(vol_avg, &currency, "USD", &rates);

            sqlx::query(
                "UPDATE raw.stock_info SET vol_avg_eur = $1, vol_avg_usd = $2 WHERE symbol = $3",
            )
            .bind(eur)
            .bind(usd)
            .bind(&symbol)
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
            updated += 1;
        }

        tracing::info!("Successfully updated currency columns for {updated} records");
        Ok(true)
    }
}

pub struct RelevanceManager {
    store: PgStore,
}

impl RelevanceManager {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    /// One share class per company: the symbol with the highest USD average
    /// volume among listed, non-ETF/fund/ADR, non-OTC rows.
    pub async fn run_update(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 6 - RelevanceManager");

        self.store
            .execute(
                "ALTER TABLE raw.stock_info \
                 ADD COLUMN IF NOT EXISTS relevant BOOLEAN DEFAULT FALSE",
            )
            .await?;

        self.store.execute("UPDATE raw.stock_info SET relevant = FALSE").await?;
        tracing::info!("Reset all records to not relevant");

        let marked = self
            .store
            .execute(
                "WITH ranked_companies AS (
                     SELECT
                         symbol,
                         ROW_NUMBER() OVER (
                             PARTITION BY company_name
                             ORDER BY vol_avg_usd DESC NULLS LAST
                         ) AS rank
                     FROM raw.stock_info
                     WHERE company_name IS NOT NULL
                       AND vol_avg_usd IS NOT NULL
                       AND is_etf IS FALSE
                       AND is_fund IS FALSE
                       AND is_adr IS FALSE
                       AND exchange_short_name IS NOT NULL
                       AND exchange_short_name <> 'OTC'
                 )
                 UPDATE raw.stock_info si
                 SET relevant = TRUE
                 FROM ranked_companies rc
                 WHERE si.symbol = rc.symbol AND rc.rank = 1",
            )
            .await?;

        tracing::info!("Successfully marked {marked} records as relevant");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn profile_parsing_applies_coercions() {
        let profile = json!({
            "symbol": "TEVA.TA",
            "price": 14.2,
            "volAvg": 125000.0,
            "companyName": "Teva Pharmaceutical",
            "currency": "ila",
            "exchangeShortName": "TLV",
            "isEtf": "False",
            "isAdr": false,
            "ipoDate": "1987-02-13",
            "fullTimeEmployees": "37000",
            "description": ""
        });

        let row = parse_profile(&profile).unwrap();
        assert_eq!(row.symbol, "TEVA.TA");
        assert_eq!(row.currency.as_deref(), Some("ILS"));
        assert_eq!(row.is_etf, Some(false));
        assert_eq!(row.is_adr, Some(false));
        assert_eq!(row.full_time_employees, Some(37000));
        assert_eq!(row.description, None);
        assert_eq!(
            row.ipo_date,
            Some(NaiveDate::from_ymd_opt(1987, 2, 13).unwrap())
        );
    }

    #[test]
    fn profile_without_symbol_is_dropped() {
        assert!(parse_profile(&json!({"price": 10.0})).is_none());
        assert!(parse_profile(&json!({"symbol": ""})).is_none());
        assert!(parse_profile(&json!({"symbol": "WAY_TOO_LONG_FOR_A_TICKER_FIELD"})).is_none());
    }

    #[test]
    fn vol_avg_conversion_divides_by_target_source_pair() {
        let mut rates = HashMap::new();
        rates.insert("EURUSD".to_string(), 1.25);
        rates.insert("USDJPY".to_string(), 150.0);

        // USD volume into EUR: divide by EURUSD.
        assert_eq!(convert_vol_avg(1000.0, "USD", "EUR", &rates), Some(800));
        // JPY volume into USD: divide by USDJPY.
        assert_eq!(convert_vol_avg(1_500_000.0, "JPY", "USD", &rates), Some(10000));
        // Identity conversion needs no rate.
        assert_eq!(convert_vol_avg(42.6, "EUR", "EUR", &rates), Some(43));
        // Unknown pair yields no value rather than a wrong one.
        assert_eq!(convert_vol_avg(10.0, "GBP", "EUR", &rates), None);
    }
}
