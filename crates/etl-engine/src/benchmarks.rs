//! Benchmark (index/ETF) price ingestion into `raw.benchmarks` and its
//! EUR/USD conversion. Benchmarks behave like price/volume for FX purposes
//! but live in their own table and carry no volume.

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use fmp_client::FmpClient;
use futures_util::future::join_all;
use market_core::{BenchmarkRow, EtlError, EtlResult};
use pg_store::PgStore;
use sqlx::Row;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;

pub const BENCHMARK_START_DATE: &str = "2014-01-01";
const BATCH_SIZE: usize = 250;
const MAX_RETRIES: u32 = 7;
const MAX_SYMBOLS: usize = 500;

/// ETFs tracked alongside the provider's index catalog.
const ETF_SYMBOLS: &[(&str, &str, &str)] = &[
    ("SPY", "SPDR S&P 500 ETF Trust", "USD"),
    ("SMH", "VanEck Semiconductor ETF", "USD"),
];

#[derive(Debug, Clone)]
pub struct BenchmarkListing {
    pub symbol: String,
    pub name: String,
    pub kind: String,
    pub currency: String,
}

pub struct BenchmarkManager {
    store: PgStore,
    fmp: FmpClient,
}

impl BenchmarkManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    async fn recreate_table(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store
            .recreate(
                "raw.benchmarks",
                "CREATE TABLE IF NOT EXISTS raw.benchmarks (
                     symbol TEXT NOT NULL,
                     name   TEXT,
                     type   TEXT,
                     currency TEXT,
                     date   DATE NOT NULL,
                     close  DOUBLE PRECISION,
                     PRIMARY KEY (symbol, date)
                 )",
            )
            .await?;
        self.store
            .execute(
                "CREATE INDEX IF NOT EXISTS benchmarks_date_currency_idx \
                 ON raw.benchmarks(date, currency)",
            )
            .await?;
        Ok(())
    }

    /// Index catalog plus the static ETF allowlist.
    pub async fn fetch_benchmarks_catalog(&self) -> EtlResult<Vec<BenchmarkListing>> {
        let indices = self.fmp.get_index_list().await.unwrap_or_else(|e| {
            tracing::error!("Error fetching index catalog: {e}");
            Vec::new()
        });

        let mut items: Vec<BenchmarkListing> = indices
            .into_iter()
            .filter_map(|listing| {
                let symbol = listing.symbol?;
                let name = listing.name?;
                let currency = listing
                    .currency
                    .or(listing.price_currency)
                    .unwrap_or_else(|| "USD".to_string());
                Some(BenchmarkListing {
                    symbol,
                    name,
                    kind: "index".to_string(),
                    currency,
                })
            })
            .collect();

        for (symbol, name, currency) in ETF_SYMBOLS {
            items.push(BenchmarkListing {
                symbol: symbol.to_string(),
                name: name.to_string(),
                kind: "etf".to_string(),
                currency: currency.to_string(),
            });
        }
        Ok(items)
    }

    async fn fetch_history(&self, item: &BenchmarkListing) -> Vec<BenchmarkRow> {
        let to_date = (Local::now().date_naive() - ChronoDuration::days(2))
            .format("%Y-%m-%d")
            .to_string();
        let bars = match self
            .fmp
            .get_historical_price(&item.symbol, BENCHMARK_START_DATE, &to_date)
            .await
        {
            Ok(bars) => bars,
            Err(e) => {
                tracing::error!("Failed for {}: {e}", item.symbol);
                return Vec::new();
            }
        };

        let mut rows = Vec::with_capacity(bars.len());
        for bar in &bars {
            let Some(date) = bar
                .date_str()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            else {
                continue;
            };
            rows.push(BenchmarkRow {
                symbol: item.symbol.clone(),
                name: Some(item.name.clone()),
                kind: Some(item.kind.clone()),
                currency: Some(item.currency.clone()),
                date,
                close: bar.close_value(),
            });
        }
        tracing::info!("Fetched {} rows for {}", rows.len(), item.symbol);
        rows
    }

    async fn upsert_rows(&self, rows: &[BenchmarkRow]) -> EtlResult<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let symbols: Vec<String> = rows.iter().map(|r| r.symbol.clone()).collect();
        let names: Vec<Option<String>> = rows.iter().map(|r| r.name.clone()).collect();
        let kinds: Vec<Option<String>> = rows.iter().map(|r| r.kind.clone()).collect();
        let currencies: Vec<Option<String>> = rows.iter().map(|r| r.currency.clone()).collect();
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        let closes: Vec<Option<f64>> = rows.iter().map(|r| r.close).collect();

        sqlx::query(
            "INSERT INTO raw.benchmarks (symbol, name, type, currency, date, close)
             SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::text[],
                                  $5::date[], $6::float8[])
             ON CONFLICT (symbol, date) DO UPDATE SET
               name = EXCLUDED.name,
               type = EXCLUDED.type,
               currency = EXCLUDED.currency,
               close = EXCLUDED.close",
        )
        .bind(&symbols)
        .bind(&names)
        .bind(&kinds)
        .bind(&currencies)
        .bind(&dates)
        .bind(&closes)
        .execute(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(())
    }

    async fn missing_symbols(&self, symbols: &[String]) -> EtlResult<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM raw.benchmarks")
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        let present: HashSet<String> =
            rows.iter().map(|r| r.get::<String, _>("symbol")).collect();
        Ok(symbols
            .iter()
            .filter(|s| !present.contains(*s))
            .cloned()
            .collect())
    }

    async fn process_batch(&self, batch: &[BenchmarkListing]) -> EtlResult<()> {
        let results = join_all(batch.iter().map(|item| self.fetch_history(item))).await;
        let all_rows: Vec<BenchmarkRow> = results.into_iter().flatten().collect();
        if !all_rows.is_empty() {
            let count = all_rows.len();
            self.upsert_rows(&all_rows).await?;
            tracing::info!(
                "Upserted {count} total rows for batch of {} symbols",
                batch.len()
            );
        }
        Ok(())
    }

    /// Fresh-slate reload of the benchmark table with the same retry
    /// discipline as the per-symbol loaders.
    pub async fn run(&self) -> EtlResult<()> {
        tracing::info!("######################### Step 7 - BenchmarkManager");

        self.recreate_table().await?;
        let mut catalog = self.fetch_benchmarks_catalog().await?;
        tracing::info!("Fetched {} benchmark symbols", catalog.len());
        catalog.truncate(MAX_SYMBOLS);

        let mut symbols_to_process: Vec<String> =
            catalog.iter().map(|i| i.symbol.clone()).collect();

        let budget = Duration::from_secs_f64(60.0 * BATCH_SIZE as f64 / 750.0);
        let mut attempt = 1u32;

        while attempt <= MAX_RETRIES && !symbols_to_process.is_empty() {
            tracing::info!(
                "Download attempt {attempt} for {} symbols",
                symbols_to_process.len()
            );
            let total_batches = symbols_to_process.len().div_ceil(BATCH_SIZE);

            let pass_symbols = symbols_to_process.clone();
            for (batch_num, batch_symbols) in pass_symbols.chunks(BATCH_SIZE).enumerate() {
                let wanted: HashSet<&String> = batch_symbols.iter().collect();
                let batch_items: Vec<BenchmarkListing> = catalog
                    .iter()
                    .filter(|item| wanted.contains(&item.symbol))
                    .cloned()
                    .collect();

                tracing::info!(
                    "Processing batch {}/{total_batches} (attempt {attempt})",
                    batch_num + 1
                );
                let started = Instant::now();
                self.process_batch(&batch_items).await?;
                let duration = started.elapsed();
                tracing::info!(
                    "Batch {} took {:.2}s",
                    batch_num + 1,
                    duration.as_secs_f64()
                );

                // Recompute the missing set after every batch so a clean
                // pass finishes early.
                symbols_to_process = self.missing_symbols(&symbols_to_process).await?;
                tracing::info!(
                    "Remaining symbols_to_process after batch: {}",
                    symbols_to_process.len()
                );
                if symbols_to_process.is_empty() {
                    tracing::info!("All symbols processed successfully (early completion).");
                    return Ok(());
                }

                if (batch_num + 1) * BATCH_SIZE < pass_symbols.len() && duration < budget {
                    let sleep = Duration::from_secs(7) + budget - duration;
                    tracing::info!("Sleeping for {:.2}s", sleep.as_secs_f64());
                    tokio::time::sleep(sleep).await;
                }
            }

            symbols_to_process = self.missing_symbols(&symbols_to_process).await?;
            if symbols_to_process.is_empty() {
                tracing::info!("All symbols processed successfully.");
                return Ok(());
            }
            tracing::warn!(
                "{} symbols missing after attempt {attempt}. Retrying...",
                symbols_to_process.len()
            );
            attempt += 1;
        }

        if !symbols_to_process.is_empty() {
            tracing::error!(
                "Failed to download {} symbols after {MAX_RETRIES} attempts.",
                symbols_to_process.len()
            );
        }
        Ok(())
    }
}

pub struct BenchmarkFxConverter {
    store: PgStore,
}

impl BenchmarkFxConverter {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    /// Populate close_eur/close_usd off the forex-full matrix. Benchmarks
    /// already quoted in EUR or USD pass their close through unchanged.
    pub async fn convert(&self) -> EtlResult<()> {
        tracing::info!("######################### Step 8 - BenchmarkFxConverter");

        self.store
            .execute(
                "ALTER TABLE raw.benchmarks \
                 ADD COLUMN IF NOT EXISTS close_eur DOUBLE PRECISION, \
                 ADD COLUMN IF NOT EXISTS close_usd DOUBLE PRECISION, \
                 ADD COLUMN IF NOT EXISTS created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP",
            )
            .await?;

        self.store
            .execute(
                "WITH forex_rates AS (
                     SELECT
                         date,
                         TRIM(UPPER(ccy_right)) AS currency,
                         MAX(CASE WHEN ccy_left = 'EUR' THEN price END) AS eur_rate,
                         MAX(CASE WHEN ccy_left = 'USD' THEN price END) AS usd_rate
                     FROM clean.historical_forex_full
                     WHERE ccy_left IN ('EUR', 'USD')
                     GROUP BY date, ccy_right
                 )
                 UPDATE raw.benchmarks AS b
                 SET
                     close_eur = ROUND(CAST(CASE
                         WHEN TRIM(UPPER(b.currency)) = 'EUR' THEN b.close
                         ELSE b.close / f.eur_rate
                     END AS NUMERIC), 4),
                     close_usd = ROUND(CAST(CASE
                         WHEN TRIM(UPPER(b.currency)) = 'USD' THEN b.close
                         ELSE b.close / f.usd_rate
                     END AS NUMERIC), 4),
                     created_at = COALESCE(b.created_at, CURRENT_TIMESTAMP)
                 FROM forex_rates f
                 WHERE
                     f.date = b.date AND
                     f.currency = TRIM(UPPER(b.currency))",
            )
            .await?;

        tracing::info!("Benchmark FX conversion completed (close_eur, close_usd populated).");
        Ok(())
    }
}
