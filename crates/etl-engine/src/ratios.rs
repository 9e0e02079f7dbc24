//! Quarterly financial ratio ingestion (`raw.financial_metrics`).
//!
//! Provider fields map to store columns through the single catalog in
//! `market_core::metrics`; the DDL, the COPY column list and the promote
//! statement are all generated from it.

use crate::driver::{run_retry_loop, BatchJob, RetryConfig};
use async_trait::async_trait;
use chrono::NaiveDate;
use fmp_client::FmpClient;
use market_core::metrics::{metric_columns, RATIO_FIELD_MAP};
use market_core::validate::{coerce_ratio, json_f64, json_string, normalize_currency};
use market_core::{EtlError, EtlResult, RatioRow, SymbolCurrency};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::HashSet;

const RATIO_PERIODS: u32 = 50;

const IDENTITY_COLUMNS: &[&str] = &["symbol", "date", "fiscal_year", "period", "reported_currency"];

fn all_columns() -> Vec<&'static str> {
    IDENTITY_COLUMNS
        .iter()
        .copied()
        .chain(metric_columns())
        .collect()
}

fn create_table_sql(table: &str, with_key: bool) -> String {
    let metric_defs: Vec<String> = metric_columns()
        .iter()
        .map(|col| format!("{col} NUMERIC(20, 6)"))
        .collect();
    let tail = if with_key {
        ",\n        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,\n        \
         PRIMARY KEY (symbol, date, period)"
    } else {
        ""
    };
    format!(
        "CREATE TABLE {table} (
        symbol VARCHAR(20),
        date DATE,
        fiscal_year VARCHAR(10),
        period VARCHAR(10),
        reported_currency VARCHAR(10),
        {}{tail}
    )",
        metric_defs.join(",\n        ")
    )
}

fn promote_sql() -> String {
    let cols = all_columns().join(", ");
    format!(
        "INSERT INTO raw.financial_metrics ({cols})
         SELECT {cols}
         FROM stage.financial_metrics_stage"
    )
}

/// Map one provider ratio payload to a canonical row. Records without a
/// parsable symbol and date are dropped.
pub fn parse_ratio_record(record: &serde_json::Value) -> Option<RatioRow> {
    let symbol = json_string(record.get("symbol")).filter(|s| s.chars().count() <= 20)?;
    let date = json_string(record.get("date"))
        .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok())?;
    let fiscal_year = json_string(record.get("fiscalYear")).unwrap_or_default();
    let period = json_string(record.get("period")).unwrap_or_default();
    let reported_currency = json_string(record.get("reportedCurrency"))
        .as_deref()
        .and_then(normalize_currency);

    let values = RATIO_FIELD_MAP
        .iter()
        .map(|(api, _)| json_f64(record.get(*api)).and_then(coerce_ratio))
        .collect();

    Some(RatioRow {
        symbol,
        date,
        fiscal_year,
        period,
        reported_currency,
        values,
    })
}

pub struct MetricsManager {
    store: PgStore,
    fmp: FmpClient,
    config: RetryConfig,
}

impl MetricsManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self {
            store,
            fmp,
            config: RetryConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RetryConfig) -> Self {
        self.config = config;
        self
    }

    async fn create_tables(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store
            .recreate(
                "raw.financial_metrics",
                &create_table_sql("raw.financial_metrics", true),
            )
            .await?;
        self.store
            .recreate(
                "stage.financial_metrics_stage",
                &create_table_sql("stage.financial_metrics_stage", false),
            )
            .await?;
        tracing::info!("Financial metrics tables created in raw and stage schemas");
        Ok(())
    }

    async fn relevant_symbols(&self) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query(
            "SELECT symbol, currency FROM raw.stock_info WHERE relevant = TRUE",
        )
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;
        tracing::info!("Found {} relevant symbols in database", rows.len());
        Ok(rows
            .iter()
            .map(|r| SymbolCurrency::new(r.get::<String, _>("symbol"), r.get("currency")))
            .collect())
    }

    /// Drop-recreate and refill the ratio table for the relevant universe.
    pub async fn save_financial_metrics(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 11 - MetricsManager");

        self.create_tables().await?;
        let symbols = self.relevant_symbols().await?;
        if symbols.is_empty() {
            tracing::error!("No symbols found in database.");
            return Ok(false);
        }

        run_retry_loop(self, symbols, &self.config).await?;
        tracing::info!("Financial metrics ingestion complete.");
        Ok(true)
    }
}

#[async_trait]
impl BatchJob for MetricsManager {
    type Row = RatioRow;

    fn name(&self) -> &str {
        "financial_metrics"
    }

    async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<RatioRow>> {
        let records = self
            .fmp
            .get_financial_ratios(&item.symbol, RATIO_PERIODS)
            .await?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            match parse_ratio_record(record) {
                Some(row) => rows.push(row),
                None => {
                    tracing::warn!("Error processing ratio data for {}, dropping row", item.symbol)
                }
            }
        }
        Ok(rows)
    }

    async fn promote(&self, rows: Vec<RatioRow>) -> EtlResult<()> {
        let mut buf = CopyBuffer::new();
        for row in &rows {
            buf.push_str(&row.symbol);
            buf.push_date(row.date);
            buf.push_str(&row.fiscal_year);
            buf.push_str(&row.period);
            buf.push_opt_str(row.reported_currency.as_deref());
            for value in &row.values {
                buf.push_opt_f64(*value);
            }
            buf.end_row();
        }

        let columns = all_columns();
        let count = rows.len();
        self.store
            .bulk_copy(
                "stage.financial_metrics_stage",
                &columns,
                buf,
                &promote_sql(),
            )
            .await?;
        tracing::info!("Successfully processed {count} metrics records");
        Ok(())
    }

    async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>> {
        let rows = sqlx::query("SELECT DISTINCT symbol FROM raw.financial_metrics")
            .fetch_all(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        let present: HashSet<String> =
            rows.iter().map(|r| r.get::<String, _>("symbol")).collect();
        let missing: Vec<SymbolCurrency> = items
            .iter()
            .filter(|i| !present.contains(&i.symbol))
            .cloned()
            .collect();
        tracing::info!(
            "Found {} symbols with data, {} symbols missing",
            present.len(),
            missing.len()
        );
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::metrics::metric_index;
    use serde_json::json;

    #[test]
    fn ratio_record_maps_fields_through_the_catalog() {
        let record = json!({
            "symbol": "AAPL",
            "date": "2024-03-30",
            "fiscalYear": "2024",
            "period": "Q2",
            "reportedCurrency": "usd",
            "grossProfitMargin": 0.465,
            "priceToEarningsRatio": 26.3,
            "enterpriseValueMultiple": 19.9
        });
        let row = parse_ratio_record(&record).unwrap();

        assert_eq!(row.symbol, "AAPL");
        assert_eq!(row.fiscal_year, "2024");
        assert_eq!(row.period, "Q2");
        assert_eq!(row.reported_currency.as_deref(), Some("USD"));
        assert_eq!(row.values.len(), RATIO_FIELD_MAP.len());
        assert_eq!(row.values[metric_index("gross_profit_margin").unwrap()], Some(0.465));
        assert_eq!(row.values[metric_index("price_to_earnings_ratio").unwrap()], Some(26.3));
        assert_eq!(row.values[metric_index("quick_ratio").unwrap()], None);
    }

    #[test]
    fn out_of_range_ratios_become_null() {
        let record = json!({
            "symbol": "X",
            "date": "2024-03-30",
            "period": "Q1",
            "currentRatio": 1e21,
            "quickRatio": 1e-11,
            "cashRatio": 0.5
        });
        let row = parse_ratio_record(&record).unwrap();
        assert_eq!(row.values[metric_index("current_ratio").unwrap()], None);
        assert_eq!(row.values[metric_index("quick_ratio").unwrap()], None);
        assert_eq!(row.values[metric_index("cash_ratio").unwrap()], Some(0.5));
    }

    #[test]
    fn records_without_identity_are_dropped() {
        assert!(parse_ratio_record(&json!({"date": "2024-03-30"})).is_none());
        assert!(parse_ratio_record(&json!({"symbol": "X", "date": "not-a-date"})).is_none());
    }

    #[test]
    fn generated_ddl_covers_every_metric() {
        let ddl = create_table_sql("raw.financial_metrics", true);
        for col in metric_columns() {
            assert!(ddl.contains(col), "{col} missing from DDL");
        }
        assert!(ddl.contains("PRIMARY KEY (symbol, date, period)"));
        assert!(!create_table_sql("stage.financial_metrics_stage", false).contains("PRIMARY KEY"));
    }
}
