//! Cross-sectional percentile bucketing of the ratio table into
//! `clean.financial_metrics_perc`.
//!
//! For every metric the population is cut at the eleven nearest-rank
//! quantiles, giving twelve half-open buckets labeled
//! {1, 10, 20, …, 90, 99, 100}; each row gets an integer bucket and a
//! human-readable interval string. Metrics are merged into the output
//! table four at a time through a stage batch table.

use chrono::NaiveDate;
use market_core::metrics::metric_columns;
use market_core::{EtlError, EtlResult};
use pg_store::{CopyBuffer, PgStore};
use sqlx::Row;
use std::collections::HashMap;

/// Upper-percentile positions of the bucket boundaries.
pub const PERCENTILES: [u32; 11] = [1, 10, 20, 30, 40, 50, 60, 70, 80, 90, 99];

/// Integer bucket labels, from the `<1%` tail to the `>99%` tail.
pub const BUCKET_LABELS: [i32; 12] = [1, 10, 20, 30, 40, 50, 60, 70, 80, 90, 99, 100];

const MERGE_BATCH: usize = 4;

/// Nearest-rank thresholds for the eleven percentile positions. Returns
/// None when the population is too small to cut.
pub fn quantile_thresholds(values: &[f64]) -> Option<[f64; 11]> {
    if values.len() < 2 {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    let mut thresholds = [0.0; 11];
    for (i, p) in PERCENTILES.iter().enumerate() {
        let rank = ((*p as f64 / 100.0) * n as f64).ceil() as usize;
        thresholds[i] = sorted[rank.clamp(1, n) - 1];
    }
    Some(thresholds)
}

fn display_label(bucket: i32) -> String {
    match bucket {
        1 => "<1%".to_string(),
        100 => ">99%".to_string(),
        other => format!("{other}%"),
    }
}

/// Assign a value to its bucket. Intervals are half-open `[lo, hi)` with
/// the last bucket `[lo, +∞]`, so boundary ties go up.
pub fn bucket_for(value: f64, thresholds: &[f64; 11]) -> (i32, String) {
    for (i, threshold) in thresholds.iter().enumerate() {
        if value < *threshold {
            let bucket = BUCKET_LABELS[i];
            let label = display_label(bucket);
            let bound = if i == 0 {
                format!("{label} (-∞ – {threshold:.2})")
            } else {
                format!("{label} ({:.2} – {threshold:.2})", thresholds[i - 1])
            };
            return (bucket, bound);
        }
    }
    let top = thresholds[10];
    (100, format!(">99% ({top:.2} – +∞)"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdentityKey {
    symbol: String,
    date: NaiveDate,
    fiscal_year: String,
    period: String,
    reported_currency: Option<String>,
}

pub struct PercentileCalculator {
    store: PgStore,
}

impl PercentileCalculator {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    fn create_table_sql() -> String {
        let metric_defs: Vec<String> = metric_columns()
            .iter()
            .map(|col| format!("{col}_bound VARCHAR(100),\n        {col}_perc INT"))
            .collect();
        format!(
            "CREATE TABLE clean.financial_metrics_perc (
        symbol VARCHAR(20),
        date DATE,
        fiscal_year VARCHAR(10),
        period VARCHAR(10),
        reported_currency VARCHAR(10),
        {}
    )",
            metric_defs.join(",\n        ")
        )
    }

    async fn seed_base_rows(&self) -> EtlResult<()> {
        let inserted = self
            .store
            .execute(
                "INSERT INTO clean.financial_metrics_perc
                     (symbol, date, fiscal_year, period, reported_currency)
                 SELECT DISTINCT symbol, date, fiscal_year, period, reported_currency
                 FROM raw.financial_metrics",
            )
            .await?;
        tracing::info!("Seeded {inserted} base rows in percentiles table");
        Ok(())
    }

    /// Rows and bucket assignments for one metric column.
    async fn bucketize_column(
        &self,
        column: &str,
    ) -> EtlResult<HashMap<IdentityKey, (i32, String)>> {
        let rows = sqlx::query(&format!(
            "SELECT symbol, date, fiscal_year, period, reported_currency, \
                    {column}::float8 AS value
             FROM raw.financial_metrics
             WHERE {column} IS NOT NULL"
        ))
        .fetch_all(self.store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

        let values: Vec<f64> = rows
            .iter()
            .filter_map(|r| r.try_get::<f64, _>("value").ok())
            .collect();
        let Some(thresholds) = quantile_thresholds(&values) else {
            tracing::warn!(
                "Not enough data for column {column} (only {} values)",
                values.len()
            );
            return Ok(HashMap::new());
        };
        tracing::info!("Processing {} values for {column}", values.len());

        let mut assignments = HashMap::with_capacity(rows.len());
        for row in rows {
            let value: f64 = match row.try_get("value") {
                Ok(v) => v,
                Err(_) => continue,
            };
            let key = IdentityKey {
                symbol: row.get("symbol"),
                date: row.get("date"),
                fiscal_year: row.get("fiscal_year"),
                period: row.get("period"),
                reported_currency: row.get("reported_currency"),
            };
            assignments.insert(key, bucket_for(value, &thresholds));
        }
        Ok(assignments)
    }

    /// Merge one batch of metric assignments through a stage table joined
    /// back on the identity key.
    async fn merge_batch(
        &self,
        batch_columns: &[&str],
        per_metric: Vec<HashMap<IdentityKey, (i32, String)>>,
    ) -> EtlResult<()> {
        let mut merged: HashMap<IdentityKey, Vec<Option<(i32, String)>>> = HashMap::new();
        for (slot, assignments) in per_metric.into_iter().enumerate() {
            for (key, assignment) in assignments {
                merged
                    .entry(key)
                    .or_insert_with(|| vec![None; batch_columns.len()])[slot] = Some(assignment);
            }
        }
        if merged.is_empty() {
            return Ok(());
        }

        let batch_defs: Vec<String> = batch_columns
            .iter()
            .map(|col| format!("{col}_bound VARCHAR(100), {col}_perc INT"))
            .collect();
        self.store
            .recreate(
                "stage.financial_metrics_perc_batch",
                &format!(
                    "CREATE TABLE stage.financial_metrics_perc_batch (
                         symbol VARCHAR(20),
                         date DATE,
                         fiscal_year VARCHAR(10),
                         period VARCHAR(10),
                         reported_currency VARCHAR(10),
                         {}
                     )",
                    batch_defs.join(",\n                         ")
                ),
            )
            .await?;

        let mut copy_columns = vec![
            "symbol".to_string(),
            "date".to_string(),
            "fiscal_year".to_string(),
            "period".to_string(),
            "reported_currency".to_string(),
        ];
        for col in batch_columns {
            copy_columns.push(format!("{col}_bound"));
            copy_columns.push(format!("{col}_perc"));
        }
        let copy_column_refs: Vec<&str> = copy_columns.iter().map(|s| s.as_str()).collect();

        let mut buf = CopyBuffer::new();
        for (key, assignments) in &merged {
            buf.push_str(&key.symbol);
            buf.push_date(key.date);
            buf.push_str(&key.fiscal_year);
            buf.push_str(&key.period);
            buf.push_opt_str(key.reported_currency.as_deref());
            for assignment in assignments {
                match assignment {
                    Some((bucket, bound)) => {
                        buf.push_str(bound);
                        buf.push_i64(*bucket as i64);
                    }
                    None => {
                        buf.push_null();
                        buf.push_null();
                    }
                }
            }
            buf.end_row();
        }
        self.store
            .copy_direct("stage.financial_metrics_perc_batch", &copy_column_refs, buf)
            .await?;

        let set_clauses: Vec<String> = batch_columns
            .iter()
            .map(|col| format!("{col}_bound = b.{col}_bound, {col}_perc = b.{col}_perc"))
            .collect();
        self.store
            .execute(&format!(
                "UPDATE clean.financial_metrics_perc p
                 SET {}
                 FROM stage.financial_metrics_perc_batch b
                 WHERE p.symbol = b.symbol
                   AND p.date = b.date
                   AND p.fiscal_year = b.fiscal_year
                   AND p.period = b.period
                   AND p.reported_currency IS NOT DISTINCT FROM b.reported_currency",
                set_clauses.join(",\n                     ")
            ))
            .await?;
        self.store
            .execute("DROP TABLE IF EXISTS stage.financial_metrics_perc_batch")
            .await?;
        Ok(())
    }

    /// Rebuild the whole percentile table from the current ratio table.
    pub async fn run_percentile_calculation(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 12 - PercentileCalculator");

        self.store.ensure_schemas().await?;
        self.store
            .recreate("clean.financial_metrics_perc", &Self::create_table_sql())
            .await?;
        self.seed_base_rows().await?;

        let columns = metric_columns();
        tracing::info!("Processing {} metric columns", columns.len());

        for (batch_num, batch) in columns.chunks(MERGE_BATCH).enumerate() {
            tracing::info!(
                "Bucketizing metric batch {}/{}: {:?}",
                batch_num + 1,
                columns.len().div_ceil(MERGE_BATCH),
                batch
            );
            let mut per_metric = Vec::with_capacity(batch.len());
            for column in batch {
                per_metric.push(self.bucketize_column(column).await?);
            }
            self.merge_batch(batch, per_metric).await?;
        }

        self.store
            .execute(
                "ALTER TABLE clean.financial_metrics_perc
                 ADD CONSTRAINT financial_metrics_perc_pk
                 PRIMARY KEY (symbol, date, fiscal_year, period, reported_currency)",
            )
            .await?;

        let total = self.store.count("clean.financial_metrics_perc").await?;
        tracing::info!("Percentile calculation completed. Total rows: {total}");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 1000 values 1..=1000: the canonical population where the quantiles
    /// are easy to read off.
    fn population() -> Vec<f64> {
        (1..=1000).map(|i| i as f64).collect()
    }

    #[test]
    fn nearest_rank_thresholds_on_the_canonical_population() {
        let thresholds = quantile_thresholds(&population()).unwrap();
        assert_eq!(thresholds[0], 10.0); // 1%
        assert_eq!(thresholds[1], 100.0); // 10%
        assert_eq!(thresholds[5], 500.0); // 50%
        assert_eq!(thresholds[10], 990.0); // 99%
    }

    #[test]
    fn bucket_assignment_and_bounds() {
        let thresholds = quantile_thresholds(&population()).unwrap();

        let (bucket, bound) = bucket_for(5.0, &thresholds);
        assert_eq!(bucket, 1);
        assert_eq!(bound, "<1% (-∞ – 10.00)");

        // A boundary value goes to the higher bucket: [10, 100).
        let (bucket, bound) = bucket_for(10.0, &thresholds);
        assert_eq!(bucket, 10);
        assert_eq!(bound, "10% (10.00 – 100.00)");

        let (bucket, bound) = bucket_for(991.0, &thresholds);
        assert_eq!(bucket, 100);
        assert_eq!(bound, ">99% (990.00 – +∞)");
    }

    #[test]
    fn buckets_are_monotone_in_the_value() {
        let thresholds = quantile_thresholds(&population()).unwrap();
        let mut previous = i32::MIN;
        for value in population() {
            let (bucket, _) = bucket_for(value, &thresholds);
            assert!(bucket >= previous, "bucket dropped at value {value}");
            previous = bucket;
        }
    }

    #[test]
    fn every_value_lands_in_exactly_one_bucket() {
        let values = population();
        let thresholds = quantile_thresholds(&values).unwrap();
        let mut counts: HashMap<i32, usize> = HashMap::new();
        for value in &values {
            let (bucket, _) = bucket_for(*value, &thresholds);
            *counts.entry(bucket).or_insert(0) += 1;
        }
        let covered: usize = counts.values().sum();
        assert_eq!(covered, values.len());
        for bucket in counts.keys() {
            assert!(BUCKET_LABELS.contains(bucket));
        }
    }

    #[test]
    fn boundaries_are_stable_for_a_fixed_population() {
        let a = quantile_thresholds(&population()).unwrap();
        let mut shuffled = population();
        shuffled.reverse();
        let b = quantile_thresholds(&shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn tiny_populations_are_skipped() {
        assert!(quantile_thresholds(&[]).is_none());
        assert!(quantile_thresholds(&[1.0]).is_none());
        assert!(quantile_thresholds(&[1.0, 2.0]).is_some());
    }
}
