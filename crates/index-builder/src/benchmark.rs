//! Benchmark analytics: series normalization (the benchmark flavour of the
//! index rebase) and the stricter benchmark risk/return gates.

use crate::builder::{downside_deviation, round4};
use crate::types::{BenchmarkPoint, BenchmarkRiskReturn, Currency, IndexPoint};
use chrono::{Duration as ChronoDuration, NaiveDate};
use market_core::{EtlError, EtlResult};
use pg_store::PgStore;
use sqlx::Row;
use std::collections::HashMap;

const TRADING_DAYS: usize = 250;
/// Minimum span between the first and last observation, in calendar days.
const MIN_SPAN_DAYS: i64 = 5 * 365;
/// A series with a hole longer than this is considered broken.
const MAX_GAP_DAYS: i64 = 30;
/// The last observation must be at most this old.
const MAX_STALENESS_DAYS: i64 = 30;

/// Rebase a benchmark close series onto `start_amount` over the caller's
/// window, preserving day-over-day ratios.
pub fn normalize_benchmark_series(
    points: &[(NaiveDate, f64)],
    start_amount: f64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Vec<IndexPoint> {
    let mut clipped: Vec<&(NaiveDate, f64)> = points
        .iter()
        .filter(|(d, _)| {
            start_date.map_or(true, |s| *d >= s) && end_date.map_or(true, |e| *d <= e)
        })
        .collect();
    clipped.sort_by_key(|(d, _)| *d);

    if clipped.is_empty() {
        return Vec::new();
    }

    let mut series = Vec::with_capacity(clipped.len());
    let mut value = start_amount;
    series.push(IndexPoint {
        date: clipped[0].0,
        index_value: value,
    });
    for window in clipped.windows(2) {
        let ratio = if window[0].1 != 0.0 {
            window[1].1 / window[0].1
        } else {
            1.0
        };
        value *= ratio;
        series.push(IndexPoint {
            date: window[1].0,
            index_value: value,
        });
    }
    series
}

fn leg_values(points: &[&BenchmarkPoint], currency: Currency) -> Vec<Option<f64>> {
    points
        .iter()
        .map(|p| match currency {
            Currency::Eur => p.close_eur,
            Currency::Usd => p.close_usd,
        })
        .collect()
}

/// Risk/return over both currency legs with the benchmark-grade gates: a
/// broken, short, stale or jumpy series degrades to the zero descriptor
/// rather than a misleading number.
pub fn calculate_benchmark_risk_return(
    points: &[BenchmarkPoint],
    today: NaiveDate,
) -> BenchmarkRiskReturn {
    if points.is_empty() {
        return BenchmarkRiskReturn::zero();
    }

    // Newest first.
    let mut sorted: Vec<&BenchmarkPoint> = points.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));

    for window in sorted.windows(2) {
        if window[0].date - window[1].date > ChronoDuration::days(MAX_GAP_DAYS) {
            return BenchmarkRiskReturn::zero();
        }
    }

    let first_date = sorted[sorted.len() - 1].date;
    let last_date = sorted[0].date;
    if (last_date - first_date).num_days() < MIN_SPAN_DAYS {
        return BenchmarkRiskReturn::zero();
    }
    if (today - last_date).num_days() > MAX_STALENESS_DAYS {
        return BenchmarkRiskReturn::zero();
    }

    let mut result = BenchmarkRiskReturn::zero();
    for currency in [Currency::Eur, Currency::Usd] {
        let values = leg_values(&sorted, currency);

        // A day-over-day ratio of 10x either way marks a bad splice.
        for window in values.windows(2) {
            if let (Some(newer), Some(older)) = (window[0], window[1]) {
                if older != 0.0 {
                    let ratio = newer / older;
                    if !(0.1..10.0).contains(&ratio.abs()) {
                        return BenchmarkRiskReturn::zero();
                    }
                }
            }
        }

        let mut returns = Vec::new();
        for i in 0..values.len() {
            if i + TRADING_DAYS >= values.len() {
                break;
            }
            let (Some(t0), Some(t250)) = (values[i], values[i + TRADING_DAYS]) else {
                continue;
            };
            if t0 >= 0.0 && t250 > 0.0 {
                let ret = t0 / t250 - 1.0;
                if ret.abs() < 1000.0 {
                    returns.push(ret);
                }
            }
        }

        let avg_return = if returns.is_empty() {
            0.0
        } else {
            returns.iter().sum::<f64>() / returns.len() as f64
        };
        let risk = downside_deviation(&returns);

        match currency {
            Currency::Eur => {
                result.return_eur = round4(avg_return);
                result.risk_eur = round4(risk);
            }
            Currency::Usd => {
                result.return_usd = round4(avg_return);
                result.risk_usd = round4(risk);
            }
        }
        result.data_points = returns.len();
    }
    result
}

/// Converted close series for one benchmark symbol, oldest first.
pub async fn fetch_benchmark_points(
    store: &PgStore,
    symbol: &str,
) -> EtlResult<Vec<BenchmarkPoint>> {
    let rows = sqlx::query(
        "SELECT date, close_eur::float8 AS close_eur, close_usd::float8 AS close_usd
         FROM raw.benchmarks
         WHERE symbol = $1
         ORDER BY date",
    )
    .bind(symbol)
    .fetch_all(store.pool())
    .await
    .map_err(|e| EtlError::Database(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|row| BenchmarkPoint {
            date: row.get("date"),
            close_eur: row.get("close_eur"),
            close_usd: row.get("close_usd"),
        })
        .collect())
}

/// Normalized series per requested benchmark symbol, in one currency.
pub async fn benchmark_historical_data(
    store: &PgStore,
    symbols: &[String],
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    start_amount: f64,
    currency: Currency,
) -> EtlResult<HashMap<String, Vec<IndexPoint>>> {
    let column = match currency {
        Currency::Usd => "close_usd",
        Currency::Eur => "close_eur",
    };
    let rows = sqlx::query(&format!(
        "SELECT symbol, date, {column}::float8 AS value
         FROM raw.benchmarks
         WHERE symbol = ANY($1) AND {column} IS NOT NULL
         ORDER BY symbol, date"
    ))
    .bind(symbols)
    .fetch_all(store.pool())
    .await
    .map_err(|e| EtlError::Database(e.to_string()))?;

    let mut by_symbol: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();
    for row in rows {
        let symbol: String = row.get("symbol");
        by_symbol
            .entry(symbol)
            .or_default()
            .push((row.get("date"), row.get("value")));
    }

    Ok(symbols
        .iter()
        .map(|symbol| {
            let series = by_symbol
                .get(symbol)
                .map(|points| {
                    normalize_benchmark_series(points, start_amount, start_date, end_date)
                })
                .unwrap_or_default();
            (symbol.clone(), series)
        })
        .collect())
}
