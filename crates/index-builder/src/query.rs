//! The constituent panel query: profile filter → KPI filter → market-cap
//! snapshot with next-quarter attach → rank & cap → price join.
//!
//! Every caller-supplied list is bound as an array parameter; KPI column
//! names are validated against the metric catalog before they reach SQL.

use crate::builder::CompanyInfo;
use crate::types::{ConstituentRow, IndexRequest};
use market_core::metrics::metric_index;
use market_core::{EtlError, EtlResult};
use pg_store::PgStore;
use sqlx::{Postgres, QueryBuilder, Row};
use std::collections::HashMap;

/// All twelve bucket labels; the permissive default KPI filter.
const ALL_BUCKETS: [i32; 12] = [1, 10, 20, 30, 40, 50, 60, 70, 80, 90, 99, 100];

/// Resolve a caller KPI name (with or without the `_perc` suffix) to its
/// percentile column.
fn kpi_column(name: &str) -> EtlResult<String> {
    let base = name.strip_suffix("_perc").unwrap_or(name);
    if metric_index(base).is_none() {
        return Err(EtlError::Validation(format!("unknown KPI: {name}")));
    }
    Ok(format!("{base}_perc"))
}

/// Active KPI filters; when the caller provides none, fall back to a
/// filter that admits every bucket of one metric.
fn active_kpis(request: &IndexRequest) -> EtlResult<Vec<(String, Vec<i32>)>> {
    let mut active = Vec::new();
    for (name, buckets) in &request.kpis {
        if buckets.is_empty() {
            continue;
        }
        active.push((kpi_column(name)?, buckets.clone()));
    }
    if active.is_empty() {
        active.push(("asset_turnover_perc".to_string(), ALL_BUCKETS.to_vec()));
    }
    Ok(active)
}

pub async fn fetch_constituents(
    store: &PgStore,
    request: &IndexRequest,
) -> EtlResult<Vec<ConstituentRow>> {
    let kpis = active_kpis(request)?;

    let mut qb: QueryBuilder<Postgres> =
        QueryBuilder::new("WITH prep1 AS (SELECT symbol FROM raw.stock_info WHERE (1=1");
    if !request.countries.is_empty() {
        qb.push(" AND country = ANY(");
        qb.push_bind(request.countries.clone());
        qb.push(")");
    }
    if !request.sectors.is_empty() {
        qb.push(" AND sector = ANY(");
        qb.push_bind(request.sectors.clone());
        qb.push(")");
    }
    if !request.industries.is_empty() {
        qb.push(" AND industry = ANY(");
        qb.push_bind(request.industries.clone());
        qb.push(")");
    }
    qb.push(")");
    // Explicitly listed stocks bypass the profile filter.
    if !request.stocks.is_empty() {
        qb.push(" OR symbol = ANY(");
        qb.push_bind(request.stocks.clone());
        qb.push(")");
    }

    qb.push(
        "), prep2 AS (SELECT symbol, date, fiscal_year, period, reported_currency \
         FROM clean.financial_metrics_perc WHERE (1=1",
    );
    for (column, buckets) in &kpis {
        qb.push(format!(" AND {column} = ANY("));
        qb.push_bind(buckets.clone());
        qb.push(")");
    }
    qb.push(")");
    // ...and the KPI filter.
    if !request.stocks.is_empty() {
        qb.push(" OR symbol = ANY(");
        qb.push_bind(request.stocks.clone());
        qb.push(")");
    }

    qb.push(
        "), prep3 AS (
            SELECT p2.symbol, p2.date, p2.fiscal_year, p2.period, p2.reported_currency
            FROM prep2 p2
            INNER JOIN prep1 p1 ON p2.symbol = p1.symbol
        ), prep4 AS (
            SELECT
                hmc.*,
                'Q' || (
                    CASE
                        WHEN EXTRACT(QUARTER FROM hmc.date)::INT = 4 THEN 1
                        ELSE EXTRACT(QUARTER FROM hmc.date)::INT + 1
                    END
                ) AS next_quarter,
                CASE
                    WHEN EXTRACT(QUARTER FROM hmc.date)::INT = 4
                        THEN EXTRACT(YEAR FROM hmc.date)::INT + 1
                    ELSE EXTRACT(YEAR FROM hmc.date)::INT
                END AS next_year
            FROM raw.historical_market_cap hmc
            INNER JOIN prep3 p3
              ON hmc.symbol = p3.symbol
             AND hmc.year::varchar = p3.fiscal_year
             AND hmc.quarter = p3.period
            WHERE hmc.last_quarter_date = TRUE
        ), prep5 AS (
            SELECT
                p4.*,
                RANK() OVER (
                    PARTITION BY p4.year, p4.quarter
                    ORDER BY p4.market_cap_eur DESC
                ) AS mcap_rank
            FROM prep4 p4
        ), prep6 AS (
            SELECT * FROM prep5 WHERE mcap_rank <= ",
    );
    qb.push_bind(request.max_constituents);
    // Explicit stocks also bypass the rank cutoff.
    if !request.stocks.is_empty() {
        qb.push(" OR symbol = ANY(");
        qb.push_bind(request.stocks.clone());
        qb.push(")");
    }

    qb.push(
        ")
        SELECT
            p7.date,
            p7.symbol,
            p7.year,
            p7.quarter,
            p7.last_quarter_date,
            p7.close_eur::float8 AS close_eur,
            p7.close_usd::float8 AS close_usd,
            p6.market_cap_eur::float8 AS market_cap_eur,
            p6.market_cap_usd::float8 AS market_cap_usd
        FROM raw.historical_price_volume p7
        INNER JOIN prep6 p6
          ON p7.symbol = p6.symbol
         AND p7.year = p6.next_year
         AND p7.quarter = p6.next_quarter
        WHERE p7.volume_eur > 100000",
    );

    let rows = qb
        .build()
        .fetch_all(store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

    let mut constituents = Vec::with_capacity(rows.len());
    for row in rows {
        constituents.push(ConstituentRow {
            date: row.try_get("date").map_err(|e| EtlError::Database(e.to_string()))?,
            symbol: row
                .try_get("symbol")
                .map_err(|e| EtlError::Database(e.to_string()))?,
            year: row.try_get("year").map_err(|e| EtlError::Database(e.to_string()))?,
            quarter: row
                .try_get("quarter")
                .map_err(|e| EtlError::Database(e.to_string()))?,
            last_quarter_date: row
                .try_get::<Option<bool>, _>("last_quarter_date")
                .map_err(|e| EtlError::Database(e.to_string()))?
                .unwrap_or(false),
            close_eur: row
                .try_get("close_eur")
                .map_err(|e| EtlError::Database(e.to_string()))?,
            close_usd: row
                .try_get("close_usd")
                .map_err(|e| EtlError::Database(e.to_string()))?,
            market_cap_eur: row
                .try_get("market_cap_eur")
                .map_err(|e| EtlError::Database(e.to_string()))?,
            market_cap_usd: row
                .try_get("market_cap_usd")
                .map_err(|e| EtlError::Database(e.to_string()))?,
        });
    }
    Ok(constituents)
}

/// Company name and country per symbol, for the weights ledger.
pub async fn fetch_company_info(store: &PgStore) -> EtlResult<HashMap<String, CompanyInfo>> {
    let rows = sqlx::query("SELECT symbol, company_name, country FROM raw.stock_info")
        .fetch_all(store.pool())
        .await
        .map_err(|e| EtlError::Database(e.to_string()))?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let symbol: String = row.get("symbol");
            (
                symbol,
                CompanyInfo {
                    company_name: row.get("company_name"),
                    country: row.get("country"),
                },
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, WeightScheme};
    use std::collections::BTreeMap;

    fn request(kpis: BTreeMap<String, Vec<i32>>) -> IndexRequest {
        IndexRequest {
            max_constituents: 100,
            currency: Currency::Eur,
            start_amount: 1000.0,
            start_date: None,
            end_date: None,
            countries: vec![],
            sectors: vec![],
            industries: vec![],
            stocks: vec![],
            kpis,
            weight: WeightScheme::Cap,
        }
    }

    #[test]
    fn kpi_names_resolve_with_or_without_suffix() {
        assert_eq!(
            kpi_column("price_to_earnings_ratio").unwrap(),
            "price_to_earnings_ratio_perc"
        );
        assert_eq!(
            kpi_column("price_to_earnings_ratio_perc").unwrap(),
            "price_to_earnings_ratio_perc"
        );
        assert!(kpi_column("no_such_ratio").is_err());
        assert!(kpi_column("symbol; DROP TABLE raw.stock_info").is_err());
    }

    #[test]
    fn empty_kpi_map_falls_back_to_a_permissive_filter() {
        let active = active_kpis(&request(BTreeMap::new())).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "asset_turnover_perc");
        assert_eq!(active[0].1, ALL_BUCKETS.to_vec());
    }

    #[test]
    fn kpis_with_empty_bucket_lists_are_inactive() {
        let mut kpis = BTreeMap::new();
        kpis.insert("gross_profit_margin".to_string(), vec![]);
        kpis.insert("net_profit_margin".to_string(), vec![90, 99, 100]);

        let active = active_kpis(&request(kpis)).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "net_profit_margin_perc");
    }
}
