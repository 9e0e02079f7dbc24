//! The filter → rank → weight → rebalance → reprice pipeline, operating on
//! the constituent panel the query module loads.

use crate::types::{
    ConstituentRow, ConstituentWeight, Currency, IndexPoint, RiskReturn, WeightScheme,
};
use chrono::{Datelike, NaiveDate};
use market_core::quarter_of_month;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Index level at the first rebalance date.
const BASE_INDEX_VALUE: f64 = 1000.0;
/// Trading days per year used by the rolling-return window.
const TRADING_DAYS: usize = 250;
/// Minimum series length (rows) for a non-degenerate risk/return.
const MIN_RISK_RETURN_ROWS: usize = 5 * TRADING_DAYS;

pub struct CompanyInfo {
    pub company_name: Option<String>,
    pub country: Option<String>,
}

/// Observed closes per symbol, for forward-fill lookups.
struct PriceMatrix {
    observed: HashMap<String, BTreeMap<NaiveDate, f64>>,
}

impl PriceMatrix {
    fn build(rows: &[ConstituentRow], currency: Currency) -> Self {
        let mut observed: HashMap<String, BTreeMap<NaiveDate, f64>> = HashMap::new();
        for row in rows {
            if let Some(close) = row.close(currency) {
                observed
                    .entry(row.symbol.clone())
                    .or_default()
                    .insert(row.date, close);
            }
        }
        Self { observed }
    }

    /// Price at `date`, forward-filled within (symbol, year, quarter).
    /// A stale price never crosses a rebalance boundary: membership may
    /// change between quarters and a carried-over price would leak a
    /// symbol that already left the basket.
    fn price_at(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        let series = self.observed.get(symbol)?;
        let (obs_date, price) = series.range(..=date).next_back()?;
        let same_quarter = obs_date.year() == date.year()
            && quarter_of_month(obs_date.month()) == quarter_of_month(date.month());
        same_quarter.then_some(*price)
    }
}

/// Per-day constituent weights.
fn daily_weights(
    rows: &[ConstituentRow],
    currency: Currency,
    scheme: WeightScheme,
) -> HashMap<NaiveDate, HashMap<String, f64>> {
    let mut weights: HashMap<NaiveDate, HashMap<String, f64>> = HashMap::new();

    match scheme {
        WeightScheme::Cap => {
            let mut mcaps: HashMap<NaiveDate, HashMap<String, f64>> = HashMap::new();
            for row in rows {
                if let Some(mcap) = row.market_cap(currency) {
                    mcaps
                        .entry(row.date)
                        .or_default()
                        .entry(row.symbol.clone())
                        .or_insert(mcap);
                }
            }
            for (date, by_symbol) in mcaps {
                let total: f64 = by_symbol.values().sum();
                if total == 0.0 {
                    continue;
                }
                let entry = weights.entry(date).or_default();
                for (symbol, mcap) in by_symbol {
                    entry.insert(symbol, mcap / total);
                }
            }
        }
        WeightScheme::Equal => {
            let mut universe: HashMap<NaiveDate, BTreeSet<String>> = HashMap::new();
            for row in rows {
                universe.entry(row.date).or_default().insert(row.symbol.clone());
            }
            for (date, symbols) in universe {
                let weight = 1.0 / symbols.len() as f64;
                let entry = weights.entry(date).or_default();
                for symbol in symbols {
                    entry.insert(symbol, weight);
                }
            }
        }
    }
    weights
}

/// First panel date plus every quarter-closing date.
fn rebalance_dates(rows: &[ConstituentRow]) -> Vec<NaiveDate> {
    let mut dates: BTreeSet<NaiveDate> = rows
        .iter()
        .filter(|r| r.last_quarter_date)
        .map(|r| r.date)
        .collect();
    if let Some(first) = rows.iter().map(|r| r.date).min() {
        dates.insert(first);
    }
    dates.into_iter().collect()
}

/// Reprice the panel into a daily index series starting at 1000.
///
/// Shares are pinned at each rebalance date from that day's weights and
/// the running index value, held constant through the period, and the
/// period's closing value seeds the next rebalance.
pub fn make_index(
    rows: &[ConstituentRow],
    currency: Currency,
    scheme: WeightScheme,
) -> Vec<IndexPoint> {
    if rows.is_empty() {
        return Vec::new();
    }

    let all_dates: Vec<NaiveDate> = rows
        .iter()
        .map(|r| r.date)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let symbols: Vec<String> = rows
        .iter()
        .map(|r| r.symbol.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let prices = PriceMatrix::build(rows, currency);
    let weights = daily_weights(rows, currency, scheme);
    let rebalances = rebalance_dates(rows);

    let mut series = Vec::with_capacity(all_dates.len());
    let mut current_value = BASE_INDEX_VALUE;

    for (i, &start) in rebalances.iter().enumerate() {
        let end = rebalances.get(i + 1).copied();
        let period_dates: Vec<NaiveDate> = all_dates
            .iter()
            .copied()
            .filter(|d| *d >= start && end.map_or(true, |e| *d < e))
            .collect();
        if period_dates.is_empty() {
            continue;
        }

        let day_weights = weights.get(&start);
        let shares: Vec<(String, f64)> = symbols
            .iter()
            .map(|symbol| {
                let weight = day_weights
                    .and_then(|w| w.get(symbol))
                    .copied()
                    .unwrap_or(0.0);
                let share = match prices.price_at(symbol, start) {
                    Some(price) if price != 0.0 => weight * current_value / price,
                    _ => 0.0,
                };
                (symbol.clone(), share)
            })
            .collect();

        for &date in &period_dates {
            let value: f64 = shares
                .iter()
                .map(|(symbol, share)| {
                    share * prices.price_at(symbol, date).unwrap_or(0.0)
                })
                .sum();
            series.push(IndexPoint {
                date,
                index_value: value,
            });
        }

        // The period's last valuation carries into the next rebalance.
        current_value = series.last().map(|p| p.index_value).unwrap_or(current_value);
    }

    series
}

/// Clip the series to `[start_date, end_date]` and rebuild it from
/// `start_amount` via the day-over-day return chain, preserving every
/// ratio between in-window dates.
pub fn trim_index(
    series: &[IndexPoint],
    start_amount: f64,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> Vec<IndexPoint> {
    let mut clipped: Vec<&IndexPoint> = series
        .iter()
        .filter(|p| {
            start_date.map_or(true, |s| p.date >= s) && end_date.map_or(true, |e| p.date <= e)
        })
        .collect();
    clipped.sort_by_key(|p| p.date);

    if clipped.is_empty() {
        return Vec::new();
    }

    let mut rebased = Vec::with_capacity(clipped.len());
    let mut value = start_amount;
    rebased.push(IndexPoint {
        date: clipped[0].date,
        index_value: value,
    });
    for window in clipped.windows(2) {
        let ratio = if window[0].index_value != 0.0 {
            window[1].index_value / window[0].index_value
        } else {
            1.0
        };
        value *= ratio;
        rebased.push(IndexPoint {
            date: window[1].date,
            index_value: value,
        });
    }
    rebased
}

/// Per-quarter constituent weights: each symbol's max market cap within
/// the quarter over the quarter total (or equal weights), with company
/// name and country attached.
pub fn make_constituent_weights(
    rows: &[ConstituentRow],
    currency: Currency,
    scheme: WeightScheme,
    companies: &HashMap<String, CompanyInfo>,
) -> Vec<ConstituentWeight> {
    let mut weighted: Vec<ConstituentWeight> = Vec::new();

    match scheme {
        WeightScheme::Cap => {
            let mut max_mcap: BTreeMap<(i32, String), BTreeMap<String, f64>> = BTreeMap::new();
            for row in rows {
                let Some(mcap) = row.market_cap(currency) else { continue };
                let quarter = max_mcap
                    .entry((row.year, row.quarter.clone()))
                    .or_default();
                let entry = quarter.entry(row.symbol.clone()).or_insert(mcap);
                if mcap > *entry {
                    *entry = mcap;
                }
            }
            for ((year, quarter), by_symbol) in max_mcap {
                let total: f64 = by_symbol.values().sum();
                if total == 0.0 {
                    continue;
                }
                for (symbol, mcap) in by_symbol {
                    let weight = mcap / total;
                    if weight > 0.0 {
                        weighted.push(build_weight(year, &quarter, &symbol, weight, companies));
                    }
                }
            }
        }
        WeightScheme::Equal => {
            let mut members: BTreeMap<(i32, String), BTreeSet<String>> = BTreeMap::new();
            for row in rows {
                members
                    .entry((row.year, row.quarter.clone()))
                    .or_default()
                    .insert(row.symbol.clone());
            }
            for ((year, quarter), symbols) in members {
                let weight = 1.0 / symbols.len() as f64;
                for symbol in symbols {
                    weighted.push(build_weight(year, &quarter, &symbol, weight, companies));
                }
            }
        }
    }

    weighted.sort_by(|a, b| {
        b.year
            .cmp(&a.year)
            .then(b.quarter.cmp(&a.quarter))
            .then(b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal))
    });
    weighted
}

fn build_weight(
    year: i32,
    quarter: &str,
    symbol: &str,
    weight: f64,
    companies: &HashMap<String, CompanyInfo>,
) -> ConstituentWeight {
    let info = companies.get(symbol);
    ConstituentWeight {
        year,
        quarter: quarter.to_string(),
        symbol: symbol.to_string(),
        company_name: info
            .and_then(|i| i.company_name.clone())
            .unwrap_or_else(|| symbol.to_string()),
        country: info.and_then(|i| i.country.clone()),
        weight,
    }
}

/// Annual-window risk/return on the unrebased series: for every row whose
/// 250-rows-later sibling exists, the rolling return `v_i / v_{i+250} − 1`
/// (series sorted newest first); `return` is their mean and `risk` the
/// population stddev of the negative subset.
pub fn calculate_risk_return(series: &[IndexPoint]) -> RiskReturn {
    if series.is_empty() {
        return RiskReturn::zero();
    }

    let mut sorted: Vec<&IndexPoint> = series.iter().collect();
    sorted.sort_by(|a, b| b.date.cmp(&a.date));
    let values: Vec<f64> = sorted.iter().map(|p| p.index_value).collect();

    if values.len() < MIN_RISK_RETURN_ROWS {
        return RiskReturn::zero();
    }

    let mut returns = Vec::new();
    for i in 0..values.len() {
        if i + TRADING_DAYS >= values.len() {
            break;
        }
        let t250 = values[i + TRADING_DAYS];
        if t250 > 0.0 {
            returns.push(values[i] / t250 - 1.0);
        }
    }
    if returns.is_empty() {
        return RiskReturn::zero();
    }

    let avg_return = returns.iter().sum::<f64>() / returns.len() as f64;
    let risk = downside_deviation(&returns);

    RiskReturn {
        ret: round4(avg_return),
        risk: round4(risk),
    }
}

/// Population standard deviation of the negative returns.
pub fn downside_deviation(returns: &[f64]) -> f64 {
    let negatives: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if negatives.is_empty() {
        return 0.0;
    }
    let mean = negatives.iter().sum::<f64>() / negatives.len() as f64;
    let variance =
        negatives.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / negatives.len() as f64;
    variance.sqrt()
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
