use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A work item for the batch retry driver: a ticker plus the trading
/// currency recorded for it, when known.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolCurrency {
    pub symbol: String,
    pub currency: Option<String>,
}

impl SymbolCurrency {
    pub fn new(symbol: impl Into<String>, currency: Option<String>) -> Self {
        Self {
            symbol: symbol.into(),
            currency,
        }
    }
}

/// One entry of the provider's symbol catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSymbolRow {
    pub symbol: String,
    pub company_name: Option<String>,
    pub trading_currency: Option<String>,
    pub reporting_currency: Option<String>,
}

/// Full company profile as persisted in `raw.stock_info`.
#[derive(Debug, Clone, Default)]
pub struct StockInfoRow {
    pub symbol: String,
    pub price: Option<f64>,
    pub beta: Option<f64>,
    pub vol_avg: Option<f64>,
    pub mkt_cap: Option<f64>,
    pub last_div: Option<f64>,
    pub range: Option<String>,
    pub changes: Option<f64>,
    pub company_name: Option<String>,
    pub currency: Option<String>,
    pub cik: Option<String>,
    pub isin: Option<String>,
    pub cusip: Option<String>,
    pub exchange: Option<String>,
    pub exchange_short_name: Option<String>,
    pub industry: Option<String>,
    pub website: Option<String>,
    pub description: Option<String>,
    pub ceo: Option<String>,
    pub sector: Option<String>,
    pub country: Option<String>,
    pub full_time_employees: Option<i64>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    pub dcf_diff: Option<f64>,
    pub dcf: Option<f64>,
    pub image: Option<String>,
    pub ipo_date: Option<NaiveDate>,
    pub default_image: Option<bool>,
    pub is_etf: Option<bool>,
    pub is_actively_trading: Option<bool>,
    pub is_adr: Option<bool>,
    pub is_fund: Option<bool>,
}

/// A raw forex quote: 1 unit of the left currency of `forex_pair` equals
/// `price` units of the right currency.
#[derive(Debug, Clone, PartialEq)]
pub struct ForexQuote {
    pub date: NaiveDate,
    pub forex_pair: String,
    pub price: f64,
}

/// A row of the gap-filled forex matrix (`clean.historical_forex_full`).
#[derive(Debug, Clone, PartialEq)]
pub struct ForexFullRow {
    pub date: NaiveDate,
    pub forex_pair: String,
    pub ccy_left: String,
    pub ccy_right: String,
    pub price: f64,
}

/// A daily price/volume observation with its quarter tags.
#[derive(Debug, Clone)]
pub struct PriceVolumeRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub currency: Option<String>,
    pub close: f64,
    pub volume: f64,
    pub year: i32,
    pub quarter: String,
    pub last_quarter_date: bool,
}

/// A market capitalization observation in the trading currency.
#[derive(Debug, Clone)]
pub struct MarketCapRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub currency: Option<String>,
    pub market_cap: f64,
    pub year: i32,
    pub quarter: String,
    pub last_quarter_date: bool,
}

/// One quarterly ratio record. `values` is aligned index-for-index with
/// [`crate::metrics::METRIC_COLUMNS`].
#[derive(Debug, Clone)]
pub struct RatioRow {
    pub symbol: String,
    pub date: NaiveDate,
    pub fiscal_year: String,
    pub period: String,
    pub reported_currency: Option<String>,
    pub values: Vec<Option<f64>>,
}

/// A benchmark (index or ETF) price point.
#[derive(Debug, Clone)]
pub struct BenchmarkRow {
    pub symbol: String,
    pub name: Option<String>,
    pub kind: Option<String>,
    pub currency: Option<String>,
    pub date: NaiveDate,
    pub close: Option<f64>,
}

/// Calendar quarter of a month, 1..=4.
pub fn quarter_of_month(month: u32) -> u32 {
    ((month - 1) / 3) + 1
}

/// `"Q1"`..`"Q4"` label used across the store.
pub fn quarter_label(quarter: u32) -> String {
    format!("Q{quarter}")
}

/// The quarter following (year, quarter); Q4 wraps into the next year's Q1.
pub fn next_quarter(year: i32, quarter: u32) -> (i32, u32) {
    if quarter == 4 {
        (year + 1, 1)
    } else {
        (year, quarter + 1)
    }
}

/// Tag a symbol's price history with (year, quarter, last_quarter_date).
///
/// `last_quarter_date` is set on the latest date of a (year, quarter) bucket,
/// where only dates falling in the quarter's final month are candidates, and
/// never on the quarter containing `today`.
pub fn tag_quarters(dates: &[NaiveDate], today: NaiveDate) -> Vec<(i32, String, bool)> {
    use std::collections::HashMap;

    let mut max_by_quarter: HashMap<(i32, u32), NaiveDate> = HashMap::new();
    for d in dates {
        if d.month() % 3 == 0 {
            let key = (d.year(), quarter_of_month(d.month()));
            max_by_quarter
                .entry(key)
                .and_modify(|m| {
                    if d > m {
                        *m = *d;
                    }
                })
                .or_insert(*d);
        }
    }

    let current = (today.year(), quarter_of_month(today.month()));
    dates
        .iter()
        .map(|d| {
            let key = (d.year(), quarter_of_month(d.month()));
            let is_last = key != current && max_by_quarter.get(&key) == Some(d);
            (d.year(), quarter_label(key.1), is_last)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn quarter_of_month_boundaries() {
        assert_eq!(quarter_of_month(1), 1);
        assert_eq!(quarter_of_month(3), 1);
        assert_eq!(quarter_of_month(4), 2);
        assert_eq!(quarter_of_month(12), 4);
    }

    #[test]
    fn next_quarter_wraps_year_at_q4() {
        assert_eq!(next_quarter(2020, 4), (2021, 1));
        assert_eq!(next_quarter(2020, 1), (2020, 2));
        assert_eq!(next_quarter(2020, 3), (2020, 4));
    }

    #[test]
    fn tag_quarters_marks_final_month_max_only() {
        let dates = vec![
            d(2020, 10, 5),
            d(2020, 11, 30),
            d(2020, 12, 28),
            d(2020, 12, 31),
            d(2021, 1, 4),
        ];
        let tags = tag_quarters(&dates, d(2021, 2, 15));

        assert_eq!(tags[0], (2020, "Q4".to_string(), false));
        assert_eq!(tags[1], (2020, "Q4".to_string(), false));
        assert_eq!(tags[2], (2020, "Q4".to_string(), false));
        // 2020-12-31 is the max date within December, so it closes 2020-Q4.
        assert_eq!(tags[3], (2020, "Q4".to_string(), true));
        // 2021-Q1 is the current quarter and is never closed.
        assert_eq!(tags[4], (2021, "Q1".to_string(), false));
    }

    #[test]
    fn tag_quarters_skips_quarters_without_final_month_trades() {
        // Only January/February trades: the quarter has no December-style
        // final-month candidate, so nothing is flagged.
        let dates = vec![d(2020, 1, 10), d(2020, 2, 20)];
        let tags = tag_quarters(&dates, d(2021, 6, 1));
        assert!(tags.iter().all(|(_, _, last)| !last));
    }
}
