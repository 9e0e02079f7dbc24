use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Canonical currency leg of the index computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Eur,
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Eur => "EUR",
            Currency::Usd => "USD",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightScheme {
    Cap,
    Equal,
}

/// Caller parameters for one index construction.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexRequest {
    pub max_constituents: i64,
    pub currency: Currency,
    pub start_amount: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub countries: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub stocks: Vec<String>,
    /// ratio name (with or without the `_perc` suffix) → accepted bucket
    /// labels.
    #[serde(default)]
    pub kpis: BTreeMap<String, Vec<i32>>,
    pub weight: WeightScheme,
}

/// One row of the filtered constituent panel: a priced day of a symbol
/// whose composition quarter admitted it.
#[derive(Debug, Clone)]
pub struct ConstituentRow {
    pub date: NaiveDate,
    pub symbol: String,
    pub year: i32,
    pub quarter: String,
    pub last_quarter_date: bool,
    pub close_eur: Option<f64>,
    pub close_usd: Option<f64>,
    pub market_cap_eur: Option<f64>,
    pub market_cap_usd: Option<f64>,
}

impl ConstituentRow {
    pub fn close(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Eur => self.close_eur,
            Currency::Usd => self.close_usd,
        }
    }

    pub fn market_cap(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Eur => self.market_cap_eur,
            Currency::Usd => self.market_cap_usd,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexPoint {
    pub date: NaiveDate,
    pub index_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstituentWeight {
    pub year: i32,
    pub quarter: String,
    pub symbol: String,
    pub company_name: String,
    pub country: Option<String>,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskReturn {
    #[serde(rename = "return")]
    pub ret: f64,
    pub risk: f64,
}

impl RiskReturn {
    pub fn zero() -> Self {
        Self { ret: 0.0, risk: 0.0 }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexResponse {
    pub index_df: Vec<IndexPoint>,
    pub constituent_weights: Vec<ConstituentWeight>,
    pub risk_return: RiskReturn,
}

/// Risk/return shape for benchmarks: both legs plus the sample size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkRiskReturn {
    pub data_points: usize,
    pub return_eur: f64,
    pub return_usd: f64,
    pub risk_eur: f64,
    pub risk_usd: f64,
}

impl BenchmarkRiskReturn {
    pub fn zero() -> Self {
        Self {
            data_points: 0,
            return_eur: 0.0,
            return_usd: 0.0,
            risk_eur: 0.0,
            risk_usd: 0.0,
        }
    }
}

/// A benchmark's converted close series row.
#[derive(Debug, Clone)]
pub struct BenchmarkPoint {
    pub date: NaiveDate,
    pub close_eur: Option<f64>,
    pub close_usd: Option<f64>,
}
