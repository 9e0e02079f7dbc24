//! Thin async client for the market data provider.
//!
//! Responses are treated as untrusted: field names differ between endpoints
//! (`historical` wrapper vs bare list, `adjClose` vs `close`), so the structs
//! here are permissive and normalization is left to the validators.

use market_core::EtlError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const BASE_URL: &str = "https://financialmodelingprep.com";

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests,
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            let oldest = *ts.front().expect("non-empty when at capacity");
            let wait = self.window.saturating_sub(now.duration_since(oldest))
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for provider slot", wait.as_secs_f64());
            tokio::time::sleep(wait).await;
        }
    }
}

#[derive(Clone)]
pub struct FmpClient {
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl FmpClient {
    /// Build a client from `FMP_API_KEY`. The request budget defaults to
    /// 750/min and can be tuned down with `FMP_RATE_LIMIT` for free keys.
    pub fn from_env() -> Result<Self, EtlError> {
        let api_key = std::env::var("FMP_API_KEY")
            .map_err(|_| EtlError::Config("FMP_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn new(api_key: String) -> Self {
        let rate_limit: usize = std::env::var("FMP_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(750);

        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit, Duration::from_secs(60)),
        }
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, EtlError> {
        let request = builder
            .build()
            .map_err(|e| EtlError::Api(e.to_string()))?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| EtlError::Api("Cannot clone request".to_string()))?;
            let response = self
                .client
                .execute(req_clone)
                .await
                .map_err(|e| EtlError::Api(e.to_string()))?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(
                "Provider 429 rate limited, waiting {}s before retry {}/3",
                wait_secs,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(EtlError::Api("Rate limited by provider after 3 retries".to_string()))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, EtlError> {
        let url = format!("{BASE_URL}/{path}");
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let response = self.send_request(self.client.get(&url).query(&query)).await?;

        if !response.status().is_success() {
            return Err(EtlError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| EtlError::Api(e.to_string()))
    }

    async fn get_text(&self, path: &str, params: &[(&str, &str)]) -> Result<String, EtlError> {
        let url = format!("{BASE_URL}/{path}");
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("apikey", self.api_key.as_str()));

        let response = self.send_request(self.client.get(&url).query(&query)).await?;

        if !response.status().is_success() {
            return Err(EtlError::Api(format!(
                "HTTP {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| EtlError::Api(e.to_string()))
    }

    /// Full catalog of symbols with financial statements.
    pub async fn get_stock_symbols(&self) -> Result<Vec<SymbolListing>, EtlError> {
        self.get_json("stable/financial-statement-symbol-list", &[]).await
    }

    /// Company profiles for up to 500 symbols in one call. A failed chunk
    /// yields an empty list so siblings keep going.
    pub async fn get_stock_info(&self, symbols: &[String]) -> Vec<serde_json::Value> {
        let joined = symbols.join(",");
        let path = format!("api/v3/profile/{joined}");
        match self.get_json::<Vec<serde_json::Value>>(&path, &[]).await {
            Ok(profiles) => profiles,
            Err(e) => {
                tracing::error!("Error fetching profile chunk: {e}");
                Vec::new()
            }
        }
    }

    /// Catalog of forex pairs.
    pub async fn get_forex_pairs(&self) -> Result<Vec<ForexPairListing>, EtlError> {
        self.get_json("stable/forex-list", &[]).await
    }

    /// History for one forex pair (light EOD endpoint).
    pub async fn get_historical_forex(
        &self,
        forex_pair: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<EodBar>, EtlError> {
        let response: HistoricalResponse = self
            .get_json(
                "stable/historical-price-eod/light",
                &[("symbol", forex_pair), ("from", from_date), ("to", to_date)],
            )
            .await?;
        Ok(response.into_bars())
    }

    /// Full price/volume history for one symbol.
    pub async fn get_historical_price(
        &self,
        symbol: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<EodBar>, EtlError> {
        let response: HistoricalResponse = self
            .get_json(
                "stable/historical-price-eod/full",
                &[("symbol", symbol), ("from", from_date), ("to", to_date)],
            )
            .await?;
        Ok(response.into_bars())
    }

    /// EOD bulk for one trading date; the body is CSV.
    pub async fn get_eod_bulk(&self, date: &str) -> Result<String, EtlError> {
        self.get_text("stable/eod-bulk", &[("date", date)]).await
    }

    /// Market cap history for one symbol.
    pub async fn get_historical_mcap(
        &self,
        symbol: &str,
        from_date: &str,
        to_date: &str,
    ) -> Result<Vec<McapPoint>, EtlError> {
        self.get_json(
            "stable/historical-market-capitalization",
            &[
                ("symbol", symbol),
                ("from", from_date),
                ("to", to_date),
                ("limit", "10000"),
            ],
        )
        .await
    }

    /// Current market cap for a batch of symbols.
    pub async fn get_market_cap_batch(
        &self,
        symbols: &[String],
    ) -> Result<Vec<McapPoint>, EtlError> {
        let joined = symbols.join(",");
        self.get_json("stable/market-capitalization-batch", &[("symbols", joined.as_str())])
            .await
    }

    /// Quarterly ratio history, `limit` periods deep. Field names vary per
    /// plan, so rows come back as raw JSON maps for the ingest-side mapping.
    pub async fn get_financial_ratios(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<serde_json::Value>, EtlError> {
        let limit = limit.to_string();
        self.get_json(
            "stable/ratios",
            &[("symbol", symbol), ("period", "quarter"), ("limit", limit.as_str())],
        )
        .await
    }

    /// Catalog of market indices for the benchmark loader.
    pub async fn get_index_list(&self) -> Result<Vec<IndexListing>, EtlError> {
        self.get_json("stable/index-list", &[]).await
    }
}

/// A symbol-catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolListing {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default, rename = "companyName")]
    pub company_name: Option<String>,
    #[serde(default, rename = "tradingCurrency")]
    pub trading_currency: Option<String>,
    #[serde(default, rename = "reportingCurrency")]
    pub reporting_currency: Option<String>,
}

/// A forex-catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ForexPairListing {
    #[serde(default)]
    pub symbol: Option<String>,
}

/// A market-index catalog entry.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexListing {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, rename = "priceCurrency")]
    pub price_currency: Option<String>,
}

/// One EOD observation. Dates may arrive under `date` or `formatted`;
/// closes under `close`, `adjClose` or `price` depending on the endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EodBar {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub formatted: Option<String>,
    #[serde(default)]
    pub close: Option<f64>,
    #[serde(default, rename = "adjClose")]
    pub adj_close: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
}

impl EodBar {
    pub fn date_str(&self) -> Option<&str> {
        self.date.as_deref().or(self.formatted.as_deref())
    }

    pub fn close_value(&self) -> Option<f64> {
        self.close.or(self.adj_close).or(self.price)
    }
}

/// History endpoints answer either `{"historical": [...]}` or a bare list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HistoricalResponse {
    Wrapped {
        #[serde(default)]
        historical: Vec<EodBar>,
    },
    Bare(Vec<EodBar>),
    // Empty objects and error payloads land here; treat unknown as empty.
    Other(serde_json::Value),
}

impl HistoricalResponse {
    fn into_bars(self) -> Vec<EodBar> {
        match self {
            HistoricalResponse::Wrapped { historical } => historical,
            HistoricalResponse::Bare(bars) => bars,
            HistoricalResponse::Other(_) => Vec::new(),
        }
    }
}

/// A market cap point; the batch endpoint and the history endpoint share it.
#[derive(Debug, Clone, Deserialize)]
pub struct McapPoint {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, rename = "marketCap")]
    pub market_cap: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn historical_response_accepts_both_shapes() {
        let wrapped: HistoricalResponse =
            serde_json::from_str(r#"{"historical": [{"date": "2024-01-02", "close": 10.0}]}"#)
                .unwrap();
        assert_eq!(wrapped.into_bars().len(), 1);

        let bare: HistoricalResponse =
            serde_json::from_str(r#"[{"date": "2024-01-02", "adjClose": 11.5}]"#).unwrap();
        let bars = bare.into_bars();
        assert_eq!(bars[0].close_value(), Some(11.5));

        let unknown: HistoricalResponse = serde_json::from_str(r#"{"error": "nope"}"#).unwrap();
        assert!(unknown.into_bars().is_empty());
    }

    #[test]
    fn eod_bar_field_fallbacks() {
        let bar = EodBar {
            date: None,
            formatted: Some("2024-05-10".to_string()),
            close: None,
            adj_close: None,
            price: Some(1.36),
            volume: None,
        };
        assert_eq!(bar.date_str(), Some("2024-05-10"));
        assert_eq!(bar.close_value(), Some(1.36));
    }
}
