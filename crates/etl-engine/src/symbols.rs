//! Stock symbol catalog refresh (`raw.stock_symbols`).

use fmp_client::FmpClient;
use market_core::{EtlError, EtlResult};
use pg_store::PgStore;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.stock_symbols (
        symbol VARCHAR(100) PRIMARY KEY,
        company_name VARCHAR(255),
        trading_currency VARCHAR(10),
        reporting_currency VARCHAR(10),
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

pub struct SymbolsManager {
    store: PgStore,
    fmp: FmpClient,
}

impl SymbolsManager {
    pub fn new(store: PgStore, fmp: FmpClient) -> Self {
        Self { store, fmp }
    }

    async fn create_table(&self) -> EtlResult<()> {
        self.store.ensure_schemas().await?;
        self.store.execute(CREATE_TABLE).await?;
        let deleted = self.store.execute("DELETE FROM raw.stock_symbols").await?;
        if deleted > 0 {
            tracing::info!("Cleared {deleted} rows from raw.stock_symbols");
        }
        Ok(())
    }

    /// Fetch the full symbol catalog and reload the table, superseding the
    /// previous run's values.
    pub async fn save_stock_symbols(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 1 - SymbolsManager");
        self.create_table().await?;

        tracing::info!("Fetching stock symbols from provider...");
        let listings = self.fmp.get_stock_symbols().await?;
        if listings.is_empty() {
            tracing::warn!("No stock symbols received from provider");
            return Ok(false);
        }

        let mut stored = 0usize;
        for listing in &listings {
            let Some(symbol) = listing.symbol.as_deref().filter(|s| !s.is_empty()) else {
                continue;
            };
            sqlx::query(
                "INSERT INTO raw.stock_symbols \
                     (symbol, company_name, trading_currency, reporting_currency) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (symbol) DO UPDATE \
                 SET company_name = EXCLUDED.company_name, \
                     trading_currency = EXCLUDED.trading_currency, \
                     reporting_currency = EXCLUDED.reporting_currency",
            )
            .bind(symbol)
            .bind(listing.company_name.as_deref())
            .bind(listing.trading_currency.as_deref())
            .bind(listing.reporting_currency.as_deref())
            .execute(self.store.pool())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
            stored += 1;
        }

        tracing::info!("Successfully stored {stored} stock symbols");
        Ok(true)
    }
}
