//! Query-serving index catalog. Each index is created `CONCURRENTLY` in its
//! own autocommit statement; a failure is logged and the rest proceed.

use crate::PgStore;
use market_core::EtlResult;

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_stock_info_country",
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS idx_stock_info_country \
         ON raw.stock_info (country)",
    ),
    (
        "idx_fmp_symbol_year_quarter",
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS idx_fmp_symbol_year_quarter \
         ON clean.financial_metrics_perc (symbol, fiscal_year, period)",
    ),
    (
        "idx_hpv_symbol_year_quarter",
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS idx_hpv_symbol_year_quarter \
         ON raw.historical_price_volume (symbol, year, quarter)",
    ),
    (
        "idx_hpv_volume_eur",
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS idx_hpv_volume_eur \
         ON raw.historical_price_volume (volume_eur)",
    ),
    (
        "idx_hmc_lqd_symbol_year_quarter",
        "CREATE INDEX CONCURRENTLY IF NOT EXISTS idx_hmc_lqd_symbol_year_quarter \
         ON raw.historical_market_cap (symbol, year, quarter) \
         WHERE last_quarter_date = TRUE",
    ),
];

pub struct IndexManager<'a> {
    store: &'a PgStore,
}

impl<'a> IndexManager<'a> {
    pub fn new(store: &'a PgStore) -> Self {
        Self { store }
    }

    pub async fn create_all(&self) -> EtlResult<()> {
        tracing::info!("Starting index creation process...");
        for (name, sql) in INDEXES {
            tracing::info!("Creating index: {name}");
            match self.store.execute(sql).await {
                Ok(_) => tracing::info!("Successfully created index: {name}"),
                Err(e) => {
                    // Auxiliary indexes never abort the run.
                    tracing::error!("Error creating index {name}: {e}");
                }
            }
        }
        tracing::info!("Index creation process completed");
        Ok(())
    }
}
