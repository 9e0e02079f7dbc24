//! Ingestion engine: the batch retry driver and every loader that moves
//! provider data into the store, plus FX normalization, percentile
//! bucketing and the ETL summary.

pub mod benchmarks;
pub mod driver;
pub mod forex;
pub mod market_cap;
pub mod percentiles;
pub mod price_volume;
pub mod ratios;
pub mod stock_info;
pub mod summary;
pub mod symbols;
