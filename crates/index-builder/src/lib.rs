//! Custom index construction: cross-sectional constituent selection,
//! share-ledger repricing, rebasing, constituent weights and risk/return,
//! plus benchmark analytics and the reference field export.

pub mod benchmark;
pub mod builder;
pub mod fields;
pub mod query;
pub mod types;

pub use types::*;

use market_core::EtlResult;
use pg_store::PgStore;

/// Build a custom index end to end: query the filtered constituent panel,
/// reprice it, compute risk/return on the unrebased series, then rebase to
/// the caller's window and emit the weights ledger.
pub async fn create_custom_index(store: &PgStore, request: &IndexRequest) -> EtlResult<IndexResponse> {
    tracing::info!(
        "Starting index creation: max_constituents={}, currency={}, weight={:?}",
        request.max_constituents,
        request.currency.as_str(),
        request.weight
    );

    let rows = query::fetch_constituents(store, request).await?;
    tracing::info!("Index data loaded: {} constituent rows", rows.len());

    let index_series = builder::make_index(&rows, request.currency, request.weight);
    let risk_return = builder::calculate_risk_return(&index_series);

    let trimmed = builder::trim_index(
        &index_series,
        request.start_amount,
        request.start_date,
        request.end_date,
    );

    let companies = query::fetch_company_info(store).await?;
    let constituent_weights =
        builder::make_constituent_weights(&rows, request.currency, request.weight, &companies);

    tracing::info!(
        "Index creation completed: {} points, {} weight rows",
        trimmed.len(),
        constituent_weights.len()
    );

    Ok(IndexResponse {
        index_df: trimmed,
        constituent_weights,
        risk_return,
    })
}
