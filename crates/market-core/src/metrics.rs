//! The financial ratio catalog: provider field name → store column name.
//!
//! Every consumer (ratio ingestion, percentile bucketing, the index query's
//! KPI whitelist and the reference export) is driven off this single table,
//! so a new ratio only needs one entry here plus a column in the DDL.

/// (provider camelCase field, store column). Order defines the column order
/// of `raw.financial_metrics` and the `values` vector of `RatioRow`.
pub const RATIO_FIELD_MAP: &[(&str, &str)] = &[
    // Profitability
    ("grossProfitMargin", "gross_profit_margin"),
    ("ebitMargin", "ebit_margin"),
    ("ebitdaMargin", "ebitda_margin"),
    ("operatingProfitMargin", "operating_profit_margin"),
    ("pretaxProfitMargin", "pretax_profit_margin"),
    (
        "continuousOperationsProfitMargin",
        "continuous_operations_profit_margin",
    ),
    ("netProfitMargin", "net_profit_margin"),
    ("bottomLineProfitMargin", "bottom_line_profit_margin"),
    // Liquidity
    ("currentRatio", "current_ratio"),
    ("quickRatio", "quick_ratio"),
    ("solvencyRatio", "solvency_ratio"),
    ("cashRatio", "cash_ratio"),
    // Efficiency
    ("receivablesTurnover", "receivables_turnover"),
    ("payablesTurnover", "payables_turnover"),
    ("inventoryTurnover", "inventory_turnover"),
    ("fixedAssetTurnover", "fixed_asset_turnover"),
    ("assetTurnover", "asset_turnover"),
    ("workingCapitalTurnoverRatio", "working_capital_turnover_ratio"),
    // Valuation
    ("priceToEarningsRatio", "price_to_earnings_ratio"),
    ("priceToEarningsGrowthRatio", "price_to_earnings_growth_ratio"),
    (
        "forwardPriceToEarningsGrowthRatio",
        "forward_price_to_earnings_growth_ratio",
    ),
    ("priceToBookRatio", "price_to_book_ratio"),
    ("priceToSalesRatio", "price_to_sales_ratio"),
    ("priceToFreeCashFlowRatio", "price_to_free_cash_flow_ratio"),
    (
        "priceToOperatingCashFlowRatio",
        "price_to_operating_cash_flow_ratio",
    ),
    ("priceToFairValue", "price_to_fair_value"),
    // Leverage
    ("debtToAssetsRatio", "debt_to_assets_ratio"),
    ("debtToEquityRatio", "debt_to_equity_ratio"),
    ("debtToCapitalRatio", "debt_to_capital_ratio"),
    ("longTermDebtToCapitalRatio", "long_term_debt_to_capital_ratio"),
    ("financialLeverageRatio", "financial_leverage_ratio"),
    ("debtToMarketCap", "debt_to_market_cap"),
    // Cash flow
    ("operatingCashFlowRatio", "operating_cash_flow_ratio"),
    ("operatingCashFlowSalesRatio", "operating_cash_flow_sales_ratio"),
    (
        "freeCashFlowOperatingCashFlowRatio",
        "free_cash_flow_operating_cash_flow_ratio",
    ),
    ("debtServiceCoverageRatio", "debt_service_coverage_ratio"),
    ("interestCoverageRatio", "interest_coverage_ratio"),
    (
        "shortTermOperatingCashFlowCoverageRatio",
        "short_term_operating_cash_flow_coverage_ratio",
    ),
    (
        "operatingCashFlowCoverageRatio",
        "operating_cash_flow_coverage_ratio",
    ),
    (
        "capitalExpenditureCoverageRatio",
        "capital_expenditure_coverage_ratio",
    ),
    (
        "dividendPaidAndCapexCoverageRatio",
        "dividend_paid_and_capex_coverage_ratio",
    ),
    // Dividends
    ("dividendPayoutRatio", "dividend_payout_ratio"),
    ("dividendYield", "dividend_yield"),
    ("dividendYieldPercentage", "dividend_yield_percentage"),
    ("dividendPerShare", "dividend_per_share"),
    // Per share
    ("revenuePerShare", "revenue_per_share"),
    ("netIncomePerShare", "net_income_per_share"),
    ("interestDebtPerShare", "interest_debt_per_share"),
    ("cashPerShare", "cash_per_share"),
    ("bookValuePerShare", "book_value_per_share"),
    ("tangibleBookValuePerShare", "tangible_book_value_per_share"),
    ("shareholdersEquityPerShare", "shareholders_equity_per_share"),
    ("operatingCashFlowPerShare", "operating_cash_flow_per_share"),
    ("capexPerShare", "capex_per_share"),
    ("freeCashFlowPerShare", "free_cash_flow_per_share"),
    // Additional
    ("netIncomePerEBT", "net_income_per_ebt"),
    ("ebtPerEbit", "ebt_per_ebit"),
    ("effectiveTaxRate", "effective_tax_rate"),
    ("enterpriseValueMultiple", "enterprise_value_multiple"),
];

/// Store column names, in catalog order.
pub fn metric_columns() -> Vec<&'static str> {
    RATIO_FIELD_MAP.iter().map(|(_, db)| *db).collect()
}

/// Index of a store column within the catalog, if it is a known metric.
pub fn metric_index(column: &str) -> Option<usize> {
    RATIO_FIELD_MAP.iter().position(|(_, db)| *db == column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_the_full_ratio_set() {
        assert_eq!(RATIO_FIELD_MAP.len(), 59);
    }

    #[test]
    fn columns_are_unique() {
        let cols = metric_columns();
        let mut deduped = cols.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(cols.len(), deduped.len());
    }

    #[test]
    fn metric_index_round_trips() {
        assert_eq!(metric_index("gross_profit_margin"), Some(0));
        assert_eq!(metric_index("enterprise_value_multiple"), Some(58));
        assert_eq!(metric_index("not_a_metric"), None);
    }
}
