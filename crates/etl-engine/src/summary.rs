//! ETL run summary (`raw.etl_summary`): per-trading-date distinct-symbol
//! counters over the last 10 forex dates, upserted after every run.

use market_core::EtlResult;
use pg_store::PgStore;

const CREATE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS raw.etl_summary (
        date DATE PRIMARY KEY,
        day VARCHAR(10),
        fx_cnt INTEGER,
        close_cnt INTEGER,
        vol_cnt INTEGER,
        close_eur_cnt INTEGER,
        close_usd_cnt INTEGER,
        vol_eur_cnt INTEGER,
        vol_usd_cnt INTEGER,
        mcap_cnt INTEGER,
        mcap_eur_cnt INTEGER,
        mcap_usd_cnt INTEGER,
        created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    )";

const SUMMARY_SQL: &str = "
    INSERT INTO raw.etl_summary (
        date, day, fx_cnt,
        close_cnt, vol_cnt, close_eur_cnt, close_usd_cnt, vol_eur_cnt, vol_usd_cnt,
        mcap_cnt, mcap_eur_cnt, mcap_usd_cnt
    )
    WITH recent_fx_dates AS (
      SELECT date
      FROM raw.historical_forex
      WHERE price IS NOT NULL AND price <> 0
      GROUP BY date
      ORDER BY date DESC
      LIMIT 10
    ),
    fx AS (
      SELECT d.date,
             COUNT(DISTINCT hf.forex_pair) AS fx_cnt
      FROM recent_fx_dates d
      JOIN raw.historical_forex hf
        ON hf.date = d.date
      WHERE hf.price IS NOT NULL AND hf.price <> 0
      GROUP BY d.date
    ),
    hpv_cnts AS (
      SELECT d.date,
             COUNT(DISTINCT symbol) FILTER (WHERE close       IS NOT NULL AND close       <> 0) AS close_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE volume      IS NOT NULL AND volume      <> 0) AS vol_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE close_eur   IS NOT NULL AND close_eur   <> 0) AS close_eur_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE close_usd   IS NOT NULL AND close_usd   <> 0) AS close_usd_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE volume_eur  IS NOT NULL AND volume_eur  <> 0) AS vol_eur_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE volume_usd  IS NOT NULL AND volume_usd  <> 0) AS vol_usd_cnt
      FROM raw.historical_price_volume hpv
      JOIN recent_fx_dates d ON hpv.date = d.date
      GROUP BY d.date
    ),
    mcap_cnts AS (
      SELECT d.date,
             COUNT(DISTINCT symbol) FILTER (WHERE market_cap      IS NOT NULL AND market_cap      <> 0) AS mcap_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE market_cap_eur  IS NOT NULL AND market_cap_eur  <> 0) AS mcap_eur_cnt,
             COUNT(DISTINCT symbol) FILTER (WHERE market_cap_usd  IS NOT NULL AND market_cap_usd  <> 0) AS mcap_usd_cnt
      FROM raw.historical_market_cap mc
      JOIN recent_fx_dates d ON mc.date = d.date
      GROUP BY d.date
    ),
    joined AS (
      SELECT
        COALESCE(fx.date, mc.date) AS date_key,
        fx.fx_cnt,
        hpv.close_cnt,
        hpv.vol_cnt,
        hpv.close_eur_cnt,
        hpv.close_usd_cnt,
        hpv.vol_eur_cnt,
        hpv.vol_usd_cnt,
        mc.mcap_cnt,
        mc.mcap_eur_cnt,
        mc.mcap_usd_cnt
      FROM fx
      FULL OUTER JOIN mcap_cnts mc USING (date)
      LEFT JOIN hpv_cnts hpv ON hpv.date = COALESCE(fx.date, mc.date)
    )
    SELECT
      date_key AS date,
      TO_CHAR(date_key, 'FMDay') AS day,
      fx_cnt,
      close_cnt,
      vol_cnt,
      close_eur_cnt,
      close_usd_cnt,
      vol_eur_cnt,
      vol_usd_cnt,
      mcap_cnt,
      mcap_eur_cnt,
      mcap_usd_cnt
    FROM joined
    ORDER BY date_key DESC
    ON CONFLICT (date) DO UPDATE SET
      day           = EXCLUDED.day,
      fx_cnt        = EXCLUDED.fx_cnt,
      close_cnt     = EXCLUDED.close_cnt,
      vol_cnt       = EXCLUDED.vol_cnt,
      close_eur_cnt = EXCLUDED.close_eur_cnt,
      close_usd_cnt = EXCLUDED.close_usd_cnt,
      vol_eur_cnt   = EXCLUDED.vol_eur_cnt,
      vol_usd_cnt   = EXCLUDED.vol_usd_cnt,
      mcap_cnt      = EXCLUDED.mcap_cnt,
      mcap_eur_cnt  = EXCLUDED.mcap_eur_cnt,
      mcap_usd_cnt  = EXCLUDED.mcap_usd_cnt,
      created_at    = CURRENT_TIMESTAMP";

pub struct EtlSummaryManager {
    store: PgStore,
}

impl EtlSummaryManager {
    pub fn new(store: PgStore) -> Self {
        Self { store }
    }

    pub async fn run_update(&self) -> EtlResult<bool> {
        tracing::info!("######################### Step 14 - EtlSummaryManager");

        self.store.ensure_schemas().await?;
        self.store.execute(CREATE_TABLE).await?;
        self.store.execute(SUMMARY_SQL).await?;
        tracing::info!("ETL summary table updated successfully");
        Ok(true)
    }
}
