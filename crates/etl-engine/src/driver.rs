//! The reusable retry engine wrapping every per-symbol ingestion.
//!
//! The provider rate-limits and occasionally returns empty bodies, so each
//! pass fetches a whole batch concurrently, promotes whatever validated,
//! and the next pass retries only the symbols that never reached the
//! target table. No per-item backoff; completeness comes from the passes.

use async_trait::async_trait;
use futures_util::future::join_all;
use market_core::{EtlResult, SymbolCurrency};
use rand::seq::SliceRandom;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Work items per batch; also the number of in-flight HTTP calls.
    pub batch_size: usize,
    /// Requests-per-minute target used to derive the per-batch budget.
    pub rpm_target: f64,
    /// Flat sleep added on top of the leftover batch budget.
    pub base_sleep: Duration,
    /// Full passes over the missing set before giving up.
    pub max_retries: u32,
    /// Optional random sample cap over the work list.
    pub max_symbols: Option<usize>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            batch_size: 250,
            rpm_target: 750.0,
            base_sleep: Duration::from_secs(7),
            max_retries: 7,
            max_symbols: None,
        }
    }
}

impl RetryConfig {
    /// Wall-clock budget for one batch: `60 / (rpm / batch_size)` seconds.
    pub fn batch_budget(&self) -> Duration {
        Duration::from_secs_f64(60.0 * self.batch_size as f64 / self.rpm_target)
    }
}

/// One ingestion wrapped by the driver: fetch one item, promote a batch,
/// report which items never landed in the target table.
#[async_trait]
pub trait BatchJob: Send + Sync {
    type Row: Send;

    fn name(&self) -> &str;

    /// Fetch and validate one work item into canonical rows.
    async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<Self::Row>>;

    /// Promote a batch of validated rows (stage COPY + insert + truncate).
    async fn promote(&self, rows: Vec<Self::Row>) -> EtlResult<()>;

    /// Items not yet present in the target table.
    async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>>;
}

/// Run the retry loop; returns the items still missing after the last pass.
pub async fn run_retry_loop<J: BatchJob>(
    job: &J,
    items: Vec<SymbolCurrency>,
    config: &RetryConfig,
) -> EtlResult<Vec<SymbolCurrency>> {
    let mut to_process = items;

    if let Some(cap) = config.max_symbols {
        if to_process.len() > cap {
            let mut rng = rand::thread_rng();
            to_process.shuffle(&mut rng);
            to_process.truncate(cap);
        }
    }
    tracing::info!("{}: selected {} symbols", job.name(), to_process.len());

    let budget = config.batch_budget();
    let mut attempt = 1u32;

    while attempt <= config.max_retries && !to_process.is_empty() {
        tracing::info!(
            "{}: download attempt {attempt} for {} symbols",
            job.name(),
            to_process.len()
        );
        let total_batches = to_process.len().div_ceil(config.batch_size);

        for (batch_num, batch) in to_process.chunks(config.batch_size).enumerate() {
            tracing::info!(
                "{}: processing batch {}/{} (attempt {attempt})",
                job.name(),
                batch_num + 1,
                total_batches
            );
            let started = Instant::now();

            let results = join_all(batch.iter().map(|item| job.fetch(item))).await;
            let mut rows = Vec::new();
            for (item, result) in batch.iter().zip(results) {
                match result {
                    Ok(item_rows) => rows.extend(item_rows),
                    Err(e) => {
                        tracing::error!("{}: error fetching {}: {e}", job.name(), item.symbol)
                    }
                }
            }

            if !rows.is_empty() {
                if let Err(e) = job.promote(rows).await {
                    tracing::error!("{}: error promoting batch {}: {e}", job.name(), batch_num + 1);
                }
            }

            let duration = started.elapsed();
            tracing::info!(
                "{}: batch {} took {:.2}s",
                job.name(),
                batch_num + 1,
                duration.as_secs_f64()
            );

            let is_last = (batch_num + 1) * config.batch_size >= to_process.len();
            if !is_last && duration < budget {
                let sleep = config.base_sleep + budget - duration;
                tracing::info!("{}: sleeping for {:.2}s", job.name(), sleep.as_secs_f64());
                tokio::time::sleep(sleep).await;
            }
        }

        let missing = job.missing(&to_process).await?;
        if missing.is_empty() {
            tracing::info!("{}: all symbols processed successfully", job.name());
            return Ok(Vec::new());
        }

        tracing::warn!(
            "{}: {} symbols missing after attempt {attempt}, retrying",
            job.name(),
            missing.len()
        );
        to_process = missing;
        attempt += 1;
    }

    if !to_process.is_empty() {
        tracing::error!(
            "{}: failed to download {} symbols after {} attempts",
            job.name(),
            to_process.len(),
            config.max_retries
        );
    }
    Ok(to_process)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Provider stub that answers empty for `flaky` symbols on the first
    /// pass and real rows afterwards.
    struct FlakyJob {
        flaky: HashSet<String>,
        calls: Mutex<HashSet<String>>,
        stored: Mutex<HashSet<String>>,
    }

    impl FlakyJob {
        fn new(flaky: &[&str]) -> Self {
            Self {
                flaky: flaky.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(HashSet::new()),
                stored: Mutex::new(HashSet::new()),
            }
        }
    }

    #[async_trait]
    impl BatchJob for FlakyJob {
        type Row = String;

        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<String>> {
            let first_call = self.calls.lock().unwrap().insert(item.symbol.clone());
            if first_call && self.flaky.contains(&item.symbol) {
                return Ok(Vec::new());
            }
            Ok(vec![item.symbol.clone()])
        }

        async fn promote(&self, rows: Vec<String>) -> EtlResult<()> {
            self.stored.lock().unwrap().extend(rows);
            Ok(())
        }

        async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>> {
            let stored = self.stored.lock().unwrap();
            Ok(items
                .iter()
                .filter(|i| !stored.contains(&i.symbol))
                .cloned()
                .collect())
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            batch_size: 2,
            rpm_target: 1e9,
            base_sleep: Duration::ZERO,
            max_retries: 7,
            max_symbols: None,
        }
    }

    fn items(symbols: &[&str]) -> Vec<SymbolCurrency> {
        symbols
            .iter()
            .map(|s| SymbolCurrency::new(*s, Some("USD".to_string())))
            .collect()
    }

    #[tokio::test]
    async fn second_pass_recovers_transiently_empty_symbols() {
        let job = FlakyJob::new(&["X", "Y"]);
        let leftover = run_retry_loop(&job, items(&["A", "B", "X", "Y"]), &fast_config())
            .await
            .unwrap();

        assert!(leftover.is_empty());
        let stored = job.stored.lock().unwrap();
        assert_eq!(stored.len(), 4);
        assert!(stored.contains("X") && stored.contains("Y"));
    }

    #[tokio::test]
    async fn persistently_failing_symbols_survive_as_leftovers() {
        struct DeadJob {
            stored: Mutex<HashSet<String>>,
        }

        #[async_trait]
        impl BatchJob for DeadJob {
            type Row = String;

            fn name(&self) -> &str {
                "dead"
            }

            async fn fetch(&self, item: &SymbolCurrency) -> EtlResult<Vec<String>> {
                if item.symbol == "DEAD" {
                    Ok(Vec::new())
                } else {
                    Ok(vec![item.symbol.clone()])
                }
            }

            async fn promote(&self, rows: Vec<String>) -> EtlResult<()> {
                self.stored.lock().unwrap().extend(rows);
                Ok(())
            }

            async fn missing(&self, items: &[SymbolCurrency]) -> EtlResult<Vec<SymbolCurrency>> {
                let stored = self.stored.lock().unwrap();
                Ok(items
                    .iter()
                    .filter(|i| !stored.contains(&i.symbol))
                    .cloned()
                    .collect())
            }
        }

        let job = DeadJob {
            stored: Mutex::new(HashSet::new()),
        };
        let mut config = fast_config();
        config.max_retries = 3;

        let leftover = run_retry_loop(&job, items(&["A", "DEAD"]), &config).await.unwrap();

        assert_eq!(leftover.len(), 1);
        assert_eq!(leftover[0].symbol, "DEAD");
        assert!(job.stored.lock().unwrap().contains("A"));
    }

    #[tokio::test]
    async fn sampling_caps_the_work_list() {
        let job = FlakyJob::new(&[]);
        let mut config = fast_config();
        config.max_symbols = Some(3);

        let leftover = run_retry_loop(&job, items(&["A", "B", "C", "D", "E"]), &config)
            .await
            .unwrap();
        assert!(leftover.is_empty());
        assert_eq!(job.stored.lock().unwrap().len(), 3);
    }
}
