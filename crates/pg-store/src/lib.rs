//! Store gateway: the only component that talks to PostgreSQL directly.
//!
//! Large loads go through the COPY protocol into a staging table and are
//! promoted with `INSERT … SELECT` + `TRUNCATE` in a single transaction;
//! see [`PgStore::bulk_copy`].

pub mod copy;
pub mod indexes;

pub use copy::CopyBuffer;

use market_core::{EtlError, EtlResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Assemble the connection URL from the `POSTGRES_*` environment contract.
pub fn database_url() -> EtlResult<String> {
    let get = |key: &str| {
        std::env::var(key).map_err(|_| EtlError::Config(format!("{key} not set")))
    };
    let user = get("POSTGRES_USER")?;
    let password = get("POSTGRES_PASSWORD")?;
    let db = get("POSTGRES_DB")?;
    let host = std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = std::env::var("POSTGRES_PORT").unwrap_or_else(|_| "5432".to_string());
    Ok(format!("postgresql://{user}:{password}@{host}:{port}/{db}"))
}

impl PgStore {
    pub async fn connect_from_env() -> EtlResult<Self> {
        Self::connect(&database_url()?).await
    }

    pub async fn connect(url: &str) -> EtlResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Idempotent creation of the three logical schemas.
    pub async fn ensure_schemas(&self) -> EtlResult<()> {
        for schema in ["raw", "stage", "clean"] {
            self.execute(&format!("CREATE SCHEMA IF NOT EXISTS {schema}")).await?;
        }
        Ok(())
    }

    /// Drop-then-create for tables with fresh-slate semantics.
    pub async fn recreate(&self, table: &str, create_sql: &str) -> EtlResult<()> {
        self.execute(&format!("DROP TABLE IF EXISTS {table} CASCADE")).await?;
        self.execute(create_sql).await?;
        tracing::info!("Recreated table {table}");
        Ok(())
    }

    pub async fn execute(&self, sql: &str) -> EtlResult<u64> {
        let result = sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    pub async fn count(&self, table: &str) -> EtlResult<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        row.try_get("cnt").map_err(|e| EtlError::Database(e.to_string()))
    }

    pub async fn has_rows(&self, table: &str) -> EtlResult<bool> {
        let count = self.count(table).await?;
        if count > 0 {
            tracing::info!("Found {count} existing records in {table}");
        }
        Ok(count > 0)
    }

    /// COPY `buffer` into `stage_table`, promote into the final table with
    /// `insert_sql`, truncate staging. All three statements share one
    /// transaction, so a failed promotion leaves no stage residue behind.
    pub async fn bulk_copy(
        &self,
        stage_table: &str,
        columns: &[&str],
        buffer: CopyBuffer,
        insert_sql: &str,
    ) -> EtlResult<()> {
        let copy_sql = format!(
            "COPY {stage_table} ({}) FROM STDIN",
            columns.join(", ")
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;

        let mut sink = tx
            .copy_in_raw(&copy_sql)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        sink.send(buffer.into_bytes())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        sink.finish()
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;

        sqlx::query(insert_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        sqlx::query(&format!("TRUNCATE {stage_table}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(())
    }

    /// COPY straight into a final table; used where the daily slice was
    /// deleted first or the table was just recreated.
    pub async fn copy_direct(
        &self,
        table: &str,
        columns: &[&str],
        buffer: CopyBuffer,
    ) -> EtlResult<()> {
        let copy_sql = format!("COPY {table} ({}) FROM STDIN", columns.join(", "));

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        let mut sink = conn
            .copy_in_raw(&copy_sql)
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        sink.send(buffer.into_bytes())
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        sink.finish()
            .await
            .map_err(|e| EtlError::Database(e.to_string()))?;
        Ok(())
    }
}
