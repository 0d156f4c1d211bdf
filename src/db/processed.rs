//! `processed_items` queries: mark, unmark, load, list, purge.

use chrono::{DateTime, Utc};
use opentelemetry::KeyValue;
use serde::Serialize;

use crate::error::Result;
use crate::telemetry::metrics;

/// One ledger row.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ProcessedRecord {
    pub item_id: String,
    pub outcome: String,
    pub processed_at: DateTime<Utc>,
}

fn count(operation: &'static str) {
    metrics::ledger_operations().add(1, &[KeyValue::new("operation", operation)]);
}

impl super::Db {
    /// Upsert a processed marker. A later mark overwrites the outcome and timestamp.
    pub async fn mark_processed(&self, adapter: &str, item_id: &str, outcome: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO processed_items (adapter, item_id, outcome, processed_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (adapter, item_id) DO UPDATE
             SET outcome = EXCLUDED.outcome, processed_at = now()",
        )
        .bind(adapter)
        .bind(item_id)
        .bind(outcome)
        .execute(&self.pool)
        .await?;
        count("mark");
        Ok(())
    }

    /// Delete a marker. Returns whether a row existed.
    pub async fn unmark_processed(&self, adapter: &str, item_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM processed_items WHERE adapter = $1 AND item_id = $2")
            .bind(adapter)
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        count("unmark");
        Ok(result.rows_affected() > 0)
    }

    pub async fn is_processed(&self, adapter: &str, item_id: &str) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM processed_items WHERE adapter = $1 AND item_id = $2)",
        )
        .bind(adapter)
        .bind(item_id)
        .fetch_one(&self.pool)
        .await?;
        count("lookup");
        Ok(row.0)
    }

    /// All marked item IDs for an adapter.
    pub async fn load_processed(&self, adapter: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT item_id FROM processed_items WHERE adapter = $1")
                .bind(adapter)
                .fetch_all(&self.pool)
                .await?;
        count("load");
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn get_processed(
        &self,
        adapter: &str,
        item_id: &str,
    ) -> Result<Option<ProcessedRecord>> {
        let record = sqlx::query_as::<_, ProcessedRecord>(
            "SELECT item_id, outcome, processed_at FROM processed_items
             WHERE adapter = $1 AND item_id = $2",
        )
        .bind(adapter)
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        count("lookup");
        Ok(record)
    }

    /// Most recently marked rows first.
    pub async fn list_processed(&self, adapter: &str, limit: i64) -> Result<Vec<ProcessedRecord>> {
        let records = sqlx::query_as::<_, ProcessedRecord>(
            "SELECT item_id, outcome, processed_at FROM processed_items
             WHERE adapter = $1
             ORDER BY processed_at DESC
             LIMIT $2",
        )
        .bind(adapter)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        count("list");
        Ok(records)
    }

    /// Delete rows marked before `cutoff`. Returns the number removed.
    pub async fn purge_processed(&self, adapter: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM processed_items WHERE adapter = $1 AND processed_at < $2")
                .bind(adapter)
                .bind(cutoff)
                .execute(&self.pool)
                .await?;
        count("purge");
        Ok(result.rows_affected())
    }
}
