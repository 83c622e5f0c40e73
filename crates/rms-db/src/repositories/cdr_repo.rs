//! CDR repository implementation
//!
//! Provides PostgreSQL-backed storage for loaded call detail records: a
//! set-membership lookup on identity keys and transactional multi-row
//! inserts. Uses runtime queries (not compile-time macros) to avoid
//! requiring a database connection at build time.

use crate::schema::{validate_identifier, SchemaEnsurer};
use async_trait::async_trait;
use chrono::Utc;
use rms_core::{
    models::{IdentityKey, RmsCdr},
    traits::CdrStore,
    AppResult, LoaderError,
};
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::collections::HashSet;
use tracing::{debug, error, instrument};

/// Columns written by the loader, in bind order
const CDR_INSERT_COLUMNS: &str = r#"
    uid, direction, "time", "timestamp", flagged,
    source, destination, duration, size,
    exists_in_store, local_copy, authentic,
    sip_call_id, file_name
"#;

/// PostgreSQL implementation of CdrStore
pub struct PgCdrStore {
    pool: PgPool,
    table: String,
    schema: SchemaEnsurer,
}

impl PgCdrStore {
    /// Create a new CDR store writing to `table`
    pub fn new(pool: PgPool, table: &str) -> AppResult<Self> {
        validate_identifier(table)?;
        let schema = SchemaEnsurer::new(pool.clone(), table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
            schema,
        })
    }
}

#[async_trait]
impl CdrStore for PgCdrStore {
    async fn ensure_table(&self) -> AppResult<bool> {
        self.schema.ensure().await
    }

    #[instrument(skip(self, keys), fields(keys = keys.len()))]
    async fn existing_keys(&self, keys: &[IdentityKey]) -> AppResult<HashSet<IdentityKey>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let (call_ids, timestamps): (Vec<String>, Vec<i64>) = keys
            .iter()
            .map(|k| (k.sip_call_id.clone(), k.unix_timestamp))
            .unzip();

        let query = format!(
            r#"
            SELECT DISTINCT sip_call_id, "timestamp"
            FROM {}
            WHERE (sip_call_id, "timestamp") IN (
                SELECT * FROM UNNEST($1::text[], $2::bigint[])
            )
            "#,
            self.table
        );

        let rows = sqlx::query_as::<Postgres, (String, i64)>(&query)
            .bind(call_ids)
            .bind(timestamps)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error probing identity keys: {}", e);
                LoaderError::Persistence(format!("Failed to look up existing CDRs: {}", e))
            })?;

        debug!("{} of {} keys already stored", rows.len(), keys.len());

        Ok(rows
            .into_iter()
            .map(|(sip_call_id, unix_timestamp)| IdentityKey {
                sip_call_id,
                unix_timestamp,
            })
            .collect())
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn insert_batch(&self, records: &[RmsCdr]) -> AppResult<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            LoaderError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "INSERT INTO {} ({}) ",
            self.table, CDR_INSERT_COLUMNS
        ));

        query_builder.push_values(records.iter(), |mut b, cdr| {
            b.push_bind(cdr.uid.clone())
                .push_bind(cdr.direction.clone())
                .push_bind(cdr.occurred_at.with_timezone(&Utc))
                .push_bind(cdr.unix_timestamp())
                .push_bind(cdr.flagged)
                .push_bind(cdr.source.clone())
                .push_bind(cdr.destination.clone())
                .push_bind(cdr.talk_duration)
                .push_bind(cdr.size_bytes)
                .push_bind(cdr.exists_in_store)
                .push_bind(cdr.local_copy)
                .push_bind(cdr.authentic.clone())
                .push_bind(cdr.sip_call_id.clone())
                .push_bind(cdr.file_name.clone());
        });

        let result = query_builder
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Database error inserting CDR batch: {}", e);
                LoaderError::Persistence(format!(
                    "Failed to insert batch of {} CDRs: {}",
                    records.len(),
                    e
                ))
            })?;

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            LoaderError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        debug!("Inserted {} CDRs", result.rows_affected());
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn count(&self) -> AppResult<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", self.table);
        let result: (i64,) = sqlx::query_as(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                error!("Database error counting CDRs: {}", e);
                LoaderError::Persistence(format!("Failed to count CDRs: {}", e))
            })?;

        Ok(result.0)
    }
}
