//! CDR table provisioning
//!
//! Checks for the target table and creates it, with its indexes, when it is
//! missing. There is no migration path; an existing table is left alone.

use rms_core::{AppResult, LoaderError};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

/// Verifies and creates the CDR table
#[derive(Clone)]
pub struct SchemaEnsurer {
    pool: PgPool,
    table: String,
}

impl SchemaEnsurer {
    /// Create a new schema ensurer for `table`
    pub fn new(pool: PgPool, table: &str) -> AppResult<Self> {
        validate_identifier(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Check for the table in the current schema, matching the name exactly
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn table_exists(&self) -> AppResult<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.tables
                WHERE table_schema = current_schema()
                  AND table_name = $1
            )
            "#,
        )
        .bind(&self.table)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            error!("Database error checking table {}: {}", self.table, e);
            LoaderError::Persistence(format!("Failed to check table {}: {}", self.table, e))
        })?;

        Ok(exists.0)
    }

    /// Create the table when absent
    ///
    /// Returns `true` when the table was created by this call.
    #[instrument(skip(self), fields(table = %self.table))]
    pub async fn ensure(&self) -> AppResult<bool> {
        if self.table_exists().await? {
            debug!("Table {} already exists", self.table);
            return Ok(false);
        }

        info!("Table {} does not exist, creating it", self.table);

        let mut tx = self.pool.begin().await.map_err(|e| {
            error!("Failed to start transaction: {}", e);
            LoaderError::Transaction(format!("Failed to start transaction: {}", e))
        })?;

        for statement in schema_statements(&self.table) {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    error!("Failed to provision table {}: {}", self.table, e);
                    LoaderError::Persistence(format!(
                        "Failed to create table {}: {}",
                        self.table, e
                    ))
                })?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit transaction: {}", e);
            LoaderError::Transaction(format!("Failed to commit transaction: {}", e))
        })?;

        info!("Table {} created", self.table);
        Ok(true)
    }
}

/// DDL for the table and its indexes, in execution order
pub fn schema_statements(table: &str) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGSERIAL PRIMARY KEY,
                uid VARCHAR(36) NOT NULL,
                direction TEXT,
                "time" TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                "timestamp" BIGINT,
                flagged BOOLEAN,
                source TEXT,
                destination TEXT,
                duration BIGINT,
                size NUMERIC,
                exists_in_store BOOLEAN,
                local_copy BOOLEAN,
                authentic TEXT,
                sip_call_id TEXT,
                file_name VARCHAR(100),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS {table}_timestamp_uid_idx ON {table} ("timestamp", uid)"#
        ),
        format!(
            r#"CREATE INDEX IF NOT EXISTS {table}_sip_call_id_timestamp_idx ON {table} (sip_call_id, "timestamp")"#
        ),
    ]
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn validate_identifier(name: &str) -> AppResult<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);

    if !valid_start
        || name.len() > 63
        || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(LoaderError::Config(format!(
            "Invalid table name: {:?}",
            name
        )));
    }

    Ok(())
}
