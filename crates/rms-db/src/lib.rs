//! RMS Loader Database Layer
//!
//! This crate provides PostgreSQL access for the RMS CDR loader. It includes:
//!
//! - Connection pool management with bounded connect retry
//! - Create-if-absent provisioning of the CDR table
//! - The `CdrStore` implementation used by the ingest pipeline

pub mod pool;
pub mod repositories;
pub mod schema;

pub use pool::{connect_with_retry, create_pool};
pub use repositories::*;
pub use schema::SchemaEnsurer;

// Re-export commonly used types
pub use rms_core::{AppResult, LoaderError};
pub use sqlx::{PgPool, Postgres, Transaction};
