//! Repository implementations
//!
//! Concrete implementations of the storage traits defined in rms-core,
//! using sqlx for PostgreSQL access.

pub mod cdr_repo;

pub use cdr_repo::PgCdrStore;
