//! RMS Loader Core Library
//!
//! This crate provides the foundational types, traits, and error handling
//! for the RMS CDR loader. It includes:
//!
//! - The canonical CDR record and its identity key
//! - Storage and audit traits consumed by the ingest pipeline
//! - Unified error handling with stable error codes
//! - Loader configuration

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::LoaderConfig;
pub use error::{ConversionError, LoaderError};

/// Result type alias using LoaderError
pub type AppResult<T> = Result<T, LoaderError>;
