//! Domain models for the RMS loader

pub mod audit;
pub mod cdr;

pub use audit::AuditEntry;
pub use cdr::{IdentityKey, RmsCdr, FILE_NAME_MAX_LEN};
