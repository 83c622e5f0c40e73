//! CDR (Call Detail Record) model
//!
//! Represents one call exported by the recording management system, after
//! normalization and before (or after) it is persisted.

use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Upper bound of the persisted `file_name` column, in characters
pub const FILE_NAME_MAX_LEN: usize = 100;

/// Normalized call detail record
///
/// Immutable once parsed. `occurred_at` carries the civil offset of the
/// export's time zone; the epoch projection is derived from it so the two
/// can never disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RmsCdr {
    /// Storage-assigned key, `None` until persisted
    pub id: Option<i64>,

    /// Random token assigned at parse time
    pub uid: String,

    /// Call direction as exported
    pub direction: String,

    /// Call start in the export's civil time zone
    pub occurred_at: DateTime<FixedOffset>,

    /// Whether the call was flagged in the recording system
    pub flagged: bool,

    /// Calling party
    pub source: String,

    /// Called party
    pub destination: String,

    /// Talk time in seconds, never negative
    pub talk_duration: i64,

    /// Recording size magnitude; the unit is not converted
    pub size_bytes: Decimal,

    /// Recording is present in the recording store
    pub exists_in_store: bool,

    /// A local copy of the recording exists
    pub local_copy: bool,

    /// Authenticity marker as exported
    pub authentic: String,

    /// Session identifier from the telephony platform
    pub sip_call_id: String,

    /// Recording artifact name, at most `FILE_NAME_MAX_LEN` characters
    pub file_name: String,
}

impl RmsCdr {
    /// Call start as epoch seconds
    #[inline]
    pub fn unix_timestamp(&self) -> i64 {
        self.occurred_at.timestamp()
    }

    /// Stable key deciding whether two records denote the same call
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            sip_call_id: self.sip_call_id.clone(),
            unix_timestamp: self.unix_timestamp(),
        }
    }
}

/// Content-derived identity of a call
///
/// The telephony session id alone is reused by some exports for transfer
/// legs, so the call start second is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub sip_call_id: String,
    pub unix_timestamp: i64,
}

impl IdentityKey {
    pub fn new(sip_call_id: impl Into<String>, unix_timestamp: i64) -> Self {
        Self {
            sip_call_id: sip_call_id.into(),
            unix_timestamp,
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.sip_call_id, self.unix_timestamp)
    }
}
