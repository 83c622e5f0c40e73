//! Duplicate filtering on identity keys

use rms_core::models::{IdentityKey, RmsCdr};
use rms_core::traits::CdrStore;
use rms_core::AppResult;
use std::collections::HashSet;
use tracing::debug;

/// Records of one file split by the duplicate lookup
#[derive(Debug, Default)]
pub struct Admission {
    pub admitted: Vec<RmsCdr>,
    pub duplicates: Vec<RmsCdr>,
}

/// Admits each call at most once per table
///
/// Storage is queried once per file. Keys admitted earlier in the same run
/// are remembered, since they may still sit in an unflushed batch.
#[derive(Debug, Default)]
pub struct DuplicateFilter {
    seen: HashSet<IdentityKey>,
}

impl DuplicateFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split `records` into admitted and duplicate, preserving order
    pub async fn admit<S>(&mut self, store: &S, records: Vec<RmsCdr>) -> AppResult<Admission>
    where
        S: CdrStore + ?Sized,
    {
        if records.is_empty() {
            return Ok(Admission::default());
        }

        let mut lookup: Vec<IdentityKey> = records
            .iter()
            .map(RmsCdr::identity_key)
            .filter(|k| !self.seen.contains(k))
            .collect();
        lookup.sort();
        lookup.dedup();

        let stored = store.existing_keys(&lookup).await?;
        debug!(
            records = records.len(),
            queried = lookup.len(),
            stored = stored.len(),
            "Looked up identity keys"
        );

        let mut admission = Admission::default();
        for record in records {
            let key = record.identity_key();
            if stored.contains(&key) || !self.seen.insert(key) {
                admission.duplicates.push(record);
            } else {
                admission.admitted.push(record);
            }
        }

        Ok(admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    struct FixedStore {
        stored: HashSet<IdentityKey>,
        lookups: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CdrStore for FixedStore {
        async fn ensure_table(&self) -> AppResult<bool> {
            Ok(false)
        }

        async fn existing_keys(&self, keys: &[IdentityKey]) -> AppResult<HashSet<IdentityKey>> {
            self.lookups.lock().unwrap().push(keys.len());
            Ok(keys.iter().filter(|k| self.stored.contains(k)).cloned().collect())
        }

        async fn insert_batch(&self, records: &[RmsCdr]) -> AppResult<u64> {
            Ok(records.len() as u64)
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.stored.len() as i64)
        }
    }

    fn cdr(call_id: &str, second: u32) -> RmsCdr {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        RmsCdr {
            id: None,
            uid: format!("uid-{}-{}", call_id, second),
            direction: "Incoming".to_string(),
            occurred_at: offset.with_ymd_and_hms(2023, 8, 22, 8, 9, second).unwrap(),
            flagged: false,
            source: "0215550100".to_string(),
            destination: "2001".to_string(),
            talk_duration: 10,
            size_bytes: Decimal::ONE,
            exists_in_store: true,
            local_copy: false,
            authentic: "Yes".to_string(),
            sip_call_id: call_id.to_string(),
            file_name: "rec.wav".to_string(),
        }
    }

    #[tokio::test]
    async fn test_stored_keys_rejected() {
        let stored = cdr("a", 1).identity_key();
        let store = FixedStore {
            stored: HashSet::from([stored]),
            lookups: Mutex::new(Vec::new()),
        };

        let mut filter = DuplicateFilter::new();
        let admission = filter
            .admit(&store, vec![cdr("a", 1), cdr("b", 1), cdr("a", 2)])
            .await
            .unwrap();

        assert_eq!(admission.admitted.len(), 2);
        assert_eq!(admission.duplicates.len(), 1);
        assert_eq!(admission.duplicates[0].sip_call_id, "a");
        assert_eq!(*store.lookups.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_repeat_within_run_rejected() {
        let store = FixedStore {
            stored: HashSet::new(),
            lookups: Mutex::new(Vec::new()),
        };

        let mut filter = DuplicateFilter::new();
        let first = filter
            .admit(&store, vec![cdr("a", 1), cdr("a", 1)])
            .await
            .unwrap();
        assert_eq!(first.admitted.len(), 1);
        assert_eq!(first.duplicates.len(), 1);

        // Second file repeats the call; already admitted keys are not queried again
        let second = filter
            .admit(&store, vec![cdr("a", 1), cdr("c", 3)])
            .await
            .unwrap();
        assert_eq!(second.admitted.len(), 1);
        assert_eq!(second.admitted[0].sip_call_id, "c");
        assert_eq!(*store.lookups.lock().unwrap(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_empty_input_skips_lookup() {
        let store = FixedStore {
            stored: HashSet::new(),
            lookups: Mutex::new(Vec::new()),
        };

        let admission = DuplicateFilter::new().admit(&store, Vec::new()).await.unwrap();
        assert!(admission.admitted.is_empty());
        assert!(store.lookups.lock().unwrap().is_empty());
    }
}
