//! Bounded batch inserts
//!
//! The loader is the only writer. Records are buffered until a full batch
//! is available, then written in one transaction through the store.

use rms_core::models::RmsCdr;
use rms_core::traits::CdrStore;
use rms_core::AppResult;
use tracing::{debug, error, instrument};

/// Buffers admitted records and flushes them in fixed-size batches
pub struct BatchLoader<'a, S: CdrStore + ?Sized> {
    store: &'a S,
    batch_size: usize,
    buffer: Vec<RmsCdr>,
    total_inserted: u64,
    batches: u64,
}

impl<'a, S: CdrStore + ?Sized> BatchLoader<'a, S> {
    /// Create a loader; a zero batch size is treated as one
    pub fn new(store: &'a S, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
            total_inserted: 0,
            batches: 0,
        }
    }

    /// Buffer one record, flushing when the batch is full
    ///
    /// Returns `true` when this call wrote a batch.
    pub async fn push(&mut self, record: RmsCdr) -> AppResult<bool> {
        self.buffer.push(record);
        if self.buffer.len() >= self.batch_size {
            self.flush().await?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Write whatever is buffered
    ///
    /// On failure the buffer is kept and the error returned; batches
    /// committed earlier stay committed.
    #[instrument(skip(self), fields(pending = self.buffer.len()))]
    pub async fn flush(&mut self) -> AppResult<u64> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.insert_batch(&self.buffer).await.map_err(|e| {
            error!(
                "Batch {} of {} records failed: {}",
                self.batches + 1,
                self.buffer.len(),
                e
            );
            e
        })?;

        self.buffer.clear();
        self.batches += 1;
        self.total_inserted += inserted;

        debug!(
            "Batch {} committed, {} rows ({} total)",
            self.batches, inserted, self.total_inserted
        );
        Ok(inserted)
    }

    /// Records buffered but not yet written
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn total_inserted(&self) -> u64 {
        self.total_inserted
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Drop the unflushed buffer, returning how many records were lost
    pub fn discard(&mut self) -> usize {
        let dropped = self.buffer.len();
        self.buffer.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{FixedOffset, TimeZone};
    use rms_core::models::IdentityKey;
    use rms_core::LoaderError;
    use rust_decimal::Decimal;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        batches: Mutex<Vec<usize>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl CdrStore for RecordingStore {
        async fn ensure_table(&self) -> AppResult<bool> {
            Ok(false)
        }

        async fn existing_keys(&self, _keys: &[IdentityKey]) -> AppResult<HashSet<IdentityKey>> {
            Ok(HashSet::new())
        }

        async fn insert_batch(&self, records: &[RmsCdr]) -> AppResult<u64> {
            let mut batches = self.batches.lock().unwrap();
            if self.fail_after == Some(batches.len()) {
                return Err(LoaderError::Persistence("insert rejected".to_string()));
            }
            batches.push(records.len());
            Ok(records.len() as u64)
        }

        async fn count(&self) -> AppResult<i64> {
            Ok(self.batches.lock().unwrap().iter().sum::<usize>() as i64)
        }
    }

    fn cdr(n: u32) -> RmsCdr {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        RmsCdr {
            id: None,
            uid: format!("uid-{}", n),
            direction: "Outgoing".to_string(),
            occurred_at: offset.with_ymd_and_hms(2023, 8, 22, 8, 0, 0).unwrap(),
            flagged: false,
            source: "2001".to_string(),
            destination: "0215550100".to_string(),
            talk_duration: 1,
            size_bytes: Decimal::ONE,
            exists_in_store: true,
            local_copy: true,
            authentic: "Yes".to_string(),
            sip_call_id: format!("call-{}", n),
            file_name: "rec.wav".to_string(),
        }
    }

    #[tokio::test]
    async fn test_batches_of_fixed_size() {
        let store = RecordingStore::default();
        let mut loader = BatchLoader::new(&store, 100);

        let mut flushes = 0;
        for n in 0..250 {
            if loader.push(cdr(n)).await.unwrap() {
                flushes += 1;
            }
        }
        assert_eq!(flushes, 2);
        assert_eq!(loader.pending(), 50);
        assert_eq!(loader.batches(), 2);

        assert_eq!(loader.flush().await.unwrap(), 50);
        assert_eq!(loader.total_inserted(), 250);
        assert_eq!(*store.batches.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(store.count().await.unwrap(), 250);
    }

    #[tokio::test]
    async fn test_flush_without_records() {
        let store = RecordingStore::default();
        let mut loader = BatchLoader::new(&store, 100);
        assert_eq!(loader.flush().await.unwrap(), 0);
        assert_eq!(loader.batches(), 0);
        assert!(store.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_committed_batches() {
        let store = RecordingStore {
            fail_after: Some(1),
            ..Default::default()
        };
        let mut loader = BatchLoader::new(&store, 2);

        loader.push(cdr(1)).await.unwrap();
        loader.push(cdr(2)).await.unwrap();
        loader.push(cdr(3)).await.unwrap();
        let err = loader.push(cdr(4)).await.unwrap_err();

        assert_eq!(err.error_code(), "persistence_error");
        assert_eq!(loader.total_inserted(), 2);
        assert_eq!(loader.pending(), 2);
        assert_eq!(*store.batches.lock().unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_discard_drops_buffer() {
        let store = RecordingStore::default();
        let mut loader = BatchLoader::new(&store, 10);
        loader.push(cdr(1)).await.unwrap();
        loader.push(cdr(2)).await.unwrap();

        assert_eq!(loader.discard(), 2);
        assert_eq!(loader.flush().await.unwrap(), 0);
        assert_eq!(loader.total_inserted(), 0);
    }
}
