//! Holder-side record store.
//!
//! Plaintext records and their secret openings live only here, in process
//! memory, scoped to this holder context, never in the database and never in
//! a response body. The registry and verifier see commitments only.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;
use zk_proofs::commit::CommittedRecord;
use zk_proofs::types::Record;

pub struct StoredRecord {
    pub record: Record,
    pub committed: CommittedRecord,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct RecordStore {
    inner: Arc<RwLock<HashMap<Uuid, Arc<StoredRecord>>>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        record: Record,
        committed: CommittedRecord,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.inner
            .write()
            .expect("record store lock poisoned")
            .insert(id, Arc::new(StoredRecord { record, committed, created_at }));
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Arc<StoredRecord>> {
        self.inner
            .read()
            .expect("record store lock poisoned")
            .get(id)
            .cloned()
    }

    /// All records, newest first.
    pub fn list(&self) -> Vec<(Uuid, Arc<StoredRecord>)> {
        let mut entries: Vec<(Uuid, Arc<StoredRecord>)> = self
            .inner
            .read()
            .expect("record store lock poisoned")
            .iter()
            .map(|(id, r)| (*id, r.clone()))
            .collect();
        entries.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        entries
    }
}
