//! Ordered storage cursor abstraction and an in-memory implementation.
//!
//! The document store keeps committed records and intents in two physically
//! separate keyspaces of one ordered engine. `txnview` only requires the
//! cursor surface below; [`MemStore`] provides it over sorted vectors for
//! tests and embedded use.

use std::sync::Arc;

use bytes::Bytes;

use crate::codec;
use crate::hybrid_time::DocHybridTime;
use crate::txn::{IntentType, TransactionId};

/// Forward/backward cursor over one keyspace. Ordering is lexicographic on
/// raw key bytes.
///
/// `key` and `value` must only be called while `valid()` holds.
pub trait Cursor {
    /// Positions at the first entry with key >= `key`.
    fn seek(&mut self, key: &[u8]);
    fn seek_to_last(&mut self);
    fn next(&mut self);
    fn prev(&mut self);
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
}

/// Seeks only when the cursor is not already at or past `target`, so repeated
/// forward seeks never move backwards.
pub fn seek_forward<C: Cursor + ?Sized>(cursor: &mut C, target: &[u8]) {
    if cursor.valid() && cursor.key() >= target {
        return;
    }
    cursor.seek(target);
}

/// In-memory two-keyspace store. Mutations are not visible to cursors created
/// earlier; each cursor reads a frozen copy.
#[derive(Debug, Default)]
pub struct MemStore {
    regular: Vec<(Bytes, Bytes)>,
    intents: Vec<(Bytes, Bytes)>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_regular(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        insert_sorted(&mut self.regular, key.into(), value.into());
    }

    pub fn insert_intent(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) {
        insert_sorted(&mut self.intents, key.into(), value.into());
    }

    /// Committed record: `doc_key` with `dht` appended.
    pub fn put_record(&mut self, doc_key: &[u8], dht: DocHybridTime, value: impl AsRef<[u8]>) {
        self.insert_regular(codec::record_key(doc_key, dht), value.as_ref().to_vec());
    }

    /// Provisional write owned by `txn_id`.
    pub fn put_intent(
        &mut self,
        doc_key: &[u8],
        intent_type: IntentType,
        dht: DocHybridTime,
        txn_id: TransactionId,
        payload: &[u8],
    ) {
        self.insert_intent(
            codec::intent_key(doc_key, intent_type, dht),
            codec::encode_intent_value(txn_id, payload),
        );
    }

    pub fn regular_cursor(&self) -> MemCursor {
        MemCursor::new(self.regular.clone())
    }

    pub fn intent_cursor(&self) -> MemCursor {
        MemCursor::new(self.intents.clone())
    }
}

fn insert_sorted(entries: &mut Vec<(Bytes, Bytes)>, key: Bytes, value: Bytes) {
    match entries.binary_search_by(|(k, _)| k.as_ref().cmp(key.as_ref())) {
        Ok(i) => entries[i] = (key, value),
        Err(i) => entries.insert(i, (key, value)),
    }
}

/// Cursor over a frozen sorted snapshot of one keyspace.
#[derive(Debug, Clone)]
pub struct MemCursor {
    entries: Arc<Vec<(Bytes, Bytes)>>,
    // entries.len() means "not positioned on an entry".
    pos: usize,
}

impl MemCursor {
    fn new(entries: Vec<(Bytes, Bytes)>) -> Self {
        let pos = entries.len();
        Self {
            entries: Arc::new(entries),
            pos,
        }
    }
}

impl Cursor for MemCursor {
    fn seek(&mut self, key: &[u8]) {
        self.pos = self.entries.partition_point(|(k, _)| k.as_ref() < key);
    }

    fn seek_to_last(&mut self) {
        self.pos = self.entries.len().saturating_sub(1);
    }

    fn next(&mut self) {
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
    }

    fn prev(&mut self) {
        if self.pos == 0 {
            self.pos = self.entries.len();
        } else {
            self.pos -= 1;
        }
    }

    fn valid(&self) -> bool {
        self.pos < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        self.entries[self.pos].0.as_ref()
    }

    fn value(&self) -> &[u8] {
        self.entries[self.pos].1.as_ref()
    }
}
