#![allow(dead_code)]

use std::sync::Arc;

use bytes::Bytes;

use txnview::codec;
use txnview::cursor::{MemCursor, MemStore};
use txnview::{
    DocHybridTime, HybridTime, MemoryStatusProvider, ReadHybridTime, SnapshotIter,
    TransactionContext, TransactionId,
};

pub fn ht(t: u64) -> HybridTime {
    HybridTime(t)
}

pub fn dht(t: u64, w: u32) -> DocHybridTime {
    DocHybridTime::new(ht(t), w)
}

/// `name` terminated as a document key.
pub fn doc_key(name: &[u8]) -> Vec<u8> {
    let mut key = name.to_vec();
    key.push(codec::GROUP_END);
    key
}

pub fn plain_iter(store: &MemStore, read_time: ReadHybridTime) -> SnapshotIter<MemCursor> {
    SnapshotIter::new(store.regular_cursor(), None, read_time)
}

pub fn txn_iter(
    store: &MemStore,
    provider: Arc<MemoryStatusProvider>,
    txn_id: TransactionId,
    read_time: ReadHybridTime,
) -> SnapshotIter<MemCursor> {
    SnapshotIter::new(
        store.regular_cursor(),
        Some((
            store.intent_cursor(),
            TransactionContext::new(txn_id, provider),
        )),
        read_time,
    )
}

/// Walks the whole keyspace from the smallest key, one document key at a
/// time, returning `(doc_key, value, write_time)` triples.
pub async fn collect_all(
    iter: &mut SnapshotIter<MemCursor>,
) -> anyhow::Result<Vec<(Vec<u8>, Bytes, DocHybridTime)>> {
    let mut out = Vec::new();
    iter.seek(b"").await?;
    while iter.valid() {
        let key = iter.fetch_key()?;
        let value = iter.current_value()?;
        let time = codec::decode_doc_time_from_end(&key)?;
        let doc_key = codec::strip_time_suffix(&key)?.to_vec();
        out.push((doc_key.clone(), value, time));
        iter.seek_past_subkey(&doc_key).await?;
    }
    Ok(out)
}
