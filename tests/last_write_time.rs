//! The combined last-write lookup used to resolve ancestor tombstones.

mod common;

use std::sync::Arc;

use common::*;
use txnview::cursor::MemStore;
use txnview::{
    DocHybridTime, IntentType, MemoryStatusProvider, ReadHybridTime, TransactionId, MAX_WRITE_ID,
};

#[tokio::test]
async fn newer_intent_beats_regular_tombstone() -> anyhow::Result<()> {
    // K3: regular tombstone at 5, foreign intent committed at 7.
    let provider = Arc::new(MemoryStatusProvider::new());
    let reader = TransactionId::random();
    let t1 = TransactionId::random();
    provider.commit(t1, ht(7));

    let k3 = doc_key(b"K3");
    let mut store = MemStore::new();
    store.put_record(&k3, dht(5, 0), b"tombstone");
    store.put_intent(&k3, IntentType::StrongWrite, dht(6, 0), t1, b"intent-val");

    let mut iter = txn_iter(&store, provider, reader, ReadHybridTime::single_time(ht(20)));
    let mut max_time = DocHybridTime::MIN;
    let value = iter.find_last_write_time(&k3, &mut max_time).await?;

    assert_eq!(max_time.time, ht(7));
    assert_eq!(value.as_deref(), Some(b"intent-val".as_slice()));
    Ok(())
}

#[tokio::test]
async fn regular_write_wins_exact_time_tie() -> anyhow::Result<()> {
    // Foreign intent committed at 7 ranks at (7, MAX_WRITE_ID); a committed
    // record at exactly that time takes precedence.
    let provider = Arc::new(MemoryStatusProvider::new());
    let reader = TransactionId::random();
    let t1 = TransactionId::random();
    provider.commit(t1, ht(7));

    let k = doc_key(b"K");
    let mut store = MemStore::new();
    store.put_record(&k, dht(7, MAX_WRITE_ID), b"regular");
    store.put_intent(&k, IntentType::StrongWrite, dht(6, 0), t1, b"intent-val");

    let mut iter = txn_iter(&store, provider, reader, ReadHybridTime::single_time(ht(20)));
    let mut max_time = DocHybridTime::MIN;
    let value = iter.find_last_write_time(&k, &mut max_time).await?;

    assert_eq!(max_time.time, ht(7));
    assert_eq!(value.as_deref(), Some(b"regular".as_slice()));
    Ok(())
}

#[tokio::test]
async fn newer_regular_write_beats_intent() -> anyhow::Result<()> {
    let provider = Arc::new(MemoryStatusProvider::new());
    let reader = TransactionId::random();
    let t1 = TransactionId::random();
    provider.commit(t1, ht(7));

    let k = doc_key(b"K");
    let mut store = MemStore::new();
    store.put_record(&k, dht(9, 0), b"regular");
    store.put_intent(&k, IntentType::StrongWrite, dht(6, 0), t1, b"intent-val");

    let mut iter = txn_iter(&store, provider, reader, ReadHybridTime::single_time(ht(20)));
    let mut max_time = DocHybridTime::MIN;
    let value = iter.find_last_write_time(&k, &mut max_time).await?;

    assert_eq!(max_time.time, ht(9));
    assert_eq!(value.as_deref(), Some(b"regular".as_slice()));
    Ok(())
}

#[tokio::test]
async fn regular_version_above_local_limit_is_ignored() -> anyhow::Result<()> {
    let k = doc_key(b"K");
    let mut store = MemStore::new();
    store.put_record(&k, dht(15, 0), b"future");
    store.put_record(&k, dht(4, 0), b"visible");

    let mut iter = plain_iter(&store, ReadHybridTime::single_time(ht(10)));
    let mut max_time = DocHybridTime::MIN;
    let value = iter.find_last_write_time(&k, &mut max_time).await?;

    assert_eq!(max_time.time, ht(4));
    assert_eq!(value.as_deref(), Some(b"visible".as_slice()));
    Ok(())
}

#[tokio::test]
async fn intents_for_other_keys_do_not_count() -> anyhow::Result<()> {
    let provider = Arc::new(MemoryStatusProvider::new());
    let reader = TransactionId::random();
    let t1 = TransactionId::random();
    provider.commit(t1, ht(7));

    let k = doc_key(b"K");
    let k_sub = [k.as_slice(), b"sub"].concat();
    let mut store = MemStore::new();
    store.put_intent(&k_sub, IntentType::StrongWrite, dht(6, 0), t1, b"sub-val");

    let mut iter = txn_iter(&store, provider, reader, ReadHybridTime::single_time(ht(20)));
    let mut max_time = DocHybridTime::MIN;
    let value = iter.find_last_write_time(&k, &mut max_time).await?;

    assert_eq!(max_time, DocHybridTime::MIN);
    assert_eq!(value, None);
    Ok(())
}

#[tokio::test]
async fn incoming_best_time_is_only_improved() -> anyhow::Result<()> {
    let k = doc_key(b"K");
    let mut store = MemStore::new();
    store.put_record(&k, dht(4, 0), b"old");

    let mut iter = plain_iter(&store, ReadHybridTime::single_time(ht(10)));
    let mut max_time = DocHybridTime::latest_at(ht(8));
    let value = iter.find_last_write_time(&k, &mut max_time).await?;

    assert_eq!(max_time, DocHybridTime::latest_at(ht(8)));
    assert_eq!(value, None);
    Ok(())
}
