//! Cursor over the intent keyspace and per-intent visibility resolution.
//!
//! A scan parks on the first document key that has any visible intent and
//! retains the single best candidate for it: the strong write intent with the
//! greatest effective visibility time. Own-transaction intents are always
//! visible and are ranked by their own write time; foreign intents become
//! visible at their commit time, looked up through the status oracle.

use std::cmp::Ordering;

use bytes::Bytes;
use log::debug;

use crate::codec;
use crate::cursor::{seek_forward, Cursor};
use crate::error::Result;
use crate::hybrid_time::{DocHybridTime, HybridTime, ReadHybridTime};
use crate::txn::{commit_time, TransactionContext};

/// One intent entry decoded and resolved to its effective visibility time.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedWriteIntent {
    pub doc_key: Bytes,
    pub value: Bytes,
    /// `DocHybridTime::MIN` when the intent can never win (not a strong
    /// write, or owned by a transaction not committed by the global limit).
    pub value_time: DocHybridTime,
    pub same_transaction: bool,
}

/// Classifies one intent entry and determines its effective visibility time.
///
/// Own-transaction strong writes resolve to their own write time without any
/// oracle traffic. Foreign strong writes resolve to the owning transaction's
/// commit time as of `read_time.global_limit`, ranked with the maximum write
/// id since commit time carries no intra-transaction order.
pub(crate) async fn resolve_write_intent(
    ctx: &TransactionContext,
    read_time: &ReadHybridTime,
    key: &[u8],
    value: &[u8],
) -> Result<ResolvedWriteIntent> {
    let decoded = codec::decode_intent_key(key)?;
    let doc_key = Bytes::copy_from_slice(decoded.doc_key);

    if !decoded.intent_type.is_strong_write() {
        return Ok(ResolvedWriteIntent {
            doc_key,
            value: Bytes::new(),
            value_time: DocHybridTime::MIN,
            same_transaction: false,
        });
    }

    let (txn_id, payload) = codec::decode_intent_value(value)?;
    let payload = Bytes::copy_from_slice(payload);
    if txn_id == ctx.transaction_id {
        return Ok(ResolvedWriteIntent {
            doc_key,
            value: payload,
            value_time: decoded.doc_ht,
            same_transaction: true,
        });
    }

    let commit = commit_time(ctx.provider.as_ref(), txn_id, read_time.global_limit).await?;
    debug!("intent owner {txn_id} resolved to commit time {commit}");
    let value_time = if commit == HybridTime::MIN {
        DocHybridTime::MIN
    } else {
        DocHybridTime::latest_at(commit)
    };
    Ok(ResolvedWriteIntent {
        doc_key,
        value: payload,
        value_time,
        same_transaction: false,
    })
}

/// The retained candidate of a completed scan.
#[derive(Debug, Clone)]
pub struct ResolvedIntentData {
    pub doc_key: Bytes,
    /// `doc_key` with the chosen visibility time appended, directly
    /// comparable against committed-record keys.
    pub encoded_key: Bytes,
    pub value: Bytes,
    pub time: DocHybridTime,
}

/// Whether the intent cursor currently holds a visibility-confirmed
/// candidate, and whether it still falls inside the active scope.
#[derive(Debug, Clone, Default)]
pub enum ResolvedIntent {
    #[default]
    NoIntent,
    InvalidPrefix(ResolvedIntentData),
    Valid(ResolvedIntentData),
}

/// Result of re-checking a resolved candidate against a new scope.
enum Revalidation {
    Settled(ResolvedIntent),
    RescanRequired,
}

impl ResolvedIntent {
    pub fn data(&self) -> Option<&ResolvedIntentData> {
        match self {
            ResolvedIntent::NoIntent => None,
            ResolvedIntent::InvalidPrefix(data) | ResolvedIntent::Valid(data) => Some(data),
        }
    }

    pub fn valid_data(&self) -> Option<&ResolvedIntentData> {
        match self {
            ResolvedIntent::Valid(data) => Some(data),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ResolvedIntent::Valid(_))
    }

    fn classify(data: ResolvedIntentData, scope: &[u8]) -> Self {
        if data.doc_key.starts_with(scope) {
            ResolvedIntent::Valid(data)
        } else {
            ResolvedIntent::InvalidPrefix(data)
        }
    }

    /// Pure transition for a scope change. A candidate inside the new scope
    /// flips to `Valid`, one past it flips to `InvalidPrefix`; a candidate
    /// positioned before the new scope (or no candidate at all) requires a
    /// fresh scan.
    fn revalidate(self, scope: &[u8]) -> Revalidation {
        let data = match self {
            ResolvedIntent::NoIntent => return Revalidation::RescanRequired,
            ResolvedIntent::InvalidPrefix(data) | ResolvedIntent::Valid(data) => data,
        };
        if data.doc_key.starts_with(scope) {
            return Revalidation::Settled(ResolvedIntent::Valid(data));
        }
        let overlap = data.doc_key.len().min(scope.len());
        match data.doc_key[..overlap].cmp(&scope[..overlap]) {
            Ordering::Greater => Revalidation::Settled(ResolvedIntent::InvalidPrefix(data)),
            Ordering::Less | Ordering::Equal => Revalidation::RescanRequired,
        }
    }
}

/// Scan-local accumulator for the locked-in document key.
struct ScanCandidate {
    doc_key: Bytes,
    value: Bytes,
    time: DocHybridTime,
    /// Best write time seen from the reader's own transaction, for ranking
    /// own writes against each other by write order rather than commit time.
    own_txn_time: DocHybridTime,
}

impl ScanCandidate {
    fn new(doc_key: Bytes) -> Self {
        Self {
            doc_key,
            value: Bytes::new(),
            time: DocHybridTime::MIN,
            own_txn_time: DocHybridTime::MIN,
        }
    }
}

pub struct IntentCursor<C> {
    iter: C,
    resolved: ResolvedIntent,
    ctx: TransactionContext,
    read_time: ReadHybridTime,
}

impl<C: Cursor> IntentCursor<C> {
    pub fn new(iter: C, ctx: TransactionContext, read_time: ReadHybridTime) -> Self {
        Self {
            iter,
            resolved: ResolvedIntent::NoIntent,
            ctx,
            read_time,
        }
    }

    pub fn resolved(&self) -> &ResolvedIntent {
        &self.resolved
    }

    /// Absolute reposition: engine seek to `target`, then a fresh scan.
    pub async fn seek_and_scan(&mut self, target: &[u8], scope: &[u8]) -> Result<()> {
        self.iter.seek(target);
        self.scan(scope).await
    }

    /// Forward reposition. When the resolved candidate already sits at or
    /// after `target` the scan is skipped entirely; resolution is monotonic
    /// with forward seeking.
    pub async fn seek_forward_to_suitable(&mut self, target: &[u8], scope: &[u8]) -> Result<()> {
        if let Some(data) = self.resolved.data() {
            if codec::intent_prefix(&data.doc_key).as_slice() >= target {
                return Ok(());
            }
        }
        seek_forward(&mut self.iter, target);
        self.scan(scope).await
    }

    /// Re-checks the resolved candidate against a new scope, rescanning only
    /// when the pure transition cannot settle the state.
    pub async fn apply_scope(&mut self, scope: &[u8]) -> Result<()> {
        match std::mem::take(&mut self.resolved).revalidate(scope) {
            Revalidation::Settled(resolved) => {
                self.resolved = resolved;
                Ok(())
            }
            Revalidation::RescanRequired => self.scan(scope).await,
        }
    }

    /// Finds the latest suitable intent for the first document key that has
    /// any, starting from the current engine position.
    pub async fn scan(&mut self, scope: &[u8]) -> Result<()> {
        self.resolved = ResolvedIntent::NoIntent;
        let mut candidate: Option<ScanCandidate> = None;

        while self.iter.valid() {
            let key = self.iter.key();
            if !codec::is_intent_key(key) {
                break;
            }
            if let Some(current) = &candidate {
                // Only intents for the locked-in key are scanned; intents for
                // later keys are left for a future positioning call.
                if !codec::is_intent_for_same_key(key, &current.doc_key) {
                    break;
                }
            }
            if !key[1..].starts_with(scope) {
                break;
            }
            let resolved =
                resolve_write_intent(&self.ctx, &self.read_time, key, self.iter.value()).await?;
            Self::offer(&mut candidate, resolved, &self.read_time);
            self.iter.next();
        }

        if let Some(candidate) = candidate {
            let data = ResolvedIntentData {
                encoded_key: codec::record_key(&candidate.doc_key, candidate.time).into(),
                doc_key: candidate.doc_key,
                value: candidate.value,
                time: candidate.time,
            };
            debug!(
                "resolved intent for key {:?} at {}",
                data.doc_key, data.time
            );
            self.resolved = ResolvedIntent::classify(data, scope);
        }
        Ok(())
    }

    /// Offers one resolved intent to the candidate accumulator.
    ///
    /// Own-transaction intents compare against the best own-transaction time
    /// seen so far and, when retained, rank at the read point with the
    /// maximum write id (own writes are newer than the snapshot bound but
    /// must be ordered among themselves by write sequence). Foreign intents
    /// must also pass the local visibility limit.
    fn offer(
        candidate: &mut Option<ScanCandidate>,
        resolved: ResolvedWriteIntent,
        read_time: &ReadHybridTime,
    ) {
        let best_so_far = match candidate.as_ref() {
            Some(current) if resolved.same_transaction => current.own_txn_time,
            Some(current) => current.time,
            None => DocHybridTime::MIN,
        };
        let visible = resolved.value_time > best_so_far
            && (resolved.same_transaction || resolved.value_time.time <= read_time.local_limit);
        if !visible {
            return;
        }

        let current = candidate.get_or_insert_with(|| ScanCandidate::new(resolved.doc_key));
        if resolved.same_transaction {
            current.own_txn_time = resolved.value_time;
            current.time = DocHybridTime::latest_at(read_time.read);
        } else {
            current.time = resolved.value_time;
        }
        current.value = resolved.value;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cursor::MemStore;
    use crate::txn::{IntentType, MemoryStatusProvider, TransactionId};

    fn ht(t: u64) -> HybridTime {
        HybridTime(t)
    }

    fn dht(t: u64, w: u32) -> DocHybridTime {
        DocHybridTime::new(ht(t), w)
    }

    fn context(provider: Arc<MemoryStatusProvider>) -> TransactionContext {
        TransactionContext::new(TransactionId::random(), provider)
    }

    #[tokio::test]
    async fn later_foreign_commit_wins_same_key() {
        let provider = Arc::new(MemoryStatusProvider::new());
        let t1 = TransactionId::random();
        let t2 = TransactionId::random();
        provider.commit(t1, ht(5));
        provider.commit(t2, ht(9));

        let mut store = MemStore::new();
        store.put_intent(b"k\x05", IntentType::StrongWrite, dht(3, 0), t1, b"from-t1");
        store.put_intent(b"k\x05", IntentType::StrongWrite, dht(4, 0), t2, b"from-t2");

        let read_time = ReadHybridTime::single_time(ht(20));
        let mut cursor =
            IntentCursor::new(store.intent_cursor(), context(provider.clone()), read_time);
        cursor
            .seek_and_scan(&codec::intent_prefix(b"k\x05"), b"")
            .await
            .unwrap();

        let data = cursor.resolved().valid_data().expect("intent resolved");
        assert_eq!(data.value.as_ref(), b"from-t2");
        assert_eq!(data.time, DocHybridTime::latest_at(ht(9)));
    }

    #[tokio::test]
    async fn own_transaction_intent_needs_no_oracle_call() {
        let provider = Arc::new(MemoryStatusProvider::new());
        let ctx = context(provider.clone());

        let mut store = MemStore::new();
        store.put_intent(
            b"k\x05",
            IntentType::StrongWrite,
            dht(15, 2),
            ctx.transaction_id,
            b"own",
        );

        let read_time = ReadHybridTime::new(ht(12), ht(12), ht(12));
        let mut cursor = IntentCursor::new(store.intent_cursor(), ctx, read_time);
        cursor
            .seek_and_scan(&codec::intent_prefix(b"k\x05"), b"")
            .await
            .unwrap();

        let data = cursor.resolved().valid_data().expect("own intent resolved");
        assert_eq!(data.value.as_ref(), b"own");
        // Ranked at the read point, latest write id.
        assert_eq!(data.time, DocHybridTime::latest_at(ht(12)));
        assert_eq!(provider.request_count(), 0);
    }

    #[tokio::test]
    async fn weak_intents_are_never_candidates() {
        let provider = Arc::new(MemoryStatusProvider::new());
        let t1 = TransactionId::random();
        provider.commit(t1, ht(5));

        let mut store = MemStore::new();
        store.put_intent(b"k\x05", IntentType::WeakWrite, dht(3, 0), t1, b"");

        let read_time = ReadHybridTime::single_time(ht(20));
        let mut cursor = IntentCursor::new(store.intent_cursor(), context(provider), read_time);
        cursor
            .seek_and_scan(&codec::intent_prefix(b"k\x05"), b"")
            .await
            .unwrap();

        assert!(matches!(cursor.resolved(), ResolvedIntent::NoIntent));
    }

    #[tokio::test]
    async fn scan_parks_on_first_key_with_visible_intent() {
        let provider = Arc::new(MemoryStatusProvider::new());
        let aborted = TransactionId::random();
        let committed = TransactionId::random();
        provider.abort(aborted);
        provider.commit(committed, ht(5));

        let mut store = MemStore::new();
        store.put_intent(b"a\x05", IntentType::StrongWrite, dht(3, 0), aborted, b"x");
        store.put_intent(b"b\x05", IntentType::StrongWrite, dht(4, 0), committed, b"y");
        store.put_intent(b"c\x05", IntentType::StrongWrite, dht(4, 0), committed, b"z");

        let read_time = ReadHybridTime::single_time(ht(20));
        let mut cursor = IntentCursor::new(store.intent_cursor(), context(provider), read_time);
        cursor
            .seek_and_scan(&codec::intent_prefix(b"a\x05"), b"")
            .await
            .unwrap();

        let data = cursor.resolved().valid_data().expect("resolved");
        assert_eq!(data.doc_key.as_ref(), b"b\x05");
        assert_eq!(data.value.as_ref(), b"y");
    }

    #[tokio::test]
    async fn scope_revalidation_flips_without_rescan() {
        let provider = Arc::new(MemoryStatusProvider::new());
        let t1 = TransactionId::random();
        provider.commit(t1, ht(5));

        let mut store = MemStore::new();
        store.put_intent(b"k\x05", IntentType::StrongWrite, dht(3, 0), t1, b"v");

        let read_time = ReadHybridTime::single_time(ht(20));
        let mut cursor = IntentCursor::new(store.intent_cursor(), context(provider), read_time);
        cursor
            .seek_and_scan(&codec::intent_prefix(b"k\x05"), b"")
            .await
            .unwrap();
        assert!(cursor.resolved().is_valid());

        // Scope before the resolved key: flips to InvalidPrefix.
        cursor.apply_scope(b"a\x05").await.unwrap();
        assert!(matches!(cursor.resolved(), ResolvedIntent::InvalidPrefix(_)));

        // Widen back: flips to Valid again.
        cursor.apply_scope(b"").await.unwrap();
        assert!(cursor.resolved().is_valid());
    }
}
