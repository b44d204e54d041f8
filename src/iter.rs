//! Merged, visibility-filtered iteration over committed records and intents.
//!
//! [`SnapshotIter`] owns one cursor per keyspace and presents whichever side
//! holds the lexicographically smaller key. The prefix stack bounds both
//! cursors to a sub-document; the innermost entry is the active scope.
//!
//! Error handling is sticky: the first failure is recorded and every later
//! operation short-circuits with the same error. `valid()` deliberately
//! reports `true` while an error is stored so that the caller's next key
//! fetch surfaces it; callers are expected to stop the scan on error rather
//! than continue past it.

use bytes::Bytes;
use log::debug;

use crate::codec;
use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::hybrid_time::{DocHybridTime, HybridTime, ReadHybridTime};
use crate::intent::IntentCursor;
use crate::record::RecordCursor;
use crate::txn::TransactionContext;

pub struct SnapshotIter<C> {
    record: RecordCursor<C>,
    intent: Option<IntentCursor<C>>,
    read_time: ReadHybridTime,
    prefix_stack: Vec<Bytes>,
    status: Result<()>,
    max_seen_ht: HybridTime,
}

impl<C: Cursor> SnapshotIter<C> {
    /// Builds an iterator over `regular` bound to `read_time`. Intent-aware
    /// reads additionally pass the intent-keyspace cursor and the reader's
    /// transaction context.
    pub fn new(
        regular: C,
        intent: Option<(C, TransactionContext)>,
        read_time: ReadHybridTime,
    ) -> Self {
        Self {
            record: RecordCursor::new(regular),
            intent: intent.map(|(iter, ctx)| IntentCursor::new(iter, ctx, read_time)),
            read_time,
            prefix_stack: Vec::new(),
            status: Ok(()),
            max_seen_ht: HybridTime::MIN,
        }
    }

    fn scope(&self) -> Bytes {
        self.prefix_stack.last().cloned().unwrap_or_default()
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        self.status = Err(err.clone());
        Err(err)
    }

    fn check<T>(&mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => self.fail(err),
        }
    }

    /// Positions both cursors at the start of `doc_key`.
    pub async fn seek(&mut self, doc_key: &[u8]) -> Result<()> {
        self.status.clone()?;
        debug!("seek({doc_key:?})");
        let scope = self.scope();
        let result = self.record.seek(doc_key, &scope, self.read_time.local_limit);
        self.check(result)?;
        let result = match self.intent.as_mut() {
            Some(intent) => {
                intent
                    .seek_and_scan(&codec::intent_prefix(doc_key), &scope)
                    .await
            }
            None => Ok(()),
        };
        self.check(result)
    }

    /// Forward-only variant of [`seek`](Self::seek) for keys without a time
    /// suffix.
    pub async fn seek_forward(&mut self, key: &[u8]) -> Result<()> {
        self.status.clone()?;
        debug!("seek_forward({key:?})");
        let scope = self.scope();
        let result = self
            .record
            .seek_forward(key, &scope, self.read_time.local_limit);
        self.check(result)?;
        self.seek_forward_intents(&codec::intent_prefix(key)).await
    }

    /// Steps over every version of `subdoc_key` at once by seeking to the key
    /// with the local limit appended as an upper time bound.
    pub async fn seek_forward_with_limit(&mut self, subdoc_key: &[u8]) -> Result<()> {
        let target = codec::upper_bound_key(subdoc_key, self.read_time.local_limit);
        self.seek_forward(&target).await
    }

    /// Skips every record and intent for exactly `subdoc_key`.
    pub async fn seek_past_subkey(&mut self, subdoc_key: &[u8]) -> Result<()> {
        self.status.clone()?;
        debug!("seek_past_subkey({subdoc_key:?})");
        let scope = self.scope();
        let result = self
            .record
            .seek_past_subkey(subdoc_key, &scope, self.read_time.local_limit);
        self.check(result)?;
        self.seek_forward_intents(&codec::intent_past_subkey_target(subdoc_key))
            .await
    }

    /// Skips `subdoc_key` and everything nested under it.
    pub async fn seek_out_of_subtree(&mut self, subdoc_key: &[u8]) -> Result<()> {
        self.status.clone()?;
        debug!("seek_out_of_subtree({subdoc_key:?})");
        let scope = self.scope();
        let result = self
            .record
            .seek_out_of_subtree(subdoc_key, &scope, self.read_time.local_limit);
        self.check(result)?;
        self.seek_forward_intents(&codec::intent_out_of_subtree_target(subdoc_key))
            .await
    }

    async fn seek_forward_intents(&mut self, target: &[u8]) -> Result<()> {
        let scope = self.scope();
        let result = match self.intent.as_mut() {
            Some(intent) => intent.seek_forward_to_suitable(target, &scope).await,
            None => Ok(()),
        };
        self.check(result)
    }

    /// Positions at the first entry of the last document in the keyspace.
    ///
    /// Reverse positioning is not yet supported while an intent cursor is
    /// present; the call is then a no-op.
    pub async fn seek_to_last_doc_key(&mut self) -> Result<()> {
        self.status.clone()?;
        if self.intent.is_some() {
            return Ok(());
        }
        self.record.raw().seek_to_last();
        if !self.record.raw_ref().valid() {
            self.record.invalidate();
            return Ok(());
        }
        let doc_key = match codec::first_doc_key(self.record.raw_ref().key()) {
            Ok(doc_key) => doc_key.to_vec(),
            Err(err) => return self.fail(err.into()),
        };
        self.seek(&doc_key).await
    }

    /// Positions at the first entry of the document preceding `doc_key`.
    pub async fn seek_to_previous_doc_key(&mut self, doc_key: &[u8]) -> Result<()> {
        self.seek(doc_key).await?;
        if !self.record.raw_ref().valid() {
            return self.seek_to_last_doc_key().await;
        }
        self.record.raw().prev();
        if !self.record.raw_ref().valid() {
            // Nothing before the first document.
            self.record.invalidate();
            return Ok(());
        }
        let prev_doc_key = match codec::first_doc_key(self.record.raw_ref().key()) {
            Ok(doc_key) => doc_key.to_vec(),
            Err(err) => return self.fail(err.into()),
        };
        self.seek(&prev_doc_key).await
    }

    /// True while a visible entry remains on either side, or while a stored
    /// error awaits the next key fetch.
    pub fn valid(&self) -> bool {
        self.status.is_err()
            || self.record.valid()
            || self
                .intent
                .as_ref()
                .is_some_and(|intent| intent.resolved().is_valid())
    }

    fn is_entry_regular(&self) -> bool {
        if !self.record.valid() {
            return false;
        }
        match self.intent.as_ref().and_then(|i| i.resolved().valid_data()) {
            Some(data) => self.record.current_key() < data.encoded_key.as_ref(),
            None => true,
        }
    }

    /// The current entry's encoded key: whichever of the regular key and the
    /// resolved intent's synthetic key compares smaller. Folds the key's
    /// write time into [`max_seen_ht`](Self::max_seen_ht).
    pub fn fetch_key(&mut self) -> Result<Bytes> {
        self.status.clone()?;
        let key = if self.is_entry_regular() {
            Bytes::copy_from_slice(self.record.current_key())
        } else {
            let resolved = self
                .intent
                .as_ref()
                .and_then(|i| i.resolved().valid_data())
                .map(|data| data.encoded_key.clone());
            match resolved {
                Some(key) => key,
                None => return self.fail(Error::NotPositioned),
            }
        };
        let doc_ht = match codec::decode_doc_time_from_end(&key) {
            Ok(doc_ht) => doc_ht,
            Err(err) => return self.fail(err.into()),
        };
        self.max_seen_ht = self.max_seen_ht.max(doc_ht.time);
        debug!(
            "fetched key with time {doc_ht}, read bounds {}",
            self.read_time
        );
        Ok(key)
    }

    /// The value paired with whichever key [`fetch_key`](Self::fetch_key)
    /// selects.
    pub fn current_value(&mut self) -> Result<Bytes> {
        self.status.clone()?;
        if self.is_entry_regular() {
            return Ok(Bytes::copy_from_slice(self.record.current_value()));
        }
        let resolved = self
            .intent
            .as_ref()
            .and_then(|i| i.resolved().valid_data())
            .map(|data| data.value.clone());
        match resolved {
            Some(value) => Ok(value),
            None => self.fail(Error::NotPositioned),
        }
    }

    /// Bounds traversal to `prefix` until the matching
    /// [`pop_scope`](Self::pop_scope).
    pub async fn push_scope(&mut self, prefix: &[u8]) -> Result<()> {
        self.status.clone()?;
        self.prefix_stack.push(Bytes::copy_from_slice(prefix));
        self.refilter().await
    }

    pub async fn pop_scope(&mut self) -> Result<()> {
        self.status.clone()?;
        self.prefix_stack.pop();
        self.refilter().await
    }

    async fn refilter(&mut self) -> Result<()> {
        let scope = self.scope();
        let result = self.record.refilter(&scope, self.read_time.local_limit);
        self.check(result)?;
        let result = match self.intent.as_mut() {
            Some(intent) => intent.apply_scope(&scope).await,
            None => Ok(()),
        };
        self.check(result)
    }

    /// Maximum hybrid time observed by key fetches, for the caller's
    /// read-restart decision.
    pub fn max_seen_ht(&self) -> HybridTime {
        self.max_seen_ht
    }

    /// Finds the most recent write or tombstone for exactly `doc_key` at or
    /// before the visibility limits, folding its time into `max_time`.
    ///
    /// Consults the intent keyspace first, then the committed records; when
    /// both land on the same time the committed record's value is returned.
    pub async fn find_last_write_time(
        &mut self,
        doc_key: &[u8],
        max_time: &mut DocHybridTime,
    ) -> Result<Option<Bytes>> {
        self.status.clone()?;
        let scope = self.scope();

        let mut intent_value = None;
        if self.intent.is_some() {
            let result = match self.intent.as_mut() {
                Some(intent) => {
                    intent
                        .seek_forward_to_suitable(&codec::intent_prefix(doc_key), &scope)
                        .await
                }
                None => Ok(()),
            };
            self.check(result)?;
            let improved = match self.intent.as_ref().and_then(|i| i.resolved().valid_data()) {
                Some(data) if data.time > *max_time && data.doc_key.as_ref() == doc_key => {
                    Some((data.time, data.value.clone()))
                }
                _ => None,
            };
            if let Some((time, value)) = improved {
                *max_time = time;
                self.max_seen_ht = self.max_seen_ht.max(time.time);
                intent_value = Some(value);
            }
        }

        let target = codec::upper_bound_key(doc_key, self.read_time.local_limit);
        let result = self
            .record
            .seek_forward(&target, &scope, self.read_time.local_limit);
        self.check(result)?;

        if self.record.valid() && codec::only_lacks_time_suffix(doc_key, self.record.current_key())
        {
            let doc_ht = match codec::decode_doc_time_from_end(self.record.current_key()) {
                Ok(doc_ht) => doc_ht,
                Err(err) => return self.fail(err.into()),
            };
            // A record tying the intent's time still wins; the intent value
            // only stands when it is strictly newest.
            let ties_with_intent = intent_value.is_some() && doc_ht == *max_time;
            if doc_ht > *max_time || ties_with_intent {
                *max_time = doc_ht;
                self.max_seen_ht = self.max_seen_ht.max(doc_ht.time);
                return Ok(Some(Bytes::copy_from_slice(self.record.current_value())));
            }
        }

        Ok(intent_value)
    }
}
