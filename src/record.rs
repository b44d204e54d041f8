//! Cursor over committed document records.
//!
//! Positions always settle on the first entry at or after the target whose
//! key starts with the active scope and whose trailing write time is at or
//! before the local visibility limit. Multiple physical versions of one
//! logical key exist (one per write); the filter walks past versions newer
//! than the snapshot one entry at a time.

use log::debug;

use crate::codec;
use crate::cursor::{seek_forward, Cursor};
use crate::error::Result;
use crate::hybrid_time::HybridTime;

pub struct RecordCursor<C> {
    iter: C,
    valid: bool,
}

impl<C: Cursor> RecordCursor<C> {
    pub fn new(iter: C) -> Self {
        Self { iter, valid: false }
    }

    pub fn seek(&mut self, key: &[u8], scope: &[u8], local_limit: HybridTime) -> Result<()> {
        self.iter.seek(key);
        self.skip_future_records(scope, local_limit)
    }

    pub fn seek_forward(&mut self, key: &[u8], scope: &[u8], local_limit: HybridTime) -> Result<()> {
        seek_forward(&mut self.iter, key);
        self.skip_future_records(scope, local_limit)
    }

    /// Skips every remaining version of exactly `subdoc_key`.
    pub fn seek_past_subkey(
        &mut self,
        subdoc_key: &[u8],
        scope: &[u8],
        local_limit: HybridTime,
    ) -> Result<()> {
        self.iter.seek(&codec::past_subkey_key(subdoc_key));
        self.skip_future_records(scope, local_limit)
    }

    /// Skips `subdoc_key` and everything nested under it.
    pub fn seek_out_of_subtree(
        &mut self,
        subdoc_key: &[u8],
        scope: &[u8],
        local_limit: HybridTime,
    ) -> Result<()> {
        seek_forward(&mut self.iter, &codec::out_of_subtree_key(subdoc_key));
        self.skip_future_records(scope, local_limit)
    }

    /// Re-applies the scope and time filter from the current position.
    pub fn refilter(&mut self, scope: &[u8], local_limit: HybridTime) -> Result<()> {
        self.skip_future_records(scope, local_limit)
    }

    fn skip_future_records(&mut self, scope: &[u8], local_limit: HybridTime) -> Result<()> {
        while self.iter.valid() {
            let key = self.iter.key();
            if !key.starts_with(scope) {
                debug!("record cursor left scope at key {key:?}");
                self.valid = false;
                return Ok(());
            }
            let doc_ht = match codec::decode_doc_time_from_end(key) {
                Ok(doc_ht) => doc_ht,
                Err(err) => {
                    self.valid = false;
                    return Err(err.into());
                }
            };
            if doc_ht.time <= local_limit {
                self.valid = true;
                return Ok(());
            }
            // Version newer than the snapshot; older versions of the same
            // logical key follow it.
            self.iter.next();
        }
        self.valid = false;
        Ok(())
    }

    pub fn valid(&self) -> bool {
        self.valid
    }

    pub fn current_key(&self) -> &[u8] {
        self.iter.key()
    }

    pub fn current_value(&self) -> &[u8] {
        self.iter.value()
    }

    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Raw engine cursor, for the reverse-positioning paths that bypass the
    /// visibility filter.
    pub(crate) fn raw(&mut self) -> &mut C {
        &mut self.iter
    }

    pub(crate) fn raw_ref(&self) -> &C {
        &self.iter
    }
}
