//! `txnview` is the transaction-visibility layer of a document store built on
//! an ordered (LSM-style) key-value engine.
//!
//! Two physically separate keyspaces exist: committed document records and
//! provisional "intents" tagged with a transaction id. [`SnapshotIter`]
//! merges them into one time-consistent, prefix-scoped stream:
//! - committed records are filtered to the newest version at or before the
//!   snapshot's local visibility limit;
//! - intents are resolved per entry, own-transaction writes immediately and
//!   foreign writes through the commit-status oracle, retrying transient
//!   lookup failures with a fixed backoff;
//! - the iterator surfaces whichever side holds the smaller key, and a
//!   prefix stack bounds traversal to a sub-document.
//!
//! Errors are sticky: the first failure is stored and re-surfaced by every
//! later operation, so a caller can never observe partially advanced state
//! after a fault.

pub mod codec;
pub mod cursor;
pub mod error;
pub mod hybrid_time;
pub mod intent;
pub mod iter;
pub mod record;
pub mod txn;

pub use error::{Error, Result};
pub use hybrid_time::{DocHybridTime, HybridTime, ReadHybridTime, MAX_WRITE_ID};
pub use iter::SnapshotIter;
pub use txn::{
    IntentType, MemoryStatusProvider, TransactionContext, TransactionId, TransactionStatus,
    TransactionStatusProvider, TransactionStatusResult,
};
