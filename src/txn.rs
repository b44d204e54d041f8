//! Transaction identity, intent classification, and commit-status lookup.
//!
//! The status oracle is an external, asynchronous service. Resolution awaits
//! its answer at an explicit suspension point; transient failures are retried
//! forever with a fixed delay, terminal answers and fatal failures end the
//! wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use uuid::Uuid;

use crate::error::Error;
use crate::hybrid_time::HybridTime;

/// Fixed backoff between transient status-lookup retries.
pub const STATUS_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Opaque fixed-size transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Intent classification.
///
/// Weak intents mark ancestor-path locks; only strong write intents carry a
/// value and are visibility candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IntentType {
    WeakRead = 0,
    WeakWrite = 1,
    StrongRead = 2,
    StrongWrite = 3,
}

impl IntentType {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::WeakRead),
            1 => Some(Self::WeakWrite),
            2 => Some(Self::StrongRead),
            3 => Some(Self::StrongWrite),
            _ => None,
        }
    }

    pub fn is_strong_write(self) -> bool {
        matches!(self, Self::StrongWrite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Committed,
    Aborted,
}

/// Terminal answer from the status oracle, as of the requested time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionStatusResult {
    pub status: TransactionStatus,
    pub status_time: HybridTime,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum StatusError {
    /// The oracle could not answer right now; the lookup must be re-issued.
    #[error("transaction status temporarily unavailable: {0}")]
    TryAgain(String),

    #[error("transaction status lookup failed: {0}")]
    Unavailable(String),
}

/// Commit-status oracle consumed by intent resolution.
///
/// `local_commit_time` is a best-effort synchronous cache of transactions
/// known to have committed on this node. `request_status_at` answers the
/// transaction's status as of `at`.
#[async_trait]
pub trait TransactionStatusProvider: Send + Sync {
    fn local_commit_time(&self, id: TransactionId) -> Option<HybridTime>;

    async fn request_status_at(
        &self,
        id: TransactionId,
        at: HybridTime,
    ) -> Result<TransactionStatusResult, StatusError>;
}

/// The reader's in-flight transaction. Its presence enables intent-aware
/// iteration.
#[derive(Clone)]
pub struct TransactionContext {
    pub transaction_id: TransactionId,
    pub provider: Arc<dyn TransactionStatusProvider>,
}

impl TransactionContext {
    pub fn new(transaction_id: TransactionId, provider: Arc<dyn TransactionStatusProvider>) -> Self {
        Self {
            transaction_id,
            provider,
        }
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("transaction_id", &self.transaction_id)
            .finish_non_exhaustive()
    }
}

/// Locally known commit time of `id`, clamped to "never visible" when the
/// local commit happened after `at`. `None` when this node knows nothing.
fn local_commit_time_at(
    provider: &dyn TransactionStatusProvider,
    id: TransactionId,
    at: HybridTime,
) -> Option<HybridTime> {
    provider.local_commit_time(id).map(|commit| {
        if commit <= at {
            commit
        } else {
            HybridTime::MIN
        }
    })
}

/// Commit time of `id` as of `at`, or `HybridTime::MIN` when not committed by
/// then.
///
/// Checks local commit memory first, then awaits the oracle. Transient
/// failures sleep [`STATUS_RETRY_DELAY`] and retry without limit; an aborted
/// answer falls back to local memory (covering commits applied locally after
/// the abort raced ahead); any other failure is fatal.
pub async fn commit_time(
    provider: &dyn TransactionStatusProvider,
    id: TransactionId,
    at: HybridTime,
) -> Result<HybridTime, Error> {
    if let Some(commit) = local_commit_time_at(provider, id, at) {
        return Ok(commit);
    }

    loop {
        match provider.request_status_at(id, at).await {
            Ok(result) => {
                debug!(
                    "transaction {id} at {at}: status {:?}, status time {}",
                    result.status, result.status_time
                );
                let commit = match result.status {
                    TransactionStatus::Committed => result.status_time,
                    TransactionStatus::Aborted => {
                        local_commit_time_at(provider, id, at).unwrap_or(HybridTime::MIN)
                    }
                };
                return Ok(commit);
            }
            Err(StatusError::TryAgain(reason)) => {
                warn!("transaction {id} status lookup must be retried: {reason}");
                tokio::time::sleep(STATUS_RETRY_DELAY).await;
            }
            Err(StatusError::Unavailable(reason)) => return Err(Error::Status(reason)),
        }
    }
}

#[derive(Default)]
struct StatusTable {
    commits: FxHashMap<TransactionId, HybridTime>,
    aborted: FxHashSet<TransactionId>,
    local_commits: FxHashMap<TransactionId, HybridTime>,
    transient_failures: FxHashMap<TransactionId, u32>,
}

/// In-memory status oracle for tests and embedded single-node use.
///
/// Reports `Committed` only when the recorded commit time is at or before the
/// requested time; a transaction committed later, aborted, or unknown is
/// reported `Aborted` as of that time.
#[derive(Default)]
pub struct MemoryStatusProvider {
    table: Mutex<StatusTable>,
    requests: AtomicU64,
}

impl MemoryStatusProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commit(&self, id: TransactionId, time: HybridTime) {
        self.table.lock().commits.insert(id, time);
    }

    pub fn abort(&self, id: TransactionId) {
        self.table.lock().aborted.insert(id);
    }

    pub fn set_local_commit_time(&self, id: TransactionId, time: HybridTime) {
        self.table.lock().local_commits.insert(id, time);
    }

    /// The next `count` status requests for `id` answer `TryAgain`.
    pub fn fail_transiently(&self, id: TransactionId, count: u32) {
        self.table.lock().transient_failures.insert(id, count);
    }

    /// Total `request_status_at` calls served, including transient failures.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TransactionStatusProvider for MemoryStatusProvider {
    fn local_commit_time(&self, id: TransactionId) -> Option<HybridTime> {
        self.table.lock().local_commits.get(&id).copied()
    }

    async fn request_status_at(
        &self,
        id: TransactionId,
        at: HybridTime,
    ) -> Result<TransactionStatusResult, StatusError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let mut table = self.table.lock();
        if let Some(remaining) = table.transient_failures.get_mut(&id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StatusError::TryAgain("status not yet available".into()));
            }
        }
        if table.aborted.contains(&id) {
            return Ok(TransactionStatusResult {
                status: TransactionStatus::Aborted,
                status_time: HybridTime::MIN,
            });
        }
        if let Some(&commit) = table.commits.get(&id) {
            if commit <= at {
                return Ok(TransactionStatusResult {
                    status: TransactionStatus::Committed,
                    status_time: commit,
                });
            }
        }
        // Aborted, unknown, or not yet committed as of `at`.
        Ok(TransactionStatusResult {
            status: TransactionStatus::Aborted,
            status_time: HybridTime::MIN,
        })
    }
}
