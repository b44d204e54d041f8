//! Hybrid timestamps and read snapshots.
//!
//! `txnview` orders writes by `(HybridTime ASC, write_id ASC)`. A read is
//! described by a three-point snapshot: the reader's own read point plus the
//! local and global visibility limits.

/// Totally ordered logical timestamp (hybrid physical/logical clock value).
///
/// "Unset" is represented as `Option<HybridTime>` at interfaces rather than a
/// dedicated invalid sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HybridTime(pub u64);

impl HybridTime {
    pub const MIN: HybridTime = HybridTime(0);
    pub const MAX: HybridTime = HybridTime(u64::MAX);
}

impl std::fmt::Display for HybridTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ht{{{}}}", self.0)
    }
}

/// Sentinel write id meaning "latest possible write at this time".
///
/// Used when ranking committed foreign intents, whose commit time carries no
/// intra-transaction write order, and when building seek upper bounds.
pub const MAX_WRITE_ID: u32 = u32::MAX;

/// `HybridTime` plus an intra-timestamp write sequence number.
///
/// Disambiguates multiple writes recorded at the same logical time. Ordered
/// first by time, then by write id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DocHybridTime {
    pub time: HybridTime,
    pub write_id: u32,
}

impl DocHybridTime {
    pub const MIN: DocHybridTime = DocHybridTime {
        time: HybridTime::MIN,
        write_id: 0,
    };

    pub fn new(time: HybridTime, write_id: u32) -> Self {
        Self { time, write_id }
    }

    /// The latest possible write at `time`.
    pub fn latest_at(time: HybridTime) -> Self {
        Self {
            time,
            write_id: MAX_WRITE_ID,
        }
    }
}

impl std::fmt::Display for DocHybridTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ht{{{} w{}}}", self.time.0, self.write_id)
    }
}

/// Immutable read snapshot.
///
/// `read` bounds same-transaction visibility, `local_limit` bounds committed
/// records on this node, `global_limit` bounds remote commit-status queries.
/// `read <= local_limit <= global_limit` is expected but not enforced here;
/// callers supply a consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHybridTime {
    pub read: HybridTime,
    pub local_limit: HybridTime,
    pub global_limit: HybridTime,
}

impl ReadHybridTime {
    pub fn new(read: HybridTime, local_limit: HybridTime, global_limit: HybridTime) -> Self {
        Self {
            read,
            local_limit,
            global_limit,
        }
    }

    /// Snapshot with all three points at `time`.
    pub fn single_time(time: HybridTime) -> Self {
        Self {
            read: time,
            local_limit: time,
            global_limit: time,
        }
    }
}

impl std::fmt::Display for ReadHybridTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{ read: {} local: {} global: {} }}",
            self.read, self.local_limit, self.global_limit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_hybrid_time_ordering() {
        let a = DocHybridTime::new(HybridTime(5), 3);
        let b = DocHybridTime::new(HybridTime(5), 4);
        let c = DocHybridTime::new(HybridTime(6), 0);

        assert!(a < b);
        assert!(b < c);
        assert!(DocHybridTime::MIN < a);
        assert!(a < DocHybridTime::latest_at(HybridTime(5)));
    }
}
