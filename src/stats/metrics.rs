//! Metric counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::status::OperationType;

/// Operation statistics
#[derive(Debug)]
pub struct OperationStats {
    /// Read operation count
    pub reads: AtomicU64,
    /// Read hit count
    pub read_hits: AtomicU64,
    /// Read miss count
    pub read_misses: AtomicU64,
    /// Upsert operation count
    pub upserts: AtomicU64,
    /// RMW operation count
    pub rmws: AtomicU64,
    /// Delete operation count
    pub deletes: AtomicU64,
    /// Updates applied in place under the generation lock
    pub in_place_updates: AtomicU64,
    /// Updates that appended a relocated copy
    pub copy_updates: AtomicU64,
    /// Operations deferred to `complete_pending`
    pub pending: AtomicU64,
    /// Retries after losing a chain-head race
    pub retries: AtomicU64,
    started: Instant,
}

impl Default for OperationStats {
    fn default() -> Self {
        Self {
            reads: AtomicU64::new(0),
            read_hits: AtomicU64::new(0),
            read_misses: AtomicU64::new(0),
            upserts: AtomicU64::new(0),
            rmws: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
            in_place_updates: AtomicU64::new(0),
            copy_updates: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            started: Instant::now(),
        }
    }
}

impl OperationStats {
    /// Create new operation stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an operation of the given type
    pub fn record(&self, op: OperationType) {
        let counter = match op {
            OperationType::Read => &self.reads,
            OperationType::Upsert => &self.upserts,
            OperationType::Rmw => &self.rmws,
            OperationType::Delete => &self.deletes,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the outcome of a read
    pub fn record_read_result(&self, hit: bool) {
        if hit {
            self.read_hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.read_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an in-place update
    pub fn record_in_place(&self) {
        self.in_place_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a copy-forward update
    pub fn record_copy(&self) {
        self.copy_updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a deferred operation
    pub fn record_pending(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a retry
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Total operations recorded
    pub fn total_operations(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
            + self.upserts.load(Ordering::Relaxed)
            + self.rmws.load(Ordering::Relaxed)
            + self.deletes.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            elapsed: self.started.elapsed(),
            total_operations: self.total_operations(),
            reads: self.reads.load(Ordering::Relaxed),
            read_hits: self.read_hits.load(Ordering::Relaxed),
            read_misses: self.read_misses.load(Ordering::Relaxed),
            upserts: self.upserts.load(Ordering::Relaxed),
            rmws: self.rmws.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            in_place_updates: self.in_place_updates.load(Ordering::Relaxed),
            copy_updates: self.copy_updates.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`OperationStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Elapsed time since the store was opened
    pub elapsed: Duration,
    /// Total operations
    pub total_operations: u64,
    /// Read operations
    pub reads: u64,
    /// Read hits
    pub read_hits: u64,
    /// Read misses
    pub read_misses: u64,
    /// Upsert operations
    pub upserts: u64,
    /// RMW operations
    pub rmws: u64,
    /// Delete operations
    pub deletes: u64,
    /// In-place updates
    pub in_place_updates: u64,
    /// Copy-forward updates
    pub copy_updates: u64,
    /// Deferred operations
    pub pending: u64,
    /// Retries
    pub retries: u64,
}

impl StatsSnapshot {
    /// Operations per second since the store was opened
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_operations as f64 / secs
        } else {
            0.0
        }
    }

    /// Fraction of reads that found a record
    pub fn hit_rate(&self) -> f64 {
        let total = self.read_hits + self.read_misses;
        if total > 0 {
            self.read_hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== MLKV Statistics ===")?;
        writeln!(f, "Elapsed: {:.2?}", self.elapsed)?;
        writeln!(f)?;
        writeln!(f, "Operations:")?;
        writeln!(f, "  Total:    {}", self.total_operations)?;
        writeln!(
            f,
            "  Reads:    {} (hits: {}, rate: {:.2}%)",
            self.reads,
            self.read_hits,
            self.hit_rate() * 100.0
        )?;
        writeln!(f, "  Upserts:  {}", self.upserts)?;
        writeln!(f, "  RMWs:     {}", self.rmws)?;
        writeln!(f, "  Deletes:  {}", self.deletes)?;
        writeln!(f, "  Pending:  {}", self.pending)?;
        writeln!(f)?;
        writeln!(f, "Updates:")?;
        writeln!(f, "  In place: {}", self.in_place_updates)?;
        writeln!(f, "  Copied:   {}", self.copy_updates)?;
        writeln!(f, "  Retries:  {}", self.retries)?;
        write!(f, "Throughput: {:.2} ops/sec", self.throughput())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let stats = OperationStats::new();
        stats.record(OperationType::Upsert);
        stats.record_in_place();
        let text = stats.snapshot().to_string();
        assert!(text.contains("Upserts:  1"));
        assert!(text.contains("In place: 1"));
    }

    #[test]
    fn test_operation_stats() {
        let stats = OperationStats::new();
        stats.record(OperationType::Read);
        stats.record_read_result(true);
        stats.record(OperationType::Read);
        stats.record_read_result(false);
        stats.record(OperationType::Rmw);
        stats.record_copy();

        let snap = stats.snapshot();
        assert_eq!(snap.total_operations, 3);
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.rmws, 1);
        assert_eq!(snap.copy_updates, 1);
        assert!((snap.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}
