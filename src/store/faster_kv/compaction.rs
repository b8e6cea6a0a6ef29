use std::sync::atomic::Ordering;

use crate::address::Address;
use crate::record::Key;
use crate::status::Status;
use crate::store::RmwContext;
use crate::value::Value;

use super::FasterKv;

/// Result of a compaction pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionResult {
    /// Status of the compaction
    pub status: Status,
    /// Records visited in the compacted range
    pub records_scanned: u64,
    /// Live records carried forward to the tail
    pub records_moved: u64,
    /// New begin address after compaction
    pub new_begin_address: Address,
}

impl CompactionResult {
    fn failure(status: Status) -> Self {
        Self {
            status,
            records_scanned: 0,
            records_moved: 0,
            new_begin_address: Address::INVALID,
        }
    }
}

impl FasterKv {
    /// Check if compaction is currently in progress
    pub fn is_compaction_in_progress(&self) -> bool {
        self.compaction_in_progress.load(Ordering::Acquire)
    }

    /// Carry every live record below `until` forward to the tail, then drop
    /// the range from the log.
    ///
    /// `until` is clamped to the read-only address, so only immutable
    /// records move. Each live record is moved through an RMW with the
    /// context built by `make_ctx`, whose copy hook decides what the moved
    /// record holds.
    pub fn compact<C, F>(&self, until: Address, mut make_ctx: F) -> CompactionResult
    where
        C: RmwContext,
        F: FnMut(Key, &Value<'_>) -> C,
    {
        if self
            .compaction_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return CompactionResult::failure(Status::Aborted);
        }

        let begin = self.hlog.begin_address();
        let until = until.min(self.hlog.read_only_address());
        let mut result = CompactionResult {
            status: Status::Ok,
            records_scanned: 0,
            records_moved: 0,
            new_begin_address: begin,
        };

        if until > begin {
            for (address, record) in self.hlog.scan(begin, until) {
                result.records_scanned += 1;
                let info = record.info();
                if info.is_invalid() || info.is_tombstone() {
                    continue;
                }
                // Only the newest version of a key survives the move.
                let key = record.key();
                match self.find_live(key) {
                    Some((live, _)) if live == address => {}
                    _ => continue,
                }

                let mut ctx = make_ctx(key, &record.value());
                let status = self.internal_rmw(&mut ctx, true);
                if !status.is_ok() {
                    result.status = status;
                    break;
                }
                result.records_moved += 1;
            }

            if result.status.is_ok() {
                self.hlog.shift_begin_address(until);
                result.new_begin_address = self.hlog.begin_address();
            }
        }

        self.compaction_in_progress.store(false, Ordering::Release);

        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                status = %result.status,
                scanned = result.records_scanned,
                moved = result.records_moved,
                begin = %result.new_begin_address,
                "compaction finished"
            );
        }
        result
    }
}
