//! Memory allocator for the store
//!
//! This module provides the hybrid log: an append-only sequence of in-memory
//! pages addressed by a single logical address space.
//!
//! # Memory Regions
//!
//! The hybrid log is divided into three regions:
//!
//! ```text
//! ┌─────────┬──────────────┬────────────────────┐
//! │  Cold   │  Read-Only   │     Mutable        │
//! │ Region  │    Region    │      Region        │
//! └─────────┴──────────────┴────────────────────┘
//!     ↑            ↑               ↑            ↑
//!   begin     head_address   read_only_address  tail
//! ```
//!
//! - **Mutable Region**: Most recent records, updated in place under their
//!   generation lock
//! - **Read-Only Region**: Older records; updates relocate to the tail
//! - **Cold Region**: Records below `head_address`; reads of them complete
//!   through the session's pending queue

mod hybrid_log;

pub use hybrid_log::{HybridLog, HybridLogConfig, LogScanner, LogStats, DEFAULT_PAGE_BITS};
