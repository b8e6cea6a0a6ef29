//! Record-mutation contexts
//!
//! Concrete implementations of the store's context traits:
//!
//! - [`basic`]: plain read, upsert, delete and the additive counter RMW.
//! - [`mlkv`]: staleness-bounded read, upsert and lookahead, all driven
//!   through the store's RMW path so every access adjusts the record's
//!   staleness counter under its generation lock.

pub mod basic;
pub mod mlkv;

pub use basic::{IncrementContext, SimpleDeleteContext, SimpleReadContext, SimpleUpsertContext};
pub use mlkv::{
    MlkvLookaheadContext, MlkvReadContext, MlkvUpsertContext, StalenessPolicy,
    MLKV_LOOKAHEAD_STALENESS_INCR, MLKV_READ_STALENESS_INCR, MLKV_STALENESS_BOUND,
    MLKV_UPSERT_STALENESS_INCR,
};
