//! FasterKV key-value store implementation
//!
//! This module provides the main FasterKV store implementation
//! along with session management and the operation context traits.

mod async_session;
mod contexts;
mod faster_kv;
mod session;

pub use async_session::AsyncSession;
pub use contexts::{DeleteContext, ReadContext, RmwContext, UpsertContext};
pub use faster_kv::{CompactionResult, FasterKv, FasterKvConfig};
pub use session::Session;
