//! Converse, a discussion forum engine.
//!
//! The engine keeps denormalized counters (`thread_count`, `post_count`,
//! `last_post_id` on boards, `reply_count` on threads) consistent across
//! thread and post creation, soft deletion, and moves. Every mutation runs
//! inside a single database transaction; simple cases adjust the counters
//! incrementally with a floor of zero, and structurally ambiguous cases
//! (moves, opening-post deletions, thread deletions) fall back to a full
//! recount from live rows.
//!
//! The crate is a library of operations meant to be driven by a request
//! router, which also supplies session identity, rendering, and the other
//! pieces of a complete site.

pub mod config;
pub mod error;
pub mod models;
pub mod moderation;
pub mod pagination;
pub mod schema;

pub use error::{Error, Result};
