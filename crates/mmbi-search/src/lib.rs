//! The derived search index and the worker that keeps it in step with the
//! primary store.
//!
//! Writes land in the primary store first, together with an outbox event.
//! [`IndexSync`] drains those events in order into a [`SearchIndex`]; readers
//! of the index observe changes eventually and can wait for them with
//! [`poll_until`].

pub mod error;
pub mod index;
pub mod sync;

pub use error::{IndexError, SyncError};
pub use index::MemoryIndex;
pub use sync::{IndexSync, SyncConfig, SyncHandle, poll_until};
