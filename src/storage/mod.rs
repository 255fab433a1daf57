//! File-backed persistence primitives shared by the engine, store and retry manager.

pub mod journal;
pub mod lock;

pub use journal::Journal;
pub use lock::{FileLock, write_atomic};
