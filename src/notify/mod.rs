//! File-change notification feeding the reload cycle.
//!
//! Wraps an OS-level watcher around a single file and forwards write events
//! through a single-slot channel to the reload coordinator.

pub mod watcher;

pub use watcher::FileWatcher;
