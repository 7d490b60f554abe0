// src/watch/mod.rs

//! File watching.
//!
//! Wires up a cross-platform filesystem watcher (`notify`) over the scan
//! folders and the cache root and turns its events into runtime file events.
//! It knows nothing about recognizers or sources; the conductor decides what
//! a path means.

pub mod event_handler;
pub mod watcher;

pub use event_handler::translate_event;
pub use watcher::{spawn_watcher, WatchRoot, WatcherHandle};
