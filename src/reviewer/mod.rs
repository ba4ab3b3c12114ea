//! Access request review loop.

pub mod watcher;
