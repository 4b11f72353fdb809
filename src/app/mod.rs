// LogMerge - app/mod.rs
//
// Application layer: background reload worker, change polling, and the
// published merged view.
// Dependencies: core, platform, util.

pub mod aggregator;
pub mod watcher;
