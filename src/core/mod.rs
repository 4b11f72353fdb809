// LogMerge - core/mod.rs
//
// Core business logic layer: parsing, merging, filtering, export.
// Must NOT depend on: platform, app, or touch the filesystem directly.

pub mod export;
pub mod filter;
pub mod merge;
pub mod model;
pub mod parser;
