// LogMerge - platform/mod.rs
//
// Platform abstraction layer.
// Dependencies: standard library, directories, toml, memmap2, glob.
// Must NOT depend on: core, app.

pub mod config;
pub mod fs;
