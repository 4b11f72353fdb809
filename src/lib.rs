// LogMerge - lib.rs
//
// Library entry point. The console front end in `main.rs` is a thin
// consumer of these modules; integration tests drive them directly.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
