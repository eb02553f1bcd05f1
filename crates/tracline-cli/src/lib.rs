//! TracLine CLI library
//!
//! Command definitions and handlers behind the `tracline` binary:
//! `monitor` controls per-project file monitors, `trace` manages and reports
//! file/task associations.

pub mod cli;
pub mod commands;
pub mod config;
pub mod formatting;
pub mod logging;
