pub mod monitor;
pub mod trace;
