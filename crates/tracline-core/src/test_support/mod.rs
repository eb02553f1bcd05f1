//! Test support utilities.
//!
//! In-memory implementations of every repository trait, shared by the unit
//! tests in this crate and by downstream crates through the `test-utils`
//! feature.

pub mod mocks;

pub use mocks::InMemoryStore;
