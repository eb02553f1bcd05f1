//! # TracLine File Watching
//!
//! Turns OS file-change notifications into the canonical
//! [`FileEvent`](tracline_core::FileEvent) stream consumed by the monitor.
//!
//! ```text
//! ┌────────────────┐  RawEvent   ┌──────────────────┐  FileEvent  ┌──────────────┐
//! │  WatchAdapter  │────────────▶│ EventNormalizer  │────────────▶│   pipeline   │
//! │ (notify/poll)  │  unbounded  │ (debounce, pair) │   bounded   │ (store, log) │
//! └────────────────┘             └──────────────────┘             └──────────────┘
//! ```
//!
//! The adapter filters by extension and exclusion list but never debounces;
//! the normalizer coalesces bursts per path and pairs delete/create into
//! renames. Stopping the adapter closes its channel, which makes the
//! normalizer flush everything still pending and finish.

#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod backends;
pub mod error;
mod events;
pub mod normalizer;
pub mod traits;

pub use backends::{create_adapter, validate_root, NotifyWatcher};
pub use error::{Result, WatchError};
pub use events::{EventFilter, RawEvent};
pub use normalizer::{
    spawn_normalizer, Blake3Fingerprinter, EventCoalescer, Fingerprint, Fingerprinter,
};
pub use traits::WatchAdapter;
