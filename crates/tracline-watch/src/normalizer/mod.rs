//! Event normalizer.
//!
//! [`spawn_normalizer`] drives an [`EventCoalescer`] from a raw event channel,
//! sleeping until the next per-path deadline. When the raw channel closes it
//! flushes every pending entry and then closes its output.

mod coalescer;
mod fingerprint;

pub use coalescer::EventCoalescer;
pub use fingerprint::{Blake3Fingerprinter, Fingerprint, Fingerprinter};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;
use tracline_core::FileEvent;

use crate::events::RawEvent;

/// Run the coalescer until `raw_rx` closes or `out_tx` is dropped.
pub fn spawn_normalizer(
    mut coalescer: EventCoalescer,
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    out_tx: mpsc::Sender<FileEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let next = coalescer.next_deadline();
            tokio::select! {
                maybe_raw = raw_rx.recv() => match maybe_raw {
                    Some(raw) => coalescer.push(raw, Instant::now()),
                    None => break,
                },
                _ = sleep_until(next.unwrap_or_else(Instant::now)), if next.is_some() => {
                    for event in coalescer.drain_due(Instant::now()) {
                        if out_tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }

        let remaining = coalescer.flush_all();
        debug!(flushed = remaining.len(), "raw channel closed, flushing");
        for event in remaining {
            if out_tx.send(event).await.is_err() {
                return;
            }
        }
    })
}
