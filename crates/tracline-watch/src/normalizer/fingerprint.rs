//! Content fingerprints for best-effort rename pairing.

use std::fs::File;
use std::path::Path;

/// Size plus BLAKE3 digest of a file's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub size: u64,
    pub digest: [u8; 32],
}

/// Computes fingerprints. Injectable so the coalescer can be tested without
/// touching the file system.
pub trait Fingerprinter: Send + Sync {
    /// `None` if the file cannot be read.
    fn fingerprint(&self, path: &Path) -> Option<Fingerprint>;
}

/// Reads the file and hashes it with BLAKE3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Fingerprinter;

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Option<Fingerprint> {
        let meta = std::fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        let mut file = File::open(path).ok()?;
        let mut hasher = blake3::Hasher::new();
        hasher.update_reader(&mut file).ok()?;
        Some(Fingerprint {
            size: meta.len(),
            digest: *hasher.finalize().as_bytes(),
        })
    }
}
