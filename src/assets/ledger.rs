//! Tracking for temporary asset references.
//!
//! Every downloaded file or other per-run temporary is handed out as a
//! [`TempRef`]. Releasing consumes the reference, so it cannot happen twice;
//! a reference dropped without release is released anyway and logged as a
//! leak.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tempfile::TempPath;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    acquired: AtomicUsize,
    released: AtomicUsize,
    leaked: AtomicUsize,
}

/// Shared counters for temporary references
#[derive(Debug, Clone, Default)]
pub struct ReleaseLedger {
    counters: Arc<Counters>,
}

impl ReleaseLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new temporary reference, optionally owning a temp file
    pub fn acquire(&self, label: impl Into<String>, file: Option<TempPath>) -> TempRef {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        let label = label.into();
        debug!("Acquired temporary reference {}", label);
        TempRef {
            label,
            file,
            ledger: self.clone(),
            released: false,
        }
    }

    pub fn acquired(&self) -> usize {
        self.counters.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.counters.released.load(Ordering::SeqCst)
    }

    /// References released only because they were dropped
    pub fn leaked(&self) -> usize {
        self.counters.leaked.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }
}

/// A temporary reference that must be released exactly once
#[derive(Debug)]
pub struct TempRef {
    label: String,
    file: Option<TempPath>,
    ledger: ReleaseLedger,
    released: bool,
}

impl TempRef {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                warn!("Failed to remove temporary file for {}: {}", self.label, e);
            }
        }
        self.ledger.counters.released.fetch_add(1, Ordering::SeqCst);
        debug!("Released temporary reference {}", self.label);
    }
}

impl Drop for TempRef {
    fn drop(&mut self) {
        if !self.released {
            warn!("Temporary reference {} was never released; releasing on drop", self.label);
            self.ledger.counters.leaked.fetch_add(1, Ordering::SeqCst);
            self.release_inner();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_counts_once() {
        let ledger = ReleaseLedger::new();
        let first = ledger.acquire("a", None);
        let second = ledger.acquire("b", None);
        assert_eq!(ledger.outstanding(), 2);

        first.release();
        assert_eq!(ledger.released(), 1);
        second.release();
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.released(), 2);
        assert_eq!(ledger.leaked(), 0);
    }

    #[test]
    fn test_drop_releases_and_records_leak() {
        let ledger = ReleaseLedger::new();
        {
            let _leaked = ledger.acquire("forgotten", None);
        }
        assert_eq!(ledger.outstanding(), 0);
        assert_eq!(ledger.leaked(), 1);
    }

    #[test]
    fn test_release_removes_temp_file() {
        let ledger = ReleaseLedger::new();
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_path_buf();
        let temp = ledger.acquire("download", Some(file.into_temp_path()));
        assert_eq!(temp.path(), Some(path.as_path()));
        assert!(path.exists());

        temp.release();
        assert!(!path.exists());
    }
}
