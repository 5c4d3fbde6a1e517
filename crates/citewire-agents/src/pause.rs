//! Ingestion pause gate.
//!
//! The answer pipeline and the background ingestion process share the
//! corpus. A turn may hold the gate for its duration so ingestion does
//! not land half-written articles mid-read. Reference counted so
//! overlapping turns compose; ingestion resumes only when the last
//! holder releases.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

/// Counting pause semaphore shared between turns and the ingester.
#[derive(Clone, Default)]
pub struct IngestGate {
    holders: Arc<AtomicUsize>,
}

impl IngestGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pause ingestion for the lifetime of the returned guard.
    pub fn acquire(&self) -> IngestPauseGuard {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        if holders == 1 {
            info!("Ingestion PAUSED");
        } else {
            debug!(holders, "Ingestion pause refcount raised");
        }
        IngestPauseGuard {
            holders: Arc::clone(&self.holders),
        }
    }

    /// Polled by the ingestion scheduler before each batch.
    pub fn can_proceed(&self) -> bool {
        self.holders.load(Ordering::SeqCst) == 0
    }

    /// Current number of pause holders.
    pub fn holder_count(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }
}

/// RAII release of one pause reference.
pub struct IngestPauseGuard {
    holders: Arc<AtomicUsize>,
}

impl Drop for IngestPauseGuard {
    fn drop(&mut self) {
        let remaining = self.holders.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 {
            info!("Ingestion RESUMED");
        } else {
            debug!(holders = remaining, "Ingestion pause refcount lowered");
        }
    }
}
