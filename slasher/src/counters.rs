use core::sync::atomic::{AtomicU64, Ordering};

/// Running totals shared across the pipeline tasks. Receivers bump the
/// ingest counters; only the batch worker bumps the rest.
#[derive(Default, Debug)]
pub struct Counters {
    pub attestations_received: AtomicU64,
    pub attestations_filtered: AtomicU64,
    pub attestations_deferred: AtomicU64,
    pub attestations_dropped: AtomicU64,
    pub blocks_received: AtomicU64,
    pub batches_processed: AtomicU64,
    pub batches_aborted: AtomicU64,
    pub attester_slashings_found: AtomicU64,
    pub proposer_slashings_found: AtomicU64,
}

impl Counters {
    pub fn increment(counter: &AtomicU64) {
        Self::add(counter, 1);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    #[must_use]
    pub fn load(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
