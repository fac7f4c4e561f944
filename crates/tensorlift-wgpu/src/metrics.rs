use std::sync::atomic::{AtomicU64, Ordering};

pub struct EngineMetrics {
    pipeline_cache_hits: AtomicU64,
    pipeline_cache_misses: AtomicU64,
    dispatches: AtomicU64,
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self {
            pipeline_cache_hits: AtomicU64::new(0),
            pipeline_cache_misses: AtomicU64::new(0),
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn inc_hit(&self) {
        self.pipeline_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_miss(&self) {
        self.pipeline_cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> (u64, u64) {
        (
            self.pipeline_cache_hits.load(Ordering::Relaxed),
            self.pipeline_cache_misses.load(Ordering::Relaxed),
        )
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.pipeline_cache_hits.store(0, Ordering::Relaxed);
        self.pipeline_cache_misses.store(0, Ordering::Relaxed);
        self.dispatches.store(0, Ordering::Relaxed);
    }
}
