//! Counters for the redemption engine.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

/// Aggregated counters, cloneable via `Arc<Metrics>`.
pub struct Metrics {
    /// Total redemption attempts received, any outcome.
    pub redemptions_received: AtomicU64,
    /// Redemptions that ended in a prize.
    pub prizes_awarded: AtomicU64,
    /// Rejections for unknown tokens.
    pub rejected_invalid: AtomicU64,
    /// Rejections for already-spent tokens.
    pub rejected_used: AtomicU64,
    /// Same-token requests rejected while a draw was in flight.
    pub rejected_duplicate: AtomicU64,
    /// Redemptions that found the prize pool empty.
    pub draws_exhausted: AtomicU64,
    /// Redemptions that failed on a storage error.
    pub draws_failed: AtomicU64,
    /// Tokens minted through the admin surface.
    pub tokens_generated: AtomicU64,
    /// Sum of successful draw latencies in milliseconds.
    pub draw_latency_sum_ms: AtomicU64,
    /// Number of successful draws contributing to the latency sum.
    pub draw_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            redemptions_received: AtomicU64::new(0),
            prizes_awarded: AtomicU64::new(0),
            rejected_invalid: AtomicU64::new(0),
            rejected_used: AtomicU64::new(0),
            rejected_duplicate: AtomicU64::new(0),
            draws_exhausted: AtomicU64::new(0),
            draws_failed: AtomicU64::new(0),
            tokens_generated: AtomicU64::new(0),
            draw_latency_sum_ms: AtomicU64::new(0),
            draw_count: AtomicU64::new(0),
        }
    }

    pub fn record_redemption(&self) {
        self.redemptions_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful award with its end-to-end draw latency.
    pub fn record_award(&self, latency_ms: u64) {
        self.prizes_awarded.fetch_add(1, Ordering::Relaxed);
        self.draw_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
        self.draw_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.rejected_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_already_used(&self) {
        self.rejected_used.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.rejected_duplicate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.draws_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.draws_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tokens_generated(&self, count: u64) {
        self.tokens_generated.fetch_add(count, Ordering::Relaxed);
    }

    /// Average successful draw latency in milliseconds, or 0 if none.
    pub fn avg_draw_latency_ms(&self) -> u64 {
        let count = self.draw_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.draw_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    /// Serialize counters as a JSON value for the status endpoint.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "redemptions_received": self.redemptions_received.load(Ordering::Relaxed),
            "prizes_awarded": self.prizes_awarded.load(Ordering::Relaxed),
            "rejected_invalid": self.rejected_invalid.load(Ordering::Relaxed),
            "rejected_used": self.rejected_used.load(Ordering::Relaxed),
            "rejected_duplicate": self.rejected_duplicate.load(Ordering::Relaxed),
            "draws_exhausted": self.draws_exhausted.load(Ordering::Relaxed),
            "draws_failed": self.draws_failed.load(Ordering::Relaxed),
            "tokens_generated": self.tokens_generated.load(Ordering::Relaxed),
            "avg_draw_latency_ms": self.avg_draw_latency_ms(),
        })
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
