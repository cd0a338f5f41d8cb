//! Atomic counters for eval dispatch.
//!
//! Counters are updated silently by the dispatcher. Call
//! [`DispatchMetrics::flush`] to emit current values as a single
//! `tracing::info!` event (the bot does this after every eval).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Per-dispatcher counters. No allocations, no locking.
#[derive(Debug)]
pub struct DispatchMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    active: AtomicUsize,
    peak_active: AtomicUsize,
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchMetrics {
    pub const fn new() -> Self {
        Self {
            started: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            peak_active: AtomicUsize::new(0),
        }
    }

    /// Mark a child process as running until the returned guard drops.
    pub fn track_active(&self) -> ActiveGuard<'_> {
        self.started.fetch_add(1, Ordering::Relaxed);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);
        tracing::trace!(metric = "active", value = now, "gauge incremented");
        ActiveGuard { metrics: self }
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit all current values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            started = self.started(),
            succeeded = self.succeeded(),
            failed = self.failed(),
            timed_out = self.timed_out(),
            active = self.active(),
            peak_active = self.peak_active(),
        );
    }

    pub fn started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn timed_out(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Child processes currently alive.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive child processes seen.
    pub fn peak_active(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active gauge on drop.
#[must_use = "the process counts as active only while the guard lives"]
pub struct ActiveGuard<'a> {
    metrics: &'a DispatchMetrics,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.metrics.active.fetch_sub(1, Ordering::SeqCst);
    }
}
