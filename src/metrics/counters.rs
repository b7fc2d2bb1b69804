//! Atomic counters for tunnel activity
//!
//! Lock-free counters that can be safely updated from any task.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics instance
pub static METRICS: Metrics = Metrics::new();

/// Atomic metrics counters
pub struct Metrics {
    // Tunnel metrics
    pub tunnels_total: AtomicU64,
    pub tunnels_active: AtomicU64,
    pub tunnels_failed: AtomicU64,

    // Traffic metrics
    pub bytes_up: AtomicU64,
    pub bytes_down: AtomicU64,

    // Request metrics
    pub health_checks: AtomicU64,
    pub requests_rejected: AtomicU64,

    // Error metrics
    pub timeouts_total: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            tunnels_total: AtomicU64::new(0),
            tunnels_active: AtomicU64::new(0),
            tunnels_failed: AtomicU64::new(0),
            bytes_up: AtomicU64::new(0),
            bytes_down: AtomicU64::new(0),
            health_checks: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            timeouts_total: AtomicU64::new(0),
        }
    }

    // Tunnel tracking
    #[inline]
    pub fn tunnel_opened(&self) {
        self.tunnels_total.fetch_add(1, Ordering::Relaxed);
        self.tunnels_active.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tunnel_closed(&self) {
        self.tunnels_active.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn tunnel_failed(&self) {
        self.tunnels_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Traffic tracking
    #[inline]
    pub fn bytes_up(&self, count: u64) {
        self.bytes_up.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn bytes_down(&self, count: u64) {
        self.bytes_down.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn health_check(&self) {
        self.health_checks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn timeout(&self) {
        self.timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tunnels_total: self.tunnels_total.load(Ordering::Relaxed),
            tunnels_active: self.tunnels_active.load(Ordering::Relaxed),
            tunnels_failed: self.tunnels_failed.load(Ordering::Relaxed),
            bytes_up: self.bytes_up.load(Ordering::Relaxed),
            bytes_down: self.bytes_down.load(Ordering::Relaxed),
            health_checks: self.health_checks.load(Ordering::Relaxed),
            requests_rejected: self.requests_rejected.load(Ordering::Relaxed),
            timeouts_total: self.timeouts_total.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub tunnels_total: u64,
    pub tunnels_active: u64,
    pub tunnels_failed: u64,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub health_checks: u64,
    pub requests_rejected: u64,
    pub timeouts_total: u64,
}
