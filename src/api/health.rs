//! Shared health state for the /health endpoint.
//! Updated by RealtimeManager and PickRefresher.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct HealthState {
    /// True while the realtime socket is joined and in its main loop.
    pub realtime_connected: AtomicBool,
    /// Entitlement events forwarded from the realtime channel since start.
    pub entitlement_events: AtomicU64,
    /// Consecutive failed pick refreshes (0 after any success).
    pub refresh_failures: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_realtime_connected(&self, v: bool) {
        self.realtime_connected.store(v, Ordering::Relaxed);
    }

    pub fn realtime_connected(&self) -> bool {
        self.realtime_connected.load(Ordering::Relaxed)
    }

    pub fn inc_entitlement_events(&self) {
        self.entitlement_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entitlement_events(&self) -> u64 {
        self.entitlement_events.load(Ordering::Relaxed)
    }

    pub fn record_refresh(&self, ok: bool) {
        if ok {
            self.refresh_failures.store(0, Ordering::Relaxed);
        } else {
            self.refresh_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn refresh_failures(&self) -> u64 {
        self.refresh_failures.load(Ordering::Relaxed)
    }
}
