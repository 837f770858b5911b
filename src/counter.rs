use std::sync::{Mutex, OnceLock};
use std::sync::Arc;

use metrics::gauge;
use tracing::debug;

/// Default `SynRcvdCountThreshold`, matching the textbook SYN-RECEIVED
/// backlog bound. Overridable per instance, and via [`HalfOpenCounter::global`]
/// for process-wide use.
pub const DEFAULT_THRESHOLD: u32 = 1000;

/// Process-wide bounded counter of connections currently in SYN-RECEIVED.
///
/// The threshold check and the increment are a single critical section
/// guarded by a mutex rather than a compare-and-swap loop: contention only
/// matters right at the threshold, and the mutex also rules out accounting
/// drift if a caller were to increment from more than one spawn site.
pub struct HalfOpenCounter {
    threshold: u32,
    value: Mutex<u32>,
}

impl HalfOpenCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            value: Mutex::new(0),
        }
    }

    /// The process-wide singleton, for production wiring. Tests should
    /// construct their own instance with [`HalfOpenCounter::new`] instead so
    /// they don't share state with other tests.
    pub fn global() -> Arc<HalfOpenCounter> {
        static GLOBAL: OnceLock<Arc<HalfOpenCounter>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(HalfOpenCounter::new(DEFAULT_THRESHOLD))))
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Attempt to claim a half-open slot. Returns `true` and increments the
    /// counter iff the count was below the threshold; this check and the
    /// increment happen under a single lock acquisition so two concurrent
    /// callers right at the threshold cannot both succeed.
    pub fn try_inc(&self) -> bool {
        let mut value = self.value.lock().expect("half-open counter mutex poisoned");
        if *value < self.threshold {
            *value += 1;
            gauge!("syn_acceptor_half_open_connections", *value as f64);
            true
        } else {
            false
        }
    }

    /// Release a half-open slot. Callers must only invoke this after a
    /// matching `try_inc` returned `true`; decrementing below zero is a
    /// caller bug, not a condition this type recovers from.
    pub fn dec(&self) {
        let mut value = self.value.lock().expect("half-open counter mutex poisoned");
        *value = value.checked_sub(1).unwrap_or_else(|| {
            debug!("half-open counter underflow: dec() without a matching try_inc()");
            0
        });
        gauge!("syn_acceptor_half_open_connections", *value as f64);
    }

    pub fn current(&self) -> u32 {
        *self.value.lock().expect("half-open counter mutex poisoned")
    }
}
