//! The close-notification control signal and the paired readiness events an
//! application's accept loop waits on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

/// A single control signal delivered to a listen loop: currently just
/// close. Modeled as its own type (rather than folding it into the segment
/// channel) because the listen loop services it as an independent event
/// source per the §5 concurrency model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenNotification {
    Close,
}

/// Sender half handed to whoever controls listener lifecycle; closing is
/// idempotent, matching the loop's requirement that the close signal can be
/// delivered exactly once and still terminate cleanly.
#[derive(Clone)]
pub struct ShutdownSignal {
    tx: mpsc::Sender<ListenNotification>,
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    pub fn new() -> (Self, mpsc::Receiver<ListenNotification>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Self {
                tx,
                requested: Arc::new(AtomicBool::new(false)),
            },
            rx,
        )
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Request shutdown. Safe to call more than once; only the first call
    /// has an effect.
    pub fn initiate_shutdown(&self) {
        if !self.requested.swap(true, Ordering::Relaxed) {
            let _ = self.tx.try_send(ListenNotification::Close);
        }
    }
}

/// Readable/writable readiness notifications the application's accept call
/// waits on alongside draining the accept queue.
#[derive(Clone, Default)]
pub struct ReadinessEvents {
    readable: Arc<Notify>,
    writable: Arc<Notify>,
}

impl ReadinessEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire_readable(&self) {
        self.readable.notify_waiters();
    }

    pub fn fire_writable(&self) {
        self.writable.notify_waiters();
    }

    pub async fn readable(&self) {
        self.readable.notified().await;
    }

    pub async fn writable(&self) {
        self.writable.notified().await;
    }
}
