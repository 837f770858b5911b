//! The listen loop: the event demultiplexer that classifies inbound
//! segments and dispatches them to either a spawned handshake worker or the
//! stateless cookie path.

use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::context::ListenContext;
use crate::counter::HalfOpenCounter;
use crate::endpoint::Endpoint;
use crate::handshake::spawn_handshake_worker;
use crate::management::{ListenNotification, ReadinessEvents};
use crate::network::{OptionParser, SegmentRef};

/// Whether a listener is still accepting completed connections. Flipped to
/// `Closed` exactly once, by `shutdown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Closed,
}

/// Receive half of the bounded accept queue; a listener's owner drains this
/// to obtain completed connections.
pub type AcceptQueue = mpsc::Receiver<Endpoint>;

/// Check the listener is still open and enqueue `endpoint` under a single
/// read-lock acquisition, so a concurrent `shutdown` cannot flip the state
/// between the check and the enqueue. If the listener has already closed,
/// or the queue is full, the endpoint is closed instead of delivered.
///
/// Returns whether the endpoint was actually enqueued.
pub fn deliver_accepted(
    state: &Arc<RwLock<ListenerState>>,
    accept_tx: &mpsc::Sender<Endpoint>,
    events: &ReadinessEvents,
    endpoint: Endpoint,
) -> bool {
    let guard = state.read().expect("listener state lock poisoned");
    if *guard == ListenerState::Closed {
        drop(guard);
        endpoint.close();
        return false;
    }

    let send_result = accept_tx.try_send(endpoint);
    drop(guard);

    match send_result {
        Ok(()) => {
            events.fire_readable();
            true
        }
        Err(mpsc::error::TrySendError::Full(endpoint)) | Err(mpsc::error::TrySendError::Closed(endpoint)) => {
            warn!("accept queue full or closed, dropping completed connection");
            endpoint.close();
            false
        }
    }
}

/// Flip the listener to `Closed` and wake anyone blocked on readability or
/// writability exactly once. Idempotent: a second call is a no-op.
fn shutdown(state: &Arc<RwLock<ListenerState>>, events: &ReadinessEvents) {
    let mut guard = state.write().expect("listener state lock poisoned");
    if *guard == ListenerState::Closed {
        return;
    }
    *guard = ListenerState::Closed;
    drop(guard);

    events.fire_readable();
    events.fire_writable();
}

/// Owns the demultiplexing loop for one listener: classifies each inbound
/// segment per its flags and either spawns a handshake worker (below the
/// half-open threshold) or answers statelessly with a SYN cookie (at or
/// above it).
pub struct ListenLoop {
    context: ListenContext,
    counter: Arc<HalfOpenCounter>,
    options: Arc<dyn OptionParser>,
    state: Arc<RwLock<ListenerState>>,
    accept_tx: mpsc::Sender<Endpoint>,
    events: ReadinessEvents,
}

impl ListenLoop {
    /// `queue_capacity` bounds the accept queue; a full queue causes newly
    /// completed connections to be dropped (and closed) rather than block
    /// the loop.
    pub fn new(
        context: ListenContext,
        counter: Arc<HalfOpenCounter>,
        options: Arc<dyn OptionParser>,
        queue_capacity: usize,
    ) -> (Self, AcceptQueue, ReadinessEvents) {
        let (accept_tx, accept_rx) = mpsc::channel(queue_capacity);
        let events = ReadinessEvents::new();
        let loop_ = Self {
            context,
            counter,
            options,
            state: Arc::new(RwLock::new(ListenerState::Listening)),
            accept_tx,
            events: events.clone(),
        };
        (loop_, accept_rx, events)
    }

    /// A handle onto the listener's open/closed state, for tests that want
    /// to assert on it without going through `run`.
    pub fn state_handle(&self) -> Arc<RwLock<ListenerState>> {
        Arc::clone(&self.state)
    }

    /// Drive the loop until the segment channel closes or a close
    /// notification arrives. Either terminates the loop; a close
    /// notification additionally flips the listener to `Closed`.
    pub async fn run(self, mut segments: mpsc::Receiver<SegmentRef>, mut shutdown_rx: mpsc::Receiver<ListenNotification>) {
        loop {
            tokio::select! {
                maybe_segment = segments.recv() => {
                    match maybe_segment {
                        Some(segment) => self.handle_segment(segment).await,
                        None => break,
                    }
                }
                notification = shutdown_rx.recv() => {
                    if let Some(ListenNotification::Close) = notification {
                        shutdown(&self.state, &self.events);
                    }
                    break;
                }
            }
        }
    }

    async fn handle_segment(&self, segment: SegmentRef) {
        let flags = segment.flags();
        if flags.is_syn_only() {
            self.handle_syn(segment).await;
        } else if flags.is_ack_only() {
            self.handle_cookie_ack(segment);
        } else {
            debug!(?flags, "ignoring segment with unhandled flag combination");
        }
    }

    /// Below the threshold: claim a half-open slot and spawn a handshake
    /// worker. At or above it: answer statelessly with a cookie and keep no
    /// state at all.
    async fn handle_syn(&self, segment: SegmentRef) {
        let options = match self.options.parse_syn_options(segment.as_ref()) {
            Some(options) => options,
            None => {
                warn!("dropping SYN with unparsable options");
                return;
            }
        };

        if self.counter.try_inc() {
            let context = self.context.clone();
            let counter = Arc::clone(&self.counter);
            let state = Arc::clone(&self.state);
            let accept_tx = self.accept_tx.clone();
            let events = self.events.clone();

            spawn_handshake_worker(context, counter, segment, options.mss, options.snd_wnd_scale, move |result| {
                if let Ok(endpoint) = result {
                    deliver_accepted(&state, &accept_tx, &events, endpoint);
                }
            });
        } else {
            self.context.send_cookie_syn_ack(&segment, options.mss, options.snd_wnd_scale);
        }
    }

    /// The returning ACK of a stateless cookie exchange: recover the
    /// embedded MSS class, and if it checks out, allocate and register the
    /// endpoint directly (no handshake worker — the three-way handshake
    /// already completed on the wire).
    fn handle_cookie_ack(&self, segment: SegmentRef) {
        let id = segment.id();
        let cookie = segment.ack_number().wrapping_sub(1);
        let irs = segment.sequence_number().wrapping_sub(1);

        let mss = match self.context.validate_cookie_ack(&id, cookie, irs) {
            Some(mss) => mss,
            None => {
                debug!("dropping ACK with an invalid or expired cookie");
                return;
            }
        };

        match self.context.create_connected_endpoint(&segment, cookie, irs, mss, None) {
            Ok(endpoint) => {
                deliver_accepted(&self.state, &self.accept_tx, &self.events, endpoint);
            }
            Err(e) => error!(error = %e, "failed to register endpoint for validated cookie ACK"),
        }
    }
}
