use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// The 4-tuple identifying a flow. Addresses are opaque byte strings; their
/// length is determined by the network protocol (4 bytes for v4, 16 for v6)
/// and the codec never interprets them beyond hashing the raw bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointId {
    pub local_addr: Vec<u8>,
    pub local_port: u16,
    pub remote_addr: Vec<u8>,
    pub remote_port: u16,
}

impl EndpointId {
    pub fn new(local_addr: Vec<u8>, local_port: u16, remote_addr: Vec<u8>, remote_port: u16) -> Self {
        Self {
            local_addr,
            local_port,
            remote_addr,
            remote_port,
        }
    }
}

/// Protocol family a listener serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtoFamily {
    V4,
    V6,
    Dual,
}

/// Opaque routing decision handed back by the segment; the acceptor never
/// inspects it, only threads it through to `send_syn_tcp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route(pub Vec<u8>);

/// Lifecycle states the acceptor cares about. `SynReceived` is owned by the
/// handshake subsystem; the acceptor itself only ever observes or sets
/// `Listen`, `Connected`, and `Closed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum EndpointState {
    Listen = 0,
    SynReceived = 1,
    Connected = 2,
    Closed = 3,
}

impl EndpointState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EndpointState::Listen,
            1 => EndpointState::SynReceived,
            2 => EndpointState::Connected,
            _ => EndpointState::Closed,
        }
    }
}

/// Parameters the sender was constructed with. The sliding-window send logic
/// itself lives in the (external) sender/receiver subsystem; the acceptor
/// only needs to know these were negotiated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SenderParams {
    pub iss: u32,
    pub peer_wnd: u16,
    pub mss: u16,
    pub snd_wnd_scale: Option<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReceiverParams {
    pub irs: u32,
    pub rcv_wnd: u16,
    pub rcv_wnd_scale: u8,
}

/// A TCP endpoint as seen by the acceptor: an identity, a state, and the
/// negotiated sender/receiver parameters once connected. Everything past
/// this — actual segment transmission, window management, retransmit
/// timers — belongs to the external endpoint lifecycle.
#[derive(Clone)]
pub struct Endpoint {
    id: EndpointId,
    state: Arc<AtomicU8>,
    inner: Arc<std::sync::Mutex<EndpointInner>>,
}

#[derive(Default)]
struct EndpointInner {
    sender: Option<SenderParams>,
    receiver: Option<ReceiverParams>,
}

impl Endpoint {
    pub fn new(id: EndpointId) -> Self {
        Self {
            id,
            state: Arc::new(AtomicU8::new(EndpointState::Listen as u8)),
            inner: Arc::new(std::sync::Mutex::new(EndpointInner::default())),
        }
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: EndpointState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn attach_sender(&self, params: SenderParams) {
        self.inner.lock().expect("endpoint mutex poisoned").sender = Some(params);
    }

    pub fn attach_receiver(&self, params: ReceiverParams) {
        self.inner.lock().expect("endpoint mutex poisoned").receiver = Some(params);
    }

    pub fn sender_params(&self) -> Option<SenderParams> {
        self.inner.lock().expect("endpoint mutex poisoned").sender
    }

    pub fn receiver_params(&self) -> Option<ReceiverParams> {
        self.inner.lock().expect("endpoint mutex poisoned").receiver
    }

    pub fn set_rcv_wnd_scale(&self, scale: u8) {
        if let Some(r) = self.inner.lock().expect("endpoint mutex poisoned").receiver.as_mut() {
            r.rcv_wnd_scale = scale;
        }
    }

    /// Transition the endpoint to `Closed`. Idempotent.
    pub fn close(&self) {
        self.set_state(EndpointState::Closed);
    }
}
