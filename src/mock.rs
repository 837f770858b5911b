//! A minimal in-memory stand-in for the network stack and handshake engine,
//! used by tests and the demo binary in place of a real transport layer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::endpoint::{Endpoint, EndpointId, ProtoFamily, Route};
use crate::error::{AcceptorError, Result};
use crate::network::{HandshakeEngine, HandshakeFactory, NetworkStack, Segment, SegmentFlags};

/// A fixed inbound segment, built by a test or the demo binary rather than
/// parsed off the wire.
pub struct MockSegment {
    id: EndpointId,
    flags: SegmentFlags,
    seq: u32,
    ack: u32,
    window: u16,
}

impl MockSegment {
    pub fn new(id: EndpointId, flags: SegmentFlags, seq: u32, ack: u32, window: u16) -> Self {
        Self { id, flags, seq, ack, window }
    }
}

impl Segment for MockSegment {
    fn flags(&self) -> SegmentFlags {
        self.flags
    }

    fn sequence_number(&self) -> u32 {
        self.seq
    }

    fn ack_number(&self) -> u32 {
        self.ack
    }

    fn window(&self) -> u16 {
        self.window
    }

    fn id(&self) -> EndpointId {
        self.id.clone()
    }

    fn route(&self) -> Route {
        Route(self.id.remote_addr.clone())
    }
}

/// Records every outbound SYN-ACK sent through it, and can be told to refuse
/// the next registration to exercise the registration-failure path.
#[derive(Default)]
pub struct MockNetworkStack {
    registered: Mutex<Vec<EndpointId>>,
    refuse_next_registration: AtomicBool,
    sent_syn_acks: Mutex<Vec<(EndpointId, u32, u32)>>,
}

impl MockNetworkStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refuse_next_registration(&self) {
        self.refuse_next_registration.store(true, Ordering::SeqCst);
    }

    pub fn sent_syn_acks(&self) -> Vec<(EndpointId, u32, u32)> {
        self.sent_syn_acks.lock().unwrap().clone()
    }
}

impl NetworkStack for MockNetworkStack {
    fn register_transport_endpoint(&self, id: &EndpointId, _proto: ProtoFamily) -> Result<()> {
        if self.refuse_next_registration.swap(false, Ordering::SeqCst) {
            return Err(AcceptorError::Registration(format!("refused registration for {:?}", id)));
        }
        self.registered.lock().unwrap().push(id.clone());
        Ok(())
    }

    fn send_syn_tcp(
        &self,
        _route: &Route,
        id: &EndpointId,
        _flags: SegmentFlags,
        seq: u32,
        ack: u32,
        _window: u16,
        _wnd_scale: Option<u8>,
    ) {
        self.sent_syn_acks.lock().unwrap().push((id.clone(), seq, ack));
    }
}

/// A handshake engine that completes (or fails) immediately, with no actual
/// I/O. Used for exercising the sub-threshold path in tests without a real
/// client.
pub struct MockHandshakeEngine {
    rcv_wnd_scale: u8,
    should_fail: bool,
}

#[async_trait]
impl HandshakeEngine for MockHandshakeEngine {
    fn reset_to_syn_rcvd(&mut self, _iss: u32, _irs: u32, _mss: u16, _snd_wnd_scale: Option<u8>) {}

    async fn execute(&mut self) -> Result<()> {
        if self.should_fail {
            Err(AcceptorError::Handshake("mock handshake configured to fail".into()))
        } else {
            Ok(())
        }
    }

    fn effective_rcv_wnd_scale(&self) -> u8 {
        self.rcv_wnd_scale
    }
}

/// Builds [`MockHandshakeEngine`]s that all behave the same way; set at
/// construction so a single factory can be reused across a test.
pub struct MockFactory {
    should_fail: bool,
    handshakes_built: AtomicU32,
}

impl MockFactory {
    pub fn always_succeeds() -> Self {
        Self {
            should_fail: false,
            handshakes_built: AtomicU32::new(0),
        }
    }

    pub fn always_fails() -> Self {
        Self {
            should_fail: true,
            handshakes_built: AtomicU32::new(0),
        }
    }

    pub fn handshakes_built(&self) -> u32 {
        self.handshakes_built.load(Ordering::SeqCst)
    }
}

impl HandshakeFactory for MockFactory {
    fn new_handshake(&self, _endpoint: Endpoint, _rcv_wnd: u16) -> Box<dyn HandshakeEngine> {
        self.handshakes_built.fetch_add(1, Ordering::SeqCst);
        Box::new(MockHandshakeEngine {
            rcv_wnd_scale: 7,
            should_fail: self.should_fail,
        })
    }
}
