//! Seams onto the external collaborators this subsystem dispatches to: the
//! IP stack / route table, the segment parser, and the handshake engine
//! that drives the sub-threshold three-way handshake to completion. None of
//! these are implemented here; [`crate::mock`] provides a minimal in-memory
//! stand-in used by the tests and the demo binary.

use std::sync::Arc;

use async_trait::async_trait;

use crate::endpoint::{Endpoint, EndpointId, ProtoFamily, Route};
use crate::error::Result;

/// The TCP flags of an inbound segment, as relevant to classification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SegmentFlags {
    pub syn: bool,
    pub ack: bool,
    pub rst: bool,
    pub fin: bool,
}

impl SegmentFlags {
    pub fn syn_ack() -> Self {
        Self {
            syn: true,
            ack: true,
            ..Default::default()
        }
    }

    /// Exactly SYN, nothing else.
    pub fn is_syn_only(&self) -> bool {
        self.syn && !self.ack && !self.rst && !self.fin
    }

    /// Exactly ACK, nothing else.
    pub fn is_ack_only(&self) -> bool {
        self.ack && !self.syn && !self.rst && !self.fin
    }
}

/// An inbound TCP segment. Implementations own reference counting for the
/// underlying packet buffer; the acceptor "takes a reference" by cloning
/// the `Arc<dyn Segment>` handle.
pub trait Segment: Send + Sync + 'static {
    fn flags(&self) -> SegmentFlags;
    fn sequence_number(&self) -> u32;
    fn ack_number(&self) -> u32;
    fn window(&self) -> u16;
    fn id(&self) -> EndpointId;
    fn route(&self) -> Route;
}

pub type SegmentRef = Arc<dyn Segment>;

/// Result of parsing a SYN's options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SynOptions {
    pub mss: u16,
    pub snd_wnd_scale: Option<u8>,
}

/// Parses the MSS and window-scale options off an inbound SYN.
pub trait OptionParser: Send + Sync + 'static {
    fn parse_syn_options(&self, segment: &dyn Segment) -> Option<SynOptions>;
}

/// The underlying network stack: transport demultiplexer registration and
/// raw segment transmission. Registering an already-registered 4-tuple is
/// the stack's job to reject; this subsystem relies on that to guarantee
/// at-most-one endpoint per flow. Both operations are synchronous from the
/// acceptor's point of view — only the handshake engine's `execute` needs
/// to suspend.
pub trait NetworkStack: Send + Sync + 'static {
    fn register_transport_endpoint(&self, id: &EndpointId, proto: ProtoFamily) -> Result<()>;

    fn send_syn_tcp(
        &self,
        route: &Route,
        id: &EndpointId,
        flags: SegmentFlags,
        seq: u32,
        ack: u32,
        window: u16,
        wnd_scale: Option<u8>,
    );
}

/// Drives one three-way handshake to completion for the sub-threshold
/// path. `execute` emits the SYN-ACK and awaits the client's ACK, bounded
/// by whatever retransmit/timeout policy the implementation applies.
#[async_trait]
pub trait HandshakeEngine: Send {
    fn reset_to_syn_rcvd(&mut self, iss: u32, irs: u32, mss: u16, snd_wnd_scale: Option<u8>);
    async fn execute(&mut self) -> Result<()>;
    fn effective_rcv_wnd_scale(&self) -> u8;
}

/// Constructs a fresh [`HandshakeEngine`] for a newly allocated endpoint.
pub trait HandshakeFactory: Send + Sync + 'static {
    fn new_handshake(&self, endpoint: Endpoint, rcv_wnd: u16) -> Box<dyn HandshakeEngine>;
}
