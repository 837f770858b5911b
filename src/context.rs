use std::sync::Arc;

use tracing::warn;

use crate::cookie::CookieCodec;
use crate::endpoint::{Endpoint, EndpointId, EndpointState, ProtoFamily, ReceiverParams, SenderParams};
use crate::error::Result;
use crate::mss::{decode_mss, encode_mss};
use crate::network::{HandshakeFactory, NetworkStack, SegmentFlags, SegmentRef};

/// Per-listener state: the cookie codec, the advertised receive window, and
/// the handles onto the external network stack and handshake engine. Single
/// producer (the listen loop) with concurrent readers (handshake workers
/// calling back into `create_endpoint_and_perform_handshake`); the codec's
/// own hasher mutex is what makes that safe.
///
/// Nonces are drawn once at construction and never rotate for the lifetime
/// of the listener.
#[derive(Clone)]
pub struct ListenContext {
    codec: Arc<CookieCodec>,
    stack: Arc<dyn NetworkStack>,
    handshakes: Arc<dyn HandshakeFactory>,
    rcv_wnd: u16,
    net_proto: ProtoFamily,
    v6_only: bool,
}

impl ListenContext {
    pub fn new(
        stack: Arc<dyn NetworkStack>,
        handshakes: Arc<dyn HandshakeFactory>,
        rcv_wnd: u16,
        net_proto: ProtoFamily,
        v6_only: bool,
        max_ts_diff: u32,
    ) -> Self {
        Self {
            codec: Arc::new(CookieCodec::new(max_ts_diff)),
            stack,
            handshakes,
            rcv_wnd,
            net_proto,
            v6_only,
        }
    }

    pub fn rcv_wnd(&self) -> u16 {
        self.rcv_wnd
    }

    pub fn v6_only(&self) -> bool {
        self.v6_only
    }

    pub fn create_cookie(&self, id: &EndpointId, client_seq: u32, data: u32) -> u32 {
        self.codec.create_cookie(id, client_seq, data)
    }

    pub fn validate_cookie(&self, id: &EndpointId, cookie: u32, client_seq: u32) -> Option<u32> {
        self.codec.validate_cookie(id, cookie, client_seq)
    }

    /// Allocate a new endpoint for `segment`'s 4-tuple, register it with the
    /// stack's demultiplexer, and attach sender/receiver parameters. On
    /// registration failure the endpoint is closed and the error
    /// propagated; the caller never sees a half-registered endpoint.
    pub fn create_connected_endpoint(
        &self,
        segment: &SegmentRef,
        iss: u32,
        irs: u32,
        mss: u16,
        snd_wnd_scale: Option<u8>,
    ) -> Result<Endpoint> {
        let id = segment.id();
        let endpoint = Endpoint::new(id.clone());

        if let Err(e) = self.stack.register_transport_endpoint(&id, self.net_proto) {
            endpoint.close();
            return Err(e);
        }

        endpoint.set_state(EndpointState::Connected);
        endpoint.attach_sender(SenderParams {
            iss,
            peer_wnd: segment.window(),
            mss,
            snd_wnd_scale,
        });
        endpoint.attach_receiver(ReceiverParams {
            irs,
            rcv_wnd: self.rcv_wnd,
            rcv_wnd_scale: 0,
        });

        Ok(endpoint)
    }

    /// Sub-threshold path: mint a cookie as the initial send sequence, then
    /// drive a synchronous handshake to completion. The cookie is used here
    /// purely as a securely-derived ISN, not as a stateless acceptance
    /// token — the handshake engine still tracks SYN-RECEIVED state for
    /// this connection for as long as it runs.
    pub async fn create_endpoint_and_perform_handshake(
        &self,
        segment: &SegmentRef,
        mss: u16,
        snd_wnd_scale: Option<u8>,
    ) -> Result<Endpoint> {
        let id = segment.id();
        let client_seq = segment.sequence_number();
        let data = crate::mss::encode_mss(mss);
        let iss = self.create_cookie(&id, client_seq, data);
        let irs = client_seq;

        let endpoint = self.create_connected_endpoint(segment, iss, irs, mss, snd_wnd_scale)?;

        let mut handshake = self.handshakes.new_handshake(endpoint.clone(), self.rcv_wnd);
        handshake.reset_to_syn_rcvd(iss, irs, mss, snd_wnd_scale);

        match handshake.execute().await {
            Ok(()) => {
                endpoint.set_rcv_wnd_scale(handshake.effective_rcv_wnd_scale());
                Ok(endpoint)
            }
            Err(e) => {
                warn!(error = %e, "handshake failed, closing endpoint");
                endpoint.close();
                Err(e)
            }
        }
    }

    /// Stateless cookie path: validate a returning ACK and, if the embedded
    /// MSS class is sane, decode it back through the MSS table.
    pub fn validate_cookie_ack(&self, id: &EndpointId, cookie: u32, client_seq: u32) -> Option<u16> {
        let data = self.validate_cookie(id, cookie, client_seq)?;
        decode_mss(data)
    }

    /// At/above-threshold path: mint a cookie as the ISN and emit the
    /// SYN-ACK directly through the network stack, without allocating any
    /// endpoint or touching the half-open counter. Returns the cookie used
    /// as the initial send sequence, so callers can assert on it in tests.
    pub fn send_cookie_syn_ack(&self, segment: &SegmentRef, mss: u16, snd_wnd_scale: Option<u8>) -> u32 {
        let id = segment.id();
        let client_seq = segment.sequence_number();
        let data = encode_mss(mss);
        let iss = self.create_cookie(&id, client_seq, data);

        self.stack.send_syn_tcp(
            &segment.route(),
            &id,
            SegmentFlags::syn_ack(),
            iss,
            client_seq.wrapping_add(1),
            self.rcv_wnd,
            snd_wnd_scale,
        );

        iss
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFactory, MockNetworkStack, MockSegment};
    use crate::network::SegmentFlags;

    fn syn_segment(client_seq: u32) -> SegmentRef {
        Arc::new(MockSegment::new(
            EndpointId::new(vec![10, 0, 0, 1], 80, vec![10, 0, 0, 2], 5555),
            SegmentFlags { syn: true, ack: false, rst: false, fin: false },
            client_seq,
            0,
            65535,
        ))
    }

    #[test]
    fn send_cookie_syn_ack_emits_a_syn_ack_with_the_cookie_as_iss() {
        let stack = Arc::new(MockNetworkStack::new());
        let factory = Arc::new(MockFactory::always_succeeds());
        let ctx = ListenContext::new(Arc::clone(&stack), factory, 65535, ProtoFamily::V4, false, 2);

        let segment = syn_segment(777);
        let iss = ctx.send_cookie_syn_ack(&segment, 1440, None);

        let sent = stack.sent_syn_acks();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, iss);
        assert_eq!(sent[0].2, 778);
    }

    #[tokio::test]
    async fn registration_failure_closes_endpoint_and_propagates_error() {
        let stack = Arc::new(MockNetworkStack::new());
        stack.refuse_next_registration();
        let factory = Arc::new(MockFactory::always_succeeds());
        let ctx = ListenContext::new(stack, factory, 65535, ProtoFamily::V4, false, 2);

        let segment = syn_segment(1);
        let result = ctx.create_endpoint_and_perform_handshake(&segment, 1440, None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn successful_handshake_yields_a_connected_endpoint() {
        let stack = Arc::new(MockNetworkStack::new());
        let factory = Arc::new(MockFactory::always_succeeds());
        let ctx = ListenContext::new(stack, factory, 65535, ProtoFamily::V4, false, 2);

        let segment = syn_segment(42);
        let endpoint = ctx.create_endpoint_and_perform_handshake(&segment, 1460, Some(7)).await.unwrap();
        assert_eq!(endpoint.state(), EndpointState::Connected);
        assert_eq!(endpoint.receiver_params().unwrap().rcv_wnd_scale, 7);
    }
}
