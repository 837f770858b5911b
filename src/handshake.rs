//! Sub-threshold handshake workers: one spawned task per SYN that carries a
//! connection through [`ListenContext::create_endpoint_and_perform_handshake`]
//! while holding a half-open slot.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;

use crate::context::ListenContext;
use crate::counter::HalfOpenCounter;
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::network::SegmentRef;

/// Releases the caller's half-open slot when dropped, regardless of how the
/// worker task exits — normal completion, an early `return`, or a panic
/// unwinding through the async block. This is the only place the counter is
/// decremented for the sub-threshold path; there is deliberately no direct
/// call to `HalfOpenCounter::dec` anywhere else in the worker.
struct DecGuard(Arc<HalfOpenCounter>);

impl Drop for DecGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// Spawn a worker that performs one sub-threshold handshake to completion
/// and hands the result to `deliver`.
///
/// The caller must have already claimed the half-open slot this worker
/// releases (i.e. called `counter.try_inc()` and had it return `true`)
/// before spawning.
pub fn spawn_handshake_worker(
    context: ListenContext,
    counter: Arc<HalfOpenCounter>,
    segment: SegmentRef,
    mss: u16,
    snd_wnd_scale: Option<u8>,
    deliver: impl FnOnce(Result<Endpoint>) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let _guard = DecGuard(counter);
        let result = context
            .create_endpoint_and_perform_handshake(&segment, mss, snd_wnd_scale)
            .await;
        if let Err(ref e) = result {
            error!(error = %e, "sub-threshold handshake did not complete");
        }
        deliver(result);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{EndpointId, ProtoFamily};
    use crate::mock::{MockFactory, MockNetworkStack, MockSegment};
    use crate::network::SegmentFlags;
    use std::sync::Mutex as StdMutex;

    fn segment(client_seq: u32) -> SegmentRef {
        Arc::new(MockSegment::new(
            EndpointId::new(vec![10, 0, 0, 1], 80, vec![10, 0, 0, 2], 5555),
            SegmentFlags {
                syn: true,
                ack: false,
                rst: false,
                fin: false,
            },
            client_seq,
            0,
            65535,
        ))
    }

    #[tokio::test]
    async fn worker_decrements_counter_on_success_and_delivers_endpoint() {
        let counter = Arc::new(HalfOpenCounter::new(10));
        assert!(counter.try_inc());

        let stack = Arc::new(MockNetworkStack::new());
        let factory = Arc::new(MockFactory::always_succeeds());
        let context = ListenContext::new(stack, factory, 65535, ProtoFamily::V4, false, 2);

        let delivered: Arc<StdMutex<Option<Result<Endpoint>>>> = Arc::new(StdMutex::new(None));
        let delivered2 = Arc::clone(&delivered);

        let handle = spawn_handshake_worker(context, Arc::clone(&counter), segment(100), 1460, None, move |result| {
            *delivered2.lock().unwrap() = Some(result);
        });
        handle.await.unwrap();

        assert_eq!(counter.current(), 0);
        assert!(delivered.lock().unwrap().take().unwrap().is_ok());
    }

    #[tokio::test]
    async fn worker_decrements_counter_even_when_handshake_fails() {
        let counter = Arc::new(HalfOpenCounter::new(10));
        assert!(counter.try_inc());

        let stack = Arc::new(MockNetworkStack::new());
        let factory = Arc::new(MockFactory::always_fails());
        let context = ListenContext::new(stack, factory, 65535, ProtoFamily::V4, false, 2);

        let handle = spawn_handshake_worker(context, Arc::clone(&counter), segment(100), 1460, None, |_| {});
        handle.await.unwrap();

        assert_eq!(counter.current(), 0);
    }
}
