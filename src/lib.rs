//! A SYN-flood-resilient TCP listen acceptor.
//!
//! Below a configurable half-open threshold, inbound SYNs are handed to a
//! spawned handshake worker that tracks SYN-RECEIVED state until the
//! three-way handshake completes. At or above the threshold, the acceptor
//! switches to stateless SYN cookies: the initial sequence number itself
//! carries a keyed, time-limited proof of the handshake, so no per-SYN
//! state is kept until the client's ACK returns.

pub mod config;
pub mod context;
pub mod cookie;
pub mod counter;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod listen;
pub mod management;
pub mod mock;
pub mod mss;
pub mod network;

pub use context::ListenContext;
pub use counter::HalfOpenCounter;
pub use endpoint::{Endpoint, EndpointId, EndpointState, ProtoFamily};
pub use error::{AcceptorError, Result};
pub use listen::{deliver_accepted, AcceptQueue, ListenLoop, ListenerState};
pub use management::{ListenNotification, ReadinessEvents, ShutdownSignal};
