//! Transport Mapping (RFC 3417; spec.md §4.1 "Transport binding").
//!
//! The dispatcher only ever reaches the network through this trait, so
//! swapping UDP for another transport mapping never touches
//! `core::dispatcher`. One dispatcher binds exactly one
//! `TransportDispatcher` at a time (spec.md invariant: single transport
//! binding per engine).

pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

pub use udp::UdpTransport;

/// Invoked once per inbound datagram, with the transport domain string
/// (e.g. `"udp"`) it arrived over.
pub type RecvCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Invoked on a fixed cadence so the dispatcher can age timeouts and
/// cached state (spec.md §4.2 "timer tick").
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// A transport mapping the dispatcher sends through and receives
/// callbacks from (RFC 3417 §2).
#[async_trait]
pub trait TransportDispatcher: Send + Sync {
    /// Registers the callback invoked for every inbound datagram. Only
    /// one receiver is ever registered per transport in this engine
    /// (the dispatcher itself); a second call replaces the first.
    fn register_recv_callback(&self, callback: RecvCallback);

    /// Registers the callback invoked on every timer tick.
    fn register_timer_callback(&self, callback: TimerCallback);

    async fn send_message(&self, transport_domain: &str, destination: SocketAddr, wire_bytes: Vec<u8>) -> Result<()>;

    /// Runs the receive loop and timer ticker until `shutdown` is
    /// called or the underlying socket errors out. Spawned onto its
    /// own task by the caller; does not return under normal operation.
    async fn run_dispatcher(self: Arc<Self>);

    /// Stops the receive loop and timer ticker started by
    /// `run_dispatcher`.
    async fn shutdown(&self);
}
