//! Message Processing Models (RFC 3412; spec.md §4.3): translate
//! between the Command Generator's PDU-level view and the wire
//! `SnmpMessage` envelope, selected per target by *mpModel*.

pub mod v1v2c;
pub mod v3;

use std::sync::Arc;

use crate::message::SecurityLevel;
use crate::pdu::Pdu;
use crate::security::{SecurityError, SecurityModel};
use crate::Result;

/// `mpModel` identifiers (RFC 3411 §5, spec.md §3 invariant I4).
pub const MP_MODEL_V1: i32 = 0;
pub const MP_MODEL_V2C: i32 = 1;
pub const MP_MODEL_V3: i32 = 3;

/// What the dispatcher supplies to marshal one outgoing request.
pub struct OutgoingMessageRequest<'a> {
    /// The target's `addrName`: a stable key the v3 model uses to
    /// remember a discovered remote engineID across requests. Ignored
    /// by v1/v2c, which carry no such state.
    pub target_key: &'a str,
    pub security_model: Arc<dyn SecurityModel>,
    pub security_name: &'a str,
    pub security_level: SecurityLevel,
    /// The contextEngineID to address. For v3 this doubles as the
    /// authoritative engine's ID; an empty slice here produces the
    /// unauthenticated discovery probe (spec.md §4.3 step 4).
    pub context_engine_id: &'a [u8],
    pub context_name: &'a [u8],
    pub pdu: Pdu,
    pub msg_max_size: i32,
    /// The dispatcher's best-known (boots, time) for the target
    /// engine, learned from a prior discovery Report; zero before
    /// discovery completes. Unused by v1/v2c.
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
}

/// The assembled wire message, plus whatever correlation state the
/// dispatcher needs to hold onto for this exchange.
pub struct PreparedMessage {
    pub wire_bytes: Vec<u8>,
    /// `Some` for v3 (the allocated msgID); `None` for v1/v2c, which
    /// correlate purely by the PDU's own `request_id`.
    pub msg_id: Option<i32>,
}

/// What a Message Processing Model recovers from one inbound datagram.
#[derive(Debug, Clone)]
pub struct DataElements {
    pub version: i64,
    pub msg_id: Option<i32>,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub pdu: Pdu,
    /// True for a v3 Report: the dispatcher checks this against any
    /// pending discovery handle for the sending target before treating
    /// the PDU as a genuine application response.
    pub is_report: bool,
    /// The sender's asserted identity (RFC 3414 §3.2.7). Empty for
    /// v1/v2c, which has no authoritative-engine concept.
    pub authoritative_engine_id: Vec<u8>,
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
}

/// Inbound processing failures, split along the tier-2/tier-3 line of
/// spec.md §7: `Malformed` is counted and the datagram silently
/// dropped; `Security` carries a per-request condition the dispatcher
/// still owes the waiting application an `errorIndication` for (if it
/// can recover enough of a correlation key to find the pending
/// request).
#[derive(Debug, Clone, thiserror::Error)]
pub enum MpIncomingError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("security processing failed: {error}")]
    Security {
        msg_id: Option<i32>,
        error: SecurityError,
    },
}

impl MpIncomingError {
    fn from_security(msg_id: Option<i32>, error: SecurityError) -> Self {
        match error {
            SecurityError::Malformed(s) => MpIncomingError::Malformed(s),
            other => MpIncomingError::Security {
                msg_id,
                error: other,
            },
        }
    }
}

/// A Message Processing Model, keyed in the engine's registry by its
/// `mpModel` number (0=v1, 1=v2c, 3=v3, RFC 3411 §5).
pub trait MessageProcessingModel: Send + Sync {
    fn mp_model(&self) -> i32;

    fn prepare_outgoing_message(
        &self,
        request: &OutgoingMessageRequest<'_>,
    ) -> Result<PreparedMessage>;

    fn prepare_data_elements(
        &self,
        whole_msg: &[u8],
    ) -> std::result::Result<DataElements, MpIncomingError>;

    /// Ages any cached outgoing-message state (v3's retransmission and
    /// discovery caches); a no-op for v1/v2c, which cache nothing.
    fn receive_timer_tick(&self, _time_now: std::time::Instant) {}

    /// The remote engineID (plus its last-known boots/time) this model
    /// has already discovered for `target_key`, if any. Always `None`
    /// for v1/v2c, which has no engine-discovery concept.
    fn known_remote_engine(&self, _target_key: &str) -> Option<(Vec<u8>, u32, u32)> {
        None
    }

    /// Records a discovered remote engine's identity for `target_key`
    /// so future requests skip the discovery handshake.
    fn learn_remote_engine(
        &self,
        _target_key: &str,
        _engine_id: &[u8],
        _engine_boots: u32,
        _engine_time: u32,
    ) {
    }

    /// Builds the unauthenticated probe used to discover a remote
    /// engine's identity (spec.md §4.3 step 4). `None` for models with
    /// no discovery handshake.
    fn build_discovery_probe(&self, _msg_max_size: i32) -> Option<Result<PreparedMessage>> {
        None
    }

    /// Returns the wire bytes this model cached for `msg_id`, if any,
    /// for the dispatcher's retransmission logic. v1/v2c correlate and
    /// retransmit purely from the dispatcher's own cache, so they
    /// never need this.
    fn cached_wire_bytes(&self, _msg_id: i32) -> Option<Vec<u8>> {
        None
    }
}
