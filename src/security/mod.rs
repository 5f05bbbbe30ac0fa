//! Security Models (spec.md §4.3, §4.4): apply or verify the
//! per-message security wrapper (community insertion, or USM
//! authentication/encryption).

pub mod community;
pub mod usm;

use crate::message::{MsgGlobalData, ScopedPdu};
use crate::Result;

pub use crate::message::SecurityLevel;

/// What a Security Model needs to armour an outgoing scopedPDU.
pub struct OutgoingSecurityRequest<'a> {
    pub security_name: &'a str,
    pub security_level: SecurityLevel,
    /// The authoritative engine's ID: our own for v1/v2c community
    /// processing and for USM when we are authoritative, the learned
    /// remote engineID for USM requests we originate.
    pub authoritative_engine_id: &'a [u8],
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
    pub scoped_pdu: &'a ScopedPdu,
}

/// The armoured message pieces a Security Model hands back to the
/// caller's Message Processing Model, which assembles them into the
/// final `SnmpMessage`.
pub struct OutgoingSecurityResult {
    pub msg_security_parameters: Vec<u8>,
    /// `Some` under authPriv: the ciphertext replacing the scopedPDU.
    pub encrypted_scoped_pdu: Option<Vec<u8>>,
    /// True when `msg_security_parameters` carries a 12-byte
    /// zeroed placeholder MAC that `finalize_mac` must compute and
    /// splice in once the whole message has been serialised.
    pub requires_mac_finalization: bool,
}

/// What a Security Model needs to verify/decrypt an incoming message.
pub struct IncomingSecurityRequest<'a> {
    pub msg_global_data: &'a MsgGlobalData,
    pub msg_security_parameters: &'a [u8],
    pub whole_message: &'a [u8],
    pub scoped_pdu: Option<&'a ScopedPdu>,
    pub encrypted_scoped_pdu: Option<&'a [u8]>,
}

#[derive(Debug, Clone)]
pub struct IncomingSecurityResult {
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub scoped_pdu: ScopedPdu,
    /// The peer's (boots, time) as asserted by this message, learned
    /// for USM's time-window cache.
    pub authoritative_engine_id: Vec<u8>,
    pub authoritative_engine_boots: u32,
    pub authoritative_engine_time: u32,
}

/// Transient, per-message security failures (spec.md §7). Kept
/// separate from `crate::Error`, which is reserved for configuration
/// and programming faults: these are per-request outcomes the
/// dispatcher turns into an `ErrorIndication` delivered to the
/// application, or (the `Malformed` tier-3 case) a silently-counted
/// protocol exception that never reaches the application at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SecurityError {
    #[error("unsupported security level")]
    UnsupportedSecurityLevel,
    #[error("unknown USM engine ID")]
    UnknownEngineId,
    #[error("authentication failure")]
    AuthenticationFailure,
    #[error("message outside the 150s time window")]
    NotInTimeWindow,
    #[error("decryption error")]
    DecryptionError,
    #[error("unknown security name")]
    UnknownSecurityName,
    /// A tier-3 protocol exception (malformed BER, truncated
    /// security parameters): counted and dropped, never surfaced as
    /// an `ErrorIndication`.
    #[error("malformed security parameters: {0}")]
    Malformed(String),
}

/// A Security Model, keyed in the engine's registry by its
/// `securityModel` number (1=v1, 2=v2c, 3=USM, RFC 3411 §5).
pub trait SecurityModel: Send + Sync {
    fn security_model(&self) -> i32;

    fn generate_request_msg(
        &self,
        request: &OutgoingSecurityRequest<'_>,
    ) -> Result<OutgoingSecurityResult>;

    fn process_incoming_msg(
        &self,
        request: &IncomingSecurityRequest<'_>,
    ) -> std::result::Result<IncomingSecurityResult, SecurityError>;

    /// Completes outgoing message-integrity processing once the
    /// Message Processing Model has serialised the whole message with
    /// `msg_security_parameters`'s MAC field zeroed (spec.md §4.4 step
    /// 4). Only meaningful when the preceding `generate_request_msg`
    /// set `requires_mac_finalization`; models without an integrity
    /// check (community) never need it.
    fn finalize_mac(
        &self,
        _security_name: &str,
        _authoritative_engine_id: &[u8],
        _whole_message_with_zeroed_mac: &[u8],
    ) -> Result<[u8; 12]> {
        Err(crate::Error::not_supported(
            "this security model has no message-integrity check",
        ))
    }

    /// Ages any cached per-engine replay-protection state.
    fn receive_timer_tick(&self, _time_now: std::time::Instant) {}
}

pub const SECURITY_MODEL_V1: i32 = 1;
pub const SECURITY_MODEL_V2C: i32 = 2;
pub const SECURITY_MODEL_USM: i32 = 3;
