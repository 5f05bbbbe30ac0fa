//! The Message & PDU Dispatcher (RFC 3412 §4, §7; spec.md §4.2).
//!
//! Correlates one outgoing PDU with its eventual response (or
//! timeout), drives the engine-discovery handshake for SNMPv3 targets
//! whose remote engineID isn't yet known, and retransmits on a timer
//! per the target's configured retry count. Nothing here touches
//! socket I/O directly — that's the `transport` module's job, reached
//! only through the `TransportDispatcher` trait.

use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{oneshot, RwLock};
use tracing::{debug, trace, warn};

use crate::core::engine::SnmpEngine;
use crate::message::SecurityLevel;
use crate::mp::{MessageProcessingModel, MpIncomingError, OutgoingMessageRequest, MP_MODEL_V3};
use crate::pdu::{ErrorStatus, Pdu, VarBind};
use crate::security::{SecurityError, SecurityModel};
use crate::transport::TransportDispatcher;
use crate::{Error, Result};

/// A target fully resolved by the caller (typically the Command
/// Generator's Configuration Façade): everything the dispatcher needs
/// to address and secure one exchange, without itself knowing how
/// `addrName`/`paramsName` strings map to this data.
#[derive(Clone)]
pub struct ResolvedTarget {
    /// Stable key identifying this destination across requests; used
    /// only to scope the v3 discovery cache.
    pub target_key: String,
    pub mp_model: i32,
    pub mp: Arc<dyn MessageProcessingModel>,
    pub security_model: Arc<dyn SecurityModel>,
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub transport_domain: String,
    pub transport_address: SocketAddr,
    pub msg_max_size: i32,
    pub timeout: Duration,
    pub retries: u32,
}

pub type SendPduHandle = u64;

/// Outcomes the dispatcher can deliver instead of a genuine response
/// (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorIndication {
    RequestTimedOut,
    AuthenticationFailure,
    UnknownEngineId,
    NotInTimeWindow,
    DecryptionError,
    UnsupportedSecurityLevel,
    EngineShuttingDown,
}

impl ErrorIndication {
    fn from_security_error(error: &SecurityError) -> Option<Self> {
        match error {
            SecurityError::UnsupportedSecurityLevel => Some(Self::UnsupportedSecurityLevel),
            SecurityError::UnknownEngineId => Some(Self::UnknownEngineId),
            SecurityError::AuthenticationFailure => Some(Self::AuthenticationFailure),
            SecurityError::NotInTimeWindow => Some(Self::NotInTimeWindow),
            SecurityError::DecryptionError => Some(Self::DecryptionError),
            // No unknownUserName token exists at this layer; closest
            // in spirit is an authentication failure, since a manager
            // can't distinguish "user absent" from "user rejected"
            // without leaking which.
            SecurityError::UnknownSecurityName => Some(Self::AuthenticationFailure),
            SecurityError::Malformed(_) => None,
        }
    }
}

impl fmt::Display for ErrorIndication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            Self::RequestTimedOut => "requestTimedOut",
            Self::AuthenticationFailure => "authenticationFailure",
            Self::UnknownEngineId => "unknownEngineID",
            Self::NotInTimeWindow => "notInTimeWindow",
            Self::DecryptionError => "decryptionError",
            Self::UnsupportedSecurityLevel => "unsupportedSecurityLevel",
            Self::EngineShuttingDown => "engineShuttingDown",
        };
        f.write_str(token)
    }
}

/// What a Command Generator application eventually receives for one
/// `send_pdu` call.
#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub error_indication: Option<ErrorIndication>,
    pub error_status: ErrorStatus,
    pub error_index: i32,
    pub var_binds: Vec<VarBind>,
}

impl CommandResponse {
    fn indication(indication: ErrorIndication) -> Self {
        Self {
            error_indication: Some(indication),
            error_status: ErrorStatus::NoError,
            error_index: 0,
            var_binds: Vec::new(),
        }
    }

    fn from_pdu(pdu: Pdu) -> Self {
        Self {
            error_indication: None,
            error_status: pdu.error_status,
            error_index: pdu.error_index,
            var_binds: pdu.var_binds,
        }
    }
}

/// Tier-3 protocol-exception counters (spec.md §7): datagrams dropped
/// before they could be correlated to any pending request.
#[derive(Debug, Default)]
pub struct Counters {
    pub malformed_messages: AtomicU64,
    pub unknown_mp_model: AtomicU64,
    pub unknown_security_model: AtomicU64,
    pub unmatched_responses: AtomicU64,
}

impl Counters {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.malformed_messages.load(Ordering::Relaxed),
            self.unknown_mp_model.load(Ordering::Relaxed),
            self.unknown_security_model.load(Ordering::Relaxed),
            self.unmatched_responses.load(Ordering::Relaxed),
        )
    }
}

struct PendingRequest {
    target: ResolvedTarget,
    context_engine_id: Vec<u8>,
    context_name: Vec<u8>,
    pdu: Pdu,
    msg_id: Option<i32>,
    expect_response: bool,
    deadline: Instant,
    retries_remaining: u32,
    responder: Option<oneshot::Sender<CommandResponse>>,
    /// The last wire bytes actually put on the socket for this request.
    /// v3 also caches these (keyed by msgID) in the Message Processing
    /// Model itself, which `handle_timeout` prefers; this is the
    /// fallback every model gets for free, since v1/v2c carries no
    /// msgID to key a model-owned cache by (spec.md §4.2: "re-emit the
    /// cached wire bytes").
    last_wire_bytes: Option<Vec<u8>>,
}

struct DiscoveryWait {
    target: ResolvedTarget,
    queued_handles: Vec<SendPduHandle>,
}

/// The Message & PDU Dispatcher (spec.md §4.2).
pub struct Dispatcher {
    next_handle: AtomicU64,
    next_request_id: AtomicI32,
    pending: DashMap<SendPduHandle, PendingRequest>,
    by_msg_id: DashMap<i32, SendPduHandle>,
    by_request_id: DashMap<i32, SendPduHandle>,
    discovery_by_msg_id: DashMap<i32, String>,
    discovery_waits: DashMap<String, DiscoveryWait>,
    counters: Counters,
    transport: RwLock<Option<Arc<dyn TransportDispatcher>>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("pending", &self.pending.len())
            .field("discovery_waits", &self.discovery_waits.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            next_request_id: AtomicI32::new(1),
            pending: DashMap::new(),
            by_msg_id: DashMap::new(),
            by_request_id: DashMap::new(),
            discovery_by_msg_id: DashMap::new(),
            discovery_waits: DashMap::new(),
            counters: Counters::default(),
            transport: RwLock::new(None),
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub async fn bind_transport(&self, transport: Arc<dyn TransportDispatcher>) {
        *self.transport.write().await = Some(transport);
    }

    fn alloc_handle(&self) -> SendPduHandle {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// 31-bit request-id, monotonic, wraps away from zero (RFC 3416
    /// §4.1 `request-id ::= INTEGER (-2147483648..2147483647)`; we only
    /// use the non-negative half to stay unambiguous with GET-BULK's
    /// reuse of the same wire slot).
    fn alloc_request_id(&self) -> i32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
            if id != 0 {
                return id;
            }
        }
    }

    /// Sends `pdu` to `target`, returning a handle (for cancellation
    /// bookkeeping by the caller) and a receiver that resolves once a
    /// response, error indication, or timeout occurs. `expect_response
    /// = false` fires the send and resolves the receiver immediately
    /// with an empty, indication-free response (used for PDU types
    /// with no reply, none of which this crate currently originates,
    /// but kept for symmetry with the dispatcher's RFC 3412 contract).
    pub async fn send_pdu(
        &self,
        engine: &SnmpEngine,
        target: ResolvedTarget,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
        mut pdu: Pdu,
        expect_response: bool,
    ) -> Result<(SendPduHandle, oneshot::Receiver<CommandResponse>)> {
        pdu.request_id = self.alloc_request_id();
        let handle = self.alloc_handle();
        let (tx, rx) = oneshot::channel();

        let mut context_engine_id = context_engine_id;
        let mut boots = 0u32;
        let mut time = 0u32;
        if target.mp_model == MP_MODEL_V3 && context_engine_id.is_empty() {
            if let Some((known_id, known_boots, known_time)) = target.mp.known_remote_engine(&target.target_key) {
                context_engine_id = known_id;
                boots = known_boots;
                time = known_time;
            }
        }

        let needs_discovery =
            target.mp_model == MP_MODEL_V3 && context_engine_id.is_empty() && expect_response;

        let pending = PendingRequest {
            target: target.clone(),
            context_engine_id: context_engine_id.clone(),
            context_name: context_name.clone(),
            pdu: pdu.clone(),
            msg_id: None,
            expect_response,
            deadline: Instant::now() + target.timeout,
            retries_remaining: target.retries,
            responder: Some(tx),
            last_wire_bytes: None,
        };

        if needs_discovery {
            self.pending.insert(handle, pending);
            self.begin_discovery(engine, target, handle).await?;
        } else if !expect_response {
            self.pending.insert(handle, pending);
            self.transmit(engine, handle, &context_engine_id, &context_name, boots, time)
                .await?;
            if let Some((_, mut gone)) = self.pending.remove(&handle) {
                if let Some(responder) = gone.responder.take() {
                    let _ = responder.send(CommandResponse {
                        error_indication: None,
                        error_status: ErrorStatus::NoError,
                        error_index: 0,
                        var_binds: Vec::new(),
                    });
                }
            }
        } else {
            self.pending.insert(handle, pending);
            self.transmit(engine, handle, &context_engine_id, &context_name, boots, time)
                .await?;
        }

        Ok((handle, rx))
    }

    async fn begin_discovery(&self, engine: &SnmpEngine, target: ResolvedTarget, handle: SendPduHandle) -> Result<()> {
        match self.discovery_waits.get_mut(&target.target_key) {
            Some(mut wait) => {
                wait.queued_handles.push(handle);
                return Ok(());
            }
            None => {}
        }

        let prepared = target
            .mp
            .build_discovery_probe(target.msg_max_size)
            .ok_or_else(|| Error::not_supported("this mpModel has no discovery handshake"))??;

        let msg_id = prepared
            .msg_id
            .ok_or_else(|| Error::internal("discovery probe carries no msgID"))?;

        self.discovery_by_msg_id.insert(msg_id, target.target_key.clone());
        self.discovery_waits.insert(
            target.target_key.clone(),
            DiscoveryWait {
                target: target.clone(),
                queued_handles: vec![handle],
            },
        );

        self.send_wire(engine, &target.transport_domain, target.transport_address, prepared.wire_bytes)
            .await
    }

    async fn transmit(
        &self,
        engine: &SnmpEngine,
        handle: SendPduHandle,
        context_engine_id: &[u8],
        context_name: &[u8],
        authoritative_engine_boots: u32,
        authoritative_engine_time: u32,
    ) -> Result<()> {
        let (target, pdu) = {
            let entry = self
                .pending
                .get(&handle)
                .ok_or_else(|| Error::internal("transmit called for an unknown handle"))?;
            (entry.target.clone(), entry.pdu.clone())
        };

        let request = OutgoingMessageRequest {
            target_key: &target.target_key,
            security_model: target.security_model.clone(),
            security_name: &target.security_name,
            security_level: target.security_level,
            context_engine_id,
            context_name,
            pdu,
            msg_max_size: target.msg_max_size,
            authoritative_engine_boots,
            authoritative_engine_time,
        };

        let prepared = target.mp.prepare_outgoing_message(&request)?;

        if let Some(mut entry) = self.pending.get_mut(&handle) {
            entry.msg_id = prepared.msg_id;
            entry.deadline = Instant::now() + entry.target.timeout;
            entry.last_wire_bytes = Some(prepared.wire_bytes.clone());
        }
        if let Some(msg_id) = prepared.msg_id {
            self.by_msg_id.insert(msg_id, handle);
        } else {
            let request_id = self
                .pending
                .get(&handle)
                .map(|e| e.pdu.request_id)
                .ok_or_else(|| Error::internal("pending request vanished mid-transmit"))?;
            self.by_request_id.insert(request_id, handle);
        }

        let _ = engine;
        self.send_wire(engine, &target.transport_domain, target.transport_address, prepared.wire_bytes)
            .await
    }

    async fn send_wire(
        &self,
        _engine: &SnmpEngine,
        transport_domain: &str,
        transport_address: SocketAddr,
        wire_bytes: Vec<u8>,
    ) -> Result<()> {
        let transport = self
            .transport
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::transport("no transport dispatcher is bound"))?;
        transport
            .send_message(transport_domain, transport_address, wire_bytes)
            .await
    }

    /// Feeds one inbound datagram through the appropriate Message
    /// Processing Model and correlates the result with a pending
    /// request, a pending discovery, or neither (a tier-3 protocol
    /// exception, silently counted per spec.md §7).
    pub async fn receive_message(&self, engine: &SnmpEngine, _transport_domain: &str, whole_msg: &[u8]) {
        let mp_model = match peek_mp_model(whole_msg) {
            Some(m) => m,
            None => {
                Counters::incr(&self.counters.malformed_messages);
                trace!("dropped datagram with unrecognised SNMP version");
                return;
            }
        };

        let mp = match engine.message_processing_model(mp_model) {
            Some(mp) => mp,
            None => {
                Counters::incr(&self.counters.unknown_mp_model);
                warn!(mp_model, "no Message Processing Model registered for mpModel");
                return;
            }
        };

        match mp.prepare_data_elements(whole_msg) {
            Ok(elements) => {
                if elements.is_report {
                    if let Some(msg_id) = elements.msg_id {
                        if self.discovery_by_msg_id.contains_key(&msg_id) {
                            self.complete_discovery(engine, msg_id, &elements).await;
                            return;
                        }
                    }
                    debug!("dropped unsolicited Report PDU");
                    return;
                }
                self.complete_response(elements).await;
            }
            Err(MpIncomingError::Malformed(reason)) => {
                Counters::incr(&self.counters.malformed_messages);
                trace!(%reason, "dropped malformed message");
            }
            Err(MpIncomingError::Security { msg_id, error }) => {
                Counters::incr(&self.counters.unknown_security_model);
                self.deliver_security_error(msg_id, error).await;
            }
        }
    }

    async fn complete_discovery(&self, engine: &SnmpEngine, msg_id: i32, elements: &crate::mp::DataElements) {
        let Some((_, target_key)) = self.discovery_by_msg_id.remove(&msg_id) else {
            return;
        };
        if elements.authoritative_engine_id.is_empty() {
            debug!(%target_key, "discovery Report carried no engineID");
            return;
        }

        if let Some((_, wait)) = self.discovery_waits.remove(&target_key) {
            wait.target.mp.learn_remote_engine(
                &target_key,
                &elements.authoritative_engine_id,
                elements.authoritative_engine_boots,
                elements.authoritative_engine_time,
            );
            for handle in wait.queued_handles {
                let (context_engine_id, context_name) = match self.pending.get(&handle) {
                    Some(p) => (elements.authoritative_engine_id.clone(), p.context_name.clone()),
                    None => continue,
                };
                if let Err(e) = self
                    .transmit(
                        engine,
                        handle,
                        &context_engine_id,
                        &context_name,
                        elements.authoritative_engine_boots,
                        elements.authoritative_engine_time,
                    )
                    .await
                {
                    warn!(error = %e, "failed to transmit request queued behind discovery");
                    self.fail_pending(handle, ErrorIndication::UnknownEngineId).await;
                }
            }
        }
    }

    async fn complete_response(&self, elements: crate::mp::DataElements) {
        let handle = match elements.msg_id.and_then(|id| self.by_msg_id.remove(&id)) {
            Some((_, handle)) => Some(handle),
            None => self
                .by_request_id
                .remove(&elements.pdu.request_id)
                .map(|(_, handle)| handle),
        };

        let handle = match handle {
            Some(h) => h,
            None => {
                Counters::incr(&self.counters.unmatched_responses);
                trace!(request_id = elements.pdu.request_id, "unmatched response dropped");
                return;
            }
        };

        if let Some((_, mut pending)) = self.pending.remove(&handle) {
            if let Some(msg_id) = pending.msg_id {
                self.by_msg_id.remove(&msg_id);
            }
            if let Some(responder) = pending.responder.take() {
                let _ = responder.send(CommandResponse::from_pdu(elements.pdu));
            }
        }
    }

    async fn deliver_security_error(&self, msg_id: Option<i32>, error: SecurityError) {
        let Some(indication) = ErrorIndication::from_security_error(&error) else {
            trace!(%error, "dropped message failing security processing with no correlation");
            return;
        };

        let handle = msg_id.and_then(|id| self.by_msg_id.get(&id).map(|h| *h));
        if let Some(handle) = handle {
            self.fail_pending(handle, indication).await;
        } else {
            trace!(%error, "security failure with no known correlation; counted only");
        }
    }

    async fn fail_pending(&self, handle: SendPduHandle, indication: ErrorIndication) {
        if let Some((_, mut pending)) = self.pending.remove(&handle) {
            if let Some(msg_id) = pending.msg_id {
                self.by_msg_id.remove(&msg_id);
            }
            self.by_request_id.remove(&pending.pdu.request_id);
            if let Some(responder) = pending.responder.take() {
                let _ = responder.send(CommandResponse::indication(indication));
            }
        }
    }

    /// Ages every registered Message Processing Model and Security
    /// Model, then walks pending requests for expired deadlines,
    /// retransmitting (v1/v2c resend the cached bytes directly; v3
    /// re-fetches them from the model's own cache) until retries are
    /// exhausted (spec.md §4.2 retransmission algorithm).
    pub async fn receive_timer_tick(&self, engine: &SnmpEngine, time_now: Instant) {
        for mp in engine.message_processing_models() {
            mp.receive_timer_tick(time_now);
        }
        for sm in engine.security_models() {
            sm.receive_timer_tick(time_now);
        }

        let expired: Vec<SendPduHandle> = self
            .pending
            .iter()
            .filter(|e| e.deadline <= time_now)
            .map(|e| *e.key())
            .collect();

        for handle in expired {
            self.handle_timeout(engine, handle).await;
        }
    }

    async fn handle_timeout(&self, engine: &SnmpEngine, handle: SendPduHandle) {
        let (target, msg_id, retries_remaining, fallback) = match self.pending.get(&handle) {
            Some(p) => (p.target.clone(), p.msg_id, p.retries_remaining, p.last_wire_bytes.clone()),
            None => return,
        };

        if retries_remaining == 0 {
            self.fail_pending(handle, ErrorIndication::RequestTimedOut).await;
            return;
        }

        // v3 keeps its own msgID-keyed cache (so the original msgID is
        // reused on resend, avoiding a fresh USM time-window check);
        // every model also gets the dispatcher's own copy of the last
        // wire bytes sent, which is the only cache v1/v2c has since it
        // carries no msgID to key a model-owned one by.
        let cached = msg_id.and_then(|id| target.mp.cached_wire_bytes(id)).or(fallback);
        let resend = match cached {
            Some(bytes) => bytes,
            None => {
                debug!(handle, "nothing cached to retransmit, treating as timeout");
                self.fail_pending(handle, ErrorIndication::RequestTimedOut).await;
                return;
            }
        };

        if let Some(mut pending) = self.pending.get_mut(&handle) {
            pending.retries_remaining -= 1;
            pending.deadline = Instant::now() + target.timeout;
        }

        if let Err(e) = self
            .send_wire(engine, &target.transport_domain, target.transport_address, resend)
            .await
        {
            warn!(error = %e, "retransmission failed");
            self.fail_pending(handle, ErrorIndication::RequestTimedOut).await;
        }
    }

    /// Drains every pending request with `engineShuttingDown`, for a
    /// graceful unwind of the transport binding.
    pub async fn shutdown(&self) {
        let handles: Vec<SendPduHandle> = self.pending.iter().map(|e| *e.key()).collect();
        for handle in handles {
            self.fail_pending(handle, ErrorIndication::EngineShuttingDown).await;
        }
        *self.transport.write().await = None;
    }
}

/// Reads just enough of the outer SEQUENCE to learn `msgVersion`
/// without a full decode, so the dispatcher can pick a Message
/// Processing Model before running its codec.
fn peek_mp_model(whole_msg: &[u8]) -> Option<i32> {
    let outer = crate::message::ber::read_tlv(whole_msg).ok()?;
    let version_tlv = crate::message::ber::read_tlv(outer.value).ok()?;
    let version = crate::message::ber::decode_integer(&version_tlv).ok()?;
    match version {
        0 => Some(crate::mp::MP_MODEL_V1),
        1 => Some(crate::mp::MP_MODEL_V2C),
        3 => Some(crate::mp::MP_MODEL_V3),
        _ => None,
    }
}
