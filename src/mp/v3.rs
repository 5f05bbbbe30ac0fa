//! SNMPv3 Message Processing Model (RFC 3412 §7; spec.md §4.3).
//!
//! Owns msgID allocation, the discovery handshake (an unauthenticated
//! Report probe exchanged before the first request to an engine whose
//! identity isn't yet known), and the outgoing-message cache keyed by
//! msgID that the dispatcher's retransmission logic reads from.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::message::{MsgGlobalData, ScopedPdu, SnmpMessage, FLAG_REPORTABLE, SNMP_VERSION_3};
use crate::mp::{
    DataElements, MessageProcessingModel, MpIncomingError, OutgoingMessageRequest, PreparedMessage,
    MP_MODEL_V3,
};
use crate::pdu::{Pdu, PduType};
use crate::security::usm::{encode_usm_security_parameters, splice_mac, UsmSecurityParameters};
use crate::security::{IncomingSecurityRequest, OutgoingSecurityRequest, SecurityModel, SECURITY_MODEL_USM};
use crate::Result;

/// Remembered (engineID, engineBoots, engineTime) learned from a
/// discovery Report, keyed by the target's addrName (spec.md §4.3
/// step 4).
#[derive(Debug, Clone)]
struct DiscoveredEngine {
    engine_id: Vec<u8>,
    engine_boots: u32,
    engine_time: u32,
}

struct CachedOutgoing {
    wire_bytes: Vec<u8>,
    cached_at: Instant,
}

/// How long cached outgoing wire bytes are kept for retransmission
/// before a timer tick reclaims them; generous relative to the
/// default 1s/5-retry window of spec.md §6.
const CACHE_TTL: Duration = Duration::from_secs(120);

pub struct V3MessageProcessingModel {
    security_models: Arc<DashMap<i32, Arc<dyn SecurityModel>>>,
    next_msg_id: AtomicI32,
    discovered: DashMap<String, DiscoveredEngine>,
    outgoing_cache: DashMap<i32, CachedOutgoing>,
}

impl V3MessageProcessingModel {
    pub fn new(security_models: Arc<DashMap<i32, Arc<dyn SecurityModel>>>) -> Self {
        Self {
            security_models,
            next_msg_id: AtomicI32::new(1),
            discovered: DashMap::new(),
            outgoing_cache: DashMap::new(),
        }
    }

    /// 31-bit msgID, monotonic, wraps away from zero (spec.md §4.3
    /// step 1; RFC 3412 §6.1 `msgID ::= INTEGER (0..2147483647)`).
    fn alloc_msg_id(&self) -> i32 {
        loop {
            let id = self.next_msg_id.fetch_add(1, Ordering::Relaxed) & 0x7FFF_FFFF;
            if id != 0 {
                return id;
            }
        }
    }

    fn cache_outgoing(&self, msg_id: i32, wire_bytes: Vec<u8>) {
        self.outgoing_cache.insert(
            msg_id,
            CachedOutgoing {
                wire_bytes,
                cached_at: Instant::now(),
            },
        );
    }
}

impl MessageProcessingModel for V3MessageProcessingModel {
    fn mp_model(&self) -> i32 {
        MP_MODEL_V3
    }

    fn prepare_outgoing_message(&self, request: &OutgoingMessageRequest<'_>) -> Result<PreparedMessage> {
        let msg_id = self.alloc_msg_id();
        let scoped_pdu = ScopedPdu {
            context_engine_id: request.context_engine_id.to_vec(),
            context_name: request.context_name.to_vec(),
            pdu: request.pdu.clone(),
        };

        let sec_result = request.security_model.generate_request_msg(&OutgoingSecurityRequest {
            security_name: request.security_name,
            security_level: request.security_level,
            authoritative_engine_id: request.context_engine_id,
            authoritative_engine_boots: request.authoritative_engine_boots,
            authoritative_engine_time: request.authoritative_engine_time,
            scoped_pdu: &scoped_pdu,
        })?;

        let msg_global_data = MsgGlobalData {
            msg_id,
            msg_max_size: request.msg_max_size,
            msg_flags: request.security_level.to_flags() | FLAG_REPORTABLE,
            msg_security_model: request.security_model.security_model(),
        };

        let msg = SnmpMessage::V3 {
            msg_global_data,
            msg_security_parameters: sec_result.msg_security_parameters,
            scoped_pdu: if sec_result.encrypted_scoped_pdu.is_some() {
                None
            } else {
                Some(scoped_pdu)
            },
            encrypted_pdu: sec_result.encrypted_scoped_pdu,
        };

        let mut wire_bytes = msg.encode()?;

        if sec_result.requires_mac_finalization {
            let mac = request.security_model.finalize_mac(
                request.security_name,
                request.context_engine_id,
                &wire_bytes,
            )?;
            wire_bytes = splice_mac(&wire_bytes, &mac)?;
        }

        self.cache_outgoing(msg_id, wire_bytes.clone());
        Ok(PreparedMessage {
            wire_bytes,
            msg_id: Some(msg_id),
        })
    }

    fn prepare_data_elements(&self, whole_msg: &[u8]) -> std::result::Result<DataElements, MpIncomingError> {
        let msg = SnmpMessage::decode(whole_msg).map_err(|e| MpIncomingError::Malformed(e.to_string()))?;
        let (msg_global_data, msg_security_parameters, scoped_pdu, encrypted_pdu) = match msg {
            SnmpMessage::V3 {
                msg_global_data,
                msg_security_parameters,
                scoped_pdu,
                encrypted_pdu,
            } => (msg_global_data, msg_security_parameters, scoped_pdu, encrypted_pdu),
            SnmpMessage::V1V2c { .. } => {
                return Err(MpIncomingError::Malformed(
                    "v3 model received a v1/v2c message".to_string(),
                ))
            }
        };

        let security_model = self
            .security_models
            .get(&msg_global_data.msg_security_model)
            .map(|e| e.clone())
            .ok_or_else(|| {
                MpIncomingError::Malformed(format!(
                    "unknown securityModel {}",
                    msg_global_data.msg_security_model
                ))
            })?;

        let incoming = IncomingSecurityRequest {
            msg_global_data: &msg_global_data,
            msg_security_parameters: &msg_security_parameters,
            whole_message: whole_msg,
            scoped_pdu: scoped_pdu.as_ref(),
            encrypted_scoped_pdu: encrypted_pdu.as_deref(),
        };

        let result = security_model
            .process_incoming_msg(&incoming)
            .map_err(|e| super::MpIncomingError::from_security(Some(msg_global_data.msg_id), e))?;

        let is_report = result.scoped_pdu.pdu.pdu_type == PduType::Report;
        trace!(msg_id = msg_global_data.msg_id, is_report, "v3 message decoded");

        Ok(DataElements {
            version: SNMP_VERSION_3,
            msg_id: Some(msg_global_data.msg_id),
            security_name: result.security_name,
            security_level: result.security_level,
            context_engine_id: result.scoped_pdu.context_engine_id,
            context_name: result.scoped_pdu.context_name,
            pdu: result.scoped_pdu.pdu,
            is_report,
            authoritative_engine_id: result.authoritative_engine_id,
            authoritative_engine_boots: result.authoritative_engine_boots,
            authoritative_engine_time: result.authoritative_engine_time,
        })
    }

    fn receive_timer_tick(&self, time_now: Instant) {
        self.outgoing_cache
            .retain(|_, cached| time_now.saturating_duration_since(cached.cached_at) < CACHE_TTL);
    }

    fn known_remote_engine(&self, target_key: &str) -> Option<(Vec<u8>, u32, u32)> {
        self.discovered
            .get(target_key)
            .map(|e| (e.engine_id.clone(), e.engine_boots, e.engine_time))
    }

    fn learn_remote_engine(&self, target_key: &str, engine_id: &[u8], engine_boots: u32, engine_time: u32) {
        debug!(
            target_key,
            engine_id = %hex::encode(engine_id),
            engine_boots,
            "learned remote engine via discovery"
        );
        self.discovered.insert(
            target_key.to_string(),
            DiscoveredEngine {
                engine_id: engine_id.to_vec(),
                engine_boots,
                engine_time,
            },
        );
    }

    /// The discovery probe itself: empty contextEngineID, userName
    /// `""`, no auth/priv, reportable flag set so the remote engine
    /// responds with a Report carrying its identity (spec.md §4.3
    /// step 4).
    fn build_discovery_probe(&self, msg_max_size: i32) -> Option<Result<PreparedMessage>> {
        Some((|| {
            let msg_id = self.alloc_msg_id();
            let scoped = ScopedPdu {
                context_engine_id: Vec::new(),
                context_name: Vec::new(),
                pdu: Pdu::new(PduType::Report, 0, Vec::new()),
            };
            let msg_global_data = MsgGlobalData {
                msg_id,
                msg_max_size,
                msg_flags: FLAG_REPORTABLE,
                msg_security_model: SECURITY_MODEL_USM,
            };
            let sec_params = UsmSecurityParameters {
                msg_authoritative_engine_id: Vec::new(),
                msg_authoritative_engine_boots: 0,
                msg_authoritative_engine_time: 0,
                msg_user_name: String::new(),
                msg_authentication_parameters: Vec::new(),
                msg_privacy_parameters: Vec::new(),
            };
            let msg = SnmpMessage::V3 {
                msg_global_data,
                msg_security_parameters: encode_usm_security_parameters(&sec_params),
                scoped_pdu: Some(scoped),
                encrypted_pdu: None,
            };
            let wire_bytes = msg.encode()?;
            self.cache_outgoing(msg_id, wire_bytes.clone());
            Ok(PreparedMessage {
                wire_bytes,
                msg_id: Some(msg_id),
            })
        })())
    }

    fn cached_wire_bytes(&self, msg_id: i32) -> Option<Vec<u8>> {
        self.outgoing_cache.get(&msg_id).map(|c| c.wire_bytes.clone())
    }
}
