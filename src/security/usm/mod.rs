//! The User-Based Security Model (RFC 3414; spec.md §4.4).

pub mod crypto;
pub mod timewindow;
pub mod users;

use std::sync::Arc;

use asn1_rs::{FromBer, Sequence};
use nom::IResult;
use rand::RngCore;
use tracing::{debug, warn};

use crate::message::ber;
use crate::security::{
    IncomingSecurityRequest, IncomingSecurityResult, OutgoingSecurityRequest,
    OutgoingSecurityResult, SecurityError, SecurityLevel as MsgSecurityLevel, SecurityModel,
    SECURITY_MODEL_USM,
};
use crate::security::usm::timewindow::TimeWindowCache;
use crate::security::usm::users::UsmUserTable;
use crate::{Error, Result};

/// `UsmSecurityParameters` (RFC 3414 §2.4), the structure carried
/// inside `msgSecurityParameters`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsmSecurityParameters {
    pub msg_authoritative_engine_id: Vec<u8>,
    pub msg_authoritative_engine_boots: u32,
    pub msg_authoritative_engine_time: u32,
    pub msg_user_name: String,
    pub msg_authentication_parameters: Vec<u8>,
    pub msg_privacy_parameters: Vec<u8>,
}

/// Mirrors `rusticata-snmp-parser`'s `parse_usm_security_parameters`
/// field-for-field, since `UsmSecurityParameters` is exactly the
/// SEQUENCE that crate already knows how to decode.
pub fn parse_usm_security_parameters(
    bytes: &[u8],
) -> IResult<&[u8], UsmSecurityParameters, asn1_rs::Error> {
    Sequence::from_der_and_then(bytes, |i| {
        let (i, msg_authoritative_engine_id) = <&[u8]>::from_ber(i)?;
        let (i, msg_authoritative_engine_boots) = u32::from_ber(i)?;
        let (i, msg_authoritative_engine_time) = u32::from_ber(i)?;
        let (i, msg_user_name) = <&[u8]>::from_ber(i)?;
        let (i, msg_authentication_parameters) = <&[u8]>::from_ber(i)?;
        let (i, msg_privacy_parameters) = <&[u8]>::from_ber(i)?;
        let params = UsmSecurityParameters {
            msg_authoritative_engine_id: msg_authoritative_engine_id.to_vec(),
            msg_authoritative_engine_boots,
            msg_authoritative_engine_time,
            msg_user_name: String::from_utf8_lossy(msg_user_name).into_owned(),
            msg_authentication_parameters: msg_authentication_parameters.to_vec(),
            msg_privacy_parameters: msg_privacy_parameters.to_vec(),
        };
        Ok((i, params))
    })
}

/// The encode side has no upstream reference in this codebase's
/// ASN.1 lineage (the parser crate only decodes), so this mirrors the
/// hand-rolled TLV approach in `message::ber` rather than guessing at
/// `asn1_rs`'s writer API.
pub fn encode_usm_security_parameters(params: &UsmSecurityParameters) -> Vec<u8> {
    let mut body = Vec::new();
    ber::encode_octet_string(&params.msg_authoritative_engine_id, &mut body);
    ber::encode_unsigned(ber::TAG_INTEGER, params.msg_authoritative_engine_boots as u64, &mut body);
    ber::encode_unsigned(ber::TAG_INTEGER, params.msg_authoritative_engine_time as u64, &mut body);
    ber::encode_octet_string(params.msg_user_name.as_bytes(), &mut body);
    ber::encode_octet_string(&params.msg_authentication_parameters, &mut body);
    ber::encode_octet_string(&params.msg_privacy_parameters, &mut body);
    ber::encode_sequence(&body)
}

const ZEROED_AUTH_PARAMS: [u8; 12] = [0u8; 12];

/// USM as a `SecurityModel`. Holds the user table and the per-engine
/// time-window cache; both are shared with the rest of the engine
/// (the Configuration Façade populates the user table; the dispatcher
/// reads `local_engine_id` to answer discovery).
pub struct UsmSecurityModel {
    pub users: Arc<UsmUserTable>,
    pub time_windows: Arc<TimeWindowCache>,
    /// This engine's own ID, needed when *we* are authoritative (we
    /// never are for requests we originate, but RFC 3414 requires the
    /// field to exist on both sides of every exchange).
    local_engine_id: Vec<u8>,
}

impl UsmSecurityModel {
    pub fn new(
        local_engine_id: Vec<u8>,
        users: Arc<UsmUserTable>,
        time_windows: Arc<TimeWindowCache>,
    ) -> Self {
        Self {
            users,
            time_windows,
            local_engine_id,
        }
    }

    /// This engine's own snmpEngineID, needed by the dispatcher to
    /// answer a remote manager's discovery Report when this engine is
    /// itself acting as the authoritative party.
    pub fn local_engine_id(&self) -> &[u8] {
        &self.local_engine_id
    }
}

/// Used by the Configuration Façade to report the effective
/// securityLevel of a configured user without duplicating the
/// has-auth/has-priv match at every call site.
pub(crate) fn security_level_of(user: &users::UsmUser) -> MsgSecurityLevel {
    match (user.auth_protocol.is_some(), user.priv_protocol.is_some()) {
        (true, true) => MsgSecurityLevel::AuthPriv,
        (true, false) => MsgSecurityLevel::AuthNoPriv,
        _ => MsgSecurityLevel::NoAuthNoPriv,
    }
}

fn random_salt() -> [u8; 8] {
    let mut salt = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

impl SecurityModel for UsmSecurityModel {
    fn security_model(&self) -> i32 {
        SECURITY_MODEL_USM
    }

    fn generate_request_msg(
        &self,
        request: &OutgoingSecurityRequest<'_>,
    ) -> Result<OutgoingSecurityResult> {
        let user = self
            .users
            .lookup(request.authoritative_engine_id, request.security_name)
            .ok_or_else(|| {
                Error::usm(format!(
                    "no USM user {:?} for engine {}",
                    request.security_name,
                    hex::encode(request.authoritative_engine_id)
                ))
            })?;

        let plaintext_scoped_pdu = request.scoped_pdu.encode();

        let (encrypted_scoped_pdu, priv_params) = match (request.security_level, &user.priv_protocol, &user.priv_key) {
            (MsgSecurityLevel::AuthPriv, Some(priv_protocol), Some(priv_key)) => {
                let salt = random_salt();
                let ciphertext = crypto::encrypt(
                    *priv_protocol,
                    priv_key,
                    &salt,
                    request.authoritative_engine_boots,
                    request.authoritative_engine_time,
                    &plaintext_scoped_pdu,
                )?;
                (Some(ciphertext), salt.to_vec())
            }
            (MsgSecurityLevel::AuthPriv, _, _) => {
                return Err(Error::not_supported(
                    "authPriv requested but user has no privacy key",
                ))
            }
            _ => (None, Vec::new()),
        };

        let mut params = UsmSecurityParameters {
            msg_authoritative_engine_id: request.authoritative_engine_id.to_vec(),
            msg_authoritative_engine_boots: request.authoritative_engine_boots,
            msg_authoritative_engine_time: request.authoritative_engine_time,
            msg_user_name: request.security_name.to_string(),
            msg_authentication_parameters: ZEROED_AUTH_PARAMS.to_vec(),
            msg_privacy_parameters: priv_params,
        };

        if request.security_level == MsgSecurityLevel::NoAuthNoPriv {
            return Ok(OutgoingSecurityResult {
                msg_security_parameters: encode_usm_security_parameters(&params),
                encrypted_scoped_pdu,
                requires_mac_finalization: false,
            });
        }

        // The MAC covers the whole message with the auth-params field
        // zeroed; we don't have the whole message yet at this layer,
        // so the caller (the v3 Message Processing Model) completes
        // it via `finalize_mac` after assembling the envelope.
        params.msg_authentication_parameters = ZEROED_AUTH_PARAMS.to_vec();

        Ok(OutgoingSecurityResult {
            msg_security_parameters: encode_usm_security_parameters(&params),
            encrypted_scoped_pdu,
            requires_mac_finalization: true,
        })
    }

    fn finalize_mac(
        &self,
        security_name: &str,
        authoritative_engine_id: &[u8],
        whole_message_with_zeroed_mac: &[u8],
    ) -> Result<[u8; 12]> {
        let user = self
            .users
            .lookup(authoritative_engine_id, security_name)
            .ok_or_else(|| Error::usm(format!("no USM user {:?} to finalize MAC", security_name)))?;
        let auth_protocol = user
            .auth_protocol
            .ok_or_else(|| Error::not_supported("auth requested but user has no auth protocol"))?;
        let auth_key = user
            .auth_key
            .as_ref()
            .ok_or_else(|| Error::not_supported("auth requested but user has no auth key"))?;
        crypto::authenticate(auth_protocol, auth_key, whole_message_with_zeroed_mac)
    }

    fn process_incoming_msg(
        &self,
        request: &IncomingSecurityRequest<'_>,
    ) -> std::result::Result<IncomingSecurityResult, SecurityError> {
        let (_, params) = parse_usm_security_parameters(request.msg_security_parameters)
            .map_err(|e| SecurityError::Malformed(format!("UsmSecurityParameters: {}", e)))?;

        let security_level = MsgSecurityLevel::from_flags(request.msg_global_data.msg_flags)
            .map_err(|_| SecurityError::UnsupportedSecurityLevel)?;

        // noAuthNoPriv messages (the unauthenticated engine-discovery
        // Report chief among them) never need a user-table entry: the
        // discovery Report arrives under an empty userName against an
        // engineID we by definition don't know yet, so requiring a
        // pre-provisioned (engineID, "") user here would make
        // discovery impossible to ever complete.
        let user = if security_level != MsgSecurityLevel::NoAuthNoPriv {
            Some(
                self.users
                    .lookup(&params.msg_authoritative_engine_id, &params.msg_user_name)
                    .ok_or(SecurityError::UnknownSecurityName)?,
            )
        } else {
            None
        };

        if let Some(user) = &user {
            let auth_protocol = user
                .auth_protocol
                .ok_or(SecurityError::UnsupportedSecurityLevel)?;
            let auth_key = user
                .auth_key
                .as_ref()
                .ok_or(SecurityError::UnsupportedSecurityLevel)?;

            let received_mac = params.msg_authentication_parameters.clone();
            let zeroed_message = zero_auth_params(request.whole_message, &received_mac)
                .map_err(|e| SecurityError::Malformed(e.to_string()))?;
            let expected_mac = crypto::authenticate(auth_protocol, auth_key, &zeroed_message)
                .map_err(|e| SecurityError::Malformed(e.to_string()))?;

            if !crypto::verify_mac(&expected_mac, &received_mac) {
                return Err(SecurityError::AuthenticationFailure);
            }
        }

        let in_window = self.time_windows.check(
            &params.msg_authoritative_engine_id,
            params.msg_authoritative_engine_boots,
            params.msg_authoritative_engine_time,
        );
        // As the non-authoritative (manager) side, we trust the
        // authoritative engine's asserted boots/time on every exchange
        // and resynchronise our cached view from it, even when that
        // same assertion falls outside the current window — otherwise
        // no request after the first notInTimeWindow rejection could
        // ever resynchronise and every following request to this
        // engine would fail the same way forever.
        self.time_windows.learn(
            &params.msg_authoritative_engine_id,
            params.msg_authoritative_engine_boots,
            params.msg_authoritative_engine_time,
        );
        if !in_window {
            warn!(
                user = %params.msg_user_name,
                "notInTimeWindow: msg boots/time outside the 150s lateral window"
            );
            return Err(SecurityError::NotInTimeWindow);
        }

        let scoped_pdu = if security_level == MsgSecurityLevel::AuthPriv {
            let user = user.as_ref().expect("authPriv implies user lookup above");
            let priv_protocol = user
                .priv_protocol
                .ok_or(SecurityError::UnsupportedSecurityLevel)?;
            let priv_key = user
                .priv_key
                .as_ref()
                .ok_or(SecurityError::UnsupportedSecurityLevel)?;
            let ciphertext = request
                .encrypted_scoped_pdu
                .ok_or_else(|| SecurityError::Malformed("privFlag set but no ciphertext present".to_string()))?;
            let salt: [u8; 8] = params
                .msg_privacy_parameters
                .clone()
                .try_into()
                .map_err(|_| SecurityError::Malformed("msgPrivacyParameters must be 8 octets".to_string()))?;
            let plaintext = crypto::decrypt(
                priv_protocol,
                priv_key,
                &salt,
                params.msg_authoritative_engine_boots,
                params.msg_authoritative_engine_time,
                ciphertext,
            )
            .map_err(|_| SecurityError::DecryptionError)?;
            crate::message::ScopedPdu::decode(&plaintext)
                .map_err(|_| SecurityError::DecryptionError)?
        } else {
            request
                .scoped_pdu
                .cloned()
                .ok_or_else(|| SecurityError::Malformed("missing plaintext scopedPDU".to_string()))?
        };

        debug!(user = %params.msg_user_name, level = ?security_level, "USM message accepted");

        Ok(IncomingSecurityResult {
            security_name: params.msg_user_name,
            security_level,
            scoped_pdu,
            authoritative_engine_id: params.msg_authoritative_engine_id,
            authoritative_engine_boots: params.msg_authoritative_engine_boots,
            authoritative_engine_time: params.msg_authoritative_engine_time,
        })
    }
}

/// Finds `received_mac` inside `whole_message` and returns a copy with
/// those 12 bytes zeroed, matching what the sender MAC'd over
/// (RFC 3414 §6.3.2 / §7.3.2 step 2).
fn zero_auth_params(whole_message: &[u8], received_mac: &[u8]) -> Result<Vec<u8>> {
    if received_mac.len() != 12 {
        return Err(Error::usm("msgAuthenticationParameters must be 12 octets"));
    }
    let pos = whole_message
        .windows(received_mac.len())
        .position(|w| w == received_mac)
        .ok_or_else(|| Error::usm("could not locate auth params in message"))?;
    let mut zeroed = whole_message.to_vec();
    zeroed[pos..pos + received_mac.len()].copy_from_slice(&ZEROED_AUTH_PARAMS);
    Ok(zeroed)
}

/// The outgoing counterpart of [`zero_auth_params`]: finds the
/// 12-byte zeroed placeholder `generate_request_msg` left in
/// `msgAuthenticationParameters` and splices in the real MAC that
/// `finalize_mac` computed over it (RFC 3414 §3.1 step 7, §6.3.1).
pub fn splice_mac(whole_message_with_zeroed_mac: &[u8], mac: &[u8; 12]) -> Result<Vec<u8>> {
    let pos = whole_message_with_zeroed_mac
        .windows(ZEROED_AUTH_PARAMS.len())
        .position(|w| w == ZEROED_AUTH_PARAMS)
        .ok_or_else(|| Error::usm("could not locate zeroed auth params placeholder in message"))?;
    let mut spliced = whole_message_with_zeroed_mac.to_vec();
    spliced[pos..pos + mac.len()].copy_from_slice(mac);
    Ok(spliced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;

    use crate::mp::v3::V3MessageProcessingModel;
    use crate::mp::{MessageProcessingModel, MpIncomingError, OutgoingMessageRequest};
    use crate::pdu::{Oid, Pdu, PduType, SnmpValue, VarBind};
    use crate::security::SecurityLevel;

    fn v3_with_user(engine_id: &[u8]) -> (V3MessageProcessingModel, Arc<dyn SecurityModel>, Arc<TimeWindowCache>) {
        let users = Arc::new(UsmUserTable::new());
        users
            .add(
                engine_id,
                "alice",
                Some(crypto::AuthProtocol::HmacMd5),
                Some(b"authpassword"),
                None,
                None,
                Vec::new(),
                Vec::new(),
            )
            .unwrap();
        let time_windows = Arc::new(TimeWindowCache::new());
        let security_model: Arc<dyn SecurityModel> = Arc::new(UsmSecurityModel::new(
            engine_id.to_vec(),
            users,
            time_windows.clone(),
        ));
        let registry: Arc<DashMap<i32, Arc<dyn SecurityModel>>> = Arc::new(DashMap::new());
        registry.insert(SECURITY_MODEL_USM, security_model.clone());
        (V3MessageProcessingModel::new(registry), security_model, time_windows)
    }

    fn outgoing_get(security_model: Arc<dyn SecurityModel>, engine_id: &[u8], boots: u32, time: u32) -> OutgoingMessageRequest<'_> {
        let pdu = Pdu::new(
            PduType::GetRequest,
            1,
            vec![VarBind::new(Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap(), SnmpValue::Null)],
        );
        OutgoingMessageRequest {
            target_key: "agent",
            security_model,
            security_name: "alice",
            security_level: SecurityLevel::AuthNoPriv,
            context_engine_id: engine_id,
            context_name: &[],
            pdu,
            msg_max_size: 65507,
            authoritative_engine_boots: boots,
            authoritative_engine_time: time,
        }
    }

    /// Scenario 4 (spec.md §8): a stale cached window rejects the
    /// message carrying the fresh (boots, time), but that same message
    /// resynchronises the cache so the very next request succeeds.
    #[test]
    fn not_in_time_window_resynchronises_for_the_next_message() {
        let engine_id = b"\x80\x00\x00\x00\x01".to_vec();
        let (mp, security_model, time_windows) = v3_with_user(&engine_id);

        // Establish a known window, then build a message whose
        // asserted time is 300s further along: outside the 150s
        // lateral window relative to what's currently cached.
        time_windows.learn(&engine_id, 1, 1000);

        let stale_wire = mp
            .prepare_outgoing_message(&outgoing_get(security_model.clone(), &engine_id, 1, 1300))
            .unwrap()
            .wire_bytes;

        let err = mp.prepare_data_elements(&stale_wire).unwrap_err();
        match err {
            MpIncomingError::Security { error, .. } => {
                assert_eq!(error, SecurityError::NotInTimeWindow)
            }
            other => panic!("expected a security error, got {other:?}"),
        }

        // The rejected message still resynchronised the cache: the
        // same (boots, time) it asserted is now accepted.
        assert!(time_windows.check(&engine_id, 1, 1300));

        let fresh_wire = mp
            .prepare_outgoing_message(&outgoing_get(security_model, &engine_id, 1, 1300))
            .unwrap()
            .wire_bytes;
        let elements = mp.prepare_data_elements(&fresh_wire).unwrap();
        assert_eq!(elements.security_name, "alice");
    }

    #[test]
    fn usm_security_parameters_roundtrip() {
        let params = UsmSecurityParameters {
            msg_authoritative_engine_id: vec![0x80, 0, 0, 0, 1],
            msg_authoritative_engine_boots: 3,
            msg_authoritative_engine_time: 12345,
            msg_user_name: "alice".to_string(),
            msg_authentication_parameters: vec![0u8; 12],
            msg_privacy_parameters: vec![1, 2, 3, 4, 5, 6, 7, 8],
        };
        let encoded = encode_usm_security_parameters(&params);
        let (_, decoded) = parse_usm_security_parameters(&encoded).unwrap();
        assert_eq!(decoded, params);
    }

    #[test]
    fn splice_mac_fills_zeroed_placeholder() {
        let mut message = vec![1, 2, 3];
        message.extend_from_slice(&ZEROED_AUTH_PARAMS);
        message.extend_from_slice(&[4, 5, 6]);

        let mac = [0xBBu8; 12];
        let spliced = splice_mac(&message, &mac).unwrap();
        assert_eq!(&spliced[3..15], &mac);
        assert_eq!(&spliced[..3], &[1, 2, 3]);
        assert_eq!(&spliced[15..], &[4, 5, 6]);
    }

    #[test]
    fn zero_auth_params_finds_and_clears_mac() {
        let mac = [0xAAu8; 12];
        let mut message = vec![1, 2, 3];
        message.extend_from_slice(&mac);
        message.extend_from_slice(&[4, 5, 6]);

        let zeroed = zero_auth_params(&message, &mac).unwrap();
        assert_eq!(&zeroed[3..15], &[0u8; 12]);
        assert_eq!(&zeroed[..3], &[1, 2, 3]);
        assert_eq!(&zeroed[15..], &[4, 5, 6]);
    }
}
