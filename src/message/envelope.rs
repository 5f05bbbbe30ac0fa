//! The SNMP message envelope (RFC 3412 §6, RFC 2576 §4, RFC 3414 §4).
//!
//! `SnmpMessage` is the Message Processing Model's unit of wire
//! exchange: community-based framing for v1/v2c, and the `msgGlobalData`
//! / `msgSecurityParameters` / `scopedPDU` triple for v3.

use crate::message::ber::{self, Tlv};
use crate::message::pdu_codec;
use crate::pdu::Pdu;
use crate::{Error, Result};

pub const SNMP_VERSION_1: i64 = 0;
pub const SNMP_VERSION_2C: i64 = 1;
pub const SNMP_VERSION_3: i64 = 3;

/// `msgFlags` bits (RFC 3412 §6.1, RFC 3414 §3).
pub const FLAG_AUTH: u8 = 0x01;
pub const FLAG_PRIV: u8 = 0x02;
pub const FLAG_REPORTABLE: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityLevel {
    NoAuthNoPriv,
    AuthNoPriv,
    AuthPriv,
}

impl SecurityLevel {
    pub fn to_flags(self) -> u8 {
        match self {
            SecurityLevel::NoAuthNoPriv => 0,
            SecurityLevel::AuthNoPriv => FLAG_AUTH,
            SecurityLevel::AuthPriv => FLAG_AUTH | FLAG_PRIV,
        }
    }

    pub fn from_flags(flags: u8) -> Result<Self> {
        match flags & 0x03 {
            0x00 => Ok(SecurityLevel::NoAuthNoPriv),
            0x01 => Ok(SecurityLevel::AuthNoPriv),
            0x03 => Ok(SecurityLevel::AuthPriv),
            _ => Err(Error::message_processing(
                "invalid msgFlags: priv set without auth",
            )),
        }
    }
}

/// `msgGlobalData` (RFC 3412 §6.1 `HeaderData`).
#[derive(Debug, Clone, PartialEq)]
pub struct MsgGlobalData {
    pub msg_id: i32,
    pub msg_max_size: i32,
    pub msg_flags: u8,
    /// Security Model identifier: 1=SNMPv1, 2=SNMPv2c, 3=USM (RFC 3411 §5).
    pub msg_security_model: i32,
}

/// `scopedPDU` (RFC 3412 §6.1), carried in plaintext or, under `authPriv`,
/// as the plaintext recovered after decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedPdu {
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub pdu: Pdu,
}

impl ScopedPdu {
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        ber::encode_octet_string(&self.context_engine_id, &mut body);
        ber::encode_octet_string(&self.context_name, &mut body);
        body.extend_from_slice(&pdu_codec::encode_pdu(&self.pdu));
        ber::encode_sequence(&body)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tlv = ber::read_tlv(bytes)?;
        if tlv.tag != ber::TAG_SEQUENCE {
            return Err(Error::codec("expected scopedPDU SEQUENCE"));
        }
        let engine_id_tlv = ber::read_tlv(tlv.value)?;
        let context_engine_id = ber::decode_octet_string(&engine_id_tlv)?;
        let name_tlv = ber::read_tlv(engine_id_tlv.rest)?;
        let context_name = ber::decode_octet_string(&name_tlv)?;
        let pdu = pdu_codec::decode_pdu(name_tlv.rest)?;
        Ok(ScopedPdu {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

/// A full SNMP message, version-dispatched per RFC 3411 §5.
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpMessage {
    V1V2c {
        version: i64,
        community: Vec<u8>,
        pdu: Pdu,
    },
    V3 {
        msg_global_data: MsgGlobalData,
        /// Opaque OCTET STRING; USM decodes this further (RFC 3414 §2.4).
        msg_security_parameters: Vec<u8>,
        /// `None` when the scopedPDU is still encrypted (authPriv, prior
        /// to USM decryption in the security subsystem).
        scoped_pdu: Option<ScopedPdu>,
        /// Raw encrypted scopedPDU bytes, present only under `authPriv`
        /// before decryption.
        encrypted_pdu: Option<Vec<u8>>,
    },
}

impl SnmpMessage {
    pub fn version(&self) -> i64 {
        match self {
            SnmpMessage::V1V2c { version, .. } => *version,
            SnmpMessage::V3 { .. } => SNMP_VERSION_3,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        match self {
            SnmpMessage::V1V2c {
                version,
                community,
                pdu,
            } => {
                ber::encode_integer(*version, &mut body);
                ber::encode_octet_string(community, &mut body);
                body.extend_from_slice(&pdu_codec::encode_pdu(pdu));
            }
            SnmpMessage::V3 {
                msg_global_data,
                msg_security_parameters,
                scoped_pdu,
                encrypted_pdu,
            } => {
                ber::encode_integer(SNMP_VERSION_3, &mut body);
                body.extend_from_slice(&encode_global_data(msg_global_data));
                ber::encode_octet_string(msg_security_parameters, &mut body);
                match (scoped_pdu, encrypted_pdu) {
                    (Some(scoped), _) => body.extend_from_slice(&scoped.encode()),
                    (None, Some(raw)) => ber::encode_octet_string(raw, &mut body),
                    (None, None) => {
                        return Err(Error::message_processing(
                            "message has neither plaintext nor encrypted scopedPDU",
                        ))
                    }
                }
            }
        }
        Ok(ber::encode_sequence(&body))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let outer = ber::read_tlv(bytes)?;
        if outer.tag != ber::TAG_SEQUENCE {
            return Err(Error::codec("expected SNMPv3Message SEQUENCE"));
        }
        let version_tlv = ber::read_tlv(outer.value)?;
        let version = ber::decode_integer(&version_tlv)?;

        match version {
            SNMP_VERSION_1 | SNMP_VERSION_2C => {
                let community_tlv = ber::read_tlv(version_tlv.rest)?;
                let community = ber::decode_octet_string(&community_tlv)?;
                let pdu = pdu_codec::decode_pdu(community_tlv.rest)?;
                Ok(SnmpMessage::V1V2c {
                    version,
                    community,
                    pdu,
                })
            }
            SNMP_VERSION_3 => {
                let (msg_global_data, rest) = decode_global_data(version_tlv.rest)?;
                let sec_params_tlv = ber::read_tlv(rest)?;
                let msg_security_parameters = ber::decode_octet_string(&sec_params_tlv)?;

                let flags = msg_global_data.msg_flags;
                let priv_flag = flags & FLAG_PRIV != 0;

                if priv_flag {
                    let enc_tlv = ber::read_tlv(sec_params_tlv.rest)?;
                    let encrypted = ber::decode_octet_string(&enc_tlv)?;
                    Ok(SnmpMessage::V3 {
                        msg_global_data,
                        msg_security_parameters,
                        scoped_pdu: None,
                        encrypted_pdu: Some(encrypted),
                    })
                } else {
                    let scoped = ScopedPdu::decode(sec_params_tlv.rest)?;
                    Ok(SnmpMessage::V3 {
                        msg_global_data,
                        msg_security_parameters,
                        scoped_pdu: Some(scoped),
                        encrypted_pdu: None,
                    })
                }
            }
            other => Err(Error::message_processing(format!(
                "unsupported SNMP version tag {}",
                other
            ))),
        }
    }
}

fn encode_global_data(data: &MsgGlobalData) -> Vec<u8> {
    let mut body = Vec::new();
    ber::encode_integer(data.msg_id as i64, &mut body);
    ber::encode_integer(data.msg_max_size as i64, &mut body);
    ber::encode_octet_string(&[data.msg_flags], &mut body);
    ber::encode_integer(data.msg_security_model as i64, &mut body);
    ber::encode_sequence(&body)
}

fn decode_global_data(bytes: &[u8]) -> Result<(MsgGlobalData, &[u8])> {
    let tlv: Tlv<'_> = ber::read_tlv(bytes)?;
    if tlv.tag != ber::TAG_SEQUENCE {
        return Err(Error::codec("expected HeaderData SEQUENCE"));
    }
    let msg_id_tlv = ber::read_tlv(tlv.value)?;
    let msg_id = ber::decode_integer(&msg_id_tlv)? as i32;
    let max_size_tlv = ber::read_tlv(msg_id_tlv.rest)?;
    let msg_max_size = ber::decode_integer(&max_size_tlv)? as i32;
    let flags_tlv = ber::read_tlv(max_size_tlv.rest)?;
    let flags_bytes = ber::decode_octet_string(&flags_tlv)?;
    let msg_flags = *flags_bytes
        .first()
        .ok_or_else(|| Error::codec("empty msgFlags"))?;
    let model_tlv = ber::read_tlv(flags_tlv.rest)?;
    let msg_security_model = ber::decode_integer(&model_tlv)? as i32;
    Ok((
        MsgGlobalData {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        },
        tlv.rest,
    ))
}
