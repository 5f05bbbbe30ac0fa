//! SNMPv1 / SNMPv2c Message Processing Model (RFC 3412 §7, RFC 2576;
//! spec.md §4.3). There is no msgID, no discovery, and no
//! msgSecurityParameters: the community string rides directly on the
//! envelope, so this model is little more than a thin adapter between
//! `Pdu` and `SnmpMessage::V1V2c`.

use std::sync::Arc;

use crate::message::{SecurityLevel, SnmpMessage, SNMP_VERSION_1, SNMP_VERSION_2C};
use crate::mp::{
    DataElements, MessageProcessingModel, MpIncomingError, OutgoingMessageRequest, PreparedMessage,
    MP_MODEL_V1, MP_MODEL_V2C,
};
use crate::security::community::{resolve_community, CommunityTable};
use crate::security::OutgoingSecurityRequest;
use crate::Result;

pub struct V1V2cMessageProcessingModel {
    mp_model: i32,
    wire_version: i64,
    community_table: Arc<CommunityTable>,
}

impl V1V2cMessageProcessingModel {
    pub fn v1(community_table: Arc<CommunityTable>) -> Self {
        Self {
            mp_model: MP_MODEL_V1,
            wire_version: SNMP_VERSION_1,
            community_table,
        }
    }

    pub fn v2c(community_table: Arc<CommunityTable>) -> Self {
        Self {
            mp_model: MP_MODEL_V2C,
            wire_version: SNMP_VERSION_2C,
            community_table,
        }
    }
}

impl MessageProcessingModel for V1V2cMessageProcessingModel {
    fn mp_model(&self) -> i32 {
        self.mp_model
    }

    fn prepare_outgoing_message(&self, request: &OutgoingMessageRequest<'_>) -> Result<PreparedMessage> {
        let entry = self
            .community_table
            .lookup_by_security_name(request.security_name)
            .ok_or_else(|| {
                crate::Error::usm(format!(
                    "no community entry for securityName {:?}",
                    request.security_name
                ))
            })?;

        // Community security has nothing to armour, but every model
        // still runs through the same seam so the dispatcher never
        // special-cases v1/v2c.
        let scoped_pdu = crate::message::ScopedPdu {
            context_engine_id: request.context_engine_id.to_vec(),
            context_name: request.context_name.to_vec(),
            pdu: request.pdu.clone(),
        };
        request.security_model.generate_request_msg(&OutgoingSecurityRequest {
            security_name: request.security_name,
            security_level: SecurityLevel::NoAuthNoPriv,
            authoritative_engine_id: &[],
            authoritative_engine_boots: 0,
            authoritative_engine_time: 0,
            scoped_pdu: &scoped_pdu,
        })?;

        let msg = SnmpMessage::V1V2c {
            version: self.wire_version,
            community: entry.community.into_bytes(),
            pdu: request.pdu.clone(),
        };

        Ok(PreparedMessage {
            wire_bytes: msg.encode()?,
            msg_id: None,
        })
    }

    fn prepare_data_elements(&self, whole_msg: &[u8]) -> std::result::Result<DataElements, MpIncomingError> {
        let msg = SnmpMessage::decode(whole_msg).map_err(|e| MpIncomingError::Malformed(e.to_string()))?;
        match msg {
            SnmpMessage::V1V2c { version, community, pdu } => {
                let entry = resolve_community(&self.community_table, &community).ok_or_else(|| {
                    MpIncomingError::Malformed("unrecognised community".to_string())
                })?;
                Ok(DataElements {
                    version,
                    msg_id: None,
                    security_name: entry.security_name,
                    security_level: SecurityLevel::NoAuthNoPriv,
                    context_engine_id: entry.context_engine_id,
                    context_name: entry.context_name,
                    pdu,
                    is_report: false,
                    authoritative_engine_id: Vec::new(),
                    authoritative_engine_boots: 0,
                    authoritative_engine_time: 0,
                })
            }
            SnmpMessage::V3 { .. } => Err(MpIncomingError::Malformed(
                "v1/v2c model received a v3 message".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Oid, Pdu, PduType, SnmpValue, VarBind};
    use crate::security::community::{CommunityEntry, CommunitySecurityModel};

    fn sample_pdu() -> Pdu {
        Pdu::new(
            PduType::GetRequest,
            1,
            vec![VarBind::new(
                Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap(),
                SnmpValue::Null,
            )],
        )
    }

    #[test]
    fn v2c_round_trips_through_the_model() {
        let table = Arc::new(CommunityTable::new());
        table.add(CommunityEntry {
            community: "public".to_string(),
            security_name: "public".to_string(),
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
            tag_list: String::new(),
        });

        let mp = V1V2cMessageProcessingModel::v2c(table.clone());
        let security_model: Arc<dyn crate::security::SecurityModel> =
            Arc::new(CommunitySecurityModel::v2c(table));

        let request = OutgoingMessageRequest {
            target_key: "a1",
            security_model,
            security_name: "public",
            security_level: SecurityLevel::NoAuthNoPriv,
            context_engine_id: &[],
            context_name: &[],
            pdu: sample_pdu(),
            msg_max_size: 65507,
            authoritative_engine_boots: 0,
            authoritative_engine_time: 0,
        };

        let prepared = mp.prepare_outgoing_message(&request).unwrap();
        assert!(prepared.msg_id.is_none());

        let elements = mp.prepare_data_elements(&prepared.wire_bytes).unwrap();
        assert_eq!(elements.security_name, "public");
        assert_eq!(elements.pdu, sample_pdu());
        assert!(!elements.is_report);
    }

    #[test]
    fn unknown_community_is_malformed() {
        let table = Arc::new(CommunityTable::new());
        let mp = V1V2cMessageProcessingModel::v1(table.clone());
        let msg = SnmpMessage::V1V2c {
            version: SNMP_VERSION_1,
            community: b"nope".to_vec(),
            pdu: sample_pdu(),
        };
        let wire = msg.encode().unwrap();
        assert!(matches!(
            mp.prepare_data_elements(&wire),
            Err(MpIncomingError::Malformed(_))
        ));
    }
}
