//! BER encode/decode for a complete `Pdu` (RFC 3416 §3, §4.2.3).

use crate::message::ber;
use crate::message::value_codec;
use crate::pdu::{ErrorStatus, Pdu, PduType};
use crate::{Error, Result};

pub fn encode_pdu(pdu: &Pdu) -> Vec<u8> {
    let mut body = Vec::new();
    ber::encode_integer(pdu.request_id as i64, &mut body);
    ber::encode_integer(pdu.error_status as i32 as i64, &mut body);
    ber::encode_integer(pdu.error_index as i64, &mut body);
    body.extend_from_slice(&value_codec::encode_var_bind_list(&pdu.var_binds));
    ber::encode_tagged(pdu.pdu_type.tag(), &body)
}

pub fn decode_pdu(bytes: &[u8]) -> Result<Pdu> {
    let tlv = ber::read_tlv(bytes)?;
    let pdu_type = PduType::from_tag(tlv.tag)
        .ok_or_else(|| Error::codec(format!("unknown PDU tag 0x{:02x}", tlv.tag)))?;

    let request_id_tlv = ber::read_tlv(tlv.value)?;
    let request_id = ber::decode_integer(&request_id_tlv)? as i32;

    let error_status_tlv = ber::read_tlv(request_id_tlv.rest)?;
    let error_status_raw = ber::decode_integer(&error_status_tlv)? as i32;

    let error_index_tlv = ber::read_tlv(error_status_tlv.rest)?;
    let error_index = ber::decode_integer(&error_index_tlv)? as i32;

    let var_bind_list_tlv = ber::read_tlv(error_index_tlv.rest)?;
    let var_binds = value_codec::decode_var_bind_list(&var_bind_list_tlv)?;

    Ok(Pdu {
        pdu_type,
        request_id,
        error_status: ErrorStatus::from_i32(error_status_raw),
        error_index,
        var_binds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{Oid, SnmpValue, VarBind};

    #[test]
    fn get_request_roundtrip() {
        let pdu = Pdu::new(
            PduType::GetRequest,
            42,
            vec![VarBind::new(
                Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap(),
                SnmpValue::Null,
            )],
        );
        let encoded = encode_pdu(&pdu);
        let decoded = decode_pdu(&encoded).unwrap();
        assert_eq!(decoded, pdu);
    }

    #[test]
    fn get_bulk_reuses_error_fields_as_repeaters() {
        let pdu = Pdu::get_bulk(
            7,
            0,
            10,
            vec![VarBind::new(
                Oid::from_string("1.3.6.1.2.1.2.2.1").unwrap(),
                SnmpValue::Null,
            )],
        );
        let encoded = encode_pdu(&pdu);
        let decoded = decode_pdu(&encoded).unwrap();
        assert_eq!(decoded.non_repeaters(), 0);
        assert_eq!(decoded.max_repetitions(), 10);
    }

    #[test]
    fn response_with_error_roundtrip() {
        let mut pdu = Pdu::new(PduType::Response, 1, vec![]);
        pdu.error_status = ErrorStatus::NoSuchName;
        pdu.error_index = 1;
        let encoded = encode_pdu(&pdu);
        let decoded = decode_pdu(&encoded).unwrap();
        assert_eq!(decoded.error_status, ErrorStatus::NoSuchName);
    }
}
