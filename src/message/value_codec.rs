//! BER encode/decode for `SnmpValue` and `VarBind` (RFC 1902 §7, RFC 3416 §2).

use crate::message::ber::{self, Tlv};
use crate::pdu::{SnmpValue, VarBind};
use crate::{Error, Result};

const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIME_TICKS: u8 = 0x43;
const TAG_OPAQUE: u8 = 0x44;
const TAG_COUNTER64: u8 = 0x46;
const TAG_NO_SUCH_OBJECT: u8 = 0x80;
const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

pub fn encode_value(value: &SnmpValue, out: &mut Vec<u8>) {
    match value {
        SnmpValue::Integer(v) => ber::encode_integer(*v, out),
        SnmpValue::OctetString(bytes) => ber::encode_octet_string(bytes, out),
        SnmpValue::Null => out.extend_from_slice(&ber::encode_null()),
        SnmpValue::ObjectId(oid) => ber::encode_oid(oid, out),
        SnmpValue::IpAddress(addr) => ber::encode_tlv(TAG_IP_ADDRESS, addr, out),
        SnmpValue::Counter32(v) => ber::encode_unsigned(TAG_COUNTER32, *v as u64, out),
        SnmpValue::Gauge32(v) => ber::encode_unsigned(TAG_GAUGE32, *v as u64, out),
        SnmpValue::TimeTicks(v) => ber::encode_unsigned(TAG_TIME_TICKS, *v as u64, out),
        SnmpValue::Opaque(bytes) => ber::encode_tlv(TAG_OPAQUE, bytes, out),
        SnmpValue::Counter64(v) => ber::encode_unsigned(TAG_COUNTER64, *v, out),
        SnmpValue::NoSuchObject => ber::encode_tlv(TAG_NO_SUCH_OBJECT, &[], out),
        SnmpValue::NoSuchInstance => ber::encode_tlv(TAG_NO_SUCH_INSTANCE, &[], out),
        SnmpValue::EndOfMibView => ber::encode_tlv(TAG_END_OF_MIB_VIEW, &[], out),
    }
}

pub fn decode_value(tlv: &Tlv<'_>) -> Result<SnmpValue> {
    match tlv.tag {
        ber::TAG_INTEGER => Ok(SnmpValue::Integer(ber::decode_integer(tlv)?)),
        ber::TAG_OCTET_STRING => Ok(SnmpValue::OctetString(ber::decode_octet_string(tlv)?)),
        ber::TAG_NULL => Ok(SnmpValue::Null),
        ber::TAG_OID => Ok(SnmpValue::ObjectId(ber::decode_oid(tlv)?)),
        TAG_IP_ADDRESS => {
            if tlv.value.len() != 4 {
                return Err(Error::codec("IpAddress must be 4 octets"));
            }
            let mut addr = [0u8; 4];
            addr.copy_from_slice(tlv.value);
            Ok(SnmpValue::IpAddress(addr))
        }
        TAG_COUNTER32 => Ok(SnmpValue::Counter32(ber::decode_unsigned(tlv)? as u32)),
        TAG_GAUGE32 => Ok(SnmpValue::Gauge32(ber::decode_unsigned(tlv)? as u32)),
        TAG_TIME_TICKS => Ok(SnmpValue::TimeTicks(ber::decode_unsigned(tlv)? as u32)),
        TAG_OPAQUE => Ok(SnmpValue::Opaque(tlv.value.to_vec())),
        TAG_COUNTER64 => Ok(SnmpValue::Counter64(ber::decode_unsigned(tlv)?)),
        TAG_NO_SUCH_OBJECT => Ok(SnmpValue::NoSuchObject),
        TAG_NO_SUCH_INSTANCE => Ok(SnmpValue::NoSuchInstance),
        TAG_END_OF_MIB_VIEW => Ok(SnmpValue::EndOfMibView),
        other => Err(Error::codec(format!("unsupported value tag 0x{:02x}", other))),
    }
}

pub fn encode_var_bind(vb: &VarBind, out: &mut Vec<u8>) {
    let mut body = Vec::new();
    ber::encode_oid(&vb.oid, &mut body);
    encode_value(&vb.value, &mut body);
    out.extend_from_slice(&ber::encode_sequence(&body));
}

pub fn decode_var_bind(bytes: &[u8]) -> Result<VarBind> {
    let oid_tlv = ber::read_tlv(bytes)?;
    let oid = ber::decode_oid(&oid_tlv)?;
    let value_tlv = ber::read_tlv(oid_tlv.rest)?;
    let value = decode_value(&value_tlv)?;
    Ok(VarBind::new(oid, value))
}

pub fn encode_var_bind_list(var_binds: &[VarBind]) -> Vec<u8> {
    let mut body = Vec::new();
    for vb in var_binds {
        encode_var_bind(vb, &mut body);
    }
    ber::encode_sequence(&body)
}

pub fn decode_var_bind_list(tlv: &Tlv<'_>) -> Result<Vec<VarBind>> {
    if tlv.tag != ber::TAG_SEQUENCE {
        return Err(Error::codec("expected VarBindList SEQUENCE"));
    }
    let mut remaining = tlv.value;
    let mut result = Vec::new();
    while !remaining.is_empty() {
        let entry = ber::read_tlv(remaining)?;
        if entry.tag != ber::TAG_SEQUENCE {
            return Err(Error::codec("expected VarBind SEQUENCE"));
        }
        result.push(decode_var_bind(entry.value)?);
        remaining = entry.rest;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varbind_roundtrip() {
        let vb = VarBind::new(
            Oid::from_string("1.3.6.1.2.1.1.1.0").unwrap(),
            SnmpValue::OctetString(b"Redfire".to_vec()),
        );
        let mut out = Vec::new();
        encode_var_bind(&vb, &mut out);
        let decoded = decode_var_bind(&out).unwrap();
        assert_eq!(decoded, vb);
    }

    #[test]
    fn exception_values_roundtrip() {
        for value in [
            SnmpValue::NoSuchObject,
            SnmpValue::NoSuchInstance,
            SnmpValue::EndOfMibView,
        ] {
            let mut out = Vec::new();
            encode_value(&value, &mut out);
            let tlv = ber::read_tlv(&out).unwrap();
            assert_eq!(decode_value(&tlv).unwrap(), value);
        }
    }

    #[test]
    fn var_bind_list_roundtrip() {
        let list = vec![
            VarBind::new(Oid::from_string("1.3.6.1.2.1.2.2.1.2.1").unwrap(), SnmpValue::Integer(1)),
            VarBind::new(Oid::from_string("1.3.6.1.2.1.2.2.1.2.2").unwrap(), SnmpValue::Counter32(42)),
        ];
        let encoded = encode_var_bind_list(&list);
        let tlv = ber::read_tlv(&encoded).unwrap();
        let decoded = decode_var_bind_list(&tlv).unwrap();
        assert_eq!(decoded, list);
    }
}
