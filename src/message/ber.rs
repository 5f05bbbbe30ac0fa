//! Minimal BER/DER envelope codec.
//!
//! Hand-rolled tag/length/value encode and decode for the handful of
//! universal types SNMP actually uses (INTEGER, OCTET STRING, NULL,
//! OBJECT IDENTIFIER, SEQUENCE) plus the context/application tags the
//! PDU and value types layer on top. `asn1_rs::FromBer` is used
//! elsewhere, in `security::usm`, to decode `UsmSecurityParameters` —
//! that module mirrors the upstream `rusticata-snmp-parser` crate
//! closely enough that reimplementing its SEQUENCE walk by hand would
//! only add risk, whereas the generic TLV framing here is simple
//! enough, and performance-sensitive enough on the hot encode path,
//! to own outright.

use crate::pdu::Oid;
use crate::{Error, Result};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;

/// A parsed tag/length/value triple, with `value` holding exactly the
/// content octets (definite-length form only — SNMP never uses the
/// indefinite form).
pub struct Tlv<'a> {
    pub tag: u8,
    pub value: &'a [u8],
    pub rest: &'a [u8],
}

pub fn encode_length(len: usize, out: &mut Vec<u8>) {
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = len.to_be_bytes();
        let significant: Vec<u8> = bytes
            .iter()
            .copied()
            .skip_while(|&b| b == 0)
            .collect();
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(&significant);
    }
}

pub fn encode_tlv(tag: u8, body: &[u8], out: &mut Vec<u8>) {
    out.push(tag);
    encode_length(body.len(), out);
    out.extend_from_slice(body);
}

pub fn encode_sequence(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    encode_tlv(TAG_SEQUENCE, body, &mut out);
    out
}

pub fn encode_tagged(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + 4);
    encode_tlv(tag, body, &mut out);
    out
}

pub fn encode_null() -> Vec<u8> {
    vec![TAG_NULL, 0x00]
}

/// Minimal-length two's complement encoding, as BER INTEGER requires.
pub fn encode_integer(value: i64, out: &mut Vec<u8>) {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1
        && ((bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xFF && bytes[1] & 0x80 != 0))
    {
        bytes.remove(0);
    }
    encode_tlv(TAG_INTEGER, &bytes, out);
}

/// Unsigned integer encoding for Counter32/Gauge32/TimeTicks/Counter64
/// and for engineBoots/engineTime, which are encoded as INTEGER-like
/// but never negative: a leading 0x00 pad byte is added whenever the
/// high bit of the first significant byte is set.
pub fn encode_unsigned(tag: u8, value: u64, out: &mut Vec<u8>) {
    let mut bytes: Vec<u8> = value
        .to_be_bytes()
        .iter()
        .copied()
        .skip_while(|&b| b == 0)
        .collect();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0x00);
    }
    encode_tlv(tag, &bytes, out);
}

pub fn encode_octet_string(bytes: &[u8], out: &mut Vec<u8>) {
    encode_tlv(TAG_OCTET_STRING, bytes, out);
}

pub fn encode_oid(oid: &Oid, out: &mut Vec<u8>) {
    let body = encode_oid_body(&oid.components);
    encode_tlv(TAG_OID, &body, out);
}

fn encode_oid_body(components: &[u32]) -> Vec<u8> {
    let mut body = Vec::new();
    if components.len() < 2 {
        return body;
    }
    body.push((components[0] * 40 + components[1]) as u8);
    for &component in &components[2..] {
        encode_base128(component, &mut body);
    }
    body
}

fn encode_base128(mut value: u32, out: &mut Vec<u8>) {
    let mut stack = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        stack.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    stack.reverse();
    out.extend_from_slice(&stack);
}

/// Reads one definite-length TLV from the front of `input`.
pub fn read_tlv(input: &[u8]) -> Result<Tlv<'_>> {
    if input.is_empty() {
        return Err(Error::codec("unexpected end of input reading BER tag"));
    }
    let tag = input[0];
    let mut pos = 1;
    if pos >= input.len() {
        return Err(Error::codec("truncated BER length"));
    }
    let first_len_byte = input[pos];
    pos += 1;
    let len = if first_len_byte & 0x80 == 0 {
        first_len_byte as usize
    } else {
        let num_bytes = (first_len_byte & 0x7F) as usize;
        if num_bytes == 0 || num_bytes > 8 {
            return Err(Error::codec("unsupported BER length form"));
        }
        if pos + num_bytes > input.len() {
            return Err(Error::codec("truncated BER long-form length"));
        }
        let mut len = 0usize;
        for &b in &input[pos..pos + num_bytes] {
            len = (len << 8) | b as usize;
        }
        pos += num_bytes;
        len
    };
    if pos + len > input.len() {
        return Err(Error::codec("BER value runs past end of input"));
    }
    Ok(Tlv {
        tag,
        value: &input[pos..pos + len],
        rest: &input[pos + len..],
    })
}

pub fn decode_integer(tlv: &Tlv<'_>) -> Result<i64> {
    if tlv.tag != TAG_INTEGER {
        return Err(Error::codec("expected INTEGER"));
    }
    if tlv.value.is_empty() {
        return Err(Error::codec("empty INTEGER"));
    }
    if tlv.value.len() > 8 {
        return Err(Error::codec("INTEGER too wide"));
    }
    let negative = tlv.value[0] & 0x80 != 0;
    let mut v: i64 = if negative { -1 } else { 0 };
    for &b in tlv.value {
        v = (v << 8) | b as i64;
    }
    Ok(v)
}

pub fn decode_unsigned(tlv: &Tlv<'_>) -> Result<u64> {
    if tlv.value.is_empty() {
        return Ok(0);
    }
    if tlv.value[0] & 0x80 != 0 && tlv.value.len() >= 9 {
        return Err(Error::codec("unsigned value too wide"));
    }
    let mut v: u64 = 0;
    for &b in tlv.value {
        v = (v << 8) | b as u64;
    }
    Ok(v)
}

pub fn decode_octet_string(tlv: &Tlv<'_>) -> Result<Vec<u8>> {
    if tlv.tag != TAG_OCTET_STRING {
        return Err(Error::codec("expected OCTET STRING"));
    }
    Ok(tlv.value.to_vec())
}

pub fn decode_oid(tlv: &Tlv<'_>) -> Result<Oid> {
    if tlv.tag != TAG_OID {
        return Err(Error::codec("expected OBJECT IDENTIFIER"));
    }
    Ok(Oid::new(decode_oid_body(tlv.value)?))
}

fn decode_oid_body(body: &[u8]) -> Result<Vec<u32>> {
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let mut components = vec![(body[0] / 40) as u32, (body[0] % 40) as u32];
    let mut value: u32 = 0;
    for &b in &body[1..] {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            components.push(value);
            value = 0;
        }
    }
    Ok(components)
}
