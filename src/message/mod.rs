//! Wire-format message envelope and BER codec (RFC 3412 §6, RFC 3416).

pub mod ber;
mod envelope;
mod pdu_codec;
mod value_codec;

pub use envelope::{
    MsgGlobalData, ScopedPdu, SecurityLevel, SnmpMessage, FLAG_AUTH, FLAG_PRIV, FLAG_REPORTABLE,
    SNMP_VERSION_1, SNMP_VERSION_2C, SNMP_VERSION_3,
};
pub use pdu_codec::{decode_pdu, encode_pdu};
pub use value_codec::{decode_value, decode_var_bind, decode_var_bind_list, encode_value, encode_var_bind_list};
