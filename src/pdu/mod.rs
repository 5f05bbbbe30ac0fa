//! PDU and value types shared by every Message Processing Model
//! (spec.md §3, §4.5, RFC 3416).

mod oid;
mod value;

pub use oid::Oid;
pub use value::{ErrorStatus, Pdu, PduType, SnmpValue, VarBind};
