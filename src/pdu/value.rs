//! SNMP data types, variable bindings, and PDU contents (RFC 1902, RFC 3416).

use crate::pdu::Oid;

/// SNMP data types, including the SNMPv2 exception values used during
/// table walks (spec.md §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(Oid),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    /// SNMPv2 exception: the named object does not exist.
    NoSuchObject,
    /// SNMPv2 exception: the named instance does not exist.
    NoSuchInstance,
    /// SNMPv2 exception: no further objects exist in the MIB view.
    EndOfMibView,
}

impl SnmpValue {
    /// True for any of the three exception values that end a column
    /// during a table walk (spec.md §4.5).
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::EndOfMibView | SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: SnmpValue,
}

impl VarBind {
    pub fn new(oid: Oid, value: SnmpValue) -> Self {
        Self { oid, value }
    }
}

/// RFC 1905 / RFC 3416 error-status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorStatus {
    NoError = 0,
    TooBig = 1,
    NoSuchName = 2,
    BadValue = 3,
    ReadOnly = 4,
    GenErr = 5,
    NoAccess = 6,
    WrongType = 7,
    WrongLength = 8,
    WrongEncoding = 9,
    WrongValue = 10,
    NoCreation = 11,
    InconsistentValue = 12,
    ResourceUnavailable = 13,
    CommitFailed = 14,
    UndoFailed = 15,
    AuthorizationError = 16,
    NotWritable = 17,
    InconsistentName = 18,
}

impl ErrorStatus {
    pub fn from_i32(v: i32) -> Self {
        match v {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            _ => Self::GenErr,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::NoError)
    }
}

/// PDU types the engine originates or consumes. Trap/InformRequest are
/// notification-originator/receiver concerns and are out of scope
/// (spec.md §1: "no agent-side command responder").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PduType {
    GetRequest,
    GetNextRequest,
    GetBulkRequest,
    SetRequest,
    Response,
    Report,
}

impl PduType {
    /// BER application/context tag byte used on the wire (RFC 3416 §5).
    pub fn tag(self) -> u8 {
        match self {
            PduType::GetRequest => 0xA0,
            PduType::GetNextRequest => 0xA1,
            PduType::Response => 0xA2,
            PduType::SetRequest => 0xA3,
            PduType::GetBulkRequest => 0xA5,
            PduType::Report => 0xA8,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(PduType::GetRequest),
            0xA1 => Some(PduType::GetNextRequest),
            0xA2 => Some(PduType::Response),
            0xA3 => Some(PduType::SetRequest),
            0xA5 => Some(PduType::GetBulkRequest),
            0xA8 => Some(PduType::Report),
            _ => None,
        }
    }
}

/// The body of an SNMP PDU. For GET-BULK, `error_status`/`error_index`
/// double as `non_repeaters`/`max_repetitions` on the wire (RFC 3416
/// §4.2.3), mirrored here as named fields instead for clarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    pub pdu_type: PduType,
    pub request_id: i32,
    pub error_status: ErrorStatus,
    pub error_index: i32,
    pub var_binds: Vec<VarBind>,
}

impl Pdu {
    pub fn new(pdu_type: PduType, request_id: i32, var_binds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            var_binds,
        }
    }

    pub fn get_bulk(
        request_id: i32,
        non_repeaters: i32,
        max_repetitions: i32,
        var_binds: Vec<VarBind>,
    ) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: ErrorStatus::from_i32(non_repeaters),
            error_index: max_repetitions,
            var_binds,
        }
    }

    pub fn non_repeaters(&self) -> i32 {
        self.error_status as i32
    }

    pub fn max_repetitions(&self) -> i32 {
        self.error_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_values_detected() {
        assert!(SnmpValue::EndOfMibView.is_exception());
        assert!(SnmpValue::NoSuchInstance.is_exception());
        assert!(SnmpValue::NoSuchObject.is_exception());
        assert!(!SnmpValue::Null.is_exception());
        assert!(!SnmpValue::Integer(1).is_exception());
    }

    #[test]
    fn pdu_type_tag_roundtrip() {
        for t in [
            PduType::GetRequest,
            PduType::GetNextRequest,
            PduType::Response,
            PduType::SetRequest,
            PduType::GetBulkRequest,
            PduType::Report,
        ] {
            assert_eq!(PduType::from_tag(t.tag()), Some(t));
        }
    }

    #[test]
    fn v1_no_such_name_is_error() {
        assert!(ErrorStatus::NoSuchName.is_error());
        assert!(!ErrorStatus::NoError.is_error());
    }
}
