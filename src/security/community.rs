//! v1/v2c community-based security (spec.md §3 "V1/V2c community entry",
//! §4.3).
//!
//! There is no authentication or privacy to apply; `generate_request_msg`
//! and `process_incoming_msg` exist only so the dispatcher can treat
//! every security model uniformly. The community string itself lives
//! on the `SnmpMessage::V1V2c` variant, not in `msgSecurityParameters`
//! (RFC 2576 §4), so this model's real job is the table that maps a
//! `securityName` to the community string to send, and a received
//! community string back to a `securityName`.

use dashmap::DashMap;

use crate::message::ScopedPdu;
use crate::security::{
    IncomingSecurityRequest, IncomingSecurityResult, OutgoingSecurityRequest,
    OutgoingSecurityResult, SecurityError, SecurityLevel, SecurityModel, SECURITY_MODEL_V1,
    SECURITY_MODEL_V2C,
};
use crate::{Error, Result};

/// A v1/v2c community entry (spec.md §3). Keyed on send by
/// `securityName`, and on receive by the community string carried in
/// the message.
#[derive(Debug, Clone)]
pub struct CommunityEntry {
    pub community: String,
    pub security_name: String,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
    pub tag_list: String,
}

/// The community table backing both v1 and v2c security processing.
/// One instance is shared by `CommunitySecurityModelV1` and
/// `CommunitySecurityModelV2c` since the wire format differs only in
/// the `msgVersion` field, not in how the community is resolved.
#[derive(Debug, Default)]
pub struct CommunityTable {
    by_security_name: DashMap<String, CommunityEntry>,
    by_community: DashMap<String, CommunityEntry>,
}

impl CommunityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, entry: CommunityEntry) {
        self.by_security_name
            .insert(entry.security_name.clone(), entry.clone());
        self.by_community.insert(entry.community.clone(), entry);
    }

    pub fn remove_by_security_name(&self, security_name: &str) {
        if let Some((_, entry)) = self.by_security_name.remove(security_name) {
            self.by_community.remove(&entry.community);
        }
    }

    pub fn lookup_by_security_name(&self, security_name: &str) -> Option<CommunityEntry> {
        self.by_security_name.get(security_name).map(|e| e.clone())
    }

    pub fn lookup_by_community(&self, community: &str) -> Option<CommunityEntry> {
        self.by_community.get(community).map(|e| e.clone())
    }

    pub fn clear(&self) {
        self.by_security_name.clear();
        self.by_community.clear();
    }
}

/// Shared implementation; `mp_model_is_v2c` only changes what
/// `security_model()` reports (RFC 3411 §5: 1 for v1, 2 for v2c).
pub struct CommunitySecurityModel {
    table: std::sync::Arc<CommunityTable>,
    security_model: i32,
}

impl CommunitySecurityModel {
    pub fn v1(table: std::sync::Arc<CommunityTable>) -> Self {
        Self {
            table,
            security_model: SECURITY_MODEL_V1,
        }
    }

    pub fn v2c(table: std::sync::Arc<CommunityTable>) -> Self {
        Self {
            table,
            security_model: SECURITY_MODEL_V2C,
        }
    }
}

impl SecurityModel for CommunitySecurityModel {
    fn security_model(&self) -> i32 {
        self.security_model
    }

    fn generate_request_msg(
        &self,
        request: &OutgoingSecurityRequest<'_>,
    ) -> Result<OutgoingSecurityResult> {
        let entry = self
            .table
            .lookup_by_security_name(request.security_name)
            .ok_or_else(|| {
                Error::usm(format!(
                    "no community entry for securityName {:?}",
                    request.security_name
                ))
            })?;
        // The community string itself rides on the message envelope,
        // not msgSecurityParameters; nothing further to armour.
        let _ = entry;
        Ok(OutgoingSecurityResult {
            msg_security_parameters: Vec::new(),
            encrypted_scoped_pdu: None,
            requires_mac_finalization: false,
        })
    }

    fn process_incoming_msg(
        &self,
        request: &IncomingSecurityRequest<'_>,
    ) -> std::result::Result<IncomingSecurityResult, SecurityError> {
        let scoped_pdu = request
            .scoped_pdu
            .ok_or_else(|| SecurityError::Malformed("v1/v2c message missing PDU".to_string()))?;
        Ok(IncomingSecurityResult {
            security_name: String::new(),
            security_level: SecurityLevel::NoAuthNoPriv,
            scoped_pdu: scoped_pdu.clone(),
            authoritative_engine_id: Vec::new(),
            authoritative_engine_boots: 0,
            authoritative_engine_time: 0,
        })
    }
}

/// Resolves a received community string to a `securityName`, or
/// `None` if unrecognised (the caller should treat this as an
/// authentication failure per RFC 3584 §3.3.3, dropping the message).
pub fn resolve_community(table: &CommunityTable, community: &[u8]) -> Option<CommunityEntry> {
    let community = String::from_utf8_lossy(community);
    table.lookup_by_community(&community)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CommunityEntry {
        CommunityEntry {
            community: "public".to_string(),
            security_name: "public".to_string(),
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
            tag_list: String::new(),
        }
    }

    #[test]
    fn lookup_by_either_key() {
        let table = CommunityTable::new();
        table.add(sample_entry());
        assert!(table.lookup_by_security_name("public").is_some());
        assert!(table.lookup_by_community("public").is_some());
        assert!(table.lookup_by_community("private").is_none());
    }

    #[test]
    fn remove_clears_both_indices() {
        let table = CommunityTable::new();
        table.add(sample_entry());
        table.remove_by_security_name("public");
        assert!(table.lookup_by_security_name("public").is_none());
        assert!(table.lookup_by_community("public").is_none());
    }

    #[test]
    fn unknown_community_is_rejected() {
        let table = CommunityTable::new();
        assert!(resolve_community(&table, b"nope").is_none());
    }
}
