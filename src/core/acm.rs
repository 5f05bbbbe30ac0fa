//! Access Control Model stub.
//!
//! The engine is a manager, not an agent: it never serves incoming
//! requests against a local MIB, so VACM view evaluation has nothing
//! to check against. The trait exists purely as the seam the Message
//! Processing Models call through, matching the shape of the other
//! subsystem registries on [`crate::core::engine::SnmpEngine`].

/// Access control decision point. A manager-role engine always grants:
/// there is no local MIB whose views could deny anything.
pub trait AccessControlModel: Send + Sync {
    fn is_access_allowed(
        &self,
        security_model: i32,
        security_name: &str,
        security_level: u8,
        context_name: &[u8],
    ) -> bool;
}

/// The only implementation this crate ships: unconditional grant.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManagerAccessControlModel;

impl AccessControlModel for ManagerAccessControlModel {
    fn is_access_allowed(
        &self,
        _security_model: i32,
        _security_name: &str,
        _security_level: u8,
        _context_name: &[u8],
    ) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_role_always_grants() {
        let acm = ManagerAccessControlModel;
        assert!(acm.is_access_allowed(3, "any", 3, b""));
    }
}
