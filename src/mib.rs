//! The seam for a MIB object store (spec.md §6 "External interfaces").
//!
//! Compiling and querying MIB modules is out of scope here — a host
//! application supplies its own `MibResolver`, typically backed by a
//! compiled MIB tree, and the Command Generator's symbolic-name
//! helpers (not yet needed by anything in this crate, since every
//! `cmdgen` entry point already takes `Oid`s directly) would call
//! through it.

use crate::pdu::Oid;

/// Resolves between symbolic MIB names and OIDs (spec.md §6, mirroring
/// pysnmp's `mibvar.mibNameToOid`/`mibvar.oidToMibName`).
pub trait MibResolver: Send + Sync {
    /// `symbolic_name` is typically `("IF-MIB", "ifDescr")`, sometimes
    /// with trailing instance indices rolled into the returned suffix.
    /// Returns the object's base OID and the index suffix, if any.
    fn mib_name_to_oid(&self, symbolic_name: &str) -> Option<(Oid, Vec<u32>)>;

    /// The inverse lookup: given a full instance OID, the symbolic
    /// name and module it belongs to, plus the index suffix.
    fn oid_to_mib_name(&self, oid: &Oid) -> Option<((String, String), Vec<u32>)>;
}
