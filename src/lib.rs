//! SNMP manager engine
//!
//! Implements the SNMPv1, SNMPv2c and SNMPv3 message processing
//! framework (RFC 3411-3415, 3416, 3417, 2576): a Message and PDU
//! Dispatcher, the three Message Processing Models, the User-Based
//! Security Model, and the Command Generator applications (GET,
//! GET-NEXT, GET-BULK, SET, table walking) that sit on top of them.
//!
//! The engine is a manager, not an agent: there is no command
//! responder and no access control beyond a stub.

pub mod cmdgen;
pub mod config;
pub mod core;
pub mod error;
pub mod message;
pub mod mib;
pub mod mp;
pub mod pdu;
pub mod security;
pub mod transport;
pub mod utils;

pub use error::{Error, Result};
pub use pdu::{ErrorStatus, Oid, PduType, SnmpValue, VarBind};

/// Crate version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
