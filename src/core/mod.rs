//! The engine object, its persistence, the Access Control Model stub,
//! and the Message & PDU Dispatcher (spec.md §3, §4.1, §4.2).

pub mod acm;
pub mod dispatcher;
pub mod engine;
mod persistence;

pub use acm::{AccessControlModel, ManagerAccessControlModel};
pub use dispatcher::{CommandResponse, Counters, Dispatcher, ErrorIndication, ResolvedTarget, SendPduHandle};
pub use engine::SnmpEngine;
