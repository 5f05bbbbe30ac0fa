//! Single-exchange Command Generator applications: GET, GET-NEXT,
//! GET-BULK and SET (RFC 3413 §3.2, §4; spec.md §4.4 "Command
//! Generator applications").
//!
//! Each of these differs from the others only in which `PduType` goes
//! out and how it's shaped; all four share the same
//! resolve-then-send-then-translate shape, grounded on
//! `pysnmp.hlapi.asyncore.cmdgen.CommandGenerator.getCmd`/`setCmd`.

use crate::cmdgen::facade::{AuthData, ConfigFacade, TransportTarget};
use crate::core::{Dispatcher, ErrorIndication, SnmpEngine};
use crate::pdu::{ErrorStatus, Pdu, PduType, SnmpValue, VarBind};
use crate::{Error, Result};

/// What every single-PDU Command Generator call returns: the
/// `(errorIndication, errorStatus, errorIndex, varBinds)` tuple RFC
/// 3413 §3.2 specifies for a Command Generator's `processResponsePdu`.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub error_indication: Option<ErrorIndication>,
    pub error_status: ErrorStatus,
    pub error_index: i32,
    pub var_binds: Vec<VarBind>,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.error_indication.is_none() && !self.error_status.is_error()
    }
}

/// Resolves `auth_data`/`transport_target` against `facade`, sends one
/// PDU through `dispatcher`, and waits for the response (or timeout,
/// or the 150s-class security failures the dispatcher can deliver in
/// its place).
pub async fn send_single(
    engine: &SnmpEngine,
    dispatcher: &Dispatcher,
    facade: &ConfigFacade,
    auth_data: &AuthData,
    transport_target: &TransportTarget,
    pdu_type: PduType,
    var_binds: Vec<VarBind>,
) -> Result<CommandResult> {
    let (addr_name, _) = facade.resolve_or_register(auth_data, transport_target, "")?;
    let target = facade.resolve_target(&addr_name)?;

    let context_engine_id = Vec::new();
    let context_name = match auth_data {
        AuthData::Community { context_name, .. } => context_name.clone(),
        AuthData::V3User { context_name, .. } => context_name.clone(),
    };

    let pdu = Pdu::new(pdu_type, 0, var_binds);
    let (_, rx) = dispatcher
        .send_pdu(engine, target, context_engine_id, context_name, pdu, true)
        .await?;

    let response = rx
        .await
        .map_err(|_| Error::internal("dispatcher dropped the response channel"))?;

    Ok(CommandResult {
        error_indication: response.error_indication,
        error_status: response.error_status,
        error_index: response.error_index,
        var_binds: response.var_binds,
    })
}

/// GET-REQUEST (RFC 3416 §4.2.1): one PDU naming the OIDs to read, a
/// `univ.Null` placeholder value for each (spec.md §4.4).
pub async fn get(
    engine: &SnmpEngine,
    dispatcher: &Dispatcher,
    facade: &ConfigFacade,
    auth_data: &AuthData,
    transport_target: &TransportTarget,
    oids: &[crate::pdu::Oid],
) -> Result<CommandResult> {
    let var_binds = oids
        .iter()
        .map(|oid| VarBind::new(oid.clone(), SnmpValue::Null))
        .collect();
    send_single(
        engine,
        dispatcher,
        facade,
        auth_data,
        transport_target,
        PduType::GetRequest,
        var_binds,
    )
    .await
}

/// GET-NEXT-REQUEST, one step (RFC 3416 §4.2.2). `walk_next` in
/// `cmdgen::walk` drives repeated calls of this into a table walk.
pub async fn get_next(
    engine: &SnmpEngine,
    dispatcher: &Dispatcher,
    facade: &ConfigFacade,
    auth_data: &AuthData,
    transport_target: &TransportTarget,
    oids: &[crate::pdu::Oid],
) -> Result<CommandResult> {
    let var_binds = oids
        .iter()
        .map(|oid| VarBind::new(oid.clone(), SnmpValue::Null))
        .collect();
    send_single(
        engine,
        dispatcher,
        facade,
        auth_data,
        transport_target,
        PduType::GetNextRequest,
        var_binds,
    )
    .await
}

/// GET-BULK-REQUEST, one step (RFC 3416 §4.2.3). `walk_bulk` in
/// `cmdgen::walk` drives repeated calls of this into a table walk.
#[allow(clippy::too_many_arguments)]
pub async fn get_bulk(
    engine: &SnmpEngine,
    dispatcher: &Dispatcher,
    facade: &ConfigFacade,
    auth_data: &AuthData,
    transport_target: &TransportTarget,
    non_repeaters: i32,
    max_repetitions: i32,
    oids: &[crate::pdu::Oid],
) -> Result<CommandResult> {
    let var_binds = oids
        .iter()
        .map(|oid| VarBind::new(oid.clone(), SnmpValue::Null))
        .collect();
    let (addr_name, _) = facade.resolve_or_register(auth_data, transport_target, "")?;
    let target = facade.resolve_target(&addr_name)?;

    let context_engine_id = Vec::new();
    let context_name = match auth_data {
        AuthData::Community { context_name, .. } => context_name.clone(),
        AuthData::V3User { context_name, .. } => context_name.clone(),
    };

    let pdu = Pdu::get_bulk(0, non_repeaters, max_repetitions, var_binds);
    let (_, rx) = dispatcher
        .send_pdu(engine, target, context_engine_id, context_name, pdu, true)
        .await?;

    let response = rx
        .await
        .map_err(|_| Error::internal("dispatcher dropped the response channel"))?;

    Ok(CommandResult {
        error_indication: response.error_indication,
        error_status: response.error_status,
        error_index: response.error_index,
        var_binds: response.var_binds,
    })
}

/// SET-REQUEST (RFC 3416 §4.2.5): `var_binds` already carries the
/// values to write, unlike GET's placeholder `Null`s.
pub async fn set(
    engine: &SnmpEngine,
    dispatcher: &Dispatcher,
    facade: &ConfigFacade,
    auth_data: &AuthData,
    transport_target: &TransportTarget,
    var_binds: Vec<VarBind>,
) -> Result<CommandResult> {
    send_single(
        engine,
        dispatcher,
        facade,
        auth_data,
        transport_target,
        PduType::SetRequest,
        var_binds,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_result_success_requires_no_indication_and_no_error() {
        let ok = CommandResult {
            error_indication: None,
            error_status: ErrorStatus::NoError,
            error_index: 0,
            var_binds: Vec::new(),
        };
        assert!(ok.is_success());

        let timed_out = CommandResult {
            error_indication: Some(ErrorIndication::RequestTimedOut),
            error_status: ErrorStatus::NoError,
            error_index: 0,
            var_binds: Vec::new(),
        };
        assert!(!timed_out.is_success());

        let errored = CommandResult {
            error_indication: None,
            error_status: ErrorStatus::GenErr,
            error_index: 1,
            var_binds: Vec::new(),
        };
        assert!(!errored.is_success());
    }
}
