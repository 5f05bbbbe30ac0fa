//! Command Generator applications (RFC 3413 §3.2, §4; spec.md §4.4):
//! GET, GET-NEXT, GET-BULK, SET and table walking, plus the
//! Configuration Facade that resolves `AuthData`/`TransportTarget`
//! pairs into targets the dispatcher can address.
//!
//! `CommandGenerator` is the one type most callers need: it owns the
//! engine, the dispatcher, and a bound UDP transport, and exposes the
//! handful of async methods an application actually calls — modelled
//! on `pysnmp.hlapi.asyncore.cmdgen.CommandGenerator`, minus the
//! callback-passing style pysnmp needs and this crate's `oneshot`
//! based dispatcher does not.

pub mod facade;
pub mod get;
pub mod walk;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::core::{Dispatcher, SnmpEngine};
use crate::pdu::{Oid, VarBind};
use crate::transport::{TransportDispatcher, UdpTransport};
use crate::Result;

pub use facade::{AuthData, ConfigFacade, TransportTarget};
pub use get::CommandResult;
pub use walk::WalkResult;

/// Ties an `SnmpEngine`, its `Dispatcher` and a bound transport
/// together (spec.md §4.4).
pub struct CommandGenerator {
    engine: Arc<SnmpEngine>,
    dispatcher: Arc<Dispatcher>,
    facade: ConfigFacade,
    transport: Arc<dyn TransportDispatcher>,
}

impl CommandGenerator {
    /// Builds the engine, binds a UDP transport on `bind_addr`, wires
    /// the dispatcher's `receive_message`/`receive_timer_tick` to the
    /// transport's callbacks, and spawns the receive loop. Each
    /// inbound datagram is handed to its own task so a slow Message
    /// Processing Model pass never stalls the transport's recv loop.
    pub async fn bind(config: &EngineConfig, bind_addr: SocketAddr, timer_period: Duration) -> Result<Self> {
        let engine = Arc::new(SnmpEngine::new(config)?);
        let dispatcher = Arc::new(Dispatcher::new());
        let facade = ConfigFacade::new(engine.clone());

        let transport: Arc<dyn TransportDispatcher> =
            Arc::new(UdpTransport::bind(bind_addr, timer_period).await?);
        dispatcher.bind_transport(transport.clone()).await;

        let recv_engine = engine.clone();
        let recv_dispatcher = dispatcher.clone();
        transport.register_recv_callback(Arc::new(move |domain: &str, bytes: &[u8]| {
            let engine = recv_engine.clone();
            let dispatcher = recv_dispatcher.clone();
            let domain = domain.to_string();
            let bytes = bytes.to_vec();
            tokio::spawn(async move {
                dispatcher.receive_message(&engine, &domain, &bytes).await;
            });
        }));

        let timer_engine = engine.clone();
        let timer_dispatcher = dispatcher.clone();
        transport.register_timer_callback(Arc::new(move || {
            let engine = timer_engine.clone();
            let dispatcher = timer_dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.receive_timer_tick(&engine, Instant::now()).await;
            });
        }));

        let run_transport = transport.clone();
        tokio::spawn(async move { run_transport.run_dispatcher().await });

        Ok(Self {
            engine,
            dispatcher,
            facade,
            transport,
        })
    }

    pub fn engine(&self) -> &Arc<SnmpEngine> {
        &self.engine
    }

    pub fn facade(&self) -> &ConfigFacade {
        &self.facade
    }

    /// Stops the receive loop/timer and fails every outstanding
    /// request with `engineShuttingDown`.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
        self.dispatcher.shutdown().await;
    }

    pub async fn get(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        oids: &[Oid],
    ) -> Result<CommandResult> {
        get::get(&self.engine, &self.dispatcher, &self.facade, auth_data, transport_target, oids).await
    }

    pub async fn set(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        var_binds: Vec<VarBind>,
    ) -> Result<CommandResult> {
        get::set(&self.engine, &self.dispatcher, &self.facade, auth_data, transport_target, var_binds).await
    }

    pub async fn get_next(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        oids: &[Oid],
    ) -> Result<CommandResult> {
        get::get_next(&self.engine, &self.dispatcher, &self.facade, auth_data, transport_target, oids).await
    }

    pub async fn get_bulk(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        non_repeaters: i32,
        max_repetitions: i32,
        oids: &[Oid],
    ) -> Result<CommandResult> {
        get::get_bulk(
            &self.engine,
            &self.dispatcher,
            &self.facade,
            auth_data,
            transport_target,
            non_repeaters,
            max_repetitions,
            oids,
        )
        .await
    }

    pub async fn walk_next(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        oids: &[Oid],
        lexicographic_mode: bool,
    ) -> Result<WalkResult> {
        walk::walk_next(
            &self.engine,
            &self.dispatcher,
            &self.facade,
            auth_data,
            transport_target,
            oids,
            lexicographic_mode,
        )
        .await
    }

    pub async fn walk_bulk(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        oids: &[Oid],
        max_repetitions: i32,
        lexicographic_mode: bool,
    ) -> Result<WalkResult> {
        walk::walk_bulk(
            &self.engine,
            &self.dispatcher,
            &self.facade,
            auth_data,
            transport_target,
            oids,
            max_repetitions,
            lexicographic_mode,
        )
        .await
    }
}
