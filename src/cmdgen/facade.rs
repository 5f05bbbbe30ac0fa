//! The Configuration Facade (spec.md §3 "Configuration Facade", §4.6;
//! modelled on `pysnmp.hlapi.asyncore.cmdgen.AsynCommandGenerator.cfgCmdGen`).
//!
//! Command Generator applications never touch `SnmpEngine`'s
//! community table, USM user table or target registries directly.
//! They describe *who* to talk to (`AuthData`) and *where*
//! (`TransportTarget`); this facade turns that pair into a stable
//! `addrName` it can hand to the dispatcher, registering the
//! underlying engine state exactly once no matter how many times the
//! same `AuthData`/`TransportTarget` combination is reused.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::core::{ResolvedTarget, SnmpEngine};
use crate::message::SecurityLevel;
use crate::mp::{MP_MODEL_V1, MP_MODEL_V2C, MP_MODEL_V3};
use crate::security::community::CommunityEntry;
use crate::security::usm::crypto::{AuthProtocol, PrivProtocol};
use crate::security::{SECURITY_MODEL_USM, SECURITY_MODEL_V1, SECURITY_MODEL_V2C};
use crate::{Error, Result};

/// How a target is authenticated: either a v1/v2c community or a USM
/// user. Hashed directly, the way pysnmp hashes `CommunityData` and
/// `UsmUserData`, so registering the same credentials twice is a
/// cache hit rather than a duplicate table entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthData {
    Community {
        security_name: String,
        community: String,
        /// 0 for v1, 1 for v2c (RFC 3411 §5).
        mp_model: i32,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
    },
    V3User {
        security_name: String,
        /// The remote authoritative engine's ID. Unlike pysnmp, which
        /// can localise a user's keys lazily against whichever engine
        /// discovery turns up, this facade requires it up front: a
        /// USM user table entry is keyed by `(engineID, userName)`
        /// and there is nowhere to stash a not-yet-localised key.
        engine_id: Vec<u8>,
        auth_protocol: Option<AuthProtocol>,
        auth_password: Option<Vec<u8>>,
        priv_protocol: Option<PrivProtocol>,
        priv_password: Option<Vec<u8>>,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
    },
}

impl AuthData {
    pub fn security_name(&self) -> &str {
        match self {
            AuthData::Community { security_name, .. } => security_name,
            AuthData::V3User { security_name, .. } => security_name,
        }
    }

    fn mp_model(&self) -> i32 {
        match self {
            AuthData::Community { mp_model, .. } => *mp_model,
            AuthData::V3User { .. } => MP_MODEL_V3,
        }
    }

    /// `authPriv` if a privacy password was given, `authNoPriv` if
    /// only an authentication password was given, `noAuthNoPriv`
    /// otherwise (RFC 3414 §3, mirroring `UsmUserData.securityLevel`).
    fn security_level(&self) -> SecurityLevel {
        match self {
            AuthData::Community { .. } => SecurityLevel::NoAuthNoPriv,
            AuthData::V3User {
                auth_password,
                priv_password,
                ..
            } => {
                if priv_password.is_some() {
                    SecurityLevel::AuthPriv
                } else if auth_password.is_some() {
                    SecurityLevel::AuthNoPriv
                } else {
                    SecurityLevel::NoAuthNoPriv
                }
            }
        }
    }
}

/// Where to send requests (`pysnmp.hlapi.asyncore.cmdgen.UdpTransportTarget`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportTarget {
    pub transport_domain: String,
    pub address: SocketAddr,
    pub timeout: Duration,
    pub retries: u32,
}

impl TransportTarget {
    pub fn udp(address: SocketAddr) -> Self {
        Self {
            transport_domain: "udp".to_string(),
            address,
            timeout: Duration::from_secs(1),
            retries: 5,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

/// `targetParams` entry (RFC 3413 §5.3): which security identity and
/// level to apply, independent of where the bytes go.
#[derive(Debug, Clone)]
pub struct ParamsEntry {
    pub security_name: String,
    pub security_level: SecurityLevel,
    pub mp_model: i32,
}

/// `targetAddr` entry (RFC 3413 §5.2): where the bytes go, and which
/// `targetParams` to apply when they get there.
#[derive(Debug, Clone)]
pub struct AddrEntry {
    pub transport_domain: String,
    pub transport_address: SocketAddr,
    pub params_name: String,
    pub timeout: Duration,
    pub retries: u32,
    pub tag_list: String,
}

fn security_model_for_mp_model(mp_model: i32) -> i32 {
    match mp_model {
        MP_MODEL_V1 => SECURITY_MODEL_V1,
        MP_MODEL_V2C => SECURITY_MODEL_V2C,
        _ => SECURITY_MODEL_USM,
    }
}

/// Registers targets and credentials against an `SnmpEngine` on
/// demand and remembers the generated names, so repeated
/// `resolve_or_register` calls with the same `AuthData` and
/// `TransportTarget` are free after the first (spec.md §4.6).
pub struct ConfigFacade {
    engine: Arc<SnmpEngine>,
    params: DashMap<String, ParamsEntry>,
    addrs: DashMap<String, AddrEntry>,
    known_auths: DashMap<AuthData, String>,
    known_transports: DashMap<String, ()>,
    known_transport_addrs: DashMap<(String, SocketAddr, String), String>,
    next_id: AtomicU32,
}

impl ConfigFacade {
    pub fn new(engine: Arc<SnmpEngine>) -> Self {
        Self {
            engine,
            params: DashMap::new(),
            addrs: DashMap::new(),
            known_auths: DashMap::new(),
            known_transports: DashMap::new(),
            known_transport_addrs: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    fn next_params_name(&self) -> String {
        format!("p{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn next_addr_name(&self) -> String {
        format!("a{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn add_v1_system(
        &self,
        security_name: &str,
        community: &str,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
        tag_list: &str,
    ) {
        self.engine.community_table().add(CommunityEntry {
            community: community.to_string(),
            security_name: security_name.to_string(),
            context_engine_id,
            context_name,
            tag_list: tag_list.to_string(),
        });
    }

    pub fn del_v1_system(&self, security_name: &str) {
        self.engine.community_table().remove_by_security_name(security_name);
    }

    pub fn add_v3_user(
        &self,
        security_name: &str,
        engine_id: &[u8],
        auth_protocol: Option<AuthProtocol>,
        auth_password: Option<&[u8]>,
        priv_protocol: Option<PrivProtocol>,
        priv_password: Option<&[u8]>,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
    ) -> Result<()> {
        self.engine.usm_users().add(
            engine_id,
            security_name,
            auth_protocol,
            auth_password,
            priv_protocol,
            priv_password,
            context_engine_id,
            context_name,
        )
    }

    pub fn del_v3_user(&self, engine_id: &[u8], security_name: &str) {
        self.engine.usm_users().remove(engine_id, security_name);
    }

    pub fn add_target_params(
        &self,
        params_name: &str,
        security_name: &str,
        security_level: SecurityLevel,
        mp_model: i32,
    ) {
        self.params.insert(
            params_name.to_string(),
            ParamsEntry {
                security_name: security_name.to_string(),
                security_level,
                mp_model,
            },
        );
    }

    pub fn del_target_params(&self, params_name: &str) {
        self.params.remove(params_name);
    }

    pub fn add_target_addr(
        &self,
        addr_name: &str,
        transport_domain: &str,
        transport_address: SocketAddr,
        params_name: &str,
        timeout: Duration,
        retries: u32,
        tag_list: &str,
    ) {
        self.addrs.insert(
            addr_name.to_string(),
            AddrEntry {
                transport_domain: transport_domain.to_string(),
                transport_address,
                params_name: params_name.to_string(),
                timeout,
                retries,
                tag_list: tag_list.to_string(),
            },
        );
    }

    pub fn del_target_addr(&self, addr_name: &str) {
        self.addrs.remove(addr_name);
    }

    /// Marks `transport_domain` as bound. This engine only ever binds
    /// a single `TransportDispatcher` (spec.md §4.1 invariant), so
    /// unlike pysnmp's `addSocketTransport` this opens nothing; it
    /// just stops `resolve_or_register` repeating the bookkeeping.
    pub fn add_socket_transport(&self, transport_domain: &str) {
        self.known_transports.insert(transport_domain.to_string(), ());
    }

    pub fn del_socket_transport(&self, transport_domain: &str) {
        self.known_transports.remove(transport_domain);
    }

    /// The `cfgCmdGen` equivalent: registers `auth_data` and
    /// `transport_target` with the engine the first time they are
    /// seen, and returns the (possibly cached) `addrName`/`paramsName`
    /// pair.
    pub fn resolve_or_register(
        &self,
        auth_data: &AuthData,
        transport_target: &TransportTarget,
        tag_list: &str,
    ) -> Result<(String, String)> {
        let tag_list = match auth_data {
            AuthData::Community { security_name, .. } => {
                format!("{} {}", tag_list, security_name)
            }
            AuthData::V3User { .. } => tag_list.to_string(),
        };

        let params_name = match self.known_auths.get(auth_data) {
            Some(existing) => existing.clone(),
            None => {
                let params_name = self.next_params_name();
                match auth_data {
                    AuthData::Community {
                        security_name,
                        community,
                        mp_model,
                        context_engine_id,
                        context_name,
                    } => {
                        self.add_v1_system(
                            security_name,
                            community,
                            context_engine_id.clone(),
                            context_name.clone(),
                            &tag_list,
                        );
                        self.add_target_params(
                            &params_name,
                            security_name,
                            SecurityLevel::NoAuthNoPriv,
                            *mp_model,
                        );
                    }
                    AuthData::V3User {
                        security_name,
                        engine_id,
                        auth_protocol,
                        auth_password,
                        priv_protocol,
                        priv_password,
                        context_engine_id,
                        context_name,
                    } => {
                        self.add_v3_user(
                            security_name,
                            engine_id,
                            *auth_protocol,
                            auth_password.as_deref(),
                            *priv_protocol,
                            priv_password.as_deref(),
                            context_engine_id.clone(),
                            context_name.clone(),
                        )?;
                        self.add_target_params(
                            &params_name,
                            security_name,
                            auth_data.security_level(),
                            MP_MODEL_V3,
                        );
                    }
                }
                self.known_auths.insert(auth_data.clone(), params_name.clone());
                params_name
            }
        };

        if !self.known_transports.contains_key(&transport_target.transport_domain) {
            self.add_socket_transport(&transport_target.transport_domain);
        }

        let key = (params_name.clone(), transport_target.address, tag_list.clone());
        let addr_name = match self.known_transport_addrs.get(&key) {
            Some(existing) => existing.clone(),
            None => {
                let addr_name = self.next_addr_name();
                self.add_target_addr(
                    &addr_name,
                    &transport_target.transport_domain,
                    transport_target.address,
                    &params_name,
                    transport_target.timeout,
                    transport_target.retries,
                    &tag_list,
                );
                self.known_transport_addrs.insert(key, addr_name.clone());
                addr_name
            }
        };

        Ok((addr_name, params_name))
    }

    /// Builds the `ResolvedTarget` the dispatcher needs to send a PDU
    /// to `addr_name`, joining the addr/params entries against the
    /// engine's live Message Processing and Security Model registries.
    pub fn resolve_target(&self, addr_name: &str) -> Result<ResolvedTarget> {
        let addr = self
            .addrs
            .get(addr_name)
            .ok_or_else(|| Error::invalid_state(format!("unknown target address {:?}", addr_name)))?
            .clone();
        let params = self
            .params
            .get(&addr.params_name)
            .ok_or_else(|| {
                Error::invalid_state(format!("unknown target params {:?}", addr.params_name))
            })?
            .clone();

        let mp = self
            .engine
            .message_processing_model(params.mp_model)
            .ok_or_else(|| Error::invalid_state(format!("no mpModel {} registered", params.mp_model)))?;
        let security_model_id = security_model_for_mp_model(params.mp_model);
        let security_model = self
            .engine
            .security_model(security_model_id)
            .ok_or_else(|| {
                Error::invalid_state(format!("no securityModel {} registered", security_model_id))
            })?;

        Ok(ResolvedTarget {
            target_key: addr_name.to_string(),
            mp_model: params.mp_model,
            mp,
            security_model,
            security_name: params.security_name,
            security_level: params.security_level,
            transport_domain: addr.transport_domain,
            transport_address: addr.transport_address,
            msg_max_size: self.engine.max_message_size() as i32,
            timeout: addr.timeout,
            retries: addr.retries,
        })
    }

    /// Tears down everything this facade has registered, the
    /// `uncfgCmdGen` equivalent.
    pub fn clear(&self) {
        for entry in self.known_auths.iter() {
            match entry.key() {
                AuthData::Community { security_name, .. } => self.del_v1_system(security_name),
                AuthData::V3User {
                    security_name,
                    engine_id,
                    ..
                } => self.del_v3_user(engine_id, security_name),
            }
        }
        self.known_auths.clear();
        self.params.clear();
        self.known_transports.clear();
        self.known_transport_addrs.clear();
        self.addrs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    fn facade() -> ConfigFacade {
        let engine = Arc::new(SnmpEngine::new(&EngineConfig::default_config()).unwrap());
        ConfigFacade::new(engine)
    }

    #[test]
    fn community_round_trip_registers_and_resolves() {
        let facade = facade();
        let auth = AuthData::Community {
            security_name: "public".to_string(),
            community: "public".to_string(),
            mp_model: MP_MODEL_V2C,
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
        };
        let target = TransportTarget::udp("127.0.0.1:161".parse().unwrap());
        let (addr_name, params_name) = facade.resolve_or_register(&auth, &target, "").unwrap();
        assert!(addr_name.starts_with('a'));
        assert!(params_name.starts_with('p'));

        let resolved = facade.resolve_target(&addr_name).unwrap();
        assert_eq!(resolved.security_name, "public");
        assert_eq!(resolved.mp_model, MP_MODEL_V2C);

        // the community table must actually have gained an entry, not
        // just the facade's own bookkeeping.
        assert!(facade
            .engine
            .community_table()
            .lookup_by_security_name("public")
            .is_some());
    }

    #[test]
    fn repeated_registration_is_cached() {
        let facade = facade();
        let auth = AuthData::Community {
            security_name: "public".to_string(),
            community: "public".to_string(),
            mp_model: MP_MODEL_V2C,
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
        };
        let target = TransportTarget::udp("127.0.0.1:161".parse().unwrap());
        let (addr1, params1) = facade.resolve_or_register(&auth, &target, "").unwrap();
        let (addr2, params2) = facade.resolve_or_register(&auth, &target, "").unwrap();
        assert_eq!(addr1, addr2);
        assert_eq!(params1, params2);
    }

    #[test]
    fn v3_user_round_trip_registers_and_resolves() {
        let facade = facade();
        let auth = AuthData::V3User {
            security_name: "alice".to_string(),
            engine_id: hex::decode("8000000105aabbccdd").unwrap(),
            auth_protocol: Some(AuthProtocol::HmacSha1),
            auth_password: Some(b"authpassword".to_vec()),
            priv_protocol: Some(PrivProtocol::Aes128),
            priv_password: Some(b"privpassword".to_vec()),
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
        };
        let target = TransportTarget::udp("127.0.0.1:161".parse().unwrap());
        let (addr_name, _) = facade.resolve_or_register(&auth, &target, "").unwrap();

        let resolved = facade.resolve_target(&addr_name).unwrap();
        assert_eq!(resolved.security_name, "alice");
        assert_eq!(resolved.security_level, SecurityLevel::AuthPriv);
        assert_eq!(resolved.mp_model, MP_MODEL_V3);

        assert!(facade
            .engine
            .usm_users()
            .lookup(&hex::decode("8000000105aabbccdd").unwrap(), "alice")
            .is_some());
    }

    #[test]
    fn clear_removes_registered_credentials() {
        let facade = facade();
        let auth = AuthData::Community {
            security_name: "public".to_string(),
            community: "public".to_string(),
            mp_model: MP_MODEL_V2C,
            context_engine_id: Vec::new(),
            context_name: Vec::new(),
        };
        let target = TransportTarget::udp("127.0.0.1:161".parse().unwrap());
        facade.resolve_or_register(&auth, &target, "").unwrap();
        facade.clear();
        assert!(facade
            .engine
            .community_table()
            .lookup_by_security_name("public")
            .is_none());
    }
}
