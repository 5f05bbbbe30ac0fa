//! The engine object (spec.md §3 "SnmpEngine", §4.1, RFC 3411 §3).
//!
//! Owns the identity (engineID, engineBoots, boot-time reference point
//! for engineTime) and the registries every Message/Security Model and
//! the dispatcher share: community tables, USM users and time windows,
//! and the per-`mpModel`/`securityModel` lookup maps themselves.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use rand::RngCore;
use tracing::info;

use crate::config::EngineConfig;
use crate::core::acm::{AccessControlModel, ManagerAccessControlModel};
use crate::core::persistence;
use crate::mp::v1v2c::V1V2cMessageProcessingModel;
use crate::mp::v3::V3MessageProcessingModel;
use crate::mp::{MessageProcessingModel, MP_MODEL_V1, MP_MODEL_V2C, MP_MODEL_V3};
use crate::security::community::CommunitySecurityModel;
use crate::security::community::CommunityTable;
use crate::security::usm::timewindow::TimeWindowCache;
use crate::security::usm::users::UsmUserTable;
use crate::security::usm::UsmSecurityModel;
use crate::security::{SecurityModel, SECURITY_MODEL_USM, SECURITY_MODEL_V1, SECURITY_MODEL_V2C};

/// This crate's enterprise number under `1.3.6.1.4.1` (RFC 3411 §5,
/// the "administratively assigned" octet-string engineID format).
const ENTERPRISE_NUMBER: u32 = 99999;

/// Builds a 9-octet engineID when the operator doesn't supply one:
/// high bit of the enterprise number set per RFC 3411 §5, format byte
/// `0x05` ("octets, administratively assigned"), 4 random octets.
fn synthesize_engine_id() -> Vec<u8> {
    let mut id = Vec::with_capacity(9);
    id.extend_from_slice(&(ENTERPRISE_NUMBER | 0x8000_0000).to_be_bytes());
    id.push(0x05);
    let mut tail = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut tail);
    id.extend_from_slice(&tail);
    id
}

/// The live SNMP engine: identity, timers, and the Message/Security
/// Model registries (spec.md §3, §4.1).
pub struct SnmpEngine {
    engine_id: Vec<u8>,
    engine_boots: u32,
    boot_instant: Instant,
    max_message_size: u32,
    acm: Arc<dyn AccessControlModel>,
    mp_models: DashMap<i32, Arc<dyn MessageProcessingModel>>,
    security_models: Arc<DashMap<i32, Arc<dyn SecurityModel>>>,
    community_table: Arc<CommunityTable>,
    usm_users: Arc<UsmUserTable>,
    usm_time_windows: Arc<TimeWindowCache>,
    /// Opaque per-application state (RFC 3411 §3.1.1's `userContext`),
    /// keyed by the caller's own name, for passing object between
    /// handlers without routing it through the engine's own registries.
    user_context: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl SnmpEngine {
    /// Builds the engine from `config`: synthesises or decodes the
    /// engineID, loads and increments the persisted boot counter, and
    /// wires up the v1/v2c/v3 Message Processing Models over a shared
    /// community table and USM user/time-window registry.
    pub fn new(config: &EngineConfig) -> crate::Result<Self> {
        let engine_id = match &config.engine_id {
            Some(hexstr) => hex::decode(hexstr)
                .map_err(|e| crate::Error::parse(format!("invalid engine_id hex: {}", e)))?,
            None => synthesize_engine_id(),
        };

        let boots = match &config.persistence_dir {
            Some(dir) => persistence::load_and_increment_boots(std::path::Path::new(dir), &engine_id),
            None => {
                info!("no persistence_dir configured; engineBoots will not survive a restart");
                0
            }
        };

        let community_table = Arc::new(CommunityTable::new());
        let usm_users = Arc::new(UsmUserTable::new());
        let usm_time_windows = Arc::new(TimeWindowCache::with_window(config.time_window_secs));

        let security_models: Arc<DashMap<i32, Arc<dyn SecurityModel>>> = Arc::new(DashMap::new());
        security_models.insert(
            SECURITY_MODEL_V1,
            Arc::new(CommunitySecurityModel::v1(community_table.clone())) as Arc<dyn SecurityModel>,
        );
        security_models.insert(
            SECURITY_MODEL_V2C,
            Arc::new(CommunitySecurityModel::v2c(community_table.clone())) as Arc<dyn SecurityModel>,
        );
        security_models.insert(
            SECURITY_MODEL_USM,
            Arc::new(UsmSecurityModel::new(
                engine_id.clone(),
                usm_users.clone(),
                usm_time_windows.clone(),
            )) as Arc<dyn SecurityModel>,
        );

        let mp_models: DashMap<i32, Arc<dyn MessageProcessingModel>> = DashMap::new();
        mp_models.insert(
            MP_MODEL_V1,
            Arc::new(V1V2cMessageProcessingModel::v1(community_table.clone())) as Arc<dyn MessageProcessingModel>,
        );
        mp_models.insert(
            MP_MODEL_V2C,
            Arc::new(V1V2cMessageProcessingModel::v2c(community_table.clone())) as Arc<dyn MessageProcessingModel>,
        );
        mp_models.insert(
            MP_MODEL_V3,
            Arc::new(V3MessageProcessingModel::new(security_models.clone())) as Arc<dyn MessageProcessingModel>,
        );

        info!(
            engine_id = %hex::encode(&engine_id),
            engine_boots = boots,
            "SNMP engine initialised"
        );

        Ok(Self {
            engine_id,
            engine_boots: boots,
            boot_instant: Instant::now(),
            max_message_size: config.max_message_size,
            acm: Arc::new(ManagerAccessControlModel),
            mp_models,
            security_models,
            community_table,
            usm_users,
            usm_time_windows,
            user_context: DashMap::new(),
        })
    }

    pub fn engine_id(&self) -> &[u8] {
        &self.engine_id
    }

    pub fn engine_boots(&self) -> u32 {
        self.engine_boots
    }

    /// Seconds since this engine object was constructed, standing in
    /// for *our* `snmpEngineTime` (RFC 3414 §3.2.7) when we are
    /// authoritative; a manager only ever reports this in replies it
    /// never actually sends (it has no command responder), but the
    /// field is kept for symmetry with a future agent role and so
    /// `finalize_mac` callers have a well-defined local clock.
    pub fn engine_time(&self) -> u32 {
        self.boot_instant.elapsed().as_secs() as u32
    }

    pub fn max_message_size(&self) -> u32 {
        self.max_message_size
    }

    pub fn acm(&self) -> &Arc<dyn AccessControlModel> {
        &self.acm
    }

    pub fn community_table(&self) -> &Arc<CommunityTable> {
        &self.community_table
    }

    pub fn usm_users(&self) -> &Arc<UsmUserTable> {
        &self.usm_users
    }

    pub fn usm_time_windows(&self) -> &Arc<TimeWindowCache> {
        &self.usm_time_windows
    }

    pub fn message_processing_model(&self, mp_model: i32) -> Option<Arc<dyn MessageProcessingModel>> {
        self.mp_models.get(&mp_model).map(|e| e.clone())
    }

    pub fn message_processing_models(&self) -> Vec<Arc<dyn MessageProcessingModel>> {
        self.mp_models.iter().map(|e| e.clone()).collect()
    }

    pub fn security_model(&self, security_model: i32) -> Option<Arc<dyn SecurityModel>> {
        self.security_models.get(&security_model).map(|e| e.clone())
    }

    pub fn security_models(&self) -> Vec<Arc<dyn SecurityModel>> {
        self.security_models.iter().map(|e| e.clone()).collect()
    }

    /// Stashes `value` under `name` in the engine's opaque user-context
    /// bag. A second call with the same name replaces the prior value.
    pub fn set_user_context(&self, name: &str, value: Arc<dyn Any + Send + Sync>) {
        self.user_context.insert(name.to_string(), value);
    }

    pub fn get_user_context(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_context.get(name).map(|e| e.clone())
    }

    pub fn del_user_context(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.user_context.remove(name).map(|(_, v)| v)
    }
}

impl std::fmt::Debug for SnmpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnmpEngine")
            .field("engine_id", &hex::encode(&self.engine_id))
            .field("engine_boots", &self.engine_boots)
            .finish()
    }
}

impl std::fmt::Display for SnmpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "snmp-engine {}", hex::encode(&self.engine_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_engine_id_has_rfc3411_shape() {
        let id = synthesize_engine_id();
        assert_eq!(id.len(), 9);
        assert_eq!(id[0] & 0x80, 0x80);
        assert_eq!(id[4], 0x05);
    }

    #[test]
    fn new_engine_registers_all_three_mp_models() {
        let config = EngineConfig::default_config();
        let engine = SnmpEngine::new(&config).unwrap();
        assert!(engine.message_processing_model(MP_MODEL_V1).is_some());
        assert!(engine.message_processing_model(MP_MODEL_V2C).is_some());
        assert!(engine.message_processing_model(MP_MODEL_V3).is_some());
        assert!(engine.security_model(SECURITY_MODEL_V1).is_some());
        assert!(engine.security_model(SECURITY_MODEL_V2C).is_some());
        assert!(engine.security_model(SECURITY_MODEL_USM).is_some());
    }

    #[test]
    fn engine_id_round_trips_from_hex_config() {
        let mut config = EngineConfig::default_config();
        config.engine_id = Some("8000000105aabbccdd".to_string());
        let engine = SnmpEngine::new(&config).unwrap();
        assert_eq!(hex::encode(engine.engine_id()), "8000000105aabbccdd");
    }

    #[test]
    fn user_context_round_trips_and_deletes() {
        let config = EngineConfig::default_config();
        let engine = SnmpEngine::new(&config).unwrap();

        assert!(engine.get_user_context("stats").is_none());

        engine.set_user_context("stats", Arc::new(42u32));
        let retrieved = engine.get_user_context("stats").unwrap();
        assert_eq!(*retrieved.downcast_ref::<u32>().unwrap(), 42);

        engine.set_user_context("stats", Arc::new(7u32));
        assert_eq!(*engine.get_user_context("stats").unwrap().downcast_ref::<u32>().unwrap(), 7);

        let removed = engine.del_user_context("stats").unwrap();
        assert_eq!(*removed.downcast_ref::<u32>().unwrap(), 7);
        assert!(engine.get_user_context("stats").is_none());
    }

    #[test]
    fn boots_persists_across_engine_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default_config();
        config.engine_id = Some("8000000105aabbccdd".to_string());
        config.persistence_dir = Some(dir.path().to_string_lossy().into_owned());

        let first = SnmpEngine::new(&config).unwrap();
        let second = SnmpEngine::new(&config).unwrap();
        assert_eq!(second.engine_boots(), first.engine_boots() + 1);
    }
}
