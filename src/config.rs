//! Process-level configuration for the SNMP engine
//!
//! This covers the static settings an operator loads once at startup
//! (message size limits, default timers, where the boot counter is
//! persisted, logging). It does *not* cover the dynamic target/user
//! tables described in the Configuration Facade (`cmdgen::facade`) —
//! those are populated at runtime through engine method calls, not
//! from a file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub engine_id: Option<String>,
    pub max_message_size: u32,
    pub timeout_ms: u64,
    pub retries: u32,
    pub time_window_secs: u32,
    pub persistence_dir: Option<String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "compact")]
    Compact,
    #[serde(rename = "full")]
    Full,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Full,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::default_config()
    }
}

impl EngineConfig {
    /// Defaults named in the SNMP framework MIB and RFC 3414 §3.2.7.
    pub fn default_config() -> Self {
        Self {
            engine_id: None,
            max_message_size: 65507,
            timeout_ms: 1_000,
            retries: 5,
            time_window_secs: 150,
            persistence_dir: None,
            logging: LoggingConfig::default(),
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig =
            toml::from_str(&contents).map_err(|e| Error::parse(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default_config())?)
            .add_source(config::Environment::with_prefix("SNMP").separator("_"))
            .build()?;
        let engine_config: EngineConfig = settings.try_deserialize()?;
        engine_config.validate()?;
        Ok(engine_config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_message_size < 484 {
            return Err(Error::parse(
                "max_message_size below the RFC 1157 minimum of 484 octets",
            ));
        }
        if self.timeout_ms == 0 {
            return Err(Error::parse("timeout_ms must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = EngineConfig::default_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_message_size, 65507);
        assert_eq!(cfg.retries, 5);
        assert_eq!(cfg.time_window_secs, 150);
    }

    #[test]
    fn rejects_undersized_message_limit() {
        let mut cfg = EngineConfig::default_config();
        cfg.max_message_size = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let mut cfg = EngineConfig::default_config();
        cfg.timeout_ms = 0;
        assert!(cfg.validate().is_err());
    }
}
