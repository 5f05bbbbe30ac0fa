//! The USM user table, keyed by `(engineID, userName)` (spec.md §3
//! "USM user entry").

use dashmap::DashMap;

use crate::security::usm::crypto::{self, AuthProtocol, PrivProtocol};
use crate::{Error, Result};

/// A single localised USM credential set for one remote engine.
#[derive(Debug, Clone)]
pub struct UsmUser {
    pub user_name: String,
    pub auth_protocol: Option<AuthProtocol>,
    pub auth_key: Option<Vec<u8>>,
    pub priv_protocol: Option<PrivProtocol>,
    pub priv_key: Option<Vec<u8>>,
    pub context_engine_id: Vec<u8>,
    pub context_name: Vec<u8>,
}

impl UsmUser {
    /// (I3) privacy implies authentication.
    pub fn validate(&self) -> Result<()> {
        if self.priv_protocol.is_some() && self.auth_protocol.is_none() {
            return Err(Error::invalid_state(
                "privacy protocol configured without an authentication protocol",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct UserKey {
    engine_id: Vec<u8>,
    user_name: String,
}

/// USM user table. Users are configured with a plaintext password and
/// localised lazily the first time the engineID is known (construction
/// time for `add_v3_user` when the caller already supplies an
/// engineID, or on first successful discovery otherwise).
#[derive(Debug, Default)]
pub struct UsmUserTable {
    users: DashMap<UserKey, UsmUser>,
}

impl UsmUserTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &self,
        engine_id: &[u8],
        user_name: &str,
        auth_protocol: Option<AuthProtocol>,
        auth_password: Option<&[u8]>,
        priv_protocol: Option<PrivProtocol>,
        priv_password: Option<&[u8]>,
        context_engine_id: Vec<u8>,
        context_name: Vec<u8>,
    ) -> Result<()> {
        let auth_key = match (auth_protocol, auth_password) {
            (Some(p), Some(pw)) => Some(crypto::localize_key(p, pw, engine_id)),
            _ => None,
        };
        let priv_key = match (priv_protocol, priv_password) {
            (Some(p), Some(pw)) => {
                // RFC 3414 §2.6: privacy keys are localised with the
                // same hash as the user's authentication protocol.
                let auth_proto = auth_protocol
                    .ok_or_else(|| Error::invalid_state("privacy requires an auth protocol"))?;
                Some(crypto::localize_key(auth_proto, pw, engine_id))
            }
            _ => None,
        };

        let user = UsmUser {
            user_name: user_name.to_string(),
            auth_protocol,
            auth_key,
            priv_protocol,
            priv_key,
            context_engine_id,
            context_name,
        };
        user.validate()?;

        self.users.insert(
            UserKey {
                engine_id: engine_id.to_vec(),
                user_name: user_name.to_string(),
            },
            user,
        );
        Ok(())
    }

    pub fn lookup(&self, engine_id: &[u8], user_name: &str) -> Option<UsmUser> {
        self.users
            .get(&UserKey {
                engine_id: engine_id.to_vec(),
                user_name: user_name.to_string(),
            })
            .map(|u| u.clone())
    }

    pub fn remove(&self, engine_id: &[u8], user_name: &str) {
        self.users.remove(&UserKey {
            engine_id: engine_id.to_vec(),
            user_name: user_name.to_string(),
        });
    }

    pub fn clear(&self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_lookup_round_trips() {
        let table = UsmUserTable::new();
        table
            .add(
                b"\x80\x00\x00\x00\x01",
                "alice",
                Some(AuthProtocol::HmacSha1),
                Some(b"authpassword"),
                Some(PrivProtocol::Aes128),
                Some(b"privpassword"),
                Vec::new(),
                Vec::new(),
            )
            .unwrap();

        let user = table.lookup(b"\x80\x00\x00\x00\x01", "alice").unwrap();
        assert_eq!(user.user_name, "alice");
        assert!(user.auth_key.is_some());
        assert!(user.priv_key.is_some());
    }

    #[test]
    fn unknown_user_is_none() {
        let table = UsmUserTable::new();
        assert!(table.lookup(b"engine", "nobody").is_none());
    }

    #[test]
    fn privacy_without_auth_is_rejected() {
        let table = UsmUserTable::new();
        let result = table.add(
            b"engine",
            "bob",
            None,
            None,
            Some(PrivProtocol::Des),
            Some(b"privpassword"),
            Vec::new(),
            Vec::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn same_user_different_engines_are_distinct() {
        let table = UsmUserTable::new();
        table
            .add(
                b"engine-a",
                "carol",
                Some(AuthProtocol::HmacMd5),
                Some(b"pw"),
                None,
                None,
                Vec::new(),
                Vec::new(),
            )
            .unwrap();
        assert!(table.lookup(b"engine-a", "carol").is_some());
        assert!(table.lookup(b"engine-b", "carol").is_none());
    }
}
