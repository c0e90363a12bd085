use chrono::{DateTime, Utc};
use ledger_sql::encryption_keys::EncryptionKeyRow;
use models::Id;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct KeyInfo {
    pub material: Vec<u8>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl KeyInfo {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// In-memory view of the encryption-key table: every loaded key by id, plus
/// which one currently signs. Replaced wholesale on rotation.
#[derive(Debug)]
pub struct KeyRing {
    keys: HashMap<Id, KeyInfo>,
    active_id: Id,
}

impl KeyRing {
    pub fn new(active: EncryptionKeyRow, others: Vec<EncryptionKeyRow>) -> Self {
        let mut keys = HashMap::new();
        let active_id = active.id;

        for row in std::iter::once(active).chain(others) {
            keys.insert(
                row.id,
                KeyInfo {
                    material: row.symmetric_key,
                    expires_at: row.expired_at,
                },
            );
        }

        Self { keys, active_id }
    }

    pub fn for_tests(active_id: Id, material: Vec<u8>) -> Self {
        let mut keys = HashMap::new();
        keys.insert(
            active_id,
            KeyInfo {
                material,
                expires_at: None,
            },
        );
        Self { keys, active_id }
    }

    pub fn active(&self) -> Result<(Id, &KeyInfo), crate::Error> {
        let info = self
            .keys
            .get(&self.active_id)
            .ok_or(crate::Error::KeyNotFound(self.active_id))?;
        if info.is_expired() {
            return Err(crate::Error::ActiveKeyExpired);
        }
        Ok((self.active_id, info))
    }

    /// Look up a verification key. Expired keys are treated as absent.
    pub fn get(&self, id: Id) -> Option<&KeyInfo> {
        self.keys.get(&id).filter(|info| !info.is_expired())
    }
}
