//! Common types for the stepsim engine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a mutual-exclusion domain.
///
/// Tasks that share an owner key never run concurrently. The simulation
/// harness uses one key per agent, so an agent never handles two events
/// at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnerKey(pub Uuid);

impl OwnerKey {
    /// Creates a new random key.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a key from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a deterministic key from a seed (one per simulated agent).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for OwnerKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.simple().to_string()[..8])
    }
}

/// How a task is repeated once scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    /// Run a single time
    Once,

    /// Run a bounded number of times, `step` apart
    Repeatedly,

    /// Run every `step` until the scheduler is killed
    Infinitely,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_key_from_seed_is_stable() {
        assert_eq!(OwnerKey::from_seed(7), OwnerKey::from_seed(7));
        assert_ne!(OwnerKey::from_seed(7), OwnerKey::from_seed(8));
    }

    #[test]
    fn test_owner_key_display_is_short() {
        let key = OwnerKey::from_seed(1);
        assert_eq!(key.to_string().len(), 8);
    }
}
