//! Persisted command records and the device registry, both kept in the
//! bus's keyed store.
//!
//! Command records live under `vocalink:cmd:<id>` with a one-hour TTL and
//! exist so callers can poll status; they are deleted as soon as a
//! terminal response arrives, or swept by age if no response ever comes.
//! Device records live under `vocalink:device:<CANONICAL-ID>` with no TTL
//! and are deleted only on explicit removal.

use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use vocalink_net::MessageBus;
use vocalink_types::command::now_unix;
use vocalink_types::{CommandId, DeviceId, DeviceSettings, EffectCommand};

pub const COMMAND_CHANNEL: &str = "vocalink:commands";
pub const RESPONSE_CHANNEL: &str = "vocalink:responses";
pub const COMMAND_KEY_PREFIX: &str = "vocalink:cmd:";
pub const DEVICE_KEY_PREFIX: &str = "vocalink:device:";

/// How long a stored command record lives without any cleanup running.
pub const COMMAND_TTL: Duration = Duration::from_secs(60 * 60);
/// Sweep age on the control plane.
pub const CONTROL_CLEANUP_AGE: Duration = Duration::from_secs(30 * 60);
/// Sweep age on the device side.
pub const DEVICE_CLEANUP_AGE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bus i/o failed: {0}")]
    Bus(#[from] std::io::Error),
    #[error("payload format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Command records keyed by id.
#[derive(Clone)]
pub struct CommandStore {
    bus: Arc<dyn MessageBus>,
}

impl CommandStore {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    fn key(id: &CommandId) -> String {
        format!("{}{}", COMMAND_KEY_PREFIX, id)
    }

    pub fn put(&self, command: &EffectCommand) -> Result<(), StoreError> {
        let json = serde_json::to_string(command)?;
        self.bus
            .kv_set(&Self::key(&command.command_id), &json, Some(COMMAND_TTL))?;
        Ok(())
    }

    /// An unparseable stored record reads as absent; the sweeper deletes
    /// it for good.
    pub fn get(&self, id: &CommandId) -> Result<Option<EffectCommand>, StoreError> {
        let Some(json) = self.bus.kv_get(&Self::key(id))? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(command) => Ok(Some(command)),
            Err(e) => {
                warn!("Corrupt command record {}: {}", id, e);
                Ok(None)
            }
        }
    }

    pub fn delete(&self, id: &CommandId) -> Result<bool, StoreError> {
        Ok(self.bus.kv_delete(&Self::key(id))?)
    }

    /// Delete records older than `max_age`, plus any record whose payload
    /// no longer parses. Returns how many were removed.
    pub fn cleanup_expired(&self, max_age: Duration) -> Result<usize, StoreError> {
        let now = now_unix();
        let mut deleted = 0;

        for key in self.bus.kv_keys(COMMAND_KEY_PREFIX)? {
            let Some(json) = self.bus.kv_get(&key)? else {
                continue;
            };
            let stale = match serde_json::from_str::<EffectCommand>(&json) {
                Ok(command) => command.age_secs(now) > max_age.as_secs(),
                Err(e) => {
                    warn!("Deleting unparseable command record {}: {}", key, e);
                    true
                }
            };
            if stale {
                self.bus.kv_delete(&key)?;
                deleted += 1;
            }
        }

        if deleted > 0 {
            info!("Swept {} stale command record(s)", deleted);
        }
        Ok(deleted)
    }
}

/// Device settings snapshots keyed by canonical identity.
#[derive(Clone)]
pub struct DeviceRegistry {
    bus: Arc<dyn MessageBus>,
}

impl DeviceRegistry {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    fn key(id: &DeviceId) -> String {
        format!("{}{}", DEVICE_KEY_PREFIX, id)
    }

    pub fn get(&self, id: &DeviceId) -> Result<Option<DeviceSettings>, StoreError> {
        let Some(json) = self.bus.kv_get(&Self::key(id))? else {
            return Ok(None);
        };
        match serde_json::from_str(&json) {
            Ok(settings) => Ok(Some(settings)),
            Err(e) => {
                warn!("Corrupt device record {}: {}", id, e);
                Ok(None)
            }
        }
    }

    pub fn put(&self, settings: &DeviceSettings) -> Result<(), StoreError> {
        let json = serde_json::to_string(settings)?;
        self.bus.kv_set(&Self::key(&settings.device_id), &json, None)?;
        Ok(())
    }

    pub fn delete(&self, id: &DeviceId) -> Result<bool, StoreError> {
        Ok(self.bus.kv_delete(&Self::key(id))?)
    }

    pub fn list(&self) -> Result<Vec<DeviceSettings>, StoreError> {
        let mut devices = Vec::new();
        for key in self.bus.kv_keys(DEVICE_KEY_PREFIX)? {
            if let Some(json) = self.bus.kv_get(&key)? {
                match serde_json::from_str(&json) {
                    Ok(settings) => devices.push(settings),
                    Err(e) => warn!("Skipping corrupt device record {}: {}", key, e),
                }
            }
        }
        Ok(devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vocalink_net::MemoryBus;
    use vocalink_types::EffectKind;

    fn bus() -> Arc<dyn MessageBus> {
        Arc::new(MemoryBus::new())
    }

    #[test]
    fn command_round_trip_and_delete() {
        let store = CommandStore::new(bus());
        let command = EffectCommand::new(EffectKind::Robot, DeviceId::new("AA"));

        store.put(&command).unwrap();
        let loaded = store.get(&command.command_id).unwrap().unwrap();
        assert_eq!(loaded, command);

        assert!(store.delete(&command.command_id).unwrap());
        assert!(store.get(&command.command_id).unwrap().is_none());
    }

    #[test]
    fn cleanup_removes_old_and_corrupt_records_only() {
        let bus = bus();
        let store = CommandStore::new(Arc::clone(&bus));

        let fresh = EffectCommand::new(EffectKind::Reverb, DeviceId::new("AA"));
        store.put(&fresh).unwrap();

        let mut old = EffectCommand::new(EffectKind::Robot, DeviceId::new("AA"));
        old.created_at = now_unix() - 3600;
        store.put(&old).unwrap();

        bus.kv_set(
            &format!("{}broken", COMMAND_KEY_PREFIX),
            "{not json",
            None,
        )
        .unwrap();

        let deleted = store.cleanup_expired(Duration::from_secs(600)).unwrap();
        assert_eq!(deleted, 2);

        assert!(store.get(&fresh.command_id).unwrap().is_some());
        assert!(store.get(&old.command_id).unwrap().is_none());
        assert_eq!(bus.kv_keys(COMMAND_KEY_PREFIX).unwrap().len(), 1);
    }

    #[test]
    fn well_formed_but_old_records_are_swept() {
        let store = CommandStore::new(bus());
        let mut command = EffectCommand::new(EffectKind::Harmony, DeviceId::new("AA"));
        command.created_at = now_unix() - 11 * 60;
        store.put(&command).unwrap();

        assert_eq!(store.cleanup_expired(DEVICE_CLEANUP_AGE).unwrap(), 1);
        assert!(store.get(&command.command_id).unwrap().is_none());
    }

    #[test]
    fn device_registry_is_keyed_by_canonical_identity() {
        let registry = DeviceRegistry::new(bus());
        let settings = DeviceSettings::new(DeviceId::new("00:15:5d:4f:a2:7f"), "Stage", 1);
        registry.put(&settings).unwrap();

        // Any spelling of the identity reaches the same record.
        let loaded = registry.get(&DeviceId::new("00155D4FA27F")).unwrap().unwrap();
        assert_eq!(loaded, settings);

        assert_eq!(registry.list().unwrap().len(), 1);
        assert!(registry.delete(&DeviceId::new("00-15-5D-4F-A2-7F")).unwrap());
        assert!(registry.get(&settings.device_id).unwrap().is_none());
    }
}
