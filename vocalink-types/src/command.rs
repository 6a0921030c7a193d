//! Command and response envelopes for the shared bus channels.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::params::{EffectRequest, ParamError};
use crate::{DeviceId, EffectKind};

/// Opaque command token. Generated from a nanosecond timestamp plus a
/// xorshift-mixed suffix; uniqueness matters, prettiness does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn generate() -> Self {
        let nanos = unix_nanos();
        Self(format!("{:x}-{:x}", nanos, xorshift(nanos as u64)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn unix_nanos() -> u128 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0)
}

/// Current wall-clock time as unix seconds, the timestamp unit used on the
/// wire.
pub fn now_unix() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn xorshift(seed: u64) -> u64 {
    let mut x = seed ^ 0x1234_5678_90ab_cdef;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x
}

/// Lifecycle of a command: `Pending` when stored and published, `Executing`
/// while a device applies it, then one of the two terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommandStatus::Completed | CommandStatus::Failed)
    }
}

/// One unit of work addressed to a single device or broadcast to all.
/// Immutable after creation apart from `status`/`error_message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectCommand {
    pub command_id: CommandId,
    #[serde(default)]
    pub target_device_id: DeviceId,
    #[serde(default)]
    pub is_broadcast: bool,
    pub effect_type: EffectKind,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    pub created_at: u64,
    #[serde(default)]
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EffectCommand {
    /// A fresh pending command addressed to one device.
    pub fn new(effect_type: EffectKind, target: DeviceId) -> Self {
        Self {
            command_id: CommandId::generate(),
            target_device_id: target,
            is_broadcast: false,
            effect_type,
            parameters: Map::new(),
            created_at: now_unix(),
            status: CommandStatus::Pending,
            error_message: None,
        }
    }

    /// A fresh pending command for every subscribed device.
    pub fn broadcast(effect_type: EffectKind) -> Self {
        Self {
            is_broadcast: true,
            ..Self::new(effect_type, DeviceId::default())
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Structural validity, checked before any store or publish: a command
    /// needs a real effect tag, and a target unless it is broadcast.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.effect_type == EffectKind::None {
            return Err("effect type must not be 'none'");
        }
        if !self.is_broadcast && self.target_device_id.is_empty() {
            return Err("non-broadcast command needs a target device id");
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// The addressing rule every consumer applies before any other work.
    pub fn is_addressed_to(&self, identity: &DeviceId) -> bool {
        self.is_broadcast || self.target_device_id == *identity
    }

    /// Seconds since creation, saturating for clock skew.
    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }

    /// Decode the parameter bag against the effect tag (once, at the
    /// boundary).
    pub fn request(&self) -> Result<EffectRequest, ParamError> {
        EffectRequest::decode(self.effect_type, &self.parameters)
    }
}

/// Terminal outcome emitted by the device that applied (or failed to
/// apply) a command. Correlates back to the stored command by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub command_id: CommandId,
    pub device_id: DeviceId,
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub processed_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_differ() {
        assert_ne!(CommandId::generate(), CommandId::generate());
    }

    #[test]
    fn command_without_target_is_invalid_unless_broadcast() {
        let mut command = EffectCommand::new(EffectKind::Robot, DeviceId::default());
        assert!(!command.is_valid());

        command.is_broadcast = true;
        assert!(command.is_valid());
    }

    #[test]
    fn none_effect_is_invalid_regardless_of_broadcast() {
        let mut command = EffectCommand::broadcast(EffectKind::None);
        assert!(!command.is_valid());

        command.target_device_id = DeviceId::new("AABBCC");
        command.is_broadcast = false;
        assert!(!command.is_valid());
    }

    #[test]
    fn targeted_command_is_valid() {
        let command = EffectCommand::new(EffectKind::Reverb, DeviceId::new("00:11:22"));
        assert!(command.is_valid());
    }

    #[test]
    fn addressing_accepts_broadcast_and_canonical_match() {
        let me = DeviceId::new("00:15:5D:4F:A2:7F");

        let command = EffectCommand::new(EffectKind::Robot, DeviceId::new("00155d4fa27f"));
        assert!(command.is_addressed_to(&me));

        let other = EffectCommand::new(EffectKind::Robot, DeviceId::new("00155d4fa280"));
        assert!(!other.is_addressed_to(&me));

        assert!(EffectCommand::broadcast(EffectKind::RobotOff).is_addressed_to(&me));
    }

    #[test]
    fn wire_json_uses_camel_case_and_lowercase_tags() {
        let command = EffectCommand::new(EffectKind::Robot, DeviceId::new("aa:bb"));
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["targetDeviceId"], "AABB");
        assert_eq!(json["effectType"], "robot");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["isBroadcast"], false);
        assert!(json.get("errorMessage").is_none());
    }

    #[test]
    fn incoming_json_parses_with_defaults() {
        let command: EffectCommand = serde_json::from_str(
            r#"{"commandId":"c1","effectType":"reverboff","isBroadcast":true,"createdAt":10}"#,
        )
        .unwrap();
        assert!(command.is_valid());
        assert_eq!(command.status, CommandStatus::Pending);
        assert!(command.parameters.is_empty());
    }

    #[test]
    fn terminal_statuses() {
        assert!(!CommandStatus::Pending.is_terminal());
        assert!(!CommandStatus::Executing.is_terminal());
        assert!(CommandStatus::Completed.is_terminal());
        assert!(CommandStatus::Failed.is_terminal());
    }
}
