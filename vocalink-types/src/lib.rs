//! # vocalink-types
//!
//! Shared type definitions for the Vocalink effect control plane.
//! This crate contains the command protocol, device settings model, and
//! per-effect parameter types used across vocalink-core, vocalink-midi,
//! and vocalink-net.

pub mod command;
pub mod effect;
pub mod params;
pub mod settings;

pub use command::{CommandId, CommandResponse, CommandStatus, EffectCommand};
pub use effect::EffectKind;
pub use params::{
    EffectRequest, EqualizerParams, HarmonyParams, MegaphoneParams, ParamError, ReverbParams,
    RobotParams, SliderControl, VocoderParams,
};
pub use settings::{
    DeviceSettings, EqualizerSettings, HarmonySettings, MegaphoneSettings, ReverbSettings,
    RobotSettings, SliderSettings, VocoderSettings,
};

/// Canonical hardware identity of one controller device.
///
/// Construction strips `:` and `-` separators and upper-cases, so any
/// spelling of the same adapter address compares equal. Every storage key
/// and addressing comparison goes through this form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: &str) -> Self {
        Self(
            raw.chars()
                .filter(|c| *c != ':' && *c != '-')
                .collect::<String>()
                .to_ascii_uppercase(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for DeviceId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for DeviceId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
