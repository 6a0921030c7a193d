//! Canonical mutable state of one controller device.
//!
//! One record per device, keyed by canonical identity. Holds the active
//! effect plus the last-applied value of every parameter of every effect,
//! so that partial updates can resolve unspecified fields (see
//! [`crate::params`]).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{DeviceId, EffectKind};

/// Robot effect: octave 0-3, feedback switch 0-1, resonance/level 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobotSettings {
    pub octave: u8,
    pub feedback_switch: u8,
    pub feedback_resonance: u8,
    pub feedback_level: u8,
}

impl Default for RobotSettings {
    fn default() -> Self {
        Self {
            octave: 2,
            feedback_switch: 0,
            feedback_resonance: 120,
            feedback_level: 160,
        }
    }
}

/// Harmony effect: three voices, each with level 0-255, key 0-11, gender 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarmonySettings {
    pub h1_level: u8,
    pub h2_level: u8,
    pub h3_level: u8,
    pub h1_key: u8,
    pub h2_key: u8,
    pub h3_key: u8,
    pub h1_gender: u8,
    pub h2_gender: u8,
    pub h3_gender: u8,
}

impl Default for HarmonySettings {
    fn default() -> Self {
        Self {
            h1_level: 200,
            h2_level: 150,
            h3_level: 100,
            h1_key: 0,
            h2_key: 4,
            h3_key: 7,
            h1_gender: 128,
            h2_gender: 128,
            h3_gender: 128,
        }
    }
}

/// Megaphone effect: type 0-3 plus four free parameters 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MegaphoneSettings {
    #[serde(rename = "type")]
    pub kind: u8,
    pub param1: u8,
    pub param2: u8,
    pub param3: u8,
    pub param4: u8,
}

impl Default for MegaphoneSettings {
    fn default() -> Self {
        Self {
            kind: 0,
            param1: 100,
            param2: 150,
            param3: 200,
            param4: 180,
        }
    }
}

/// Reverb effect: type 0-5 plus four free parameters 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbSettings {
    #[serde(rename = "type")]
    pub kind: u8,
    pub param1: u8,
    pub param2: u8,
    pub param3: u8,
    pub param4: u8,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            kind: 0,
            param1: 100,
            param2: 150,
            param3: 200,
            param4: 180,
        }
    }
}

/// Vocoder effect: type 0-4 plus four free parameters 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VocoderSettings {
    #[serde(rename = "type")]
    pub kind: u8,
    pub param1: u8,
    pub param2: u8,
    pub param3: u8,
    pub param4: u8,
}

impl Default for VocoderSettings {
    fn default() -> Self {
        Self {
            kind: 0,
            param1: 100,
            param2: 150,
            param3: 200,
            param4: 180,
        }
    }
}

/// Equalizer: switch 0-1, freq/Q bands 0-127, gains 0-40. Only the low-mid
/// and high-mid bands carry a Q value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EqualizerSettings {
    pub eq_switch: u8,
    pub low_shelf_freq: u8,
    pub low_shelf_gain: u8,
    pub low_mid_freq: u8,
    pub low_mid_q: u8,
    pub low_mid_gain: u8,
    pub high_mid_freq: u8,
    pub high_mid_q: u8,
    pub high_mid_gain: u8,
    pub high_shelf_freq: u8,
    pub high_shelf_gain: u8,
}

impl Default for EqualizerSettings {
    fn default() -> Self {
        Self {
            eq_switch: 1,
            low_shelf_freq: 40,
            low_shelf_gain: 20,
            low_mid_freq: 60,
            low_mid_q: 70,
            low_mid_gain: 15,
            high_mid_freq: 80,
            high_mid_q: 70,
            high_mid_gain: 10,
            high_shelf_freq: 100,
            high_shelf_gain: 20,
        }
    }
}

/// Single-value controls. Key is a note 0-11, pitch is the one 14-bit
/// value (0-16383, center 8192), everything else is 0-127.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SliderSettings {
    pub key: u8,
    pub mic_sens: u8,
    pub volume: u8,
    pub reverb_send: u8,
    pub balance: u8,
    pub formant: u8,
    pub pitch: u16,
}

impl Default for SliderSettings {
    fn default() -> Self {
        Self {
            key: 0,
            mic_sens: 64,
            volume: 100,
            reverb_send: 64,
            balance: 64,
            formant: 64,
            pitch: 8192,
        }
    }
}

/// The persisted snapshot of one device: identity, the active effect, and
/// the last-applied parameters of every effect kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct DeviceSettings {
    pub device_id: DeviceId,
    pub device_name: String,
    pub is_active: bool,
    pub midi_port: usize,
    pub active_effect: EffectKind,
    pub sliders: SliderSettings,
    pub robot: RobotSettings,
    pub harmony: HarmonySettings,
    pub megaphone: MegaphoneSettings,
    pub reverb: ReverbSettings,
    pub vocoder: VocoderSettings,
    pub equalizer: EqualizerSettings,
}

impl DeviceSettings {
    pub fn new(device_id: DeviceId, device_name: impl Into<String>, midi_port: usize) -> Self {
        Self {
            device_id,
            device_name: device_name.into(),
            is_active: true,
            midi_port,
            ..Self::default()
        }
    }

    /// The parameter bag a command for `kind` would carry to reproduce the
    /// current settings. Used by reconciliation to re-issue the snapshot's
    /// active effect as a regular command.
    pub fn parameters_for(&self, kind: EffectKind) -> Map<String, Value> {
        fn to_map<T: Serialize>(value: &T) -> Map<String, Value> {
            match serde_json::to_value(value) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            }
        }
        fn single(value: u64) -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("value".into(), Value::from(value));
            map
        }

        match kind {
            EffectKind::Robot => to_map(&self.robot),
            EffectKind::Harmony => to_map(&self.harmony),
            EffectKind::Megaphone => to_map(&self.megaphone),
            EffectKind::Reverb => to_map(&self.reverb),
            EffectKind::Vocoder => to_map(&self.vocoder),
            EffectKind::Equalizer => to_map(&self.equalizer),
            EffectKind::Key => single(self.sliders.key as u64),
            EffectKind::MicSens => single(self.sliders.mic_sens as u64),
            EffectKind::Volume => single(self.sliders.volume as u64),
            EffectKind::ReverbSend => single(self.sliders.reverb_send as u64),
            EffectKind::Balance => single(self.sliders.balance as u64),
            EffectKind::Formant => single(self.sliders.formant as u64),
            EffectKind::Pitch => single(self.sliders.pitch as u64),
            _ => Map::new(),
        }
    }
}
