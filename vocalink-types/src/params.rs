//! Typed decoding of a command's open parameter bag.
//!
//! Commands travel with a loose `string -> value` JSON object. Each bag is
//! decoded exactly once, against the command's effect tag, into an
//! [`EffectRequest`]; from there on the processor works with named, bounded
//! fields. Fields a command does not mention stay `None` and are resolved
//! from the device's last-known settings, so repeated partial updates
//! compose.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::settings::{
    EqualizerSettings, HarmonySettings, MegaphoneSettings, ReverbSettings, RobotSettings,
    VocoderSettings,
};
use crate::EffectKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("effect type '{0}' cannot be applied")]
    Unsupported(EffectKind),
    #[error("malformed parameters: {0}")]
    Malformed(String),
    #[error("{field} out of range: {value} (valid 0-{max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
}

fn check(field: &'static str, value: Option<u8>, max: u8) -> Result<(), ParamError> {
    match value {
        Some(v) if v > max => Err(ParamError::OutOfRange {
            field,
            value: v as u32,
            max: max as u32,
        }),
        _ => Ok(()),
    }
}

/// Partial Robot parameters as carried on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RobotParams {
    pub octave: Option<u8>,
    pub feedback_switch: Option<u8>,
    pub feedback_resonance: Option<u8>,
    pub feedback_level: Option<u8>,
}

impl RobotParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("octave", self.octave, 3)?;
        check("feedbackSwitch", self.feedback_switch, 1)
    }

    /// Fill unspecified fields from the device's last-known values.
    pub fn resolve(&self, current: &RobotSettings) -> RobotSettings {
        RobotSettings {
            octave: self.octave.unwrap_or(current.octave),
            feedback_switch: self.feedback_switch.unwrap_or(current.feedback_switch),
            feedback_resonance: self.feedback_resonance.unwrap_or(current.feedback_resonance),
            feedback_level: self.feedback_level.unwrap_or(current.feedback_level),
        }
    }
}

/// Partial Harmony parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HarmonyParams {
    pub h1_level: Option<u8>,
    pub h2_level: Option<u8>,
    pub h3_level: Option<u8>,
    pub h1_key: Option<u8>,
    pub h2_key: Option<u8>,
    pub h3_key: Option<u8>,
    pub h1_gender: Option<u8>,
    pub h2_gender: Option<u8>,
    pub h3_gender: Option<u8>,
}

impl HarmonyParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("h1Key", self.h1_key, 11)?;
        check("h2Key", self.h2_key, 11)?;
        check("h3Key", self.h3_key, 11)
    }

    pub fn resolve(&self, current: &HarmonySettings) -> HarmonySettings {
        HarmonySettings {
            h1_level: self.h1_level.unwrap_or(current.h1_level),
            h2_level: self.h2_level.unwrap_or(current.h2_level),
            h3_level: self.h3_level.unwrap_or(current.h3_level),
            h1_key: self.h1_key.unwrap_or(current.h1_key),
            h2_key: self.h2_key.unwrap_or(current.h2_key),
            h3_key: self.h3_key.unwrap_or(current.h3_key),
            h1_gender: self.h1_gender.unwrap_or(current.h1_gender),
            h2_gender: self.h2_gender.unwrap_or(current.h2_gender),
            h3_gender: self.h3_gender.unwrap_or(current.h3_gender),
        }
    }
}

/// Partial Megaphone parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MegaphoneParams {
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    pub param1: Option<u8>,
    pub param2: Option<u8>,
    pub param3: Option<u8>,
    pub param4: Option<u8>,
}

impl MegaphoneParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("type", self.kind, 3)
    }

    pub fn resolve(&self, current: &MegaphoneSettings) -> MegaphoneSettings {
        MegaphoneSettings {
            kind: self.kind.unwrap_or(current.kind),
            param1: self.param1.unwrap_or(current.param1),
            param2: self.param2.unwrap_or(current.param2),
            param3: self.param3.unwrap_or(current.param3),
            param4: self.param4.unwrap_or(current.param4),
        }
    }
}

/// Partial Reverb parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReverbParams {
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    pub param1: Option<u8>,
    pub param2: Option<u8>,
    pub param3: Option<u8>,
    pub param4: Option<u8>,
}

impl ReverbParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("type", self.kind, 5)
    }

    pub fn resolve(&self, current: &ReverbSettings) -> ReverbSettings {
        ReverbSettings {
            kind: self.kind.unwrap_or(current.kind),
            param1: self.param1.unwrap_or(current.param1),
            param2: self.param2.unwrap_or(current.param2),
            param3: self.param3.unwrap_or(current.param3),
            param4: self.param4.unwrap_or(current.param4),
        }
    }
}

/// Partial Vocoder parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VocoderParams {
    #[serde(rename = "type")]
    pub kind: Option<u8>,
    pub param1: Option<u8>,
    pub param2: Option<u8>,
    pub param3: Option<u8>,
    pub param4: Option<u8>,
}

impl VocoderParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("type", self.kind, 4)
    }

    pub fn resolve(&self, current: &VocoderSettings) -> VocoderSettings {
        VocoderSettings {
            kind: self.kind.unwrap_or(current.kind),
            param1: self.param1.unwrap_or(current.param1),
            param2: self.param2.unwrap_or(current.param2),
            param3: self.param3.unwrap_or(current.param3),
            param4: self.param4.unwrap_or(current.param4),
        }
    }
}

/// Partial Equalizer parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EqualizerParams {
    pub eq_switch: Option<u8>,
    pub low_shelf_freq: Option<u8>,
    pub low_shelf_gain: Option<u8>,
    pub low_mid_freq: Option<u8>,
    pub low_mid_q: Option<u8>,
    pub low_mid_gain: Option<u8>,
    pub high_mid_freq: Option<u8>,
    pub high_mid_q: Option<u8>,
    pub high_mid_gain: Option<u8>,
    pub high_shelf_freq: Option<u8>,
    pub high_shelf_gain: Option<u8>,
}

impl EqualizerParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        check("eqSwitch", self.eq_switch, 1)?;
        check("lowShelfFreq", self.low_shelf_freq, 127)?;
        check("lowShelfGain", self.low_shelf_gain, 40)?;
        check("lowMidFreq", self.low_mid_freq, 127)?;
        check("lowMidQ", self.low_mid_q, 127)?;
        check("lowMidGain", self.low_mid_gain, 40)?;
        check("highMidFreq", self.high_mid_freq, 127)?;
        check("highMidQ", self.high_mid_q, 127)?;
        check("highMidGain", self.high_mid_gain, 40)?;
        check("highShelfFreq", self.high_shelf_freq, 127)?;
        check("highShelfGain", self.high_shelf_gain, 40)
    }

    pub fn resolve(&self, current: &EqualizerSettings) -> EqualizerSettings {
        EqualizerSettings {
            eq_switch: self.eq_switch.unwrap_or(current.eq_switch),
            low_shelf_freq: self.low_shelf_freq.unwrap_or(current.low_shelf_freq),
            low_shelf_gain: self.low_shelf_gain.unwrap_or(current.low_shelf_gain),
            low_mid_freq: self.low_mid_freq.unwrap_or(current.low_mid_freq),
            low_mid_q: self.low_mid_q.unwrap_or(current.low_mid_q),
            low_mid_gain: self.low_mid_gain.unwrap_or(current.low_mid_gain),
            high_mid_freq: self.high_mid_freq.unwrap_or(current.high_mid_freq),
            high_mid_q: self.high_mid_q.unwrap_or(current.high_mid_q),
            high_mid_gain: self.high_mid_gain.unwrap_or(current.high_mid_gain),
            high_shelf_freq: self.high_shelf_freq.unwrap_or(current.high_shelf_freq),
            high_shelf_gain: self.high_shelf_gain.unwrap_or(current.high_shelf_gain),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
struct SingleValue {
    value: Option<u16>,
}

/// The continuous controls addressed by a single short message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliderControl {
    Key,
    MicSens,
    Volume,
    ReverbSend,
    Balance,
    Formant,
}

impl SliderControl {
    pub fn name(self) -> &'static str {
        match self {
            SliderControl::Key => "key",
            SliderControl::MicSens => "micSens",
            SliderControl::Volume => "volume",
            SliderControl::ReverbSend => "reverbSend",
            SliderControl::Balance => "balance",
            SliderControl::Formant => "formant",
        }
    }

    pub fn max(self) -> u8 {
        match self {
            SliderControl::Key => 11,
            _ => 127,
        }
    }
}

/// A command's parameter bag decoded against its effect tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectRequest {
    Robot(RobotParams),
    Harmony(HarmonyParams),
    Megaphone(MegaphoneParams),
    Reverb(ReverbParams),
    Vocoder(VocoderParams),
    Equalizer(EqualizerParams),
    /// Single short-message control; `None` means "re-send the last value".
    Slider {
        control: SliderControl,
        value: Option<u8>,
    },
    /// 14-bit pitch bend, 0-16383.
    Pitch { value: Option<u16> },
    /// Scene recall via program change 0-3.
    SceneRecall { program: u8 },
    /// Deactivate `base` (which must be a full effect with a toggle or a
    /// send level) and reset the active effect.
    EffectOff { base: EffectKind },
}

impl EffectRequest {
    /// Decode a parameter bag once, at the boundary. Shape errors
    /// (non-numeric values, wrong types) surface here; range checking is
    /// [`EffectRequest::validate`].
    pub fn decode(kind: EffectKind, bag: &Map<String, Value>) -> Result<Self, ParamError> {
        fn from_bag<T: serde::de::DeserializeOwned>(
            bag: &Map<String, Value>,
        ) -> Result<T, ParamError> {
            serde_json::from_value(Value::Object(bag.clone()))
                .map_err(|e| ParamError::Malformed(e.to_string()))
        }
        fn slider(
            control: SliderControl,
            bag: &Map<String, Value>,
        ) -> Result<EffectRequest, ParamError> {
            let single: SingleValue = from_bag(bag)?;
            Ok(EffectRequest::Slider {
                control,
                value: match single.value {
                    None => None,
                    Some(v) => Some(
                        u8::try_from(v).map_err(|_| ParamError::OutOfRange {
                            field: control.name(),
                            value: v as u32,
                            max: control.max() as u32,
                        })?,
                    ),
                },
            })
        }

        match kind {
            EffectKind::Robot => Ok(EffectRequest::Robot(from_bag(bag)?)),
            EffectKind::Harmony => Ok(EffectRequest::Harmony(from_bag(bag)?)),
            EffectKind::Megaphone => Ok(EffectRequest::Megaphone(from_bag(bag)?)),
            EffectKind::Reverb => Ok(EffectRequest::Reverb(from_bag(bag)?)),
            EffectKind::Vocoder => Ok(EffectRequest::Vocoder(from_bag(bag)?)),
            EffectKind::Equalizer => Ok(EffectRequest::Equalizer(from_bag(bag)?)),
            EffectKind::Key => slider(SliderControl::Key, bag),
            EffectKind::MicSens => slider(SliderControl::MicSens, bag),
            EffectKind::Volume => slider(SliderControl::Volume, bag),
            EffectKind::ReverbSend => slider(SliderControl::ReverbSend, bag),
            EffectKind::Balance => slider(SliderControl::Balance, bag),
            EffectKind::Formant => slider(SliderControl::Formant, bag),
            EffectKind::Pitch => {
                let single: SingleValue = from_bag(bag)?;
                Ok(EffectRequest::Pitch {
                    value: single.value,
                })
            }
            EffectKind::RobotOff => Ok(EffectRequest::EffectOff {
                base: EffectKind::Robot,
            }),
            EffectKind::HarmonyOff => Ok(EffectRequest::EffectOff {
                base: EffectKind::Harmony,
            }),
            EffectKind::MegaphoneOff => Ok(EffectRequest::EffectOff {
                base: EffectKind::Megaphone,
            }),
            EffectKind::VocoderOff => Ok(EffectRequest::EffectOff {
                base: EffectKind::Vocoder,
            }),
            EffectKind::ReverbOff => Ok(EffectRequest::EffectOff {
                base: EffectKind::Reverb,
            }),
            EffectKind::Effect1 => Ok(EffectRequest::SceneRecall { program: 0 }),
            EffectKind::Effect2 => Ok(EffectRequest::SceneRecall { program: 1 }),
            EffectKind::Effect3 => Ok(EffectRequest::SceneRecall { program: 2 }),
            EffectKind::Effect4 => Ok(EffectRequest::SceneRecall { program: 3 }),
            EffectKind::None => Err(ParamError::Unsupported(EffectKind::None)),
        }
    }

    /// Range-check every field the request actually carries. Runs at the
    /// submit boundary so out-of-range commands are rejected before any
    /// store or publish.
    pub fn validate(&self) -> Result<(), ParamError> {
        match self {
            EffectRequest::Robot(p) => p.validate(),
            EffectRequest::Harmony(p) => p.validate(),
            EffectRequest::Megaphone(p) => p.validate(),
            EffectRequest::Reverb(p) => p.validate(),
            EffectRequest::Vocoder(p) => p.validate(),
            EffectRequest::Equalizer(p) => p.validate(),
            EffectRequest::Slider { control, value } => check(control.name(), *value, control.max()),
            EffectRequest::Pitch { value } => match value {
                Some(v) if *v > 16383 => Err(ParamError::OutOfRange {
                    field: "pitch",
                    value: *v as u32,
                    max: 16383,
                }),
                _ => Ok(()),
            },
            EffectRequest::SceneRecall { .. } | EffectRequest::EffectOff { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(json: &str) -> Map<String, Value> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn robot_bag_decodes_with_camel_case_names() {
        let request = EffectRequest::decode(
            EffectKind::Robot,
            &bag(r#"{"octave":2,"feedbackSwitch":1,"feedbackResonance":120,"feedbackLevel":160}"#),
        )
        .unwrap();
        match request {
            EffectRequest::Robot(p) => {
                assert_eq!(p.octave, Some(2));
                assert_eq!(p.feedback_level, Some(160));
            }
            other => panic!("expected robot request, got {:?}", other),
        }
    }

    #[test]
    fn partial_update_resolves_from_current_settings() {
        let current = RobotSettings {
            octave: 1,
            feedback_switch: 1,
            feedback_resonance: 50,
            feedback_level: 60,
        };
        let partial = RobotParams {
            octave: Some(3),
            ..RobotParams::default()
        };
        let resolved = partial.resolve(&current);
        assert_eq!(resolved.octave, 3);
        assert_eq!(resolved.feedback_switch, 1);
        assert_eq!(resolved.feedback_resonance, 50);
        assert_eq!(resolved.feedback_level, 60);
    }

    #[test]
    fn merge_is_idempotent_for_unspecified_fields() {
        let current = HarmonySettings::default();
        let partial = HarmonyParams {
            h1_level: Some(5),
            ..HarmonyParams::default()
        };
        let expected = HarmonySettings {
            h1_level: 5,
            ..current
        };
        assert_eq!(partial.resolve(&current), expected);
        // Applying the same partial to its own result changes nothing.
        assert_eq!(partial.resolve(&expected), expected);
    }

    #[test]
    fn out_of_range_octave_is_rejected() {
        let request =
            EffectRequest::decode(EffectKind::Robot, &bag(r#"{"octave":4}"#)).unwrap();
        let err = request.validate().unwrap_err();
        assert_eq!(
            err,
            ParamError::OutOfRange {
                field: "octave",
                value: 4,
                max: 3
            }
        );
    }

    #[test]
    fn equalizer_gain_bound_is_forty() {
        let request =
            EffectRequest::decode(EffectKind::Equalizer, &bag(r#"{"lowShelfGain":41}"#)).unwrap();
        assert!(matches!(
            request.validate(),
            Err(ParamError::OutOfRange {
                field: "lowShelfGain",
                ..
            })
        ));
    }

    #[test]
    fn slider_and_pitch_bounds() {
        let request = EffectRequest::decode(EffectKind::Key, &bag(r#"{"value":12}"#)).unwrap();
        assert!(request.validate().is_err());

        let request = EffectRequest::decode(EffectKind::Pitch, &bag(r#"{"value":16383}"#)).unwrap();
        assert!(request.validate().is_ok());
    }

    #[test]
    fn off_tags_map_to_their_base_effect() {
        let request = EffectRequest::decode(EffectKind::ReverbOff, &Map::new()).unwrap();
        assert_eq!(
            request,
            EffectRequest::EffectOff {
                base: EffectKind::Reverb
            }
        );
    }

    #[test]
    fn none_cannot_be_decoded() {
        assert_eq!(
            EffectRequest::decode(EffectKind::None, &Map::new()),
            Err(ParamError::Unsupported(EffectKind::None))
        );
    }

    #[test]
    fn malformed_bag_is_a_shape_error() {
        let err =
            EffectRequest::decode(EffectKind::Robot, &bag(r#"{"octave":"loud"}"#)).unwrap_err();
        assert!(matches!(err, ParamError::Malformed(_)));
    }
}
