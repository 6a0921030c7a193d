//! Closed enumeration of the effect and control tags a command can carry.

use serde::{Deserialize, Serialize};

/// Every command names one of these. Full effects carry a parameter set and
/// are sent as SysEx; off-commands and sliders are short control messages;
/// `effect1`..`effect4` recall a stored scene via program change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    #[default]
    None,
    Robot,
    Harmony,
    Megaphone,
    Reverb,
    Vocoder,
    Equalizer,
    RobotOff,
    HarmonyOff,
    MegaphoneOff,
    VocoderOff,
    ReverbOff,
    Key,
    MicSens,
    Volume,
    ReverbSend,
    Balance,
    Formant,
    Pitch,
    Effect1,
    Effect2,
    Effect3,
    Effect4,
}

impl EffectKind {
    /// The wire tag, identical to the serde representation.
    pub fn tag(self) -> &'static str {
        match self {
            EffectKind::None => "none",
            EffectKind::Robot => "robot",
            EffectKind::Harmony => "harmony",
            EffectKind::Megaphone => "megaphone",
            EffectKind::Reverb => "reverb",
            EffectKind::Vocoder => "vocoder",
            EffectKind::Equalizer => "equalizer",
            EffectKind::RobotOff => "robotoff",
            EffectKind::HarmonyOff => "harmonyoff",
            EffectKind::MegaphoneOff => "megaphoneoff",
            EffectKind::VocoderOff => "vocoderoff",
            EffectKind::ReverbOff => "reverboff",
            EffectKind::Key => "key",
            EffectKind::MicSens => "micsens",
            EffectKind::Volume => "volume",
            EffectKind::ReverbSend => "reverbsend",
            EffectKind::Balance => "balance",
            EffectKind::Formant => "formant",
            EffectKind::Pitch => "pitch",
            EffectKind::Effect1 => "effect1",
            EffectKind::Effect2 => "effect2",
            EffectKind::Effect3 => "effect3",
            EffectKind::Effect4 => "effect4",
        }
    }

    /// Full-parameter effects, i.e. the ones applied as a SysEx frame.
    pub fn is_full_effect(self) -> bool {
        matches!(
            self,
            EffectKind::Robot
                | EffectKind::Harmony
                | EffectKind::Megaphone
                | EffectKind::Reverb
                | EffectKind::Vocoder
                | EffectKind::Equalizer
        )
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}
