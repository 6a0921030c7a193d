//! # vocalink-midi
//!
//! Wire codec and output transport for the VT-4 control surface.
//!
//! The codec half is pure: it turns validated parameter sets into exact
//! byte sequences — short 1-3 byte control messages and checksummed
//! System-Exclusive frames. The transport half owns the midir output
//! connection and exposes it through the [`MidiSink`] byte-sink trait.

pub mod message;
pub mod output;
pub mod sysex;

pub use message::{control, effect_toggle, pitch_bend, program_change};
pub use output::{MidiError, MidiOutputManager, MidiPortInfo, MidiSink};
pub use sysex::IDENTITY_REQUEST;

use vocalink_types::EffectKind;

/// Codec construction failure. Produced before any wire bytes are
/// written; values are never clamped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("{field} out of range: {value} (valid 0-{max})")]
    OutOfRange {
        field: &'static str,
        value: u16,
        max: u16,
    },
    #[error("effect '{0}' has no control-surface message")]
    Unsupported(EffectKind),
}
