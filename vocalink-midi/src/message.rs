//! Short (1-3 byte) control messages.
//!
//! The status byte carries the command class in the high nibble and the
//! zero-based channel in the low nibble. The VT-4 listens on channel 0;
//! the channel is still a parameter because it is part of the wire format.

use vocalink_types::{EffectKind, SliderControl};

use crate::CodecError;

const CONTROL_CHANGE: u8 = 0xB0;
const PROGRAM_CHANGE: u8 = 0xC0;
const PITCH_BEND: u8 = 0xE0;

/// Controller numbers of the control surface.
const CTL_VOLUME: u8 = 0x2E;
const CTL_MIC_SENS: u8 = 0x2F;
const CTL_KEY: u8 = 0x30;
const CTL_ROBOT: u8 = 0x31;
const CTL_MEGAPHONE: u8 = 0x32;
const CTL_VOCODER: u8 = 0x34;
const CTL_HARMONY: u8 = 0x35;
const CTL_FORMANT: u8 = 0x36;
const CTL_BALANCE: u8 = 0x38;
const CTL_REVERB_SEND: u8 = 0x39;

const TOGGLE_ON: u8 = 0x7F;
const TOGGLE_OFF: u8 = 0x00;

fn status(class: u8, channel: u8) -> Result<u8, CodecError> {
    if channel > 0x0F {
        return Err(CodecError::OutOfRange {
            field: "channel",
            value: channel as u16,
            max: 0x0F,
        });
    }
    Ok(class | channel)
}

fn controller_for(control: SliderControl) -> u8 {
    match control {
        SliderControl::Key => CTL_KEY,
        SliderControl::MicSens => CTL_MIC_SENS,
        SliderControl::Volume => CTL_VOLUME,
        SliderControl::ReverbSend => CTL_REVERB_SEND,
        SliderControl::Balance => CTL_BALANCE,
        SliderControl::Formant => CTL_FORMANT,
    }
}

/// Set a continuous control. The per-control bound (11 for key, 127
/// otherwise) is enforced here, before any bytes exist.
pub fn control(channel: u8, control: SliderControl, value: u8) -> Result<[u8; 3], CodecError> {
    if value > control.max() {
        return Err(CodecError::OutOfRange {
            field: control.name(),
            value: value as u16,
            max: control.max() as u16,
        });
    }
    Ok([
        status(CONTROL_CHANGE, channel)?,
        controller_for(control),
        value,
    ])
}

/// Switch a toggle-style effect on or off. Only robot, megaphone, vocoder
/// and harmony have a toggle controller.
pub fn effect_toggle(channel: u8, effect: EffectKind, on: bool) -> Result<[u8; 3], CodecError> {
    let controller = match effect {
        EffectKind::Robot => CTL_ROBOT,
        EffectKind::Megaphone => CTL_MEGAPHONE,
        EffectKind::Vocoder => CTL_VOCODER,
        EffectKind::Harmony => CTL_HARMONY,
        other => return Err(CodecError::Unsupported(other)),
    };
    Ok([
        status(CONTROL_CHANGE, channel)?,
        controller,
        if on { TOGGLE_ON } else { TOGGLE_OFF },
    ])
}

/// Scene recall. Programs are zero-based on the wire.
pub fn program_change(channel: u8, program: u8) -> Result<[u8; 2], CodecError> {
    if program > 0x7F {
        return Err(CodecError::OutOfRange {
            field: "program",
            value: program as u16,
            max: 0x7F,
        });
    }
    Ok([status(PROGRAM_CHANGE, channel)?, program])
}

/// Pitch bend, the one 14-bit control: the value is split into two 7-bit
/// halves, LSB first.
pub fn pitch_bend(channel: u8, value: u16) -> Result<[u8; 3], CodecError> {
    if value > 16383 {
        return Err(CodecError::OutOfRange {
            field: "pitch",
            value,
            max: 16383,
        });
    }
    let lsb = (value & 0x7F) as u8;
    let msb = ((value >> 7) & 0x7F) as u8;
    Ok([status(PITCH_BEND, channel)?, lsb, msb])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_bytes() {
        assert_eq!(
            control(0, SliderControl::Key, 9).unwrap(),
            [0xB0, 0x30, 0x09]
        );
        assert_eq!(
            control(0, SliderControl::Volume, 100).unwrap(),
            [0xB0, 0x2E, 0x64]
        );
        assert_eq!(
            control(0, SliderControl::ReverbSend, 0).unwrap(),
            [0xB0, 0x39, 0x00]
        );
        assert_eq!(
            control(1, SliderControl::Formant, 64).unwrap(),
            [0xB1, 0x36, 0x40]
        );
    }

    #[test]
    fn key_is_bounded_at_eleven() {
        let err = control(0, SliderControl::Key, 12).unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "key",
                value: 12,
                max: 11
            }
        );
    }

    #[test]
    fn slider_is_bounded_at_127() {
        assert!(control(0, SliderControl::Balance, 127).is_ok());
        assert!(control(0, SliderControl::Balance, 128).is_err());
    }

    #[test]
    fn toggles_use_7f_and_00() {
        assert_eq!(
            effect_toggle(0, EffectKind::Robot, true).unwrap(),
            [0xB0, 0x31, 0x7F]
        );
        assert_eq!(
            effect_toggle(0, EffectKind::Harmony, false).unwrap(),
            [0xB0, 0x35, 0x00]
        );
        assert_eq!(
            effect_toggle(0, EffectKind::Megaphone, false).unwrap(),
            [0xB0, 0x32, 0x00]
        );
        assert_eq!(
            effect_toggle(0, EffectKind::Vocoder, true).unwrap(),
            [0xB0, 0x34, 0x7F]
        );
    }

    #[test]
    fn reverb_has_no_toggle_controller() {
        assert_eq!(
            effect_toggle(0, EffectKind::Reverb, false),
            Err(CodecError::Unsupported(EffectKind::Reverb))
        );
    }

    #[test]
    fn program_change_bytes() {
        assert_eq!(program_change(0, 2).unwrap(), [0xC0, 0x02]);
        assert!(program_change(0, 128).is_err());
    }

    #[test]
    fn pitch_bend_splits_into_seven_bit_halves() {
        assert_eq!(pitch_bend(0, 8192).unwrap(), [0xE0, 0x00, 0x40]);
        assert_eq!(pitch_bend(0, 16383).unwrap(), [0xE0, 0x7F, 0x7F]);
        assert_eq!(pitch_bend(0, 0).unwrap(), [0xE0, 0x00, 0x00]);
        assert!(pitch_bend(0, 16384).is_err());
    }

    #[test]
    fn channel_nibble_is_bounded() {
        assert!(control(15, SliderControl::Key, 0).is_ok());
        assert!(control(16, SliderControl::Key, 0).is_err());
    }
}
