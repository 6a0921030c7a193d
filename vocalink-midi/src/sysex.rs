//! Checksummed System-Exclusive frames.
//!
//! Frame layout:
//! `F0 41 10 00 00 00 51 <cmd> <address x4> <len> <data...> <checksum> F7`.
//! The checksum covers address through data and satisfies
//! `(sum(address + len + data + checksum)) % 128 == 0`.
//!
//! Each effect is one entry in a static template table (command id,
//! address, ordered field bounds); a single builder consumes the table, so
//! no frame layout is ever duplicated per effect.

use vocalink_types::{
    EqualizerSettings, HarmonySettings, MegaphoneSettings, ReverbSettings, RobotSettings,
    VocoderSettings,
};

use crate::CodecError;

const SYSEX_START: u8 = 0xF0;
const SYSEX_END: u8 = 0xF7;
const MANUFACTURER_ID: u8 = 0x41;
const DEVICE_ID: u8 = 0x10;
const MODEL_ID: [u8; 3] = [0x00, 0x00, 0x00];
const FAMILY_ID: u8 = 0x51;

/// Byte offset of the address field, i.e. where the checksum span starts.
const ADDRESS_OFFSET: usize = 8;

/// Universal identity-request probe, sent once after opening a device.
pub const IDENTITY_REQUEST: [u8; 6] = [0xF0, 0x7E, 0x7F, 0x06, 0x01, 0xF7];

struct Field {
    name: &'static str,
    max: u8,
}

struct Template {
    command_id: u8,
    address: [u8; 4],
    fields: &'static [Field],
}

const fn field(name: &'static str, max: u8) -> Field {
    Field { name, max }
}

static ROBOT: Template = Template {
    command_id: 0x12,
    address: [0x00, 0x00, 0x00, 0x30],
    fields: &[
        field("octave", 3),
        field("feedbackSwitch", 1),
        field("feedbackResonance", 255),
        field("feedbackLevel", 255),
    ],
};

static HARMONY: Template = Template {
    command_id: 0x13,
    address: [0x31, 0x00, 0x00, 0x00],
    fields: &[
        field("h1Level", 255),
        field("h2Level", 255),
        field("h3Level", 255),
        field("h1Key", 11),
        field("h2Key", 11),
        field("h3Key", 11),
        field("h1Gender", 255),
        field("h2Gender", 255),
        field("h3Gender", 255),
    ],
};

static MEGAPHONE: Template = Template {
    command_id: 0x14,
    address: [0x41, 0x00, 0x00, 0x00],
    fields: &[
        field("type", 3),
        field("param1", 255),
        field("param2", 255),
        field("param3", 255),
        field("param4", 255),
    ],
};

static REVERB: Template = Template {
    command_id: 0x15,
    address: [0x51, 0x00, 0x00, 0x00],
    fields: &[
        field("type", 5),
        field("param1", 255),
        field("param2", 255),
        field("param3", 255),
        field("param4", 255),
    ],
};

static VOCODER: Template = Template {
    command_id: 0x16,
    address: [0x61, 0x00, 0x00, 0x00],
    fields: &[
        field("type", 4),
        field("param1", 255),
        field("param2", 255),
        field("param3", 255),
        field("param4", 255),
    ],
};

static EQUALIZER: Template = Template {
    command_id: 0x17,
    address: [0x63, 0x00, 0x00, 0x00],
    fields: &[
        field("eqSwitch", 1),
        field("lowShelfFreq", 127),
        field("lowShelfGain", 40),
        field("lowMidFreq", 127),
        field("lowMidQ", 127),
        field("lowMidGain", 40),
        field("highMidFreq", 127),
        field("highMidQ", 127),
        field("highMidGain", 40),
        field("highShelfFreq", 127),
        field("highShelfGain", 40),
    ],
};

/// Roland checksum over the given span: `(128 - (sum % 128)) % 128`.
pub fn checksum(bytes: &[u8]) -> u8 {
    let sum: u32 = bytes.iter().map(|&b| b as u32).sum();
    ((128 - (sum % 128)) % 128) as u8
}

fn build(template: &Template, values: &[u8]) -> Result<Vec<u8>, CodecError> {
    debug_assert_eq!(values.len(), template.fields.len());

    // Validate every field before a single byte of output exists.
    for (field, &value) in template.fields.iter().zip(values) {
        if value > field.max {
            return Err(CodecError::OutOfRange {
                field: field.name,
                value: value as u16,
                max: field.max as u16,
            });
        }
    }

    let mut msg = Vec::with_capacity(ADDRESS_OFFSET + 4 + 1 + values.len() + 2);
    msg.push(SYSEX_START);
    msg.push(MANUFACTURER_ID);
    msg.push(DEVICE_ID);
    msg.extend_from_slice(&MODEL_ID);
    msg.push(FAMILY_ID);
    msg.push(template.command_id);
    msg.extend_from_slice(&template.address);
    msg.push(values.len() as u8);
    msg.extend_from_slice(values);
    let ck = checksum(&msg[ADDRESS_OFFSET..]);
    msg.push(ck);
    msg.push(SYSEX_END);
    Ok(msg)
}

pub fn robot(p: &RobotSettings) -> Result<Vec<u8>, CodecError> {
    build(
        &ROBOT,
        &[
            p.octave,
            p.feedback_switch,
            p.feedback_resonance,
            p.feedback_level,
        ],
    )
}

pub fn harmony(p: &HarmonySettings) -> Result<Vec<u8>, CodecError> {
    build(
        &HARMONY,
        &[
            p.h1_level, p.h2_level, p.h3_level, p.h1_key, p.h2_key, p.h3_key, p.h1_gender,
            p.h2_gender, p.h3_gender,
        ],
    )
}

pub fn megaphone(p: &MegaphoneSettings) -> Result<Vec<u8>, CodecError> {
    build(
        &MEGAPHONE,
        &[p.kind, p.param1, p.param2, p.param3, p.param4],
    )
}

pub fn reverb(p: &ReverbSettings) -> Result<Vec<u8>, CodecError> {
    build(&REVERB, &[p.kind, p.param1, p.param2, p.param3, p.param4])
}

pub fn vocoder(p: &VocoderSettings) -> Result<Vec<u8>, CodecError> {
    build(&VOCODER, &[p.kind, p.param1, p.param2, p.param3, p.param4])
}

pub fn equalizer(p: &EqualizerSettings) -> Result<Vec<u8>, CodecError> {
    build(
        &EQUALIZER,
        &[
            p.eq_switch,
            p.low_shelf_freq,
            p.low_shelf_gain,
            p.low_mid_freq,
            p.low_mid_q,
            p.low_mid_gain,
            p.high_mid_freq,
            p.high_mid_q,
            p.high_mid_gain,
            p.high_shelf_freq,
            p.high_shelf_gain,
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum_span_sums_to_zero(frame: &[u8]) -> bool {
        // address..=checksum, i.e. everything between the command id and F7
        let span = &frame[ADDRESS_OFFSET..frame.len() - 1];
        span.iter().map(|&b| b as u32).sum::<u32>() % 128 == 0
    }

    #[test]
    fn robot_frame_is_byte_exact() {
        let frame = robot(&RobotSettings {
            octave: 2,
            feedback_switch: 1,
            feedback_resonance: 120,
            feedback_level: 160,
        })
        .unwrap();
        assert_eq!(
            frame,
            vec![
                0xF0, 0x41, 0x10, 0x00, 0x00, 0x00, 0x51, 0x12, // header
                0x00, 0x00, 0x00, 0x30, // address
                0x04, // data length
                0x02, 0x01, 0x78, 0xA0, // octave, switch, resonance, level
                0x31, // checksum
                0xF7,
            ]
        );
    }

    #[test]
    fn every_template_satisfies_the_checksum_invariant() {
        let frames = vec![
            robot(&RobotSettings::default()).unwrap(),
            harmony(&HarmonySettings::default()).unwrap(),
            megaphone(&MegaphoneSettings::default()).unwrap(),
            reverb(&ReverbSettings::default()).unwrap(),
            vocoder(&VocoderSettings::default()).unwrap(),
            equalizer(&EqualizerSettings::default()).unwrap(),
        ];
        for frame in frames {
            assert_eq!(frame[0], 0xF0);
            assert_eq!(*frame.last().unwrap(), 0xF7);
            assert!(checksum_span_sums_to_zero(&frame), "frame {:02X?}", frame);
        }
    }

    #[test]
    fn frame_layout_per_effect() {
        let frame = harmony(&HarmonySettings::default()).unwrap();
        assert_eq!(frame[7], 0x13);
        assert_eq!(&frame[8..12], &[0x31, 0x00, 0x00, 0x00]);
        assert_eq!(frame[12], 0x09);
        assert_eq!(frame.len(), 8 + 4 + 1 + 9 + 2);

        let frame = equalizer(&EqualizerSettings::default()).unwrap();
        assert_eq!(frame[7], 0x17);
        assert_eq!(&frame[8..12], &[0x63, 0x00, 0x00, 0x00]);
        assert_eq!(frame[12], 0x0B);
        assert_eq!(frame.len(), 8 + 4 + 1 + 11 + 2);
    }

    #[test]
    fn one_past_bound_fails_with_no_output() {
        let err = robot(&RobotSettings {
            octave: 4,
            ..RobotSettings::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "octave",
                value: 4,
                max: 3
            }
        );

        let err = harmony(&HarmonySettings {
            h2_key: 12,
            ..HarmonySettings::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "h2Key",
                value: 12,
                max: 11
            }
        );

        let err = reverb(&ReverbSettings {
            kind: 6,
            ..ReverbSettings::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "type",
                value: 6,
                max: 5
            }
        );

        let err = vocoder(&VocoderSettings {
            kind: 5,
            ..VocoderSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { field: "type", .. }));

        let err = megaphone(&MegaphoneSettings {
            kind: 4,
            ..MegaphoneSettings::default()
        })
        .unwrap_err();
        assert!(matches!(err, CodecError::OutOfRange { field: "type", .. }));

        let err = equalizer(&EqualizerSettings {
            high_mid_gain: 41,
            ..EqualizerSettings::default()
        })
        .unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                field: "highMidGain",
                value: 41,
                max: 40
            }
        );
    }

    #[test]
    fn checksum_is_recomputed_per_call() {
        let a = reverb(&ReverbSettings::default()).unwrap();
        let b = reverb(&ReverbSettings {
            param1: 99,
            ..ReverbSettings::default()
        })
        .unwrap();
        assert_ne!(a[a.len() - 2], b[b.len() - 2]);
        assert!(checksum_span_sums_to_zero(&a));
        assert!(checksum_span_sums_to_zero(&b));
    }

    #[test]
    fn checksum_of_empty_sum_is_zero() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x80]), 0);
        assert_eq!(checksum(&[0x40, 0x41, 0x22, 0x01]), 0x5C);
    }
}
