//! Device-side command processing.
//!
//! Each inbound command walks an explicit pipeline:
//! received → validating-target → resolving-parameters → encoding →
//! transmitting → completed | failed. Commands not addressed to this
//! device are dropped before any settings or codec work. An accepted
//! command always produces a response, and the settings snapshot is
//! persisted after every terminal outcome — success or not — so the
//! registry reflects what was last attempted.

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use thiserror::Error;

use vocalink_midi::{message, sysex, CodecError, MidiError, MidiSink};
use vocalink_net::MessageBus;
use vocalink_types::command::now_unix;
use vocalink_types::{
    CommandResponse, CommandStatus, DeviceId, DeviceSettings, EffectCommand, EffectKind,
    EffectRequest, ParamError, SliderControl,
};

use crate::store::{CommandStore, DeviceRegistry, RESPONSE_CHANNEL};

/// The device listens on MIDI channel 0.
const MIDI_CHANNEL: u8 = 0;

/// Pipeline phase of one command on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPhase {
    Received,
    ValidatingTarget,
    ResolvingParameters,
    Encoding,
    Transmitting,
    Completed,
    Failed,
}

/// Why a command could not be applied. The text of these ends up in the
/// response's `errorMessage`.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Midi(#[from] MidiError),
}

/// Applies commands to the local device and answers on the response
/// channel. The settings snapshot and the MIDI sink are both single-writer
/// resources shared with the reconcile poller, hence the mutexes.
pub struct CommandProcessor {
    identity: DeviceId,
    bus: Arc<dyn MessageBus>,
    devices: DeviceRegistry,
    commands: CommandStore,
    settings: Mutex<DeviceSettings>,
    sink: Mutex<Box<dyn MidiSink>>,
}

impl CommandProcessor {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        settings: DeviceSettings,
        sink: Box<dyn MidiSink>,
    ) -> Self {
        Self {
            identity: settings.device_id.clone(),
            devices: DeviceRegistry::new(Arc::clone(&bus)),
            commands: CommandStore::new(Arc::clone(&bus)),
            settings: Mutex::new(settings),
            sink: Mutex::new(sink),
            bus,
        }
    }

    pub fn identity(&self) -> &DeviceId {
        &self.identity
    }

    /// A copy of the current local settings.
    pub fn settings(&self) -> DeviceSettings {
        self.settings.lock().unwrap().clone()
    }

    /// Run one command through the pipeline. Returns `None` when the
    /// command is not addressed to this device.
    pub fn process(&self, command: &EffectCommand) -> Option<CommandResponse> {
        let mut phase = CommandPhase::Received;
        debug!("Command {} {:?}", command.command_id, phase);

        phase = CommandPhase::ValidatingTarget;
        if !command.is_addressed_to(&self.identity) {
            debug!(
                "Ignoring command {} for {}",
                command.command_id, command.target_device_id
            );
            return None;
        }

        info!(
            "Executing command {}: {}",
            command.command_id, command.effect_type
        );

        let outcome = self.apply(command, &mut phase);
        let (status, error_message) = match outcome {
            Ok(()) => {
                phase = CommandPhase::Completed;
                (CommandStatus::Completed, None)
            }
            Err(e) => {
                phase = CommandPhase::Failed;
                warn!("Command {} failed: {}", command.command_id, e);
                (CommandStatus::Failed, Some(e.to_string()))
            }
        };
        debug!("Command {} finished in {:?}", command.command_id, phase);

        // Persist the snapshot whatever happened, so the registry shows
        // the last attempted state.
        let snapshot = self.settings();
        if let Err(e) = self.devices.put(&snapshot) {
            warn!("Failed to persist settings for {}: {}", self.identity, e);
        }

        let response = CommandResponse {
            command_id: command.command_id.clone(),
            device_id: self.identity.clone(),
            status,
            error_message,
            processed_at: now_unix(),
        };

        match serde_json::to_string(&response) {
            Ok(json) => {
                if let Err(e) = self.bus.publish(RESPONSE_CHANNEL, &json) {
                    warn!("Failed to publish response for {}: {}", command.command_id, e);
                }
            }
            Err(e) => warn!("Failed to encode response: {}", e),
        }

        // The record has served its purpose once a terminal answer exists.
        if let Err(e) = self.commands.delete(&command.command_id) {
            warn!("Failed to delete command record {}: {}", command.command_id, e);
        }

        Some(response)
    }

    /// Resolve, update the local snapshot to the attempted state, encode,
    /// transmit. The snapshot is written before the wire calls, so a
    /// failed attempt is still visible in the registry.
    fn apply(&self, command: &EffectCommand, phase: &mut CommandPhase) -> Result<(), ApplyError> {
        *phase = CommandPhase::ResolvingParameters;
        let request = command.request()?;

        let mut settings = self.settings.lock().unwrap();
        let mut sink = self.sink.lock().unwrap();

        match request {
            EffectRequest::Robot(p) => {
                let resolved = p.resolve(&settings.robot);
                settings.robot = resolved;
                settings.active_effect = EffectKind::Robot;
                *phase = CommandPhase::Encoding;
                let frame = sysex::robot(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::Harmony(p) => {
                let resolved = p.resolve(&settings.harmony);
                settings.harmony = resolved;
                settings.active_effect = EffectKind::Harmony;
                *phase = CommandPhase::Encoding;
                let frame = sysex::harmony(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::Megaphone(p) => {
                let resolved = p.resolve(&settings.megaphone);
                settings.megaphone = resolved;
                settings.active_effect = EffectKind::Megaphone;
                *phase = CommandPhase::Encoding;
                let frame = sysex::megaphone(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::Reverb(p) => {
                let resolved = p.resolve(&settings.reverb);
                settings.reverb = resolved;
                settings.active_effect = EffectKind::Reverb;
                *phase = CommandPhase::Encoding;
                let frame = sysex::reverb(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::Vocoder(p) => {
                let resolved = p.resolve(&settings.vocoder);
                settings.vocoder = resolved;
                settings.active_effect = EffectKind::Vocoder;
                *phase = CommandPhase::Encoding;
                let frame = sysex::vocoder(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::Equalizer(p) => {
                let resolved = p.resolve(&settings.equalizer);
                settings.equalizer = resolved;
                settings.active_effect = EffectKind::Equalizer;
                *phase = CommandPhase::Encoding;
                let frame = sysex::equalizer(&resolved)?;
                *phase = CommandPhase::Transmitting;
                sink.send_long(&frame)?;
            }
            EffectRequest::EffectOff { base } => {
                *phase = CommandPhase::Encoding;
                // Reverb has no toggle controller; its deactivation is a
                // zero send level.
                let msg = if base == EffectKind::Reverb {
                    message::control(MIDI_CHANNEL, SliderControl::ReverbSend, 0)?
                } else {
                    message::effect_toggle(MIDI_CHANNEL, base, false)?
                };
                *phase = CommandPhase::Transmitting;
                sink.send_short(&msg)?;
                settings.active_effect = EffectKind::None;
            }
            EffectRequest::Slider { control, value } => {
                let current = slider_value(&settings, control);
                let value = value.unwrap_or(current);
                *phase = CommandPhase::Encoding;
                let msg = message::control(MIDI_CHANNEL, control, value)?;
                *phase = CommandPhase::Transmitting;
                sink.send_short(&msg)?;
                set_slider_value(&mut settings, control, value);
            }
            EffectRequest::Pitch { value } => {
                let value = value.unwrap_or(settings.sliders.pitch);
                *phase = CommandPhase::Encoding;
                let msg = message::pitch_bend(MIDI_CHANNEL, value)?;
                *phase = CommandPhase::Transmitting;
                sink.send_short(&msg)?;
                settings.sliders.pitch = value;
            }
            EffectRequest::SceneRecall { program } => {
                *phase = CommandPhase::Encoding;
                let msg = message::program_change(MIDI_CHANNEL, program)?;
                *phase = CommandPhase::Transmitting;
                sink.send_short(&msg)?;
                settings.active_effect = match program {
                    0 => EffectKind::Effect1,
                    1 => EffectKind::Effect2,
                    2 => EffectKind::Effect3,
                    _ => EffectKind::Effect4,
                };
            }
        }

        Ok(())
    }
}

fn slider_value(settings: &DeviceSettings, control: SliderControl) -> u8 {
    match control {
        SliderControl::Key => settings.sliders.key,
        SliderControl::MicSens => settings.sliders.mic_sens,
        SliderControl::Volume => settings.sliders.volume,
        SliderControl::ReverbSend => settings.sliders.reverb_send,
        SliderControl::Balance => settings.sliders.balance,
        SliderControl::Formant => settings.sliders.formant,
    }
}

fn set_slider_value(settings: &mut DeviceSettings, control: SliderControl, value: u8) {
    match control {
        SliderControl::Key => settings.sliders.key = value,
        SliderControl::MicSens => settings.sliders.mic_sens = value,
        SliderControl::Volume => settings.sliders.volume = value,
        SliderControl::ReverbSend => settings.sliders.reverb_send = value,
        SliderControl::Balance => settings.sliders.balance = value,
        SliderControl::Formant => settings.sliders.formant = value,
    }
}
