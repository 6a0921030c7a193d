//! Control-plane side: validate, store, publish, and clean up commands.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};
use thiserror::Error;

use vocalink_net::MessageBus;
use vocalink_types::{
    CommandId, CommandResponse, DeviceId, DeviceSettings, EffectCommand, ParamError,
};

use crate::store::{
    CommandStore, DeviceRegistry, StoreError, COMMAND_CHANNEL, CONTROL_CLEANUP_AGE,
    RESPONSE_CHANNEL,
};

#[derive(Debug, Error)]
pub enum SubmitError {
    /// The command failed structural validation; nothing was stored or
    /// published.
    #[error("command rejected: {0}")]
    Invalid(&'static str),
    /// A provided parameter is out of range or malformed; nothing was
    /// stored or published.
    #[error(transparent)]
    Params(#[from] ParamError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Publishes commands and tracks their stored records. The HTTP surface
/// (not part of this crate) is a thin shim over these methods.
pub struct Dispatcher {
    bus: Arc<dyn MessageBus>,
    commands: CommandStore,
    devices: DeviceRegistry,
}

impl Dispatcher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self {
            commands: CommandStore::new(Arc::clone(&bus)),
            devices: DeviceRegistry::new(Arc::clone(&bus)),
            bus,
        }
    }

    /// Validate, persist with TTL, then publish. Order matters: a command
    /// that cannot be stored is never published, and an invalid one is
    /// rejected before either.
    pub fn submit(&self, command: &EffectCommand) -> Result<(), SubmitError> {
        command.validate().map_err(SubmitError::Invalid)?;
        command.request()?.validate()?;

        self.commands.put(command)?;

        let json = serde_json::to_string(command).map_err(StoreError::Format)?;
        self.bus
            .publish(COMMAND_CHANNEL, &json)
            .map_err(StoreError::Bus)?;

        info!(
            "Command {} published: {} -> {}",
            command.command_id,
            command.effect_type,
            if command.is_broadcast {
                "broadcast".to_string()
            } else {
                command.target_device_id.to_string()
            }
        );
        Ok(())
    }

    /// The stored record for status polling, or `None` once it has been
    /// cleaned up.
    pub fn get_status(&self, id: &CommandId) -> Result<Option<EffectCommand>, StoreError> {
        self.commands.get(id)
    }

    /// A terminal response retires the stored record. Responses for
    /// already-deleted records (broadcast fan-in, redelivery) are fine.
    pub fn on_response(&self, response: &CommandResponse) {
        info!(
            "Response for {} from {}: {:?} {}",
            response.command_id,
            response.device_id,
            response.status,
            response.error_message.as_deref().unwrap_or("")
        );
        if response.status.is_terminal() {
            if let Err(e) = self.commands.delete(&response.command_id) {
                warn!("Failed to delete command {}: {}", response.command_id, e);
            }
        }
    }

    /// Safety net for commands no device ever answered.
    pub fn cleanup_expired(&self) -> Result<usize, StoreError> {
        self.commands.cleanup_expired(CONTROL_CLEANUP_AGE)
    }

    // Device registry, exposed for the devices endpoint.

    pub fn register_device(&self, settings: &DeviceSettings) -> Result<(), StoreError> {
        self.devices.put(settings)
    }

    pub fn get_device(&self, id: &DeviceId) -> Result<Option<DeviceSettings>, StoreError> {
        self.devices.get(id)
    }

    pub fn list_devices(&self) -> Result<Vec<DeviceSettings>, StoreError> {
        self.devices.list()
    }

    pub fn remove_device(&self, id: &DeviceId) -> Result<bool, StoreError> {
        self.devices.delete(id)
    }

    /// Drain the response channel on a background thread until `shutdown`
    /// is set. Malformed payloads are logged and skipped.
    pub fn spawn_response_listener(
        self: &Arc<Self>,
        shutdown: Arc<AtomicBool>,
    ) -> io::Result<JoinHandle<()>> {
        let rx = self.bus.subscribe(RESPONSE_CHANNEL)?;
        let dispatcher = Arc::clone(self);

        Ok(thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match rx.recv_timeout(Duration::from_millis(250)) {
                    Ok(payload) => match serde_json::from_str::<CommandResponse>(&payload) {
                        Ok(response) => dispatcher.on_response(&response),
                        Err(e) => warn!("Ignoring malformed response: {}", e),
                    },
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        warn!("Response channel closed");
                        break;
                    }
                }
            }
            info!("Response listener exiting");
        }))
    }
}
