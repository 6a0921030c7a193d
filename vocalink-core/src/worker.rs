//! The device client runtime: subscription loop, reconcile poller, and
//! stale-command sweeper.
//!
//! All three loops share one shutdown flag and exit within one sleep
//! interval of it being set. In-flight device writes are not rolled back
//! on shutdown.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use log::{error, info, warn};

use vocalink_net::MessageBus;
use vocalink_types::{DeviceSettings, EffectCommand, EffectKind};

use crate::processor::CommandProcessor;
use crate::store::{CommandStore, DeviceRegistry, COMMAND_CHANNEL, DEVICE_CLEANUP_AGE};

/// How long the subscription loop blocks before re-checking shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// Owns the loops of one device client.
pub struct ClientRuntime {
    bus: Arc<dyn MessageBus>,
    processor: Arc<CommandProcessor>,
    poll_interval: Duration,
    cleanup_interval: Duration,
}

impl ClientRuntime {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        processor: Arc<CommandProcessor>,
        poll_interval: Duration,
        cleanup_interval: Duration,
    ) -> Self {
        Self {
            bus,
            processor,
            poll_interval,
            cleanup_interval,
        }
    }

    /// Register the device, subscribe, and drain commands until shutdown.
    /// The reconcile poller and the sweeper run on their own threads for
    /// the lifetime of this call.
    pub fn run(&self, shutdown: Arc<AtomicBool>) -> io::Result<()> {
        let registry = DeviceRegistry::new(Arc::clone(&self.bus));

        // Adopt the persisted snapshot if one exists, otherwise register
        // the local defaults as the first record for this device.
        let snapshot = self.processor.settings();
        match registry.get(&snapshot.device_id) {
            Ok(Some(_)) => info!("Device {} already registered", snapshot.device_id),
            Ok(None) => {
                if let Err(e) = registry.put(&snapshot) {
                    warn!("Failed to register device {}: {}", snapshot.device_id, e);
                }
            }
            Err(e) => warn!("Registry read failed for {}: {}", snapshot.device_id, e),
        }

        let commands = self.bus.subscribe(COMMAND_CHANNEL)?;
        info!(
            "Device {} listening on {}",
            self.processor.identity(),
            COMMAND_CHANNEL
        );

        let poller = self.spawn_reconcile_poller(Arc::clone(&shutdown));
        let sweeper = self.spawn_sweeper(Arc::clone(&shutdown));

        while !shutdown.load(Ordering::Relaxed) {
            match commands.recv_timeout(DRAIN_TIMEOUT) {
                Ok(payload) => match serde_json::from_str::<EffectCommand>(&payload) {
                    Ok(command) => {
                        self.processor.process(&command);
                    }
                    Err(e) => warn!("Ignoring malformed command payload: {}", e),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    error!("Command channel closed, stopping");
                    shutdown.store(true, Ordering::Relaxed);
                    break;
                }
            }
        }

        info!("Device client {} stopping", self.processor.identity());
        let _ = poller.join();
        let _ = sweeper.join();
        Ok(())
    }

    /// Periodically compare the persisted snapshot against local state; if
    /// an operator changed the active effect through the registry, replay
    /// it as a self-addressed command through the normal pipeline.
    fn spawn_reconcile_poller(&self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let registry = DeviceRegistry::new(Arc::clone(&self.bus));
        let processor = Arc::clone(&self.processor);
        let interval = self.poll_interval;

        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                match registry.get(processor.identity()) {
                    Ok(Some(snapshot)) => {
                        if let Some(command) = reconcile_command(&processor.settings(), &snapshot) {
                            info!(
                                "Reconciling {} to effect {}",
                                processor.identity(),
                                command.effect_type
                            );
                            processor.process(&command);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Reconcile poll failed: {}", e),
                }
            }
        })
    }

    /// The device-side safety net for command records nobody answered.
    fn spawn_sweeper(&self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        let store = CommandStore::new(Arc::clone(&self.bus));
        let interval = self.cleanup_interval;

        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                thread::sleep(interval);
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                if let Err(e) = store.cleanup_expired(DEVICE_CLEANUP_AGE) {
                    warn!("Command sweep failed: {}", e);
                }
            }
        })
    }
}

/// A command reproducing the snapshot's active effect, or `None` when
/// local state already matches (or the snapshot asks for no effect).
fn reconcile_command(local: &DeviceSettings, snapshot: &DeviceSettings) -> Option<EffectCommand> {
    if snapshot.active_effect == EffectKind::None
        || snapshot.active_effect == local.active_effect
    {
        return None;
    }
    Some(
        EffectCommand::new(snapshot.active_effect, local.device_id.clone())
            .with_parameters(snapshot.parameters_for(snapshot.active_effect)),
    )
}
