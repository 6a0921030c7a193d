//! Device client daemon: connects the local VT-4 to the Vocalink bus.

use std::fs::File;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{error, info, warn};

use vocalink_core::{ClientRuntime, CommandProcessor};
use vocalink_midi::MidiOutputManager;
use vocalink_net::{BusClient, MessageBus};
use vocalink_types::DeviceSettings;

fn init_logging(verbose: bool) {
    use simplelog::*;

    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("vocalink")
        .join("client.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = File::create(&log_path).unwrap_or_else(|_| {
        File::create("/tmp/vocalink-client.log").expect("Cannot create log file")
    });

    WriteLogger::init(log_level, Config::default(), log_file)
        .expect("Failed to initialize logger");

    log::info!("vocalink-client starting (log level: {:?})", log_level);
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = vocalink_core::Config::load();
    if config.identity().is_empty() {
        error!("No device hardware address configured");
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "set [device] mac_address in config.toml",
        ));
    }

    let bus = match BusClient::connect(config.bus_addr(), config.connect_timeout()) {
        Ok(bus) => Arc::new(bus) as Arc<dyn MessageBus>,
        Err(e) => {
            error!("Could not reach bus at {}: {}", config.bus_addr(), e);
            return Err(e);
        }
    };

    let mut midi = MidiOutputManager::new();
    midi.refresh_ports();
    for port in midi.list_ports() {
        info!("MIDI output {}: {}", port.index, port.name);
    }
    if config.auto_connect() {
        if let Err(e) = midi.connect(config.midi_port()) {
            // The processor reports per-command failures; a missing device
            // at startup is not fatal.
            warn!("MIDI port {} not opened: {}", config.midi_port(), e);
        }
    }

    let settings = DeviceSettings::new(
        config.identity(),
        config.device_name(),
        config.midi_port(),
    );
    info!(
        "Device {} ({}) joining bus at {}",
        settings.device_id,
        settings.device_name,
        config.bus_addr()
    );

    let processor = Arc::new(CommandProcessor::new(
        Arc::clone(&bus),
        settings,
        Box::new(midi),
    ));
    let runtime = ClientRuntime::new(
        bus,
        processor,
        config.poll_interval(),
        config.cleanup_interval(),
    );

    // Runs until the process is terminated; every loop watches this flag.
    let shutdown = Arc::new(AtomicBool::new(false));
    runtime.run(shutdown)
}
