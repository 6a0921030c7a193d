//! Client configuration: embedded defaults plus an optional user file.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use vocalink_types::DeviceId;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

#[derive(Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    bus: BusConfig,
    #[serde(default)]
    device: DeviceConfig,
    #[serde(default)]
    midi: MidiConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

#[derive(Deserialize, Default)]
struct BusConfig {
    addr: Option<String>,
    connect_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct DeviceConfig {
    mac_address: Option<String>,
    name: Option<String>,
}

#[derive(Deserialize, Default)]
struct MidiConfig {
    port: Option<usize>,
    auto_connect: Option<bool>,
}

#[derive(Deserialize, Default)]
struct RuntimeConfig {
    poll_interval_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
}

pub struct Config {
    bus: BusConfig,
    device: DeviceConfig,
    midi: MidiConfig,
    runtime: RuntimeConfig,
}

impl Config {
    pub fn load() -> Self {
        Self::load_with_user_file(user_config_path())
    }

    fn load_with_user_file(path: Option<PathBuf>) -> Self {
        let mut base: ConfigFile =
            toml::from_str(DEFAULT_CONFIG).expect("Failed to parse embedded config.toml");

        if let Some(path) = path {
            if path.exists() {
                match std::fs::read_to_string(&path) {
                    Ok(contents) => match toml::from_str::<ConfigFile>(&contents) {
                        Ok(user) => merge(&mut base, user),
                        Err(e) => {
                            log::warn!(target: "config", "ignoring malformed config {}: {}", path.display(), e)
                        }
                    },
                    Err(e) => {
                        log::warn!(target: "config", "could not read config {}: {}", path.display(), e)
                    }
                }
            }
        }

        Config {
            bus: base.bus,
            device: base.device,
            midi: base.midi,
            runtime: base.runtime,
        }
    }

    pub fn bus_addr(&self) -> &str {
        self.bus.addr.as_deref().unwrap_or("127.0.0.1:7381")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.bus.connect_timeout_secs.unwrap_or(10))
    }

    /// The client's identity, canonicalized from the configured hardware
    /// address.
    pub fn identity(&self) -> DeviceId {
        DeviceId::new(self.device.mac_address.as_deref().unwrap_or_default())
    }

    pub fn device_name(&self) -> &str {
        self.device.name.as_deref().unwrap_or("VT-4")
    }

    pub fn midi_port(&self) -> usize {
        self.midi.port.unwrap_or(0)
    }

    pub fn auto_connect(&self) -> bool {
        self.midi.auto_connect.unwrap_or(true)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.poll_interval_secs.unwrap_or(5))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.runtime.cleanup_interval_secs.unwrap_or(60))
    }
}

fn merge(base: &mut ConfigFile, user: ConfigFile) {
    if user.bus.addr.is_some() {
        base.bus.addr = user.bus.addr;
    }
    if user.bus.connect_timeout_secs.is_some() {
        base.bus.connect_timeout_secs = user.bus.connect_timeout_secs;
    }
    if user.device.mac_address.is_some() {
        base.device.mac_address = user.device.mac_address;
    }
    if user.device.name.is_some() {
        base.device.name = user.device.name;
    }
    if user.midi.port.is_some() {
        base.midi.port = user.midi.port;
    }
    if user.midi.auto_connect.is_some() {
        base.midi.auto_connect = user.midi.auto_connect;
    }
    if user.runtime.poll_interval_secs.is_some() {
        base.runtime.poll_interval_secs = user.runtime.poll_interval_secs;
    }
    if user.runtime.cleanup_interval_secs.is_some() {
        base.runtime.cleanup_interval_secs = user.runtime.cleanup_interval_secs;
    }
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vocalink").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn embedded_defaults_parse() {
        let config = Config::load_with_user_file(None);
        assert_eq!(config.bus_addr(), "127.0.0.1:7381");
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.auto_connect());
    }

    #[test]
    fn user_file_overrides_only_what_it_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[device]\nmac_address = \"aa:bb:cc:dd:ee:ff\"\n\n[runtime]\npoll_interval_secs = 2"
        )
        .unwrap();

        let config = Config::load_with_user_file(Some(file.path().to_path_buf()));
        assert_eq!(config.identity().as_str(), "AABBCCDDEEFF");
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        // Untouched keys keep their defaults.
        assert_eq!(config.bus_addr(), "127.0.0.1:7381");
        assert_eq!(config.device_name(), "VT-4");
    }

    #[test]
    fn malformed_user_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "this is not toml [[").unwrap();

        let config = Config::load_with_user_file(Some(file.path().to_path_buf()));
        assert_eq!(config.bus_addr(), "127.0.0.1:7381");
    }
}
