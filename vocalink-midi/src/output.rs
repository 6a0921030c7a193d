//! MIDI output transport over midir.

use log::{info, warn};
use midir::{MidiOutput, MidiOutputConnection};

use crate::sysex::IDENTITY_REQUEST;

/// Transport failure. Codec errors never appear here; by the time bytes
/// reach a sink they are already validated.
#[derive(Debug, thiserror::Error)]
pub enum MidiError {
    #[error("MIDI output not connected")]
    NotConnected,
    #[error("invalid MIDI port index: {0}")]
    InvalidPort(usize),
    #[error("MIDI init failed: {0}")]
    Init(String),
    #[error("MIDI connect failed: {0}")]
    Connect(String),
    #[error("MIDI send failed: {0}")]
    Send(String),
}

/// The byte-sink the command processor writes to. Short messages are at
/// most 3 bytes; long messages are SysEx-framed and arbitrary length.
pub trait MidiSink: Send {
    fn send_short(&mut self, message: &[u8]) -> Result<(), MidiError>;
    fn send_long(&mut self, message: &[u8]) -> Result<(), MidiError>;
}

/// Information about an available MIDI output port.
#[derive(Debug, Clone)]
pub struct MidiPortInfo {
    pub index: usize,
    pub name: String,
}

/// MIDI output manager: port enumeration plus one open connection.
pub struct MidiOutputManager {
    midi_out: Option<MidiOutput>,
    connection: Option<MidiOutputConnection>,
    connected_port_name: Option<String>,
    available_ports: Vec<MidiPortInfo>,
}

impl MidiOutputManager {
    pub fn new() -> Self {
        let midi_out = MidiOutput::new("vocalink").ok();
        Self {
            midi_out,
            connection: None,
            connected_port_name: None,
            available_ports: Vec::new(),
        }
    }

    /// Refresh the list of available MIDI output ports
    pub fn refresh_ports(&mut self) {
        self.available_ports.clear();

        if let Some(ref midi_out) = self.midi_out {
            let ports = midi_out.ports();
            for (index, port) in ports.iter().enumerate() {
                if let Ok(name) = midi_out.port_name(port) {
                    self.available_ports.push(MidiPortInfo { index, name });
                }
            }
        }
    }

    pub fn list_ports(&self) -> &[MidiPortInfo] {
        &self.available_ports
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn connected_port_name(&self) -> Option<&str> {
        self.connected_port_name.as_deref()
    }

    /// Connect to a MIDI output port by index and probe the device with a
    /// universal identity request.
    pub fn connect(&mut self, port_index: usize) -> Result<(), MidiError> {
        // Disconnect existing connection first
        self.disconnect();

        // Need to recreate MidiOutput after handing ownership to connect()
        let midi_out = MidiOutput::new("vocalink").map_err(|e| MidiError::Init(e.to_string()))?;
        let ports = midi_out.ports();

        if port_index >= ports.len() {
            return Err(MidiError::InvalidPort(port_index));
        }

        let port = &ports[port_index];
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let mut connection = midi_out
            .connect(port, "vocalink-output")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        if let Err(e) = connection.send(&IDENTITY_REQUEST) {
            warn!("identity request failed on '{}': {}", port_name, e);
        }

        info!("MIDI output connected: {}", port_name);
        self.connection = Some(connection);
        self.connected_port_name = Some(port_name);

        // Recreate MidiOutput for future port listing
        self.midi_out = MidiOutput::new("vocalink").ok();

        Ok(())
    }

    pub fn disconnect(&mut self) {
        if let Some(conn) = self.connection.take() {
            conn.close();
        }
        self.connected_port_name = None;
    }

    fn send(&mut self, message: &[u8]) -> Result<(), MidiError> {
        let conn = self.connection.as_mut().ok_or(MidiError::NotConnected)?;
        conn.send(message)
            .map_err(|e| MidiError::Send(e.to_string()))
    }
}

impl MidiSink for MidiOutputManager {
    fn send_short(&mut self, message: &[u8]) -> Result<(), MidiError> {
        self.send(message)
    }

    fn send_long(&mut self, message: &[u8]) -> Result<(), MidiError> {
        self.send(message)
    }
}

impl Default for MidiOutputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MidiOutputManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}
