//! MIDI output sink

use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use tracing::debug;

use crate::error::BridgeError;

/// Client name registered with the MIDI backend
const CLIENT_NAME: &str = "Serial-MIDI-Bridge";

/// Message-based output written by the bridge worker
pub trait MidiSink: Send {
    /// Resolved port name
    fn name(&self) -> &str;

    /// Send one complete MIDI message
    fn send(&mut self, message: &[u8]) -> Result<(), BridgeError>;

    /// Close the connection. Further sends fail.
    fn close(&mut self);
}

/// [`MidiSink`] backed by a midir output connection
pub struct MidirSink {
    name: String,
    conn: Option<MidiOutputConnection>,
}

impl MidirSink {
    /// Open the output named `pattern`
    ///
    /// An exact name match wins; otherwise the first port containing `pattern`
    /// (case-insensitive) is used, which copes with the numeric suffixes some
    /// backends append to port names.
    pub fn open(pattern: &str) -> Result<Self, BridgeError> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| BridgeError::SinkOpen {
            port: pattern.to_string(),
            reason: e.to_string(),
        })?;

        let (port, name) = find_output_port(&midi_out, pattern)
            .ok_or_else(|| BridgeError::SinkNotFound(pattern.to_string()))?;

        let conn = midi_out
            .connect(&port, "serial-midi-bridge")
            .map_err(|e| BridgeError::SinkOpen {
                port: name.clone(),
                reason: e.to_string(),
            })?;

        debug!("MIDI output '{}' opened", name);

        Ok(Self {
            name,
            conn: Some(conn),
        })
    }
}

impl MidiSink for MidirSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&mut self, message: &[u8]) -> Result<(), BridgeError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| BridgeError::Send(format!("MIDI output '{}' closed", self.name)))?;
        conn.send(message)
            .map_err(|e| BridgeError::Send(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.close();
            debug!("MIDI output '{}' closed", self.name);
        }
    }
}

fn find_output_port(midi_out: &MidiOutput, pattern: &str) -> Option<(MidiOutputPort, String)> {
    let named: Vec<(MidiOutputPort, String)> = midi_out
        .ports()
        .into_iter()
        .filter_map(|port| midi_out.port_name(&port).ok().map(|name| (port, name)))
        .collect();

    let index = match_port_name(named.iter().map(|(_, name)| name.as_str()), pattern)?;
    named.into_iter().nth(index)
}

/// Index of the port name matching `pattern`: exact first, then substring
pub(crate) fn match_port_name<'a>(
    names: impl Iterator<Item = &'a str> + Clone,
    pattern: &str,
) -> Option<usize> {
    if pattern.is_empty() {
        return None;
    }
    if let Some(idx) = names.clone().position(|name| name == pattern) {
        return Some(idx);
    }
    let needle = pattern.to_lowercase();
    names.into_iter().position(|name| name.to_lowercase().contains(&needle))
}
