//! Port discovery and auto-selection
//!
//! Lists serial devices and MIDI outputs and picks sensible defaults: an
//! Arduino-looking serial port and a virtual MIDI bus (IAC, loopMIDI).

use anyhow::{Context, Result};
use colored::*;
use midir::MidiOutput;
use serialport::SerialPortType;
use tracing::{debug, warn};

use crate::config::AppConfig;

/// A serial device as shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortEntry {
    pub device: String,
    pub description: String,
}

impl std::fmt::Display for SerialPortEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.device, self.description)
    }
}

/// List available serial ports
///
/// On macOS only `/dev/cu.*` devices are listed: the `/dev/tty.*` twins block on
/// open waiting for carrier detect.
pub fn list_serial_ports() -> Result<Vec<SerialPortEntry>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;

    Ok(ports
        .into_iter()
        .filter(|_p| {
            #[cfg(target_os = "macos")]
            {
                !_p.port_name.starts_with("/dev/tty.")
            }
            #[cfg(not(target_os = "macos"))]
            {
                true
            }
        })
        .map(|p| {
            let description = match p.port_type {
                SerialPortType::UsbPort(info) => info
                    .product
                    .or(info.manufacturer)
                    .unwrap_or_else(|| format!("USB {:04x}:{:04x}", info.vid, info.pid)),
                SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                SerialPortType::PciPort => "PCI".to_string(),
                SerialPortType::Unknown => "n/a".to_string(),
            };
            SerialPortEntry {
                device: p.port_name,
                description,
            }
        })
        .collect())
}

/// List available MIDI output port names
pub fn list_midi_outputs() -> Result<Vec<String>> {
    let midi_out =
        MidiOutput::new("Serial-MIDI-Bridge-Scanner").context("Failed to create MIDI output")?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Pick the serial port to use
///
/// The first port whose device path or description contains one of `patterns`
/// (case-insensitive) wins; otherwise the first port.
pub fn pick_serial_port<'a>(
    ports: &'a [SerialPortEntry],
    patterns: &[String],
) -> Option<&'a SerialPortEntry> {
    ports
        .iter()
        .find(|p| {
            let device = p.device.to_lowercase();
            let description = p.description.to_lowercase();
            patterns.iter().any(|pat| {
                let pat = pat.to_lowercase();
                device.contains(&pat) || description.contains(&pat)
            })
        })
        .or_else(|| ports.first())
}

/// Pick the MIDI output to use
///
/// Patterns are tried in order of the port list; otherwise the first output.
pub fn pick_midi_output<'a>(names: &'a [String], patterns: &[String]) -> Option<&'a String> {
    names
        .iter()
        .find(|name| {
            let name = name.to_lowercase();
            patterns.iter().any(|pat| name.contains(&pat.to_lowercase()))
        })
        .or_else(|| names.first())
}

/// Use `explicit` if given, else auto-select from the available serial ports
pub fn resolve_serial_port(explicit: Option<&str>, patterns: &[String]) -> Result<Option<String>> {
    if let Some(port) = explicit {
        return Ok(Some(port.to_string()));
    }
    let ports = list_serial_ports()?;
    Ok(pick_serial_port(&ports, patterns).map(|p| p.device.clone()))
}

/// Use `explicit` if given, else auto-select from the available MIDI outputs
pub fn resolve_midi_output(explicit: Option<&str>, patterns: &[String]) -> Result<Option<String>> {
    if let Some(port) = explicit {
        return Ok(Some(port.to_string()));
    }
    let names = list_midi_outputs()?;
    Ok(pick_midi_output(&names, patterns).cloned())
}

/// Ports to hand to the bridge: explicit choices first, then config, then
/// auto-selection
///
/// An empty string means nothing could be selected; the bridge reports that as
/// a configuration error.
pub fn resolve_ports(
    serial: Option<&str>,
    midi: Option<&str>,
    config: &AppConfig,
) -> (String, String) {
    let serial = serial.or(config.serial.port.as_deref());
    let midi = midi.or(config.midi.output_port.as_deref());

    let serial = resolve_serial_port(serial, &config.serial.auto_select).unwrap_or_else(|e| {
        warn!("Serial port discovery failed: {:#}", e);
        None
    });
    let midi = resolve_midi_output(midi, &config.midi.auto_select).unwrap_or_else(|e| {
        warn!("MIDI output discovery failed: {:#}", e);
        None
    });

    debug!("Resolved ports: serial={:?} midi={:?}", serial, midi);
    (serial.unwrap_or_default(), midi.unwrap_or_default())
}

/// Print serial ports and MIDI outputs, marking the auto-selected ones
pub fn print_ports(serial_patterns: &[String], midi_patterns: &[String]) {
    println!("\n{}", "Serial ports:".bold());
    match list_serial_ports() {
        Ok(ports) if ports.is_empty() => {
            println!("  {}", "(none - is the Arduino connected?)".yellow());
        }
        Ok(ports) => {
            let selected = pick_serial_port(&ports, serial_patterns).map(|p| p.device.clone());
            for (i, port) in ports.iter().enumerate() {
                print_entry(i, &port.to_string(), selected.as_deref() == Some(port.device.as_str()));
            }
        }
        Err(e) => println!("  {}", format!("{:#}", e).red()),
    }

    println!("\n{}", "MIDI outputs:".bold());
    match list_midi_outputs() {
        Ok(names) if names.is_empty() => {
            println!(
                "  {}",
                "(none - create a virtual port: IAC Driver on macOS, loopMIDI on Windows)"
                    .yellow()
            );
        }
        Ok(names) => {
            let selected = pick_midi_output(&names, midi_patterns).cloned();
            for (i, name) in names.iter().enumerate() {
                print_entry(i, name, selected.as_ref() == Some(name));
            }
        }
        Err(e) => println!("  {}", format!("{:#}", e).red()),
    }
    println!();
}

fn print_entry(index: usize, label: &str, selected: bool) {
    if selected {
        println!("  {}: {} {}", index, label.green(), "(auto)".dimmed());
    } else {
        println!("  {}: {}", index, label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(device: &str, description: &str) -> SerialPortEntry {
        SerialPortEntry {
            device: device.to_string(),
            description: description.to_string(),
        }
    }

    fn patterns(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_serial_prefers_usbmodem() {
        let ports = vec![
            entry("/dev/cu.Bluetooth-Incoming-Port", "n/a"),
            entry("/dev/cu.usbmodem14101", "IOUSBHostDevice"),
        ];
        let picked = pick_serial_port(&ports, &patterns(&["usbmodem", "arduino"]));
        assert_eq!(picked.map(|p| p.device.as_str()), Some("/dev/cu.usbmodem14101"));
    }

    #[test]
    fn test_serial_matches_description_case_insensitive() {
        let ports = vec![entry("COM1", "Communications Port"), entry("COM4", "Arduino Leonardo")];
        let picked = pick_serial_port(&ports, &patterns(&["usbmodem", "arduino"]));
        assert_eq!(picked.map(|p| p.device.as_str()), Some("COM4"));
    }

    #[test]
    fn test_serial_falls_back_to_first() {
        let ports = vec![entry("/dev/ttyS0", "n/a"), entry("/dev/ttyS1", "n/a")];
        let picked = pick_serial_port(&ports, &patterns(&["usbmodem"]));
        assert_eq!(picked.map(|p| p.device.as_str()), Some("/dev/ttyS0"));
        assert!(pick_serial_port(&[], &patterns(&["usbmodem"])).is_none());
    }

    #[test]
    fn test_midi_prefers_virtual_bus() {
        let names = patterns(&["Midi Through Port-0", "loopMIDI Port", "IAC Driver Pedals"]);
        let picked = pick_midi_output(&names, &patterns(&["iac", "pedals", "loopmidi"]));
        assert_eq!(picked.map(String::as_str), Some("loopMIDI Port"));
    }

    #[test]
    fn test_midi_falls_back_to_first() {
        let names = patterns(&["Midi Through Port-0"]);
        assert_eq!(
            pick_midi_output(&names, &patterns(&["iac"])).map(String::as_str),
            Some("Midi Through Port-0")
        );
        assert!(pick_midi_output(&[], &patterns(&["iac"])).is_none());
    }

    #[test]
    fn test_explicit_ports_skip_enumeration() {
        assert_eq!(
            resolve_serial_port(Some("COM3"), &[]).unwrap(),
            Some("COM3".to_string())
        );
        assert_eq!(
            resolve_midi_output(Some("IAC Driver Pedals"), &[]).unwrap(),
            Some("IAC Driver Pedals".to_string())
        );
    }

    #[test]
    fn test_explicit_choice_beats_config() {
        let mut config = AppConfig::default();
        config.serial.port = Some("/dev/cu.usbmodem1".to_string());
        config.midi.output_port = Some("IAC Driver Bus 1".to_string());

        assert_eq!(
            resolve_ports(Some("COM7"), None, &config),
            ("COM7".to_string(), "IAC Driver Bus 1".to_string())
        );
        assert_eq!(
            resolve_ports(None, Some("loopMIDI"), &config),
            ("/dev/cu.usbmodem1".to_string(), "loopMIDI".to_string())
        );
    }

    #[test]
    fn test_entry_display() {
        assert_eq!(entry("COM4", "Arduino Uno").to_string(), "COM4 - Arduino Uno");
    }
}
