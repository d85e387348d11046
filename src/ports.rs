//! Port opening seam between the bridge and real devices

use crate::error::BridgeError;
use crate::sink::{MidiSink, MidirSink};
use crate::transport::{SerialTransport, Transport};

/// Opens the transport and sink handles for a run
pub trait PortOpener: Send + Sync {
    fn open_transport(&self, port: &str, baud_rate: u32) -> Result<Box<dyn Transport>, BridgeError>;

    fn open_sink(&self, port: &str) -> Result<Box<dyn MidiSink>, BridgeError>;
}

/// Opens real serial ports and MIDI outputs
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    fn open_transport(&self, port: &str, baud_rate: u32) -> Result<Box<dyn Transport>, BridgeError> {
        Ok(Box::new(SerialTransport::open(port, baud_rate)?))
    }

    fn open_sink(&self, port: &str) -> Result<Box<dyn MidiSink>, BridgeError> {
        Ok(Box::new(MidirSink::open(port)?))
    }
}
