//! Types shared between the bridge actor, its worker and observers

use std::fmt;
use std::time::Duration;

use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::midi::FrameKind;
use crate::transport::DEFAULT_BAUD_RATE;

/// Whether a worker is currently relaying bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Stopped => f.write_str("Stopped"),
            RunState::Running => f.write_str("Running"),
        }
    }
}

/// Which side of the bridge a port belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    Serial,
    Midi,
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortRole::Serial => f.write_str("serial port"),
            PortRole::Midi => f.write_str("MIDI port"),
        }
    }
}

/// Ports of the active run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningPorts {
    pub serial: String,
    pub midi: String,
    pub baud_rate: u32,
}

/// Snapshot returned by control commands
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BridgeStatus {
    pub state: RunState,
    pub ports: Option<RunningPorts>,
    /// Read or send failure that ended the last run
    pub last_error: Option<BridgeError>,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BridgeStats {
    /// Raw bytes read from the transport
    pub bytes_read: u64,
    /// Frames delivered to the sink
    pub frames_forwarded: u64,
    /// Bytes dropped while resynchronizing
    pub bytes_discarded: u64,
    /// Observability events dropped because the event channel was full
    pub events_dropped: u64,
    /// Incomplete frame bytes still buffered when the run ended
    pub pending_dropped: usize,
}

/// Observability events emitted by the bridge
///
/// Emission never blocks: events are dropped when nobody keeps up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    StateChanged(RunState),
    PortOpened { role: PortRole, name: String },
    PortClosed { role: PortRole, name: String },
    Frame { kind: FrameKind, data1: u8, data2: u8 },
    Error(BridgeError),
    Summary(BridgeStats),
}

/// Tunables for a run, derived from the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub baud_rate: u32,
    /// Idle wait when the transport has no bytes
    pub poll_interval: Duration,
    /// Upper bound on joining the worker at stop
    pub stop_timeout: Duration,
    /// Capacity of the observability channel
    pub event_buffer: usize,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            poll_interval: Duration::from_millis(1),
            stop_timeout: Duration::from_millis(1000),
            event_buffer: 1024,
        }
    }
}

impl From<&AppConfig> for BridgeSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            baud_rate: config.serial.baud_rate,
            poll_interval: Duration::from_millis(config.bridge.poll_interval_ms),
            stop_timeout: Duration::from_millis(config.bridge.stop_timeout_ms),
            event_buffer: config.bridge.event_buffer,
        }
    }
}
