//! Bridge error types

use thiserror::Error;

/// Broad error classes, used to decide how the control surface reacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing port selection; retry with other identifiers
    Configuration,
    /// Serial read failure or device gone; the run is stopped
    Transport,
    /// MIDI send failure; the run is stopped
    Sink,
    /// Misuse of the start/stop API or controller unavailable
    Control,
}

/// Errors reported by the bridge runner
///
/// Every variant is cheap to clone so it can travel both as a command reply
/// and inside a [`crate::bridge::BridgeEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("no serial port selected")]
    NoTransportSelected,

    #[error("no MIDI output selected")]
    NoSinkSelected,

    #[error("serial port '{0}' not found")]
    TransportNotFound(String),

    #[error("could not open serial port '{port}': {reason}")]
    TransportOpen { port: String, reason: String },

    #[error("MIDI output '{0}' not found")]
    SinkNotFound(String),

    #[error("could not open MIDI output '{port}': {reason}")]
    SinkOpen { port: String, reason: String },

    #[error("serial read failed: {0}")]
    Read(String),

    #[error("serial port '{0}' disconnected")]
    Disconnected(String),

    #[error("MIDI send failed: {0}")]
    Send(String),

    #[error("bridge is already running")]
    AlreadyRunning,

    #[error("previous run is still closing its ports")]
    StillStopping,

    #[error("bridge controller is not available")]
    ControllerGone,
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::NoTransportSelected
            | BridgeError::NoSinkSelected
            | BridgeError::TransportNotFound(_)
            | BridgeError::TransportOpen { .. }
            | BridgeError::SinkNotFound(_)
            | BridgeError::SinkOpen { .. } => ErrorCategory::Configuration,
            BridgeError::Read(_) | BridgeError::Disconnected(_) => ErrorCategory::Transport,
            BridgeError::Send(_) => ErrorCategory::Sink,
            BridgeError::AlreadyRunning
            | BridgeError::StillStopping
            | BridgeError::ControllerGone => ErrorCategory::Control,
        }
    }

    /// Configuration errors can be fixed by picking other ports and retrying
    pub fn is_configuration(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert!(BridgeError::TransportNotFound("/dev/null0".into()).is_configuration());
        assert!(BridgeError::SinkOpen {
            port: "IAC".into(),
            reason: "busy".into()
        }
        .is_configuration());
        assert_eq!(
            BridgeError::Read("timeout".into()).category(),
            ErrorCategory::Transport
        );
        assert_eq!(BridgeError::Send("gone".into()).category(), ErrorCategory::Sink);
        assert_eq!(BridgeError::AlreadyRunning.category(), ErrorCategory::Control);
        assert_eq!(BridgeError::StillStopping.category(), ErrorCategory::Control);
    }

    #[test]
    fn test_messages_name_the_port() {
        let err = BridgeError::TransportOpen {
            port: "COM3".into(),
            reason: "Access is denied.".into(),
        };
        assert_eq!(
            err.to_string(),
            "could not open serial port 'COM3': Access is denied."
        );
    }
}
