//! Serial MIDI Bridge
//!
//! Reads a byte stream of 3-byte MIDI messages from a serial device,
//! reassembles it into frames and forwards each frame to a MIDI output port.
//!
//! - [`reassembler`]: stream to frame reassembly with resynchronization
//! - [`bridge`]: the start/stop state machine and the relay worker
//! - [`transport`] / [`sink`] / [`ports`]: serial input, MIDI output and how they are opened
//! - [`config`], [`discovery`], [`activity`], [`cli`]: the application around it

pub mod activity;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod midi;
pub mod ports;
pub mod reassembler;
pub mod sink;
pub mod transport;

pub use bridge::{BridgeActor, BridgeEvent, BridgeHandle, BridgeSettings, RunState};
pub use error::BridgeError;
pub use midi::Frame;
pub use reassembler::FrameReassembler;
