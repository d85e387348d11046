//! Commands accepted by the bridge actor

use tokio::sync::oneshot;

use super::types::{BridgeSettings, BridgeStatus};
use crate::error::BridgeError;

/// Reply channel for control commands
pub type Reply = oneshot::Sender<Result<BridgeStatus, BridgeError>>;

/// Commands for the bridge actor
///
/// All state transitions go through this channel; the actor is the only
/// writer of the run state.
#[derive(Debug)]
pub enum BridgeCommand {
    /// Open both ports and spawn the worker
    Start {
        serial: String,
        midi: String,
        response: Reply,
    },

    /// Stop the worker and close both ports. No-op when stopped.
    Stop { response: Reply },

    /// Start when stopped, stop when running
    Toggle {
        serial: String,
        midi: String,
        response: Reply,
    },

    /// Current state and ports
    Status { response: Reply },

    /// Replace the run settings; applied at the next start
    UpdateSettings(BridgeSettings),

    /// Stop if running, then end the actor
    Shutdown { response: oneshot::Sender<()> },
}
