//! Bridge runner - relays frames from the serial transport to the MIDI sink
//!
//! The runner is split in three parts:
//! - [`BridgeActor`]: single owner of the `Stopped`/`Running` state machine
//! - the worker: a blocking read loop spawned per run
//! - [`BridgeHandle`]: cloneable control API for the control surface
//!
//! Observability goes out through a bounded event channel and a watch channel
//! carrying the run state; neither can slow down forwarding.

mod actor;
mod actor_handle;
mod commands;
mod types;
mod worker;

pub use actor::BridgeActor;
pub use actor_handle::BridgeHandle;
pub use types::{
    BridgeEvent, BridgeSettings, BridgeStats, BridgeStatus, PortRole, RunState, RunningPorts,
};
