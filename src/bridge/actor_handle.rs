//! BridgeHandle - public API for the BridgeActor
//!
//! Cloneable and cheap; every method only sends a message, so callers are
//! never blocked by the worker.

use tokio::sync::{mpsc, oneshot, watch};

use super::commands::BridgeCommand;
use super::types::{BridgeSettings, BridgeStatus, RunState};
use crate::error::BridgeError;

/// Handle for controlling the bridge
#[derive(Clone)]
pub struct BridgeHandle {
    cmd_tx: mpsc::UnboundedSender<BridgeCommand>,
    state_rx: watch::Receiver<RunState>,
}

impl BridgeHandle {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<BridgeCommand>,
        state_rx: watch::Receiver<RunState>,
    ) -> Self {
        Self { cmd_tx, state_rx }
    }

    /// Open `serial` and `midi` and start relaying
    ///
    /// Fails with a configuration error when either port cannot be opened,
    /// and with [`BridgeError::AlreadyRunning`] when a run is active.
    pub async fn start(
        &self,
        serial: impl Into<String>,
        midi: impl Into<String>,
    ) -> Result<BridgeStatus, BridgeError> {
        let serial = serial.into();
        let midi = midi.into();
        self.request(|response| BridgeCommand::Start {
            serial,
            midi,
            response,
        })
        .await
    }

    /// Stop relaying and close both ports. Succeeds when already stopped.
    pub async fn stop(&self) -> Result<BridgeStatus, BridgeError> {
        self.request(|response| BridgeCommand::Stop { response })
            .await
    }

    /// Start when stopped, stop when running
    pub async fn toggle(
        &self,
        serial: impl Into<String>,
        midi: impl Into<String>,
    ) -> Result<BridgeStatus, BridgeError> {
        let serial = serial.into();
        let midi = midi.into();
        self.request(|response| BridgeCommand::Toggle {
            serial,
            midi,
            response,
        })
        .await
    }

    pub async fn status(&self) -> Result<BridgeStatus, BridgeError> {
        self.request(|response| BridgeCommand::Status { response })
            .await
    }

    /// Replace the run settings (fire-and-forget); applied at the next start
    pub fn update_settings(&self, settings: BridgeSettings) {
        let _ = self.cmd_tx.send(BridgeCommand::UpdateSettings(settings));
    }

    /// Stop if running and end the actor
    pub async fn shutdown(&self) {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(BridgeCommand::Shutdown {
                response: response_tx,
            })
            .is_err()
        {
            return;
        }
        let _ = response_rx.await;
    }

    /// Wait until the bridge is stopped
    ///
    /// Returns the error that ended the run, if it ended on a failure rather
    /// than on request.
    pub async fn wait_stopped(&self) -> Result<(), BridgeError> {
        let mut state = self.state_rx.clone();
        state
            .wait_for(|state| !state.is_running())
            .await
            .map_err(|_| BridgeError::ControllerGone)?;

        match self.status().await?.last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Last published run state
    pub fn run_state(&self) -> RunState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every run state change
    pub fn subscribe_state(&self) -> watch::Receiver<RunState> {
        self.state_rx.clone()
    }

    async fn request<F>(&self, make: F) -> Result<BridgeStatus, BridgeError>
    where
        F: FnOnce(oneshot::Sender<Result<BridgeStatus, BridgeError>>) -> BridgeCommand,
    {
        let (response_tx, response_rx) = oneshot::channel();
        self.cmd_tx
            .send(make(response_tx))
            .map_err(|_| BridgeError::ControllerGone)?;
        response_rx.await.map_err(|_| BridgeError::ControllerGone)?
    }
}
