//! BridgeActor - owns the run state and the worker lifecycle
//!
//! Control requests arrive as [`BridgeCommand`]s and are processed one at a
//! time, so the run state has a single writer. While running, the actor also
//! watches the worker so an I/O failure turns into an orderly stop without
//! any request from the control surface.

use std::sync::Arc;

use crossbeam::channel as cb;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::actor_handle::BridgeHandle;
use super::commands::BridgeCommand;
use super::types::{
    BridgeEvent, BridgeSettings, BridgeStatus, PortRole, RunState, RunningPorts,
};
use super::worker::{EventEmitter, Worker, WorkerExit};
use crate::error::BridgeError;
use crate::ports::PortOpener;

/// Why a run is being ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Requested,
    Shutdown,
}

/// The active run: its ports, the stop channel and the worker task
struct ActiveRun {
    ports: RunningPorts,
    stop_tx: cb::Sender<()>,
    worker: JoinHandle<WorkerExit>,
}

pub struct BridgeActor {
    opener: Arc<dyn PortOpener>,
    settings: BridgeSettings,
    active: Option<ActiveRun>,
    /// Worker that missed the stop deadline; its ports close when it returns
    draining: Option<JoinHandle<WorkerExit>>,
    /// Error that ended the last run, cleared by the next start
    last_error: Option<BridgeError>,
    command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
    event_tx: mpsc::Sender<BridgeEvent>,
    state_tx: watch::Sender<RunState>,
}

impl BridgeActor {
    /// Spawn the actor on the current runtime
    ///
    /// Returns the control handle and the receiving end of the observability
    /// channel. Dropping the receiver is fine; events are then discarded.
    pub fn spawn(
        opener: Arc<dyn PortOpener>,
        settings: BridgeSettings,
    ) -> (BridgeHandle, mpsc::Receiver<BridgeEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(settings.event_buffer.max(1));
        let (state_tx, state_rx) = watch::channel(RunState::Stopped);

        let actor = BridgeActor {
            opener,
            settings,
            active: None,
            draining: None,
            last_error: None,
            command_rx: cmd_rx,
            event_tx,
            state_tx,
        };

        tokio::spawn(actor.run());

        debug!("BridgeActor spawned");

        (BridgeHandle::new(cmd_tx, state_rx), event_rx)
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(cmd) => {
                        if !self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => {
                        // Every handle is gone: treat as process shutdown
                        self.shut_down().await;
                        break;
                    }
                },
                exit = wait_worker(self.active.as_mut().map(|run| &mut run.worker)) => {
                    self.on_worker_exit(exit);
                }
                exit = wait_worker(self.draining.as_mut()) => {
                    self.draining = None;
                    debug!("Late bridge worker returned");
                    self.finish(exit);
                }
            }
        }

        debug!("BridgeActor run loop ended");
    }

    /// Process one command. Returns false once the actor should end.
    async fn handle_command(&mut self, cmd: BridgeCommand) -> bool {
        match cmd {
            BridgeCommand::Start {
                serial,
                midi,
                response,
            } => {
                let result = self.start(&serial, &midi);
                let _ = response.send(result);
            }
            BridgeCommand::Stop { response } => {
                self.stop(StopReason::Requested).await;
                let _ = response.send(Ok(self.status()));
            }
            BridgeCommand::Toggle {
                serial,
                midi,
                response,
            } => {
                let result = if self.active.is_some() {
                    self.stop(StopReason::Requested).await;
                    Ok(self.status())
                } else {
                    self.start(&serial, &midi)
                };
                let _ = response.send(result);
            }
            BridgeCommand::Status { response } => {
                let _ = response.send(Ok(self.status()));
            }
            BridgeCommand::UpdateSettings(settings) => {
                if self.active.is_some() {
                    info!("Bridge settings updated; they apply at the next start");
                }
                self.settings = settings;
            }
            BridgeCommand::Shutdown { response } => {
                self.shut_down().await;
                let _ = response.send(());
                return false;
            }
        }
        true
    }

    fn status(&self) -> BridgeStatus {
        BridgeStatus {
            state: self.state(),
            ports: self.active.as_ref().map(|run| run.ports.clone()),
            last_error: self.last_error.clone(),
        }
    }

    fn state(&self) -> RunState {
        if self.active.is_some() {
            RunState::Running
        } else {
            RunState::Stopped
        }
    }

    /// Open both ports and spawn the worker
    fn start(&mut self, serial: &str, midi: &str) -> Result<BridgeStatus, BridgeError> {
        if self.active.is_some() {
            return Err(BridgeError::AlreadyRunning);
        }
        if self.draining.is_some() {
            return Err(BridgeError::StillStopping);
        }

        let result = self.open_and_spawn(serial, midi);
        if let Err(e) = &result {
            warn!("Failed to start bridge: {}", e);
            self.emit(BridgeEvent::Error(e.clone()));
        }
        result
    }

    fn open_and_spawn(&mut self, serial: &str, midi: &str) -> Result<BridgeStatus, BridgeError> {
        if serial.trim().is_empty() {
            return Err(BridgeError::NoTransportSelected);
        }
        if midi.trim().is_empty() {
            return Err(BridgeError::NoSinkSelected);
        }

        let baud_rate = self.settings.baud_rate;
        let mut transport = self.opener.open_transport(serial, baud_rate)?;
        let transport_name = transport.name().to_string();
        info!("Opened serial port: {} at {} baud", transport_name, baud_rate);
        self.emit(BridgeEvent::PortOpened {
            role: PortRole::Serial,
            name: transport_name.clone(),
        });

        let sink = match self.opener.open_sink(midi) {
            Ok(sink) => sink,
            Err(e) => {
                transport.close();
                self.emit(BridgeEvent::PortClosed {
                    role: PortRole::Serial,
                    name: transport_name,
                });
                return Err(e);
            }
        };
        let sink_name = sink.name().to_string();
        info!("Opened MIDI port: {}", sink_name);
        self.emit(BridgeEvent::PortOpened {
            role: PortRole::Midi,
            name: sink_name.clone(),
        });

        self.last_error = None;
        let (stop_tx, stop_rx) = cb::bounded(1);
        let worker = Worker::new(
            transport,
            sink,
            self.event_tx.clone(),
            stop_rx,
            self.settings.poll_interval,
        );
        let handle = tokio::task::spawn_blocking(move || worker.run());

        self.active = Some(ActiveRun {
            ports: RunningPorts {
                serial: transport_name,
                midi: sink_name,
                baud_rate,
            },
            stop_tx,
            worker: handle,
        });
        self.set_state(RunState::Running);
        info!("Bridge is running");

        Ok(self.status())
    }

    /// Signal the worker, join it with a bounded wait, then close the ports
    async fn stop(&mut self, reason: StopReason) {
        let Some(run) = self.active.take() else {
            return;
        };

        debug!("Stopping bridge ({:?})", reason);
        let _ = run.stop_tx.try_send(());

        let mut worker = run.worker;
        match tokio::time::timeout(self.settings.stop_timeout, &mut worker).await {
            Ok(joined) => self.finish(joined),
            Err(_) => {
                warn!(
                    "Bridge worker did not stop within {:?}; ports will close when it returns",
                    self.settings.stop_timeout
                );
                self.draining = Some(worker);
            }
        }

        self.set_state(RunState::Stopped);
        info!("Bridge stopped");
    }

    /// Stop, then give a late worker one more bounded wait to close its ports
    async fn shut_down(&mut self) {
        self.stop(StopReason::Shutdown).await;

        if let Some(mut worker) = self.draining.take() {
            match tokio::time::timeout(self.settings.stop_timeout, &mut worker).await {
                Ok(joined) => self.finish(joined),
                Err(_) => warn!("Bridge worker still busy at shutdown; abandoning its ports"),
            }
        }
    }

    /// The worker returned without being asked to
    fn on_worker_exit(&mut self, joined: Result<WorkerExit, JoinError>) {
        self.active = None;
        self.finish(joined);
        self.set_state(RunState::Stopped);
        info!("Bridge stopped");
    }

    fn finish(&mut self, joined: Result<WorkerExit, JoinError>) {
        match joined {
            Ok(exit) => {
                if let Some(e) = &exit.error {
                    error!("Bridge error: {}", e);
                    self.emit(BridgeEvent::Error(e.clone()));
                    self.last_error = Some(e.clone());
                }
                close_ports(exit, &mut EventEmitter::new(self.event_tx.clone()));
            }
            Err(e) => {
                // Handles were dropped (and so closed) while unwinding
                error!("Bridge worker panicked: {}", e);
                let e = BridgeError::Read(format!("worker terminated unexpectedly: {}", e));
                self.emit(BridgeEvent::Error(e.clone()));
                self.last_error = Some(e);
            }
        }
    }

    fn set_state(&self, state: RunState) {
        self.state_tx.send_replace(state);
        self.emit(BridgeEvent::StateChanged(state));
    }

    fn emit(&self, event: BridgeEvent) {
        if self.event_tx.try_send(event).is_err() {
            debug!("Bridge event dropped (channel full or closed)");
        }
    }
}

/// Resolves with the worker's result, or never when there is no worker
async fn wait_worker(
    worker: Option<&mut JoinHandle<WorkerExit>>,
) -> Result<WorkerExit, JoinError> {
    match worker {
        Some(worker) => worker.await,
        None => std::future::pending().await,
    }
}

/// Close sink then transport and report both, followed by the run summary
fn close_ports(mut exit: WorkerExit, events: &mut EventEmitter) {
    let midi = exit.sink.name().to_string();
    exit.sink.close();
    info!("Closed MIDI port: {}", midi);
    events.emit(BridgeEvent::PortClosed {
        role: PortRole::Midi,
        name: midi,
    });

    let serial = exit.transport.name().to_string();
    exit.transport.close();
    info!("Closed serial port: {}", serial);
    events.emit(BridgeEvent::PortClosed {
        role: PortRole::Serial,
        name: serial,
    });

    debug!("Run summary: {:?}", exit.stats);
    events.emit(BridgeEvent::Summary(exit.stats));
}
