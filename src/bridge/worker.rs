//! Blocking read loop: transport -> reassembler -> sink
//!
//! The worker owns the accumulator and both port handles for the duration of
//! a run and hands the handles back when it returns, so they are only closed
//! once the loop is guaranteed to be out of any read or send.

use std::io;
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, TryRecvError};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::types::{BridgeEvent, BridgeStats};
use crate::error::BridgeError;
use crate::midi::format_hex;
use crate::reassembler::FrameReassembler;
use crate::sink::MidiSink;
use crate::transport::Transport;

/// Read failures worth another try on the next loop iteration
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Everything the worker gives back when its loop ends
pub(crate) struct WorkerExit {
    pub transport: Box<dyn Transport>,
    pub sink: Box<dyn MidiSink>,
    pub stats: BridgeStats,
    /// Set when the loop ended on a read or send failure
    pub error: Option<BridgeError>,
}

/// Fire-and-forget event emission that counts drops
pub(crate) struct EventEmitter {
    tx: mpsc::Sender<BridgeEvent>,
    dropped: u64,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<BridgeEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    pub fn emit(&mut self, event: BridgeEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped += 1;
        }
    }
}

pub(crate) struct Worker {
    transport: Box<dyn Transport>,
    sink: Box<dyn MidiSink>,
    reassembler: FrameReassembler,
    events: EventEmitter,
    stop_rx: Receiver<()>,
    poll_interval: Duration,
    bytes_read: u64,
    frames_forwarded: u64,
}

impl Worker {
    pub fn new(
        transport: Box<dyn Transport>,
        sink: Box<dyn MidiSink>,
        events: mpsc::Sender<BridgeEvent>,
        stop_rx: Receiver<()>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            sink,
            reassembler: FrameReassembler::new(),
            events: EventEmitter::new(events),
            stop_rx,
            poll_interval,
            bytes_read: 0,
            frames_forwarded: 0,
        }
    }

    /// Run until a stop message arrives, the stop channel closes, or I/O fails
    pub fn run(mut self) -> WorkerExit {
        debug!(
            "Bridge worker started: {} -> {}",
            self.transport.name(),
            self.sink.name()
        );

        let mut buf = Vec::with_capacity(256);
        let outcome = loop {
            match self.stop_rx.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break Ok(()),
            }

            let available = match self.transport.bytes_available() {
                Ok(n) => n,
                Err(e) => break Err(BridgeError::Read(e.to_string())),
            };

            if available == 0 {
                // Idle wait doubles as the stop check
                match self.stop_rx.recv_timeout(self.poll_interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break Ok(()),
                }
            }

            buf.clear();
            match self.transport.read_available(&mut buf) {
                Ok(0) => {
                    // Bytes were reported but none arrived: the device went away
                    break Err(BridgeError::Disconnected(self.transport.name().to_string()));
                }
                Ok(n) => {
                    self.bytes_read += n as u64;
                    trace!("Serial RX {} bytes: {}", n, format_hex(&buf));
                }
                Err(e) if is_transient(&e) => {
                    trace!("Serial read retried: {}", e);
                    continue;
                }
                Err(e) => break Err(BridgeError::Read(e.to_string())),
            }

            if let Err(e) = self.forward(&buf) {
                break Err(e);
            }
        };

        let pending_dropped = self.reassembler.clear();
        if pending_dropped > 0 {
            debug!("Dropping {} buffered byte(s) of an incomplete frame", pending_dropped);
        }

        let stats = BridgeStats {
            bytes_read: self.bytes_read,
            frames_forwarded: self.frames_forwarded,
            bytes_discarded: self.reassembler.discarded_bytes(),
            events_dropped: self.events.dropped,
            pending_dropped,
        };

        let error = outcome.err();
        match &error {
            Some(e) => warn!("Bridge worker stopped on error: {}", e),
            None => debug!("Bridge worker stopped"),
        }

        WorkerExit {
            transport: self.transport,
            sink: self.sink,
            stats,
            error,
        }
    }

    /// Reassemble `bytes` and forward every complete frame, in order
    fn forward(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        self.reassembler.ingest(bytes);
        for frame in self.reassembler.drain() {
            self.sink.send(&frame.to_bytes())?;
            self.frames_forwarded += 1;
            self.events.emit(BridgeEvent::Frame {
                kind: frame.kind(),
                data1: frame.data1,
                data2: frame.data2,
            });
        }
        Ok(())
    }
}
