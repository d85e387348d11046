//! Activity log for bridge events
//!
//! Runs off the data path: it only consumes the bridge's event channel.
//! Frames are sampled (every N-th one is printed) so a busy pedalboard cannot
//! flood the terminal; everything else is always printed.

use chrono::Local;
use colored::*;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::bridge::{BridgeEvent, RunState};

/// Turns bridge events into activity log lines
pub struct ActivityLog {
    frame_log_every: u64,
    frames_seen: u64,
}

impl ActivityLog {
    pub fn new(frame_log_every: u64) -> Self {
        Self {
            frame_log_every: frame_log_every.max(1),
            frames_seen: 0,
        }
    }

    /// Change the sampling rate (e.g. after a config reload)
    pub fn set_frame_log_every(&mut self, every: u64) {
        self.frame_log_every = every.max(1);
    }

    /// Line to print for `event`, or None when the event is sampled out
    pub fn describe(&mut self, event: &BridgeEvent) -> Option<String> {
        let line = match event {
            BridgeEvent::Frame { kind, data1, data2 } => {
                self.frames_seen += 1;
                if self.frames_seen % self.frame_log_every != 0 {
                    return None;
                }
                format!("♪ {}: Note={} Vel={}", kind, data1, data2)
            }
            BridgeEvent::StateChanged(RunState::Running) => {
                self.frames_seen = 0;
                "Bridge is running! Press pedals to send MIDI...".to_string()
            }
            BridgeEvent::StateChanged(RunState::Stopped) => "Bridge stopped".to_string(),
            BridgeEvent::PortOpened { role, name } => format!("Opened {}: {}", role, name),
            BridgeEvent::PortClosed { role, name } => format!("Closed {}: {}", role, name),
            BridgeEvent::Error(e) => format!("ERROR: {}", e),
            BridgeEvent::Summary(stats) => {
                let mut line = format!(
                    "Run summary: {} frame(s) forwarded, {} byte(s) read",
                    stats.frames_forwarded, stats.bytes_read
                );
                if stats.bytes_discarded > 0 {
                    line.push_str(&format!(", {} byte(s) skipped", stats.bytes_discarded));
                }
                if stats.pending_dropped > 0 {
                    line.push_str(&format!(
                        ", {} byte(s) of an incomplete message dropped",
                        stats.pending_dropped
                    ));
                }
                line
            }
        };
        Some(line)
    }
}

/// Print bridge events until the channel closes
///
/// `frame_log_every` carries the sampling rate so config reloads apply live.
pub async fn run_activity_log(
    mut events: mpsc::Receiver<BridgeEvent>,
    mut frame_log_every: watch::Receiver<u64>,
) {
    let mut log = ActivityLog::new(*frame_log_every.borrow_and_update());
    let mut rate_updates = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if let Some(line) = log.describe(&event) {
                    print_line(&event, &line);
                }
            }
            changed = frame_log_every.changed(), if rate_updates => {
                if changed.is_err() {
                    rate_updates = false;
                    continue;
                }
                let every = *frame_log_every.borrow_and_update();
                debug!("Activity log now prints every {} frame(s)", every);
                log.set_frame_log_every(every);
            }
        }
    }

    debug!("Activity log ended");
}

fn print_line(event: &BridgeEvent, line: &str) {
    let stamp = Local::now().format("%H:%M:%S%.3f").to_string();
    match event {
        BridgeEvent::Error(_) => {
            warn!("{}", line);
            println!("{} {}", stamp.dimmed(), line.red());
        }
        BridgeEvent::Frame { .. } => {
            println!("{} {}", stamp.dimmed(), line);
        }
        BridgeEvent::StateChanged(RunState::Running) => {
            info!("{}", line);
            println!("{} {}", stamp.dimmed(), line.green().bold());
        }
        _ => {
            info!("{}", line);
            println!("{} {}", stamp.dimmed(), line.cyan());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{BridgeStats, PortRole};
    use crate::error::BridgeError;
    use crate::midi::FrameKind;

    fn note_on(note: u8) -> BridgeEvent {
        BridgeEvent::Frame {
            kind: FrameKind::NoteOn,
            data1: note,
            data2: 100,
        }
    }

    #[test]
    fn test_frames_are_sampled() {
        let mut log = ActivityLog::new(5);
        let printed: Vec<String> = (0..10).filter_map(|n| log.describe(&note_on(n))).collect();

        assert_eq!(
            printed,
            vec![
                "♪ Note On : Note=4 Vel=100".to_string(),
                "♪ Note On : Note=9 Vel=100".to_string(),
            ]
        );
    }

    #[test]
    fn test_every_frame_when_rate_is_one() {
        let mut log = ActivityLog::new(1);
        assert!(log.describe(&note_on(60)).is_some());
        assert!(log.describe(&note_on(61)).is_some());

        // Zero is clamped to one
        let mut log = ActivityLog::new(0);
        assert!(log.describe(&note_on(60)).is_some());
    }

    #[test]
    fn test_non_frame_events_always_print() {
        let mut log = ActivityLog::new(1000);
        let opened = BridgeEvent::PortOpened {
            role: PortRole::Midi,
            name: "IAC Driver Pedals".to_string(),
        };
        assert_eq!(
            log.describe(&opened).as_deref(),
            Some("Opened MIDI port: IAC Driver Pedals")
        );

        let error = BridgeEvent::Error(BridgeError::Read("device unplugged".to_string()));
        assert_eq!(
            log.describe(&error).as_deref(),
            Some("ERROR: serial read failed: device unplugged")
        );
    }

    #[test]
    fn test_sampling_restarts_with_each_run() {
        let mut log = ActivityLog::new(2);
        assert!(log.describe(&note_on(1)).is_none());
        log.describe(&BridgeEvent::StateChanged(RunState::Running));
        assert!(log.describe(&note_on(2)).is_none());
        assert!(log.describe(&note_on(3)).is_some());
    }

    #[test]
    fn test_summary_mentions_dropped_tail() {
        let mut log = ActivityLog::new(1);
        let stats = BridgeStats {
            bytes_read: 7,
            frames_forwarded: 2,
            bytes_discarded: 0,
            events_dropped: 0,
            pending_dropped: 1,
        };
        let line = log.describe(&BridgeEvent::Summary(stats)).unwrap();
        assert!(line.contains("2 frame(s) forwarded"));
        assert!(line.contains("1 byte(s) of an incomplete message dropped"));
        assert!(!line.contains("skipped"));
    }
}
