//! MIDI frame types
//!
//! The bridge only deals with fixed 3-byte channel messages (status, data1, data2).
//! Classification is coarse: Note On, or everything else.

use std::fmt;

/// Number of bytes in a frame
pub const FRAME_LEN: usize = 3;

/// Returns true if `byte` can start a frame (high bit set)
#[inline]
pub fn is_status_byte(byte: u8) -> bool {
    byte & 0x80 != 0
}

/// Coarse message classification used for the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Status high nibble is 0x9
    NoteOn,
    /// Any other status byte (Note Off, CC, pitch bend, ...)
    NoteOff,
}

impl FrameKind {
    /// Classify a status byte
    pub fn classify(status: u8) -> Self {
        if status & 0xF0 == 0x90 {
            FrameKind::NoteOn
        } else {
            FrameKind::NoteOff
        }
    }

    /// Fixed-width label, as shown in the activity log
    pub fn label(&self) -> &'static str {
        match self {
            FrameKind::NoteOn => "Note On ",
            FrameKind::NoteOff => "Note Off",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A complete 3-byte message extracted from the serial stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frame {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl Frame {
    pub fn new(status: u8, data1: u8, data2: u8) -> Self {
        Self {
            status,
            data1,
            data2,
        }
    }

    /// Derived message kind
    pub fn kind(&self) -> FrameKind {
        FrameKind::classify(self.status)
    }

    /// Channel (0-15) encoded in the low nibble of the status byte
    pub fn channel(&self) -> u8 {
        self.status & 0x0F
    }

    /// Whether the status byte marks a valid frame start
    pub fn is_valid(&self) -> bool {
        is_status_byte(self.status)
    }

    /// Wire representation, as sent to the MIDI output
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        [self.status, self.data1, self.data2]
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Note={} Vel={}",
            self.kind(),
            self.data1,
            self.data2
        )
    }
}

/// Format raw bytes as a hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
