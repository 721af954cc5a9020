//! MIDI message types carried over the transport
//!
//! A [`MidiMessage`] is one decoded logical unit: a channel voice message, a
//! single-byte system common/realtime message, or a System Exclusive payload.
//! [`TimedMessage`] pairs a message with the 13-bit millisecond timestamp the
//! wire format carries (milliseconds modulo 8192; wraparound is the
//! consumer's concern).

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Timestamps are 13-bit milliseconds, wrapping at this modulus.
pub const TIMESTAMP_MODULUS: u16 = 8192;

/// System Exclusive start marker.
pub const SYSEX_START: u8 = 0xF0;

/// System Exclusive end marker.
pub const SYSEX_END: u8 = 0xF7;

// ----------------------------------------------------------------------------
// Message Types
// ----------------------------------------------------------------------------

/// A decoded MIDI message.
///
/// Channel numbers are 0-15; data values are 7-bit except the 14-bit
/// [`PitchBend`](MidiMessage::PitchBend) value and
/// [`SongPosition`](MidiMessage::SongPosition) beat count. The SysEx payload
/// excludes the `0xF0`/`0xF7` framing bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMessage {
    // Channel voice
    NoteOff { channel: u8, note: u8, velocity: u8 },
    NoteOn { channel: u8, note: u8, velocity: u8 },
    PolyAftertouch { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelAftertouch { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },

    // System common
    TimeCodeQuarterFrame { value: u8 },
    SongPosition { beats: u16 },
    SongSelect { song: u8 },
    TuneRequest,

    // System realtime
    TimingClock,
    Start,
    Continue,
    Stop,
    ActiveSensing,
    SystemReset,

    // System exclusive
    SysEx { payload: Vec<u8> },
}

impl MidiMessage {
    /// The status byte this message is introduced by on the wire.
    pub fn status_byte(&self) -> u8 {
        match self {
            Self::NoteOff { channel, .. } => 0x80 | (channel & 0x0F),
            Self::NoteOn { channel, .. } => 0x90 | (channel & 0x0F),
            Self::PolyAftertouch { channel, .. } => 0xA0 | (channel & 0x0F),
            Self::ControlChange { channel, .. } => 0xB0 | (channel & 0x0F),
            Self::ProgramChange { channel, .. } => 0xC0 | (channel & 0x0F),
            Self::ChannelAftertouch { channel, .. } => 0xD0 | (channel & 0x0F),
            Self::PitchBend { channel, .. } => 0xE0 | (channel & 0x0F),
            Self::TimeCodeQuarterFrame { .. } => 0xF1,
            Self::SongPosition { .. } => 0xF2,
            Self::SongSelect { .. } => 0xF3,
            Self::TuneRequest => 0xF6,
            Self::TimingClock => 0xF8,
            Self::Start => 0xFA,
            Self::Continue => 0xFB,
            Self::Stop => 0xFC,
            Self::ActiveSensing => 0xFE,
            Self::SystemReset => 0xFF,
            Self::SysEx { .. } => SYSEX_START,
        }
    }

    /// The data bytes following the status byte, masked to 7 bits.
    ///
    /// Empty for single-byte system messages. SysEx payloads are not
    /// returned here; the codec frames them separately.
    pub fn data_bytes(&self) -> SmallVec<[u8; 2]> {
        match self {
            Self::NoteOff { note, velocity, .. } => SmallVec::from_slice(&[note & 0x7F, velocity & 0x7F]),
            Self::NoteOn { note, velocity, .. } => SmallVec::from_slice(&[note & 0x7F, velocity & 0x7F]),
            Self::PolyAftertouch { note, pressure, .. } => {
                SmallVec::from_slice(&[note & 0x7F, pressure & 0x7F])
            }
            Self::ControlChange { controller, value, .. } => {
                SmallVec::from_slice(&[controller & 0x7F, value & 0x7F])
            }
            Self::ProgramChange { program, .. } => SmallVec::from_slice(&[program & 0x7F]),
            Self::ChannelAftertouch { pressure, .. } => SmallVec::from_slice(&[pressure & 0x7F]),
            Self::PitchBend { value, .. } => {
                SmallVec::from_slice(&[(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8])
            }
            Self::TimeCodeQuarterFrame { value } => SmallVec::from_slice(&[value & 0x7F]),
            Self::SongPosition { beats } => {
                SmallVec::from_slice(&[(beats & 0x7F) as u8, ((beats >> 7) & 0x7F) as u8])
            }
            Self::SongSelect { song } => SmallVec::from_slice(&[song & 0x7F]),
            _ => SmallVec::new(),
        }
    }

    /// True for channel voice messages, the only messages eligible for
    /// running status.
    pub fn is_channel_voice(&self) -> bool {
        matches!(
            self,
            Self::NoteOff { .. }
                | Self::NoteOn { .. }
                | Self::PolyAftertouch { .. }
                | Self::ControlChange { .. }
                | Self::ProgramChange { .. }
                | Self::ChannelAftertouch { .. }
                | Self::PitchBend { .. }
        )
    }

    /// True for single-byte system realtime messages.
    pub fn is_realtime(&self) -> bool {
        matches!(
            self,
            Self::TimingClock
                | Self::Start
                | Self::Continue
                | Self::Stop
                | Self::ActiveSensing
                | Self::SystemReset
        )
    }

    /// Number of data bytes that follow `status`, if `status` introduces a
    /// multi-byte message this codec understands.
    pub(crate) fn expected_data_len(status: u8) -> usize {
        match status {
            0xC0..=0xDF => 1,
            0x80..=0xEF => 2,
            0xF1 | 0xF3 => 1,
            0xF2 => 2,
            _ => 0,
        }
    }

    /// Rebuild a channel voice message from its wire form.
    pub(crate) fn from_channel_voice(status: u8, data: &[u8]) -> Option<Self> {
        let channel = status & 0x0F;
        match status & 0xF0 {
            0x80 => Some(Self::NoteOff { channel, note: data[0], velocity: data[1] }),
            0x90 => Some(Self::NoteOn { channel, note: data[0], velocity: data[1] }),
            0xA0 => Some(Self::PolyAftertouch { channel, note: data[0], pressure: data[1] }),
            0xB0 => Some(Self::ControlChange { channel, controller: data[0], value: data[1] }),
            0xC0 => Some(Self::ProgramChange { channel, program: data[0] }),
            0xD0 => Some(Self::ChannelAftertouch { channel, pressure: data[0] }),
            0xE0 => Some(Self::PitchBend {
                channel,
                value: (data[0] as u16) | ((data[1] as u16) << 7),
            }),
            _ => None,
        }
    }

    /// Rebuild a system common message from its wire form.
    pub(crate) fn from_system_common(status: u8, data: &[u8]) -> Option<Self> {
        match status {
            0xF1 => Some(Self::TimeCodeQuarterFrame { value: data[0] }),
            0xF2 => Some(Self::SongPosition {
                beats: (data[0] as u16) | ((data[1] as u16) << 7),
            }),
            0xF3 => Some(Self::SongSelect { song: data[0] }),
            0xF6 => Some(Self::TuneRequest),
            _ => None,
        }
    }

    /// Rebuild a system realtime message. `0xF9` and `0xFD` are undefined
    /// and yield `None`.
    pub(crate) fn from_realtime(status: u8) -> Option<Self> {
        match status {
            0xF8 => Some(Self::TimingClock),
            0xFA => Some(Self::Start),
            0xFB => Some(Self::Continue),
            0xFC => Some(Self::Stop),
            0xFE => Some(Self::ActiveSensing),
            0xFF => Some(Self::SystemReset),
            _ => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Timed Messages
// ----------------------------------------------------------------------------

/// A MIDI message with its 13-bit millisecond timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedMessage {
    /// Milliseconds modulo [`TIMESTAMP_MODULUS`].
    pub timestamp: u16,
    pub message: MidiMessage,
}

impl TimedMessage {
    /// Create a timed message; the timestamp is reduced modulo 8192.
    pub fn new(timestamp: u16, message: MidiMessage) -> Self {
        Self {
            timestamp: timestamp % TIMESTAMP_MODULUS,
            message,
        }
    }
}
