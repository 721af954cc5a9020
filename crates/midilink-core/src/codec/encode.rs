//! Packet encoding: framing, running status, fragmentation

use crate::message::{MidiMessage, TimedMessage, SYSEX_END, SYSEX_START};

use super::{header_byte, timestamp_byte, MIN_PAYLOAD};

// ----------------------------------------------------------------------------
// Encoder
// ----------------------------------------------------------------------------

/// Encodes ordered message sequences into BLE-MIDI packets no larger than
/// the negotiated maximum payload.
#[derive(Debug, Clone)]
pub struct PacketEncoder {
    max_payload: usize,
}

impl PacketEncoder {
    /// Create an encoder for the given negotiated payload size, clamped to
    /// the conservative minimum of 20 bytes.
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.max(MIN_PAYLOAD),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Encode `messages` into one or more packets, in order.
    pub fn encode(&self, messages: &[TimedMessage]) -> Vec<Vec<u8>> {
        let mut writer = PacketWriter::new(self.max_payload);
        for message in messages {
            writer.push_message(message);
        }
        writer.finish()
    }
}

// ----------------------------------------------------------------------------
// Packet Writer
// ----------------------------------------------------------------------------

/// Accumulates events into packets, tracking running status and the
/// timestamp context within the open packet.
struct PacketWriter {
    max_payload: usize,
    packets: Vec<Vec<u8>>,
    current: Vec<u8>,
    ts_high: u8,
    running_status: Option<u8>,
    last_timestamp: Option<u16>,
}

impl PacketWriter {
    fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            packets: Vec::new(),
            current: Vec::new(),
            ts_high: 0,
            running_status: None,
            last_timestamp: None,
        }
    }

    fn space(&self) -> usize {
        self.max_payload - self.current.len()
    }

    /// Ensure a packet is open whose header matches the high timestamp bits
    /// of `timestamp`. The header encodes only the high 6 bits, so an event
    /// in a different 128 ms window needs a new packet.
    fn open(&mut self, timestamp: u16) {
        let high = (timestamp >> 7) as u8 & 0x3F;
        if !self.current.is_empty() && high != self.ts_high {
            self.flush();
        }
        if self.current.is_empty() {
            self.current.push(header_byte(timestamp));
            self.ts_high = high;
        }
    }

    /// Close the open packet. Running status never spans packets.
    fn flush(&mut self) {
        if self.current.len() > 1 {
            self.packets.push(std::mem::take(&mut self.current));
        } else {
            self.current.clear();
        }
        self.running_status = None;
        self.last_timestamp = None;
    }

    fn push_message(&mut self, message: &TimedMessage) {
        if let MidiMessage::SysEx { payload } = &message.message {
            self.push_sysex(message.timestamp, payload);
            return;
        }

        let ts = message.timestamp;
        self.open(ts);

        let status = message.message.status_byte();
        let data = message.message.data_bytes();

        let mut need_status =
            !message.message.is_channel_voice() || self.running_status != Some(status);
        // A timestamp byte precedes every status byte, and data continuation
        // under running status only when the timestamp changed.
        let mut need_ts = need_status || self.last_timestamp != Some(ts);

        let needed = data.len() + usize::from(need_ts) + usize::from(need_status);
        if needed > self.space() {
            self.flush();
            self.open(ts);
            need_status = true;
            need_ts = true;
        }

        if need_ts {
            self.current.push(timestamp_byte(ts));
        }
        if need_status {
            self.current.push(status);
        }
        self.current.extend_from_slice(&data);

        // Interleaved system messages cancel running status, so the next
        // channel voice message re-emits its status byte.
        self.running_status = if message.message.is_channel_voice() {
            Some(status)
        } else {
            None
        };
        self.last_timestamp = Some(ts);
    }

    /// SysEx splits across packets; every continuation packet repeats the
    /// header and a fresh timestamp byte, and the end marker travels in the
    /// packet holding the final payload byte.
    fn push_sysex(&mut self, ts: u16, payload: &[u8]) {
        self.open(ts);
        if self.space() < 2 {
            self.flush();
            self.open(ts);
        }
        self.current.push(timestamp_byte(ts));
        self.current.push(SYSEX_START);
        self.running_status = None;

        // A timestamp byte at or above 0xF7 is indistinguishable from the
        // end marker or a realtime byte in that position, so the trailer
        // timestamp is dropped when it would collide; the continuation
        // timestamp already carries the same value.
        let trailer_ts = timestamp_byte(ts) < SYSEX_END;

        let mut idx = 0;
        // whether the last byte written is a continuation timestamp with no
        // payload after it; a trailer timestamp directly behind it would
        // read as two stacked timestamp bytes
        let mut at_fresh_continuation = false;
        loop {
            let space = self.space();
            let remaining = payload.len() - idx;
            if remaining + 2 <= space {
                self.current.extend_from_slice(&payload[idx..]);
                if trailer_ts && !(at_fresh_continuation && remaining == 0) {
                    self.current.push(timestamp_byte(ts));
                }
                self.current.push(SYSEX_END);
                break;
            }
            // Fill this packet, keeping at least one payload byte for the
            // packet that carries the end marker.
            let take = space.min(remaining.saturating_sub(1));
            self.current.extend_from_slice(&payload[idx..idx + take]);
            idx += take;
            self.flush();
            self.open(ts);
            self.current.push(timestamp_byte(ts));
            at_fresh_continuation = true;
        }
        self.last_timestamp = Some(ts);
    }

    fn finish(mut self) -> Vec<Vec<u8>> {
        self.flush();
        self.packets
    }
}
