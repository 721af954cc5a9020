//! Packet decoding: stateful, resynchronizing parser
//!
//! Decoder state persists across packets within one session: running status,
//! an open SysEx buffer, and the last timestamp seen. Malformed input never
//! raises an error; unrecognizable bytes are dropped up to the next valid
//! status byte.
//!
//! Byte values above 0x7F are ambiguous in isolation (a timestamp byte can
//! collide with a status byte, including the realtime range and the SysEx
//! end marker), so they are classified by position: a high byte in timestamp
//! position (packet start, or the start of an event) is always a timestamp;
//! one in status position is a status or realtime byte.

use smallvec::SmallVec;

use crate::message::{MidiMessage, TimedMessage, SYSEX_END, SYSEX_START};

/// Default cap on SysEx reassembly, 64 KiB.
pub(crate) const DEFAULT_SYSEX_LIMIT: usize = 64 * 1024;

// ----------------------------------------------------------------------------
// Decoder
// ----------------------------------------------------------------------------

/// Decodes BLE-MIDI packets into [`TimedMessage`]s.
///
/// One decoder instance belongs to one input endpoint; feeding it packets
/// from more than one link corrupts running-status and SysEx context.
#[derive(Debug)]
pub struct PacketDecoder {
    running_status: Option<u8>,
    sysex: Option<Vec<u8>>,
    last_timestamp: u16,
    sysex_limit: usize,
}

/// A status byte whose data bytes are still arriving. Discarded if the
/// packet ends before the message completes.
struct Partial {
    status: u8,
    data: SmallVec<[u8; 2]>,
    needed: usize,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self::with_sysex_limit(DEFAULT_SYSEX_LIMIT)
    }

    /// Create a decoder with a custom SysEx reassembly bound. A transfer
    /// exceeding the bound is dropped as malformed.
    pub fn with_sysex_limit(sysex_limit: usize) -> Self {
        Self {
            running_status: None,
            sysex: None,
            last_timestamp: 0,
            sysex_limit,
        }
    }

    /// Discard all decode state (session teardown).
    pub fn reset(&mut self) {
        self.running_status = None;
        self.sysex = None;
        self.last_timestamp = 0;
    }

    /// Decode one notification payload. Never fails; garbage input yields
    /// fewer messages, not errors.
    pub fn decode(&mut self, packet: &[u8]) -> Vec<TimedMessage> {
        let mut out = Vec::new();

        // The header byte has its top bit set; skip leading garbage.
        let mut i = 0;
        while i < packet.len() && packet[i] & 0x80 == 0 {
            i += 1;
        }
        if i >= packet.len() {
            return out;
        }
        let ts_high = (packet[i] & 0x3F) as u16;
        i += 1;

        // `pending_ts`: the previous byte was consumed as a timestamp byte,
        // so the next high byte is in status position. `first_content`
        // marks the byte right after the header, where a SysEx continuation
        // timestamp lives.
        let mut pending_ts = false;
        let mut first_content = true;
        let mut partial: Option<Partial> = None;

        while i < packet.len() {
            let b = packet[i];
            i += 1;
            let at_packet_start = first_content;
            first_content = false;

            if b & 0x80 == 0 {
                pending_ts = false;
                if self.sysex.is_some() {
                    self.push_sysex_byte(b);
                } else {
                    self.push_data_byte(b, &mut partial, &mut out);
                }
                continue;
            }

            if self.sysex.is_some() {
                if at_packet_start {
                    // Continuation packets repeat a fresh timestamp byte
                    // right after the header.
                    self.last_timestamp = (ts_high << 7) | (b & 0x7F) as u16;
                    pending_ts = true;
                } else if b == SYSEX_END {
                    self.end_sysex(&mut out);
                    pending_ts = false;
                } else if b >= 0xF8 {
                    // Realtime interleave, does not disturb the transfer.
                    self.emit_realtime(b, &mut out);
                } else if !pending_ts {
                    self.last_timestamp = (ts_high << 7) | (b & 0x7F) as u16;
                    pending_ts = true;
                } else {
                    // A status byte while a SysEx is open: implicit abort,
                    // the partial buffer is discarded.
                    self.sysex = None;
                    self.process_status(b, &mut partial, &mut out);
                    pending_ts = false;
                }
                continue;
            }

            if partial.is_some() {
                if b >= 0xF8 {
                    // Realtime interleave mid-message; collection continues.
                    self.emit_realtime(b, &mut out);
                    continue;
                }
                // Truncated message, dropped; resync on this byte.
                partial = None;
            }

            if !pending_ts {
                self.last_timestamp = (ts_high << 7) | (b & 0x7F) as u16;
                pending_ts = true;
            } else if b >= 0xF8 {
                // Realtime in status position consumes the pending timestamp.
                self.emit_realtime(b, &mut out);
                pending_ts = false;
            } else {
                self.process_status(b, &mut partial, &mut out);
                pending_ts = false;
            }
        }

        // A multi-byte message truncated at end of packet is discarded.
        out
    }

    fn push_data_byte(&mut self, b: u8, partial: &mut Option<Partial>, out: &mut Vec<TimedMessage>) {
        match partial {
            Some(p) => {
                p.data.push(b);
                if p.data.len() == p.needed {
                    if let Some(p) = partial.take() {
                        self.emit(&p, out);
                    }
                }
            }
            None => match self.running_status {
                Some(status) => {
                    let needed = MidiMessage::expected_data_len(status);
                    let mut p = Partial { status, data: SmallVec::new(), needed };
                    p.data.push(b);
                    if p.data.len() == needed {
                        self.emit(&p, out);
                    } else {
                        *partial = Some(p);
                    }
                }
                // Data byte with no active status: skipped, resync at the
                // next status byte.
                None => {}
            },
        }
    }

    fn process_status(&mut self, status: u8, partial: &mut Option<Partial>, out: &mut Vec<TimedMessage>) {
        match status {
            0x80..=0xEF => {
                self.running_status = Some(status);
                *partial = Some(Partial {
                    status,
                    data: SmallVec::new(),
                    needed: MidiMessage::expected_data_len(status),
                });
            }
            SYSEX_START => {
                self.running_status = None;
                self.sysex = Some(Vec::new());
            }
            0xF1 | 0xF2 | 0xF3 => {
                self.running_status = None;
                *partial = Some(Partial {
                    status,
                    data: SmallVec::new(),
                    needed: MidiMessage::expected_data_len(status),
                });
            }
            0xF6 => {
                self.running_status = None;
                out.push(TimedMessage::new(self.last_timestamp, MidiMessage::TuneRequest));
            }
            // 0xF4/0xF5 are undefined and a stray 0xF7 has no open SysEx;
            // both cancel running status and are dropped.
            _ => {
                self.running_status = None;
            }
        }
    }

    fn emit_realtime(&self, b: u8, out: &mut Vec<TimedMessage>) {
        // 0xF9 and 0xFD are undefined and skipped.
        if let Some(message) = MidiMessage::from_realtime(b) {
            out.push(TimedMessage::new(self.last_timestamp, message));
        }
    }

    fn push_sysex_byte(&mut self, b: u8) {
        if let Some(buffer) = &mut self.sysex {
            if buffer.len() >= self.sysex_limit {
                tracing::debug!(
                    limit = self.sysex_limit,
                    "sysex reassembly bound exceeded, dropping transfer"
                );
                self.sysex = None;
            } else {
                buffer.push(b);
            }
        }
    }

    fn end_sysex(&mut self, out: &mut Vec<TimedMessage>) {
        if let Some(payload) = self.sysex.take() {
            out.push(TimedMessage::new(self.last_timestamp, MidiMessage::SysEx { payload }));
        }
    }

    fn emit(&self, partial: &Partial, out: &mut Vec<TimedMessage>) {
        let message = if partial.status < 0xF0 {
            MidiMessage::from_channel_voice(partial.status, &partial.data)
        } else {
            MidiMessage::from_system_common(partial.status, &partial.data)
        };
        if let Some(message) = message {
            out.push(TimedMessage::new(self.last_timestamp, message));
        }
    }
}
