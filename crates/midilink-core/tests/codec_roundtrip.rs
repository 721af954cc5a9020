//! Property tests for the wire codec: round-trips over generated message
//! sequences, fragmentation bounds, and decoder resilience to arbitrary
//! byte garbage.

use midilink_core::{MidiMessage, PacketDecoder, PacketEncoder, TimedMessage};
use proptest::prelude::*;

fn arb_message() -> impl Strategy<Value = MidiMessage> {
    prop_oneof![
        (0u8..16, 0u8..128, 0u8..128)
            .prop_map(|(channel, note, velocity)| MidiMessage::NoteOn { channel, note, velocity }),
        (0u8..16, 0u8..128, 0u8..128)
            .prop_map(|(channel, note, velocity)| MidiMessage::NoteOff { channel, note, velocity }),
        (0u8..16, 0u8..128, 0u8..128).prop_map(|(channel, note, pressure)| {
            MidiMessage::PolyAftertouch { channel, note, pressure }
        }),
        (0u8..16, 0u8..128, 0u8..128).prop_map(|(channel, controller, value)| {
            MidiMessage::ControlChange { channel, controller, value }
        }),
        (0u8..16, 0u8..128)
            .prop_map(|(channel, program)| MidiMessage::ProgramChange { channel, program }),
        (0u8..16, 0u8..128)
            .prop_map(|(channel, pressure)| MidiMessage::ChannelAftertouch { channel, pressure }),
        (0u8..16, 0u16..0x4000)
            .prop_map(|(channel, value)| MidiMessage::PitchBend { channel, value }),
        (0u8..128).prop_map(|value| MidiMessage::TimeCodeQuarterFrame { value }),
        (0u16..0x4000).prop_map(|beats| MidiMessage::SongPosition { beats }),
        (0u8..128).prop_map(|song| MidiMessage::SongSelect { song }),
        Just(MidiMessage::TuneRequest),
        Just(MidiMessage::TimingClock),
        Just(MidiMessage::Start),
        Just(MidiMessage::Continue),
        Just(MidiMessage::Stop),
        Just(MidiMessage::ActiveSensing),
        Just(MidiMessage::SystemReset),
        prop::collection::vec(0u8..128, 0..300)
            .prop_map(|payload| MidiMessage::SysEx { payload }),
    ]
}

fn arb_timed() -> impl Strategy<Value = TimedMessage> {
    (0u16..8192, arb_message()).prop_map(|(ts, message)| TimedMessage::new(ts, message))
}

proptest! {
    #[test]
    fn prop_round_trip_preserves_messages(
        messages in prop::collection::vec(arb_timed(), 0..40),
        max_payload in 20usize..=514,
    ) {
        let encoder = PacketEncoder::new(max_payload);
        let packets = encoder.encode(&messages);
        for packet in &packets {
            prop_assert!(packet.len() <= max_payload);
            prop_assert!(packet[0] & 0x80 != 0);
        }

        let mut decoder = PacketDecoder::new();
        let decoded: Vec<_> = packets.iter().flat_map(|p| decoder.decode(p)).collect();
        prop_assert_eq!(decoded, messages);
    }

    #[test]
    fn prop_sysex_fragmentation_bounds(
        payload in prop::collection::vec(0u8..128, 0..2000),
        max_payload in 20usize..=256,
        ts in 0u16..8192,
    ) {
        let message = TimedMessage::new(ts, MidiMessage::SysEx { payload: payload.clone() });
        let encoder = PacketEncoder::new(max_payload);
        let packets = encoder.encode(&[message.clone()]);

        if payload.len() > max_payload - 2 {
            prop_assert!(packets.len() >= payload.len().div_ceil(max_payload - 2));
        }

        let mut decoder = PacketDecoder::new();
        let decoded: Vec<_> = packets.iter().flat_map(|p| decoder.decode(p)).collect();
        prop_assert_eq!(decoded, vec![message]);
    }

    #[test]
    fn prop_decoder_never_panics_on_garbage(
        packets in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..8),
    ) {
        let mut decoder = PacketDecoder::new();
        for packet in &packets {
            // must not panic or error, whatever the input
            let _ = decoder.decode(packet);
        }
    }

    #[test]
    fn prop_decoder_resynchronizes_after_garbage(
        garbage in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut decoder = PacketDecoder::new();
        let _ = decoder.decode(&garbage);
        decoder.reset();

        let clean = decoder.decode(&[0x80, 0x80, 0x90, 0x40, 0x7F]);
        prop_assert_eq!(clean.len(), 1);
        prop_assert_eq!(
            clean[0].message.clone(),
            MidiMessage::NoteOn { channel: 0, note: 0x40, velocity: 0x7F }
        );
    }
}
