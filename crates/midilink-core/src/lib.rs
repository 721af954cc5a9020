//! Core BLE-MIDI transport
//!
//! This crate carries MIDI event streams over Bluetooth Low Energy links.
//! It is transport-library agnostic: physical connections enter as
//! [`MidiLink`] trait objects (see `midilink-ble` for the btleplug-backed
//! implementation), and the core drives each through discovery,
//! negotiation, optional pairing, and into steady-state message exchange.
//!
//! ## Architecture
//!
//! - [`codec`] - BLE-MIDI packet encoding and decoding
//! - [`message`] - MIDI message and timestamp types
//! - [`link`] - the link collaborator contract
//! - [`discovery`] - process-wide discovery serialization
//! - [`session`] - per-peer connection state machine
//! - [`endpoint`] - logical MIDI input/output endpoints
//! - [`registry`] - concurrent device registry with attach/detach listeners
//! - [`provider`] - host-facing facade
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use midilink_core::{MidiLinkProvider, MidiMessage, ProviderConfig};
//!
//! # async fn example(link: Arc<dyn midilink_core::MidiLink>) {
//! let provider = MidiLinkProvider::new(ProviderConfig::new());
//!
//! // links arrive from a scanner or acceptor
//! provider.attach_link(link).await;
//!
//! // once a session is active its endpoints appear in the snapshots
//! for output in provider.outputs().await {
//!     let _ = output
//!         .send(MidiMessage::NoteOn { channel: 0, note: 60, velocity: 100 })
//!         .await;
//! }
//! # }
//! ```

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod codec;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod link;
pub mod message;
pub mod provider;
pub mod registry;
pub mod session;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use codec::{PacketDecoder, PacketEncoder, MIN_PAYLOAD};
pub use config::ProviderConfig;
pub use discovery::{DiscoveryController, DiscoveryPermit};
pub use endpoint::{MessageCallback, MidiInput, MidiOutput};
pub use error::{MidiLinkError, Result};
pub use link::{
    BondState, BondStream, ByteStream, LinkCapabilities, MidiLink, MIDI_IO_CHARACTERISTIC_UUID,
    MIDI_SERVICE_UUID,
};
pub use message::{MidiMessage, TimedMessage, TIMESTAMP_MODULUS};
pub use provider::MidiLinkProvider;
pub use registry::{DeviceListener, DeviceRegistry};
pub use session::SessionPhase;
pub use types::DeviceAddress;
