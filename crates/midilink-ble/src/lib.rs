//! Bluetooth Low Energy link collaborator for midilink
//!
//! Implements the `MidiLink` contract from `midilink-core` on top of
//! `btleplug`, covering the central role: scanning for peripherals that
//! advertise the BLE-MIDI service, connecting, and feeding the resulting
//! links into a `MidiLinkProvider`.
//!
//! ## Architecture
//!
//! - [`config`] - central scanner and link settings
//! - [`error`] - BLE-level error types
//! - [`protocol`] - BLE-MIDI UUIDs and scan helpers
//! - [`link`] - btleplug-backed `MidiLink` implementation
//! - [`central`] - adapter setup, scanning, link hand-off
//! - [`advertising`] - pluggable peripheral-mode advertising backends
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use midilink_ble::{BleCentral, BleCentralConfig};
//! use midilink_core::{MidiLinkProvider, ProviderConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let provider = Arc::new(MidiLinkProvider::new(ProviderConfig::new()));
//! let mut central = BleCentral::new(BleCentralConfig::new());
//!
//! // every discovered MIDI peripheral becomes a session on the provider
//! central.start(provider.clone()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Platform Support
//!
//! Scanning and connecting work wherever btleplug does (Linux/BlueZ,
//! macOS/CoreBluetooth, Windows/WinRT). Peripheral-mode advertising needs a
//! platform backend plugged into [`AdvertisingManager`]; without one the
//! crate stays central-only and logs a warning.

mod advertising;
mod central;
mod config;
mod error;
mod link;
mod protocol;

// Public API exports
pub use advertising::{AdvertisingManager, BleAdvertiser};
pub use central::BleCentral;
pub use config::BleCentralConfig;
pub use error::BleLinkError;
pub use link::BtleMidiLink;
pub use protocol::{
    advertises_midi_service, midi_scan_filter, MIDI_IO_CHARACTERISTIC_UUID, MIDI_SERVICE_UUID,
};

// Re-export the core entry points for convenience
pub use midilink_core::{MidiLink, MidiLinkProvider};
