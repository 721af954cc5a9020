//! Link collaborator contract
//!
//! A [`MidiLink`] is one physical BLE connection as seen by the core:
//! byte-level send/receive, capability discovery, payload-size negotiation,
//! and bonding, regardless of which side initiated the connection. The
//! central role (`midilink-ble`) and inbound peripheral-side links both
//! enter the core as `Arc<dyn MidiLink>`; role-specific setup lives in each
//! implementation rather than behind downcasts.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::Result;
use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Well-Known Identifiers
// ----------------------------------------------------------------------------

/// BLE-MIDI service UUID fixed by the standard.
pub const MIDI_SERVICE_UUID: Uuid = Uuid::from_u128(0x03B80E5A_EDE8_4B33_A751_6CE34EC4C700);

/// BLE-MIDI I/O characteristic UUID fixed by the standard.
pub const MIDI_IO_CHARACTERISTIC_UUID: Uuid = Uuid::from_u128(0x7772E5DB_3868_4112_A1A9_F2669D106BF3);

// ----------------------------------------------------------------------------
// Link Types
// ----------------------------------------------------------------------------

/// Stream of notification payloads from the remote peer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Stream of bond-state transitions.
pub type BondStream = Pin<Box<dyn Stream<Item = BondState> + Send>>;

/// Bonding state of a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondState {
    None,
    Pairing,
    Bonded,
}

/// The remote's advertised service/characteristic set, as enumerated during
/// capability discovery.
#[derive(Debug, Clone, Default)]
pub struct LinkCapabilities {
    pub services: Vec<Uuid>,
    /// `(service, characteristic)` pairs.
    pub characteristics: Vec<(Uuid, Uuid)>,
}

impl LinkCapabilities {
    pub fn has_service(&self, service: Uuid) -> bool {
        self.services.contains(&service)
    }

    pub fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool {
        self.characteristics.contains(&(service, characteristic))
    }
}

// ----------------------------------------------------------------------------
// Link Trait
// ----------------------------------------------------------------------------

/// One physical BLE connection.
///
/// Owned exclusively by its peer session while the session is non-terminal.
/// Closing the link unblocks every flow of control waiting on it; the
/// [`closed`](MidiLink::closed) watch channel is the cancellation signal.
#[async_trait]
pub trait MidiLink: Send + Sync {
    /// Stable address of the remote device.
    fn address(&self) -> DeviceAddress;

    /// Advertised device name, if known.
    fn name(&self) -> Option<String>;

    /// Open the physical link. A no-op for links that arrive already open
    /// (inbound connections on the peripheral side).
    async fn open(&self) -> Result<()>;

    /// Enumerate the remote's services and characteristics. Callers must
    /// hold the discovery controller's permit; the platform stack tolerates
    /// only one discovery in flight.
    async fn discover_capabilities(&self) -> Result<LinkCapabilities>;

    /// Request an MTU of `requested` bytes; returns the granted MTU (or the
    /// platform default when negotiation is not surfaced).
    async fn negotiate_payload_size(&self, requested: usize) -> Result<usize>;

    /// Request elevated connection priority for latency. Best-effort.
    async fn request_high_priority(&self) -> Result<()>;

    /// Subscribe to notifications on the MIDI I/O characteristic.
    async fn subscribe(&self) -> Result<()>;

    /// Write one encoded packet to the MIDI I/O characteristic.
    async fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Notification payload stream. Each item is one packet.
    async fn notifications(&self) -> Result<ByteStream>;

    /// Current bond state.
    fn bond_state(&self) -> BondState;

    /// Start the platform bonding flow.
    async fn request_bond(&self) -> Result<()>;

    /// Bond-state transition stream.
    async fn bond_events(&self) -> Result<BondStream>;

    /// Close the link, waking all waiters.
    async fn close(&self);

    /// Watch channel carrying `true` once the link is closed.
    fn closed(&self) -> watch::Receiver<bool>;
}

/// Wait until a link-closed watch channel reports closure (or its sender is
/// dropped, which counts as closed).
pub(crate) async fn closed_signal(mut rx: watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
