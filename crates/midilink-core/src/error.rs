//! Error types for the midilink transport
//!
//! Per-session errors are isolated: they close the affected session and
//! never propagate past its registry entry. Malformed packets are not an
//! error at all; the decoder resynchronizes silently.

use thiserror::Error;

use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the midilink core.
#[derive(Debug, Error)]
pub enum MidiLinkError {
    /// The physical link failed or dropped; the application may reconnect.
    #[error("link failure for {address}: {reason}")]
    LinkFailure { address: DeviceAddress, reason: String },

    /// The link was closed while an operation was waiting on it.
    #[error("link closed")]
    LinkClosed,

    /// The remote device does not expose the MIDI service.
    #[error("MIDI service not found on {address}")]
    ServiceNotFound { address: DeviceAddress },

    /// The MIDI service exists but its I/O characteristic is missing.
    #[error("MIDI characteristic not found on {address}")]
    CharacteristicNotFound { address: DeviceAddress },

    /// Capability discovery did not complete within the configured timeout.
    #[error("capability discovery timed out after {duration_ms}ms")]
    DiscoveryTimeout { duration_ms: u64 },

    /// Bonding was rejected, timed out, or its event stream ended.
    #[error("pairing failed for {address}: {reason}")]
    PairingFailure { address: DeviceAddress, reason: String },

    /// A non-closed session already holds endpoints for this address.
    /// Indicates a programming error; the session re-entrancy rule should
    /// make this unreachable.
    #[error("endpoints already registered for {address}")]
    AlreadyRegistered { address: DeviceAddress },

    /// The provider is shut down and admits no new links.
    #[error("provider is shut down")]
    Shutdown,

    /// Failure reported by the underlying link collaborator.
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = core::result::Result<T, MidiLinkError>;
