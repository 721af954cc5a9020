//! Error types for the BLE link collaborator

use midilink_core::MidiLinkError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors raised by the btleplug-backed link implementation.
#[derive(Debug, Error)]
pub enum BleLinkError {
    #[error("BLE adapter not available")]
    AdapterNotAvailable,

    #[error("failed to connect: {0}")]
    ConnectionFailed(String),

    #[error("connection timeout")]
    ConnectionTimeout,

    #[error("failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("characteristic not found: {0}")]
    CharacteristicNotFound(String),

    #[error("failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("failed to start scan: {0}")]
    ScanFailed(String),
}

impl From<BleLinkError> for MidiLinkError {
    fn from(err: BleLinkError) -> Self {
        MidiLinkError::Transport(err.to_string())
    }
}
