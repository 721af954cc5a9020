//! Peripheral-side advertising
//!
//! btleplug is central-only, so peripheral-mode advertising goes through a
//! pluggable [`BleAdvertiser`] backend. Platforms without a backend fall
//! back to a warning and stay scan-only; inbound links from an embedder's
//! own acceptor still enter the core through
//! [`MidiLinkProvider::attach_link`](midilink_core::MidiLinkProvider::attach_link).

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::BleLinkError;

// ----------------------------------------------------------------------------
// Advertiser Backend
// ----------------------------------------------------------------------------

/// Platform advertising backend. Implementations own the GATT service
/// registration and advertisement payload for the MIDI service.
#[async_trait]
pub trait BleAdvertiser: Send + Sync {
    async fn start_advertising(&mut self, local_name: &str) -> Result<(), BleLinkError>;
    async fn stop_advertising(&mut self) -> Result<(), BleLinkError>;
    fn is_advertising(&self) -> bool;
}

/// Fallback backend for platforms without peripheral-mode support.
#[derive(Default)]
struct UnsupportedAdvertiser {
    warned: bool,
}

#[async_trait]
impl BleAdvertiser for UnsupportedAdvertiser {
    async fn start_advertising(&mut self, local_name: &str) -> Result<(), BleLinkError> {
        if !self.warned {
            self.warned = true;
            warn!(
                local_name,
                "peripheral-mode advertising is not supported on this platform; \
                 running as central (scan/connect) only"
            );
        }
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), BleLinkError> {
        Ok(())
    }

    fn is_advertising(&self) -> bool {
        false
    }
}

// ----------------------------------------------------------------------------
// Advertising Manager
// ----------------------------------------------------------------------------

/// Owns the active advertising backend.
pub struct AdvertisingManager {
    advertiser: Box<dyn BleAdvertiser>,
}

impl Default for AdvertisingManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvertisingManager {
    /// Manager with the platform default backend.
    pub fn new() -> Self {
        Self {
            advertiser: Box::new(UnsupportedAdvertiser::default()),
        }
    }

    /// Manager with a caller-supplied backend (embedders with a platform
    /// peripheral stack plug it in here).
    pub fn with_advertiser(advertiser: Box<dyn BleAdvertiser>) -> Self {
        Self { advertiser }
    }

    pub async fn start(&mut self, local_name: &str) -> Result<(), BleLinkError> {
        self.advertiser.start_advertising(local_name).await?;
        if self.advertiser.is_advertising() {
            info!(local_name, "BLE-MIDI advertising started");
        }
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), BleLinkError> {
        self.advertiser.stop_advertising().await
    }

    pub fn is_advertising(&self) -> bool {
        self.advertiser.is_advertising()
    }
}
