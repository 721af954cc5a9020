//! Discovery serialization
//!
//! The platform BLE stack tolerates only one capability-discovery operation
//! in flight across all links, so every session funnels through this
//! controller before enumerating services. Waiting is scheduler-parked on a
//! single-permit semaphore, bounded by the configured timeout, and
//! abandoned outright if the waiting link closes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore, TryAcquireError};

use crate::error::{MidiLinkError, Result};
use crate::link::closed_signal;
use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Discovery Controller
// ----------------------------------------------------------------------------

/// Admits at most one in-flight capability discovery process-wide.
#[derive(Debug)]
pub struct DiscoveryController {
    gate: Arc<Semaphore>,
    timeout: Duration,
}

/// Exclusive right to run capability discovery. Released on drop,
/// unconditionally.
#[derive(Debug)]
pub struct DiscoveryPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
    address: DeviceAddress,
}

impl Drop for DiscoveryPermit {
    fn drop(&mut self) {
        tracing::trace!(address = %self.address, "discovery slot released");
    }
}

impl DiscoveryController {
    pub fn new(timeout: Duration) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(1)),
            timeout,
        }
    }

    /// Acquire the discovery slot for `address`.
    ///
    /// Returns `DiscoveryTimeout` when the slot stays contended past the
    /// timeout and `LinkClosed` when the waiting link closes first; in both
    /// cases no discovery must be attempted.
    pub async fn acquire(
        &self,
        address: &DeviceAddress,
        closed: watch::Receiver<bool>,
    ) -> Result<DiscoveryPermit> {
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        tokio::select! {
            // closed links are abandoned even when the slot is free
            biased;
            _ = closed_signal(closed) => {
                tracing::debug!(address = %address, "discovery wait abandoned, link closed");
                Err(MidiLinkError::LinkClosed)
            }
            permit = self.gate.clone().acquire_owned() => {
                let permit = permit.map_err(|_| MidiLinkError::Shutdown)?;
                tracing::trace!(address = %address, "discovery slot acquired");
                Ok(DiscoveryPermit { _permit: permit, address: address.clone() })
            }
            _ = &mut deadline => {
                Err(MidiLinkError::DiscoveryTimeout {
                    duration_ms: self.timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Whether the slot is currently free. Diagnostic only; do not use for
    /// admission decisions.
    pub fn is_idle(&self) -> bool {
        match self.gate.try_acquire() {
            Ok(permit) => {
                drop(permit);
                true
            }
            Err(TryAcquireError::NoPermits) => false,
            Err(TryAcquireError::Closed) => false,
        }
    }
}
