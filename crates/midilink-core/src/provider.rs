//! Host-facing provider
//!
//! The provider is the single entry point for physical links from either
//! connection role: the central scanner and any peripheral-side acceptor
//! both hand fresh links to [`MidiLinkProvider::attach_link`]. It owns the
//! device registry and the discovery controller, spawns one session task
//! per link, and exposes the listener/snapshot/disconnect/shutdown surface
//! the host application drives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ProviderConfig;
use crate::discovery::DiscoveryController;
use crate::endpoint::{MidiInput, MidiOutput};
use crate::link::MidiLink;
use crate::registry::{DeviceListener, DeviceRegistry};
use crate::session::{PeerSession, SessionPhase};
use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Provider
// ----------------------------------------------------------------------------

/// Owns all transport state: registry, discovery serialization, and the
/// per-link session tasks.
pub struct MidiLinkProvider {
    config: ProviderConfig,
    registry: Arc<DeviceRegistry>,
    discovery: Arc<DiscoveryController>,
    shutdown: AtomicBool,
}

impl MidiLinkProvider {
    pub fn new(config: ProviderConfig) -> Self {
        let discovery = Arc::new(DiscoveryController::new(config.discovery_timeout));
        Self {
            config,
            registry: Arc::new(DeviceRegistry::new()),
            discovery,
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Admit a new physical link and spawn its session.
    ///
    /// Returns `false`, closing the link, when the provider is shut down or
    /// a non-terminal session already holds the link's address (duplicate
    /// physical-link events are idempotent).
    pub async fn attach_link(&self, link: Arc<dyn MidiLink>) -> bool {
        let address = link.address();
        if self.shutdown.load(Ordering::SeqCst) {
            tracing::debug!(address = %address, "link rejected, provider shut down");
            link.close().await;
            return false;
        }

        let (session, handle) = PeerSession::new(
            link.clone(),
            self.config.clone(),
            self.registry.clone(),
            self.discovery.clone(),
        );
        if !self.registry.admit(handle).await {
            tracing::debug!(address = %address, "duplicate link ignored, session already active");
            link.close().await;
            return false;
        }

        tracing::info!(address = %address, "link attached, session starting");
        tokio::spawn(session.run());
        true
    }

    /// Subscribe to attach/detach notifications.
    pub async fn add_listener(&self, listener: Arc<dyn DeviceListener>) {
        self.registry.add_listener(listener).await;
    }

    /// Snapshot of the currently attached inputs.
    pub async fn inputs(&self) -> Vec<Arc<MidiInput>> {
        self.registry.snapshot_inputs().await
    }

    /// Snapshot of the currently attached outputs.
    pub async fn outputs(&self) -> Vec<Arc<MidiOutput>> {
        self.registry.snapshot_outputs().await
    }

    /// Observe a session's phase transitions, if a session exists for the
    /// address.
    pub async fn session_phase(&self, address: &DeviceAddress) -> Option<watch::Receiver<SessionPhase>> {
        self.registry.handle_for(address).await.map(|handle| handle.phase)
    }

    /// Close the link for `address`; the session transitions to closed and
    /// detach notifications fire. A no-op for unknown addresses.
    pub async fn disconnect(&self, address: &DeviceAddress) {
        if let Some(handle) = self.registry.handle_for(address).await {
            handle.link.close().await;
        }
    }

    /// Shut the provider down: no further links are admitted, every session
    /// is forced to terminal state, and every link is closed.
    pub async fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("midi link provider shutting down");
        self.registry.terminate_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::test_support::null_link;

    #[tokio::test]
    async fn test_duplicate_link_ignored() {
        let provider = MidiLinkProvider::new(ProviderConfig::default());
        let address = DeviceAddress::new("dev-a");

        assert!(provider.attach_link(null_link(address.clone())).await);
        assert!(!provider.attach_link(null_link(address.clone())).await);
    }

    #[tokio::test]
    async fn test_no_links_after_shutdown() {
        let provider = MidiLinkProvider::new(ProviderConfig::default());
        provider.shutdown().await;
        assert!(!provider.attach_link(null_link(DeviceAddress::new("dev-a"))).await);
        assert!(provider.inputs().await.is_empty());
    }

    #[tokio::test]
    async fn test_session_phase_observable_after_attach() {
        let provider = MidiLinkProvider::new(ProviderConfig::default());
        let address = DeviceAddress::new("dev-a");
        provider.attach_link(null_link(address.clone())).await;

        let phase = provider.session_phase(&address).await;
        assert!(phase.is_some());
        assert!(provider.session_phase(&DeviceAddress::new("unknown")).await.is_none());
    }
}
