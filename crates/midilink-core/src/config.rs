//! Provider configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for a [`MidiLinkProvider`](crate::provider::MidiLinkProvider).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderConfig {
    /// Require authenticated pairing before a session becomes ready.
    pub require_bonding: bool,
    /// Maximum time a session may wait for (and spend in) capability
    /// discovery before failing with `DiscoveryTimeout`.
    pub discovery_timeout: Duration,
    /// Maximum time a session stays parked waiting for bonding.
    pub pairing_timeout: Duration,
    /// MTU requested from each link during negotiation.
    pub requested_mtu: usize,
    /// Upper bound on SysEx reassembly per input endpoint.
    pub sysex_reassembly_limit: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            require_bonding: false,
            discovery_timeout: Duration::from_secs(15),
            pairing_timeout: Duration::from_secs(30),
            requested_mtu: 517,
            sysex_reassembly_limit: 64 * 1024,
        }
    }
}

impl ProviderConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require authenticated pairing for unbonded links.
    pub fn with_require_bonding(mut self, required: bool) -> Self {
        self.require_bonding = required;
        self
    }

    /// Set the capability discovery timeout.
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the pairing timeout.
    pub fn with_pairing_timeout(mut self, timeout: Duration) -> Self {
        self.pairing_timeout = timeout;
        self
    }

    /// Set the MTU requested during payload-size negotiation.
    pub fn with_requested_mtu(mut self, mtu: usize) -> Self {
        self.requested_mtu = mtu;
        self
    }

    /// Set the SysEx reassembly bound.
    pub fn with_sysex_reassembly_limit(mut self, limit: usize) -> Self {
        self.sysex_reassembly_limit = limit;
        self
    }
}
