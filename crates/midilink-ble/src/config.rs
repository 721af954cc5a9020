//! BLE central configuration

use std::time::Duration;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the BLE central scanner and the links it produces.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BleCentralConfig {
    /// Maximum time to wait for a connection to open.
    pub connect_timeout: Duration,
    /// ATT MTU reported to the core's payload negotiation. btleplug does
    /// not surface the platform's negotiated MTU, so this is the value the
    /// session arithmetic sees; the BLE 4.0 default of 23 keeps the payload
    /// at the conservative 20-byte floor.
    pub assumed_mtu: usize,
    /// Only connect to peripherals whose advertised name contains this
    /// substring, in addition to the MIDI service filter.
    pub name_filter: Option<String>,
}

impl Default for BleCentralConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            assumed_mtu: 23,
            name_filter: None,
        }
    }
}

impl BleCentralConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the assumed ATT MTU.
    pub fn with_assumed_mtu(mut self, mtu: usize) -> Self {
        self.assumed_mtu = mtu;
        self
    }

    /// Restrict connections to peripherals whose name contains `filter`.
    pub fn with_name_filter(mut self, filter: impl Into<String>) -> Self {
        self.name_filter = Some(filter.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = BleCentralConfig::new()
            .with_connect_timeout(Duration::from_secs(10))
            .with_assumed_mtu(185)
            .with_name_filter("Piano");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.assumed_mtu, 185);
        assert_eq!(config.name_filter.as_deref(), Some("Piano"));
    }
}
