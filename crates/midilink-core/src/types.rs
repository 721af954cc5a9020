//! Core identifier types

use core::fmt;
use std::sync::Arc;

// ----------------------------------------------------------------------------
// Device Address
// ----------------------------------------------------------------------------

/// Opaque, stable identifier for a physical remote device.
///
/// Typically a hardware address or platform peripheral id rendered as a
/// string. Cheap to clone and hashable; all registry lookups key on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(Arc<str>);

impl DeviceAddress {
    pub fn new(address: impl AsRef<str>) -> Self {
        Self(Arc::from(address.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceAddress {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for DeviceAddress {
    fn from(address: String) -> Self {
        Self::new(address)
    }
}
