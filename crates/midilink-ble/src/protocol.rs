//! BLE-MIDI protocol constants and scan helpers

use btleplug::api::ScanFilter;
use uuid::Uuid;

pub use midilink_core::{MIDI_IO_CHARACTERISTIC_UUID, MIDI_SERVICE_UUID};

// ----------------------------------------------------------------------------
// Scan Helpers
// ----------------------------------------------------------------------------

/// Scan filter matching only peripherals advertising the MIDI service.
pub fn midi_scan_filter() -> ScanFilter {
    ScanFilter {
        services: vec![MIDI_SERVICE_UUID],
    }
}

/// Whether an advertisement's service list is compatible with BLE-MIDI.
///
/// Some platforms deliver discovery events before the service list is
/// populated; an empty list is treated as "unknown", not as a mismatch,
/// and left for capability discovery to settle.
pub fn advertises_midi_service(services: &[Uuid]) -> bool {
    services.is_empty() || services.contains(&MIDI_SERVICE_UUID)
}
