//! BLE central: scanning and link construction
//!
//! Scans for peripherals advertising the MIDI service, wraps each match as
//! a [`BtleMidiLink`], and hands it to the provider, which deduplicates and
//! drives the session. Disconnection events from the platform are relayed
//! to the affected link's closed signal.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::StreamExt;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use midilink_core::{DeviceAddress, MidiLink, MidiLinkProvider};

use crate::config::BleCentralConfig;
use crate::error::BleLinkError;
use crate::link::BtleMidiLink;
use crate::protocol::{advertises_midi_service, midi_scan_filter};

// ----------------------------------------------------------------------------
// Central Scanner
// ----------------------------------------------------------------------------

/// Drives the central role: adapter setup, scanning, and link hand-off.
pub struct BleCentral {
    config: BleCentralConfig,
    adapter: Option<Adapter>,
    links: Arc<Mutex<HashMap<PeripheralId, Weak<BtleMidiLink>>>>,
    scanning_tx: watch::Sender<bool>,
    event_task: Option<JoinHandle<()>>,
}

impl BleCentral {
    pub fn new(config: BleCentralConfig) -> Self {
        let (scanning_tx, _) = watch::channel(false);
        Self {
            config,
            adapter: None,
            links: Arc::new(Mutex::new(HashMap::new())),
            scanning_tx,
            event_task: None,
        }
    }

    /// Observe scan state changes.
    pub fn scan_status(&self) -> watch::Receiver<bool> {
        self.scanning_tx.subscribe()
    }

    /// Initialize the first available BLE adapter.
    async fn ensure_adapter(&mut self) -> Result<Adapter, BleLinkError> {
        if let Some(adapter) = &self.adapter {
            return Ok(adapter.clone());
        }
        let manager = Manager::new()
            .await
            .map_err(|e| BleLinkError::ScanFailed(e.to_string()))?;
        let adapters = manager
            .adapters()
            .await
            .map_err(|e| BleLinkError::ScanFailed(e.to_string()))?;
        let adapter = adapters.first().ok_or(BleLinkError::AdapterNotAvailable)?.clone();
        info!("BLE adapter initialized");
        self.adapter = Some(adapter.clone());
        Ok(adapter)
    }

    /// Start scanning; discovered MIDI peripherals are attached to
    /// `provider` as new links.
    pub async fn start(&mut self, provider: Arc<MidiLinkProvider>) -> Result<(), BleLinkError> {
        let adapter = self.ensure_adapter().await?;
        let mut events = adapter
            .events()
            .await
            .map_err(|e| BleLinkError::EventStreamFailed(e.to_string()))?;

        adapter
            .start_scan(midi_scan_filter())
            .await
            .map_err(|e| BleLinkError::ScanFailed(e.to_string()))?;
        let _ = self.scanning_tx.send(true);
        info!("started BLE scan for MIDI peripherals");

        let config = self.config.clone();
        let links = self.links.clone();
        let event_adapter = adapter.clone();
        self.event_task = Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                match event {
                    CentralEvent::DeviceDiscovered(id) => {
                        handle_discovered(&event_adapter, id, &config, &links, &provider).await;
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        if let Some(link) = links.lock().await.get(&id).and_then(Weak::upgrade) {
                            debug!(address = %link.address(), "peripheral disconnected");
                            link.mark_closed();
                        }
                    }
                    _ => {}
                }
            }
            debug!("BLE central event stream ended");
        }));
        Ok(())
    }

    /// Stop scanning and the event loop. Established sessions keep running.
    pub async fn stop(&mut self) {
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
        if let Some(adapter) = &self.adapter {
            if let Err(e) = adapter.stop_scan().await {
                warn!(error = %e, "failed to stop BLE scan");
            }
        }
        let _ = self.scanning_tx.send(false);
        info!("stopped BLE scan");
    }
}

/// Vet a discovery event and hand a fresh link to the provider.
async fn handle_discovered(
    adapter: &Adapter,
    id: PeripheralId,
    config: &BleCentralConfig,
    links: &Arc<Mutex<HashMap<PeripheralId, Weak<BtleMidiLink>>>>,
    provider: &Arc<MidiLinkProvider>,
) {
    let peripheral = match adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            debug!(error = %e, "discovered peripheral vanished");
            return;
        }
    };
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        _ => return,
    };

    if !advertises_midi_service(&properties.services) {
        return;
    }
    if let Some(filter) = &config.name_filter {
        let matches = properties
            .local_name
            .as_deref()
            .is_some_and(|name| name.contains(filter.as_str()));
        if !matches {
            return;
        }
    }

    // Re-advertisements for a live link must not spawn a second link for
    // the same peripheral; closing the duplicate would tear down the
    // active connection underneath the running session.
    {
        let links = links.lock().await;
        if let Some(existing) = links.get(&id).and_then(Weak::upgrade) {
            if !*existing.closed().borrow() {
                return;
            }
        }
    }

    let address = DeviceAddress::new(properties.address.to_string());
    let name = properties.local_name.clone();
    debug!(address = %address, name = ?name, "discovered MIDI peripheral");

    let link = Arc::new(BtleMidiLink::new(peripheral, address, name, config));
    links.lock().await.insert(id, Arc::downgrade(&link));
    provider.attach_link(link).await;
}
