//! Device registry
//!
//! Process-wide mapping from device address to its active session and
//! endpoints. All mutation funnels through the registry's operations, which
//! internalize locking; listener callbacks always run on a snapshot taken
//! after the lock is dropped, so a callback may re-enter the registry
//! without deadlocking.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::endpoint::{MidiInput, MidiOutput};
use crate::error::{MidiLinkError, Result};
use crate::link::MidiLink as _;
use crate::session::SessionHandle;
use crate::types::DeviceAddress;

// ----------------------------------------------------------------------------
// Listeners
// ----------------------------------------------------------------------------

/// Attach/detach notifications. All methods default to no-ops so listeners
/// implement only what they care about; any number of listeners may
/// subscribe concurrently.
pub trait DeviceListener: Send + Sync {
    fn on_input_attached(&self, _input: Arc<MidiInput>) {}
    fn on_output_attached(&self, _output: Arc<MidiOutput>) {}
    fn on_input_detached(&self, _input: Arc<MidiInput>) {}
    fn on_output_detached(&self, _output: Arc<MidiOutput>) {}
}

// ----------------------------------------------------------------------------
// Registry
// ----------------------------------------------------------------------------

struct DeviceEntry {
    handle: SessionHandle,
    input: Option<Arc<MidiInput>>,
    output: Option<Arc<MidiOutput>>,
    /// Set once endpoints are registered; gates the attach/detach pair.
    registered: bool,
}

/// Concurrency-safe device registry. One non-terminal session per address.
pub struct DeviceRegistry {
    devices: RwLock<HashMap<DeviceAddress, DeviceEntry>>,
    listeners: RwLock<Vec<Arc<dyn DeviceListener>>>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to attach/detach notifications.
    pub async fn add_listener(&self, listener: Arc<dyn DeviceListener>) {
        self.listeners.write().await.push(listener);
    }

    /// Claim `handle.address` for a new session. Returns `false`, leaving
    /// the registry untouched, when a non-terminal session already holds
    /// the address; duplicate physical-link events are deduplicated here.
    pub(crate) async fn admit(&self, handle: SessionHandle) -> bool {
        let mut devices = self.devices.write().await;
        match devices.entry(handle.address.clone()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(DeviceEntry {
                    handle,
                    input: None,
                    output: None,
                    registered: false,
                });
                true
            }
        }
    }

    /// Register a ready session's endpoints and fire attach notifications.
    ///
    /// The session re-entrancy rule makes a duplicate registration
    /// unreachable; the `AlreadyRegistered` error is a defensive check for
    /// programming errors, not a condition to handle.
    pub(crate) async fn register_endpoints(
        &self,
        address: &DeviceAddress,
        input: Option<Arc<MidiInput>>,
        output: Option<Arc<MidiOutput>>,
    ) -> Result<()> {
        {
            let mut devices = self.devices.write().await;
            let entry = devices.get_mut(address).ok_or(MidiLinkError::LinkClosed)?;
            if entry.registered {
                return Err(MidiLinkError::AlreadyRegistered { address: address.clone() });
            }
            entry.input = input.clone();
            entry.output = output.clone();
            entry.registered = true;
        }

        let listeners = self.listener_snapshot().await;
        for listener in &listeners {
            if let Some(input) = &input {
                listener.on_input_attached(input.clone());
            }
            if let Some(output) = &output {
                listener.on_output_attached(output.clone());
            }
        }
        tracing::info!(address = %address, "midi endpoints attached");
        Ok(())
    }

    /// Remove the entry for `address` and fire detach notifications for
    /// whatever endpoints had been registered. A no-op when the address is
    /// absent; disconnection races may unregister twice.
    pub(crate) async fn unregister(
        &self,
        address: &DeviceAddress,
    ) -> Option<(Option<Arc<MidiInput>>, Option<Arc<MidiOutput>>)> {
        let entry = self.devices.write().await.remove(address)?;
        if !entry.registered {
            return Some((None, None));
        }

        let listeners = self.listener_snapshot().await;
        for listener in &listeners {
            if let Some(input) = &entry.input {
                listener.on_input_detached(input.clone());
            }
            if let Some(output) = &entry.output {
                listener.on_output_detached(output.clone());
            }
        }
        tracing::info!(address = %address, "midi endpoints detached");
        Some((entry.input, entry.output))
    }

    /// Point-in-time copy of the registered inputs.
    pub async fn snapshot_inputs(&self) -> Vec<Arc<MidiInput>> {
        self.devices
            .read()
            .await
            .values()
            .filter_map(|entry| entry.input.clone())
            .collect()
    }

    /// Point-in-time copy of the registered outputs.
    pub async fn snapshot_outputs(&self) -> Vec<Arc<MidiOutput>> {
        self.devices
            .read()
            .await
            .values()
            .filter_map(|entry| entry.output.clone())
            .collect()
    }

    /// The session handle for `address`, if one is admitted.
    pub(crate) async fn handle_for(&self, address: &DeviceAddress) -> Option<SessionHandle> {
        self.devices
            .read()
            .await
            .get(address)
            .map(|entry| entry.handle.clone())
    }

    /// Force every session to terminal state: close all links, clear the
    /// map, and fire detach notifications exactly once per registered
    /// endpoint pair.
    pub(crate) async fn terminate_all(&self) {
        let entries: Vec<(DeviceAddress, DeviceEntry)> =
            self.devices.write().await.drain().collect();
        if entries.is_empty() {
            return;
        }
        tracing::info!(count = entries.len(), "terminating all sessions");

        let listeners = self.listener_snapshot().await;
        for (address, entry) in entries {
            entry.handle.link.close().await;
            if !entry.registered {
                continue;
            }
            for listener in &listeners {
                if let Some(input) = &entry.input {
                    listener.on_input_detached(input.clone());
                }
                if let Some(output) = &entry.output {
                    listener.on_output_detached(output.clone());
                }
            }
            tracing::debug!(address = %address, "midi endpoints detached");
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    async fn listener_snapshot(&self) -> Vec<Arc<dyn DeviceListener>> {
        self.listeners.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::session::test_support::null_handle;

    #[derive(Default)]
    struct CountingListener {
        input_attached: AtomicUsize,
        output_attached: AtomicUsize,
        input_detached: AtomicUsize,
        output_detached: AtomicUsize,
    }

    impl DeviceListener for CountingListener {
        fn on_input_attached(&self, _input: Arc<MidiInput>) {
            self.input_attached.fetch_add(1, Ordering::SeqCst);
        }
        fn on_output_attached(&self, _output: Arc<MidiOutput>) {
            self.output_attached.fetch_add(1, Ordering::SeqCst);
        }
        fn on_input_detached(&self, _input: Arc<MidiInput>) {
            self.input_detached.fetch_add(1, Ordering::SeqCst);
        }
        fn on_output_detached(&self, _output: Arc<MidiOutput>) {
            self.output_detached.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn endpoints(address: &DeviceAddress) -> (Arc<MidiInput>, Arc<MidiOutput>) {
        let handle = null_handle(address.clone());
        let input = Arc::new(MidiInput::new(address.clone(), None, 1024));
        let output = Arc::new(MidiOutput::new(
            address.clone(),
            None,
            handle.link.clone(),
            Arc::new(AtomicUsize::new(20)),
        ));
        (input, output)
    }

    #[tokio::test]
    async fn test_admit_deduplicates_addresses() {
        let registry = DeviceRegistry::new();
        let address = DeviceAddress::new("dev-a");

        assert!(registry.admit(null_handle(address.clone())).await);
        assert!(!registry.admit(null_handle(address.clone())).await);

        registry.unregister(&address).await;
        assert!(registry.admit(null_handle(address)).await);
    }

    #[tokio::test]
    async fn test_attach_fires_exactly_once() {
        let registry = DeviceRegistry::new();
        let listener = Arc::new(CountingListener::default());
        registry.add_listener(listener.clone()).await;

        let address = DeviceAddress::new("dev-a");
        registry.admit(null_handle(address.clone())).await;
        let (input, output) = endpoints(&address);

        registry
            .register_endpoints(&address, Some(input.clone()), Some(output.clone()))
            .await
            .unwrap();
        assert_eq!(listener.input_attached.load(Ordering::SeqCst), 1);
        assert_eq!(listener.output_attached.load(Ordering::SeqCst), 1);

        // double registration is a programming error, surfaced not swallowed
        let err = registry
            .register_endpoints(&address, Some(input), Some(output))
            .await
            .unwrap_err();
        assert!(matches!(err, MidiLinkError::AlreadyRegistered { .. }));
        assert_eq!(listener.input_attached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_detach_fires_exactly_once_despite_repeated_unregister() {
        let registry = DeviceRegistry::new();
        let listener = Arc::new(CountingListener::default());
        registry.add_listener(listener.clone()).await;

        let address = DeviceAddress::new("dev-a");
        registry.admit(null_handle(address.clone())).await;
        let (input, output) = endpoints(&address);
        registry
            .register_endpoints(&address, Some(input), Some(output))
            .await
            .unwrap();

        assert!(registry.unregister(&address).await.is_some());
        assert!(registry.unregister(&address).await.is_none());
        assert!(registry.unregister(&address).await.is_none());

        assert_eq!(listener.input_detached.load(Ordering::SeqCst), 1);
        assert_eq!(listener.output_detached.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unregister_before_registration_skips_detach() {
        let registry = DeviceRegistry::new();
        let listener = Arc::new(CountingListener::default());
        registry.add_listener(listener.clone()).await;

        let address = DeviceAddress::new("dev-a");
        registry.admit(null_handle(address.clone())).await;
        // session failed before reaching ready
        let removed = registry.unregister(&address).await.unwrap();
        assert!(removed.0.is_none() && removed.1.is_none());
        assert_eq!(listener.input_detached.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_snapshots_are_point_in_time_copies() {
        let registry = DeviceRegistry::new();
        let address = DeviceAddress::new("dev-a");
        registry.admit(null_handle(address.clone())).await;
        let (input, output) = endpoints(&address);
        registry
            .register_endpoints(&address, Some(input), Some(output))
            .await
            .unwrap();

        let inputs = registry.snapshot_inputs().await;
        assert_eq!(inputs.len(), 1);

        registry.unregister(&address).await;
        // the earlier snapshot is unaffected
        assert_eq!(inputs.len(), 1);
        assert!(registry.snapshot_inputs().await.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_all_clears_and_detaches_once() {
        let registry = DeviceRegistry::new();
        let listener = Arc::new(CountingListener::default());
        registry.add_listener(listener.clone()).await;

        for name in ["dev-a", "dev-b"] {
            let address = DeviceAddress::new(name);
            registry.admit(null_handle(address.clone())).await;
            let (input, output) = endpoints(&address);
            registry
                .register_endpoints(&address, Some(input), Some(output))
                .await
                .unwrap();
        }

        registry.terminate_all().await;
        assert!(registry.is_empty().await);
        assert_eq!(listener.input_detached.load(Ordering::SeqCst), 2);
        assert_eq!(listener.output_detached.load(Ordering::SeqCst), 2);

        // nothing left to detach
        registry.terminate_all().await;
        assert_eq!(listener.input_detached.load(Ordering::SeqCst), 2);
    }
}
