//! Shared test harness: a scripted in-memory link and counting listeners.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use midilink_core::{
    BondState, BondStream, ByteStream, DeviceAddress, DeviceListener, LinkCapabilities,
    MidiInput, MidiLink, MidiLinkError, MidiOutput, Result, MIDI_IO_CHARACTERISTIC_UUID,
    MIDI_SERVICE_UUID,
};

// ----------------------------------------------------------------------------
// Discovery Tracking
// ----------------------------------------------------------------------------

/// Records overlap of capability-discovery intervals across links.
#[derive(Default)]
pub struct DiscoveryTracker {
    active: AtomicUsize,
    max_active: AtomicUsize,
    completed: AtomicUsize,
}

impl DiscoveryTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

// ----------------------------------------------------------------------------
// Mock Link
// ----------------------------------------------------------------------------

pub struct MockLink {
    address: DeviceAddress,
    name: Option<String>,
    caps: LinkCapabilities,
    mtu: usize,
    bond_state: Mutex<BondState>,
    bond_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<BondState>>>,
    notif_rx: AsyncMutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    written: Mutex<Vec<Vec<u8>>>,
    subscribed: AtomicUsize,
    closed_tx: watch::Sender<bool>,
    discover_delay: Duration,
    tracker: Option<Arc<DiscoveryTracker>>,
}

/// Test-side controls for a [`MockLink`]: feed notifications, drive the
/// bonding flow, inspect writes.
pub struct MockLinkHandle {
    pub link: Arc<MockLink>,
    pub notify_tx: mpsc::UnboundedSender<Vec<u8>>,
    bond_tx: mpsc::UnboundedSender<BondState>,
}

impl MockLinkHandle {
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.link.written.lock().unwrap().clone()
    }

    pub fn subscribed(&self) -> bool {
        self.link.subscribed.load(Ordering::SeqCst) > 0
    }

    pub fn is_closed(&self) -> bool {
        *self.link.closed_tx.borrow()
    }

    /// Simulate the platform finishing the bonding flow.
    pub fn complete_bonding(&self) {
        *self.link.bond_state.lock().unwrap() = BondState::Bonded;
        let _ = self.bond_tx.send(BondState::Bonded);
    }
}

pub struct MockLinkBuilder {
    address: String,
    name: Option<String>,
    mtu: usize,
    midi_service: bool,
    midi_characteristic: bool,
    bond_state: BondState,
    discover_delay: Duration,
    tracker: Option<Arc<DiscoveryTracker>>,
}

impl MockLinkBuilder {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
            name: None,
            mtu: 23,
            midi_service: true,
            midi_characteristic: true,
            bond_state: BondState::Bonded,
            discover_delay: Duration::ZERO,
            tracker: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn without_midi_service(mut self) -> Self {
        self.midi_service = false;
        self
    }

    pub fn without_midi_characteristic(mut self) -> Self {
        self.midi_characteristic = false;
        self
    }

    pub fn bond_state(mut self, state: BondState) -> Self {
        self.bond_state = state;
        self
    }

    pub fn discover_delay(mut self, delay: Duration) -> Self {
        self.discover_delay = delay;
        self
    }

    pub fn tracker(mut self, tracker: Arc<DiscoveryTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> MockLinkHandle {
        let mut caps = LinkCapabilities::default();
        if self.midi_service {
            caps.services.push(MIDI_SERVICE_UUID);
            if self.midi_characteristic {
                caps.characteristics
                    .push((MIDI_SERVICE_UUID, MIDI_IO_CHARACTERISTIC_UUID));
            }
        }

        let (notify_tx, notif_rx) = mpsc::unbounded_channel();
        let (bond_tx, bond_rx) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);

        let link = Arc::new(MockLink {
            address: DeviceAddress::new(&self.address),
            name: self.name,
            caps,
            mtu: self.mtu,
            bond_state: Mutex::new(self.bond_state),
            bond_rx: AsyncMutex::new(Some(bond_rx)),
            notif_rx: AsyncMutex::new(Some(notif_rx)),
            written: Mutex::new(Vec::new()),
            subscribed: AtomicUsize::new(0),
            closed_tx,
            discover_delay: self.discover_delay,
            tracker: self.tracker,
        });

        MockLinkHandle { link, notify_tx, bond_tx }
    }
}

fn channel_stream<T: Send + 'static>(
    rx: mpsc::UnboundedReceiver<T>,
) -> Pin<Box<dyn Stream<Item = T> + Send>> {
    Box::pin(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

#[async_trait]
impl MidiLink for MockLink {
    fn address(&self) -> DeviceAddress {
        self.address.clone()
    }

    fn name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn open(&self) -> Result<()> {
        if *self.closed_tx.subscribe().borrow() {
            return Err(MidiLinkError::LinkClosed);
        }
        Ok(())
    }

    async fn discover_capabilities(&self) -> Result<LinkCapabilities> {
        if let Some(tracker) = &self.tracker {
            tracker.enter();
        }
        if !self.discover_delay.is_zero() {
            tokio::time::sleep(self.discover_delay).await;
        }
        if let Some(tracker) = &self.tracker {
            tracker.exit();
        }
        Ok(self.caps.clone())
    }

    async fn negotiate_payload_size(&self, _requested: usize) -> Result<usize> {
        Ok(self.mtu)
    }

    async fn request_high_priority(&self) -> Result<()> {
        Ok(())
    }

    async fn subscribe(&self) -> Result<()> {
        self.subscribed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if *self.closed_tx.subscribe().borrow() {
            return Err(MidiLinkError::LinkClosed);
        }
        self.written.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn notifications(&self) -> Result<ByteStream> {
        let rx = self
            .notif_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MidiLinkError::Transport("notification stream already taken".into()))?;
        Ok(channel_stream(rx))
    }

    fn bond_state(&self) -> BondState {
        *self.bond_state.lock().unwrap()
    }

    async fn request_bond(&self) -> Result<()> {
        let mut state = self.bond_state.lock().unwrap();
        if *state == BondState::None {
            *state = BondState::Pairing;
        }
        Ok(())
    }

    async fn bond_events(&self) -> Result<BondStream> {
        let rx = self
            .bond_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| MidiLinkError::Transport("bond stream already taken".into()))?;
        Ok(channel_stream(rx))
    }

    async fn close(&self) {
        let _ = self.closed_tx.send(true);
    }

    fn closed(&self) -> watch::Receiver<bool> {
        self.closed_tx.subscribe()
    }
}

// ----------------------------------------------------------------------------
// Listeners
// ----------------------------------------------------------------------------

/// Counts attach/detach notifications.
#[derive(Default)]
pub struct CountingListener {
    pub input_attached: AtomicUsize,
    pub output_attached: AtomicUsize,
    pub input_detached: AtomicUsize,
    pub output_detached: AtomicUsize,
}

impl CountingListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn attaches(&self) -> (usize, usize) {
        (
            self.input_attached.load(Ordering::SeqCst),
            self.output_attached.load(Ordering::SeqCst),
        )
    }

    pub fn detaches(&self) -> (usize, usize) {
        (
            self.input_detached.load(Ordering::SeqCst),
            self.output_detached.load(Ordering::SeqCst),
        )
    }
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

// ----------------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------------

/// Poll `condition` until it holds or two seconds elapse.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within deadline"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until the session for `address` reports `phase`.
pub async fn wait_for_phase(
    provider: &midilink_core::MidiLinkProvider,
    address: &DeviceAddress,
    phase: midilink_core::SessionPhase,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if let Some(rx) = provider.session_phase(address).await {
            if *rx.borrow() == phase {
                return;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "session for {address} never reached {phase}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Wait until no session exists for `address`.
pub async fn wait_for_session_end(
    provider: &midilink_core::MidiLinkProvider,
    address: &DeviceAddress,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while provider.session_phase(address).await.is_some() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "session for {address} never ended"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
