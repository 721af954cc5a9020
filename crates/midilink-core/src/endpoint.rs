//! Logical MIDI endpoints
//!
//! Each ready session owns one [`MidiInput`] and one [`MidiOutput`], bound
//! to its link for the session's lifetime. Endpoints are never resurrected;
//! a reconnect produces fresh instances.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::codec::{PacketDecoder, PacketEncoder};
use crate::error::Result;
use crate::link::MidiLink;
use crate::message::{MidiMessage, TimedMessage, TIMESTAMP_MODULUS};
use crate::types::DeviceAddress;

/// Callback invoked for each decoded inbound message.
pub type MessageCallback = Arc<dyn Fn(TimedMessage) + Send + Sync>;

// ----------------------------------------------------------------------------
// Input Endpoint
// ----------------------------------------------------------------------------

/// A logical MIDI input: decodes inbound notification payloads and delivers
/// messages, in arrival order, to the registered listener.
pub struct MidiInput {
    address: DeviceAddress,
    name: Option<String>,
    decoder: Mutex<PacketDecoder>,
    listener: RwLock<Option<MessageCallback>>,
}

impl MidiInput {
    pub(crate) fn new(address: DeviceAddress, name: Option<String>, sysex_limit: usize) -> Self {
        Self {
            address,
            name,
            decoder: Mutex::new(PacketDecoder::with_sysex_limit(sysex_limit)),
            listener: RwLock::new(None),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Register the receive listener; the last listener wins.
    pub fn set_receive_listener(&self, callback: impl Fn(TimedMessage) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = Some(Arc::new(callback));
        }
    }

    pub fn clear_receive_listener(&self) {
        if let Ok(mut slot) = self.listener.write() {
            *slot = None;
        }
    }

    /// Decode one notification payload and deliver the resulting messages.
    /// Only the owning session's receive flow calls this.
    pub(crate) async fn handle_payload(&self, payload: &[u8]) {
        let messages = self.decoder.lock().await.decode(payload);
        if messages.is_empty() {
            return;
        }
        // snapshot so the callback can re-enter set_receive_listener
        let listener = match self.listener.read() {
            Ok(slot) => slot.clone(),
            Err(_) => None,
        };
        if let Some(listener) = listener {
            for message in messages {
                listener(message);
            }
        }
    }

    /// Discard decode state on session teardown.
    pub(crate) async fn reset(&self) {
        self.decoder.lock().await.reset();
    }
}

impl fmt::Debug for MidiInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiInput")
            .field("address", &self.address)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// ----------------------------------------------------------------------------
// Output Endpoint
// ----------------------------------------------------------------------------

/// A logical MIDI output: encodes messages against the session's negotiated
/// payload size and writes the packets to the link.
pub struct MidiOutput {
    address: DeviceAddress,
    name: Option<String>,
    link: Arc<dyn MidiLink>,
    max_payload: Arc<AtomicUsize>,
    epoch: Instant,
}

impl MidiOutput {
    pub(crate) fn new(
        address: DeviceAddress,
        name: Option<String>,
        link: Arc<dyn MidiLink>,
        max_payload: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            address,
            name,
            link,
            max_payload,
            epoch: Instant::now(),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The payload size negotiated for this session.
    pub fn max_payload(&self) -> usize {
        self.max_payload.load(Ordering::Relaxed)
    }

    /// Send one message stamped with the current send time.
    pub async fn send(&self, message: MidiMessage) -> Result<()> {
        let timestamp = (self.epoch.elapsed().as_millis() % TIMESTAMP_MODULUS as u128) as u16;
        self.send_all(&[TimedMessage::new(timestamp, message)]).await
    }

    /// Send one message with an explicit timestamp.
    pub async fn send_timed(&self, message: TimedMessage) -> Result<()> {
        self.send_all(std::slice::from_ref(&message)).await
    }

    /// Encode and send an ordered batch of messages.
    pub async fn send_all(&self, messages: &[TimedMessage]) -> Result<()> {
        let encoder = PacketEncoder::new(self.max_payload());
        for packet in encoder.encode(messages) {
            self.link.write(&packet).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for MidiOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MidiOutput")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("max_payload", &self.max_payload())
            .finish_non_exhaustive()
    }
}
