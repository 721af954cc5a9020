//! Peer session state machine
//!
//! One session drives one remote device through link establishment,
//! capability discovery, payload-size negotiation, optional pairing, and
//! readiness, then pumps inbound packets until the link drops. Each session
//! runs as its own task; the only cross-session serialization point is the
//! discovery controller. Errors are session-scoped: they close this session
//! and never touch its siblings.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::watch;

use crate::codec::MIN_PAYLOAD;
use crate::config::ProviderConfig;
use crate::discovery::DiscoveryController;
use crate::endpoint::{MidiInput, MidiOutput};
use crate::error::{MidiLinkError, Result};
use crate::link::{
    closed_signal, BondState, MidiLink, MIDI_IO_CHARACTERISTIC_UUID, MIDI_SERVICE_UUID,
};
use crate::registry::DeviceRegistry;
use crate::types::DeviceAddress;

/// ATT MTU assumed when negotiation is not surfaced by the platform.
const DEFAULT_ATT_MTU: usize = 23;

/// Payload size for a granted MTU: 3 bytes reserved for the attribute
/// protocol header, floored at the conservative minimum.
pub(crate) fn negotiated_payload(mtu: usize) -> usize {
    mtu.saturating_sub(3).max(MIN_PAYLOAD)
}

// ----------------------------------------------------------------------------
// Session Phase
// ----------------------------------------------------------------------------

/// Lifecycle phase of a peer session. `Closed` is terminal and reachable
/// from every other phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Discovering,
    Negotiating,
    PairingRequired,
    Paired,
    Ready,
    Active,
    Closed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Discovering => "discovering",
            Self::Negotiating => "negotiating",
            Self::PairingRequired => "pairing-required",
            Self::Paired => "paired",
            Self::Ready => "ready",
            Self::Active => "active",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

// ----------------------------------------------------------------------------
// Session Handle
// ----------------------------------------------------------------------------

/// Registry-side view of a session: enough to observe its phase and force
/// its link closed.
#[derive(Clone)]
pub(crate) struct SessionHandle {
    pub(crate) address: DeviceAddress,
    pub(crate) link: Arc<dyn MidiLink>,
    pub(crate) phase: watch::Receiver<SessionPhase>,
}

// ----------------------------------------------------------------------------
// Peer Session
// ----------------------------------------------------------------------------

/// State machine for one physical link.
pub(crate) struct PeerSession {
    address: DeviceAddress,
    link: Arc<dyn MidiLink>,
    config: ProviderConfig,
    registry: Arc<DeviceRegistry>,
    discovery: Arc<DiscoveryController>,
    phase_tx: watch::Sender<SessionPhase>,
    max_payload: Arc<AtomicUsize>,
}

impl PeerSession {
    pub(crate) fn new(
        link: Arc<dyn MidiLink>,
        config: ProviderConfig,
        registry: Arc<DeviceRegistry>,
        discovery: Arc<DiscoveryController>,
    ) -> (Self, SessionHandle) {
        let address = link.address();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Connecting);
        let handle = SessionHandle {
            address: address.clone(),
            link: link.clone(),
            phase: phase_rx,
        };
        let session = Self {
            address,
            link,
            config,
            registry,
            discovery,
            phase_tx,
            max_payload: Arc::new(AtomicUsize::new(MIN_PAYLOAD)),
        };
        (session, handle)
    }

    fn set_phase(&self, phase: SessionPhase) {
        tracing::debug!(address = %self.address, %phase, "session phase");
        self.phase_tx.send_replace(phase);
    }

    /// Run the session to completion. Consumes the session; the registry
    /// entry is removed and the link closed on the way out, whatever
    /// happened.
    pub(crate) async fn run(self) {
        if let Err(error) = self.drive().await {
            self.report(&error);
        }
        self.finish().await;
    }

    async fn drive(&self) -> Result<()> {
        // Connecting: physical link requested but not yet open.
        self.link.open().await?;

        // Discovering: one discovery in flight process-wide.
        self.set_phase(SessionPhase::Discovering);
        let caps = {
            let _permit = self
                .discovery
                .acquire(&self.address, self.link.closed())
                .await?;
            let deadline = tokio::time::sleep(self.config.discovery_timeout);
            tokio::pin!(deadline);
            tokio::select! {
                biased;
                _ = closed_signal(self.link.closed()) => return Err(MidiLinkError::LinkClosed),
                caps = self.link.discover_capabilities() => caps?,
                _ = &mut deadline => {
                    return Err(MidiLinkError::DiscoveryTimeout {
                        duration_ms: self.config.discovery_timeout.as_millis() as u64,
                    });
                }
            }
        };
        if !caps.has_service(MIDI_SERVICE_UUID) {
            return Err(MidiLinkError::ServiceNotFound { address: self.address.clone() });
        }
        if !caps.has_characteristic(MIDI_SERVICE_UUID, MIDI_IO_CHARACTERISTIC_UUID) {
            return Err(MidiLinkError::CharacteristicNotFound { address: self.address.clone() });
        }

        let name = self.link.name();
        let input = Arc::new(MidiInput::new(
            self.address.clone(),
            name.clone(),
            self.config.sysex_reassembly_limit,
        ));
        let output = Arc::new(MidiOutput::new(
            self.address.clone(),
            name,
            self.link.clone(),
            self.max_payload.clone(),
        ));

        // Negotiating: payload size gates output fragmentation from here on.
        self.set_phase(SessionPhase::Negotiating);
        let mtu = match self.link.negotiate_payload_size(self.config.requested_mtu).await {
            Ok(mtu) => mtu,
            Err(error) => {
                tracing::debug!(
                    address = %self.address, %error,
                    "mtu negotiation unavailable, assuming default"
                );
                DEFAULT_ATT_MTU
            }
        };
        let payload = negotiated_payload(mtu);
        self.max_payload.store(payload, Ordering::Relaxed);
        tracing::debug!(address = %self.address, mtu, payload, "payload size negotiated");

        if let Err(error) = self.link.request_high_priority().await {
            tracing::debug!(address = %self.address, %error, "high priority request rejected");
        }

        // PairingRequired / Paired: only when configured, only for unbonded
        // links; never retried automatically.
        if self.config.require_bonding && self.link.bond_state() != BondState::Bonded {
            self.set_phase(SessionPhase::PairingRequired);
            self.wait_for_bond().await?;
            self.set_phase(SessionPhase::Paired);
        }

        // Ready: endpoints enter the registry, attach notifications fire.
        self.set_phase(SessionPhase::Ready);
        self.registry
            .register_endpoints(&self.address, Some(input.clone()), Some(output))
            .await?;
        self.link.subscribe().await?;

        // Active: steady state until the link drops.
        self.set_phase(SessionPhase::Active);
        self.pump(&input).await
    }

    /// Wait for the platform bonding flow, parked on the link's bond-event
    /// stream rather than polling.
    async fn wait_for_bond(&self) -> Result<()> {
        let mut events = self.link.bond_events().await?;
        if self.link.bond_state() == BondState::Bonded {
            return Ok(());
        }
        self.link.request_bond().await?;

        let deadline = tokio::time::sleep(self.config.pairing_timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                biased;
                _ = closed_signal(self.link.closed()) => return Err(MidiLinkError::LinkClosed),
                event = events.next() => match event {
                    Some(BondState::Bonded) => return Ok(()),
                    Some(state) => {
                        tracing::debug!(address = %self.address, ?state, "bond state changed");
                    }
                    None => {
                        return Err(MidiLinkError::PairingFailure {
                            address: self.address.clone(),
                            reason: "bond event stream ended".into(),
                        });
                    }
                },
                _ = &mut deadline => {
                    return Err(MidiLinkError::PairingFailure {
                        address: self.address.clone(),
                        reason: "pairing timed out".into(),
                    });
                }
            }
        }
    }

    /// Active-state receive loop: decode each notification payload in
    /// arrival order and deliver to the input's listener.
    async fn pump(&self, input: &Arc<MidiInput>) -> Result<()> {
        let mut stream = self.link.notifications().await?;
        let closed = self.link.closed();
        tokio::pin! {
            let closed_wait = closed_signal(closed);
        }
        loop {
            tokio::select! {
                _ = &mut closed_wait => return Err(MidiLinkError::LinkClosed),
                payload = stream.next() => match payload {
                    Some(payload) => input.handle_payload(&payload).await,
                    None => return Err(MidiLinkError::LinkClosed),
                },
            }
        }
    }

    fn report(&self, error: &MidiLinkError) {
        match error {
            MidiLinkError::LinkClosed => {
                tracing::debug!(address = %self.address, "session ended, link closed");
            }
            MidiLinkError::ServiceNotFound { .. } | MidiLinkError::CharacteristicNotFound { .. } => {
                tracing::warn!(address = %self.address, %error, "remote is not a MIDI peer");
            }
            MidiLinkError::DiscoveryTimeout { .. } => {
                tracing::warn!(address = %self.address, %error, "discovery timed out");
            }
            MidiLinkError::PairingFailure { .. } => {
                tracing::warn!(address = %self.address, %error, "pairing failed");
            }
            MidiLinkError::AlreadyRegistered { .. } => {
                tracing::error!(address = %self.address, %error, "registry invariant violated");
            }
            other => {
                tracing::warn!(address = %self.address, error = %other, "session failed");
            }
        }
    }

    /// Terminal transition: remove endpoints, fire detach exactly once,
    /// discard codec state, close the link.
    async fn finish(&self) {
        self.set_phase(SessionPhase::Closed);
        if let Some((input, _output)) = self.registry.unregister(&self.address).await {
            if let Some(input) = input {
                input.reset().await;
            }
        }
        self.link.close().await;
    }
}

// ----------------------------------------------------------------------------
// Test Support
// ----------------------------------------------------------------------------
