//! Scan for BLE-MIDI peripherals and echo whatever they play.
//!
//! Run with `cargo run --example scan`; point a BLE-MIDI keyboard at the
//! machine and watch the decoded messages scroll by.

use std::sync::Arc;
use std::time::Duration;

use midilink_ble::{BleCentral, BleCentralConfig};
use midilink_core::{
    DeviceListener, MidiInput, MidiLinkProvider, MidiOutput, ProviderConfig,
};

struct LogListener;

impl DeviceListener for LogListener {
    fn on_input_attached(&self, input: Arc<MidiInput>) {
        tracing::info!(address = %input.address(), name = ?input.name(), "input attached");
        input.set_receive_listener(|message| {
            tracing::info!(ts = message.timestamp, "received {:?}", message.message);
        });
    }

    fn on_output_attached(&self, output: Arc<MidiOutput>) {
        tracing::info!(
            address = %output.address(),
            max_payload = output.max_payload(),
            "output attached"
        );
    }

    fn on_input_detached(&self, input: Arc<MidiInput>) {
        tracing::info!(address = %input.address(), "input detached");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,midilink_core=debug".into()),
        )
        .init();

    let provider = Arc::new(MidiLinkProvider::new(ProviderConfig::new()));
    provider.add_listener(Arc::new(LogListener)).await;

    let mut central = BleCentral::new(BleCentralConfig::new());
    central.start(provider.clone()).await?;

    tokio::signal::ctrl_c().await?;
    central.stop().await;
    provider.shutdown().await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}
