//! Signaling transports and the message envelope they carry.

pub mod codec;
pub mod memory;
pub mod websocket;

use crate::error::Result;
use crate::peer::negotiator::NegotiatorHandle;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub use codec::{decode, encode, Message};
pub use memory::MemoryChannel;
pub use websocket::WsChannel;

/// Outbound half of an ordered, reliable two-party relay.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    /// Sends one encoded envelope. Fails with `Error::ChannelClosed` once the
    /// relay is gone.
    async fn send(&self, frame: String) -> Result<()>;
}

/// Feeds inbound frames into a negotiator until the relay goes away, then
/// reports the closure.
pub async fn pump_inbound(mut inbound: mpsc::UnboundedReceiver<String>, handle: NegotiatorHandle) {
    while let Some(frame) = inbound.recv().await {
        debug!("Inbound frame: {} bytes", frame.len());
        if handle.handle_inbound_message(frame).is_err() {
            debug!("Negotiator stopped, dropping inbound pump");
            return;
        }
    }
    info!("Signaling channel closed");
    let _ = handle.channel_closed();
}
