use crate::error::{Error, Result};
use crate::signaling::SignalingChannel;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// In-process relay endpoint; frames go straight to the other endpoint's
/// receiver.
#[derive(Debug, Clone)]
pub struct MemoryChannel {
    tx: mpsc::UnboundedSender<String>,
}

pub type MemoryEndpoint = (MemoryChannel, mpsc::UnboundedReceiver<String>);

impl MemoryChannel {
    /// Two connected endpoints. Each returns the outbound channel and the
    /// receiver of frames sent by the other side.
    pub fn pair() -> (MemoryEndpoint, MemoryEndpoint) {
        let (a_tx, a_rx) = mpsc::unbounded_channel();
        let (b_tx, b_rx) = mpsc::unbounded_channel();
        ((MemoryChannel { tx: b_tx }, a_rx), (MemoryChannel { tx: a_tx }, b_rx))
    }
}

#[async_trait]
impl SignalingChannel for MemoryChannel {
    async fn send(&self, frame: String) -> Result<()> {
        self.tx.send(frame).map_err(|_| Error::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_cross_to_the_other_endpoint() {
        let ((a, mut a_rx), (b, mut b_rx)) = MemoryChannel::pair();
        a.send("from-a".into()).await.unwrap();
        b.send("from-b".into()).await.unwrap();
        assert_eq!(b_rx.recv().await.as_deref(), Some("from-a"));
        assert_eq!(a_rx.recv().await.as_deref(), Some("from-b"));
    }

    #[tokio::test]
    async fn send_fails_once_peer_is_gone() {
        let ((a, _a_rx), (_b, b_rx)) = MemoryChannel::pair();
        drop(b_rx);
        assert!(matches!(a.send("x".into()).await, Err(Error::ChannelClosed)));
    }
}
