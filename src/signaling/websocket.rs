//! WebSocket client transport for the two-party relay

use crate::error::{Error, Result};
use crate::signaling::SignalingChannel;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct WsChannel {
    url: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl WsChannel {
    /// Connects to the relay and starts the sender/receiver tasks.
    ///
    /// Returns the outbound channel and a receiver of inbound text frames;
    /// the receiver ends when the socket closes.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<String>)> {
        info!("Connecting to signaling relay: {}", url);

        let (ws_stream, _) = connect_async(url).await?;
        info!("Connected to signaling relay");

        let (write, read) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(Self::sender_task(write, rx));
        tokio::spawn(Self::receiver_task(read, inbound_tx));

        Ok((
            Self {
                url: url.to_string(),
                tx,
            },
            inbound_rx,
        ))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn close(&self) {
        let _ = self.tx.send(Message::Close(None));
    }

    async fn sender_task(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut rx: mpsc::UnboundedReceiver<Message>,
    ) {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if let Err(e) = write.send(msg).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }

        debug!("Sender task terminated");
    }

    async fn receiver_task(
        mut read: futures::stream::SplitStream<WsStream>,
        inbound: mpsc::UnboundedSender<String>,
    ) {
        while let Some(msg) = read.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if inbound.send(text).is_err() {
                        break;
                    }
                }
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => {
                        if inbound.send(text).is_err() {
                            break;
                        }
                    }
                    Err(_) => warn!("Dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(_)) => {
                    info!("WebSocket connection closed by relay");
                    break;
                }
                Err(e) => {
                    error!("WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }

        debug!("Receiver task terminated");
    }
}

#[async_trait]
impl SignalingChannel for WsChannel {
    async fn send(&self, frame: String) -> Result<()> {
        self.tx
            .send(Message::Text(frame))
            .map_err(|_| Error::ChannelClosed)
    }
}
