//! Two-party WebSocket relay.
//!
//! Forwards every text frame from one participant to the other without looking
//! inside it. A room holds at most two participants; further connections are
//! closed straight after the handshake. Frames sent while a participant is
//! alone are held and delivered in order to the next one to join.

use crate::error::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub const ROOM_CAPACITY: usize = 2;

/// Frames kept for a participant that has not joined yet
pub const MAX_HELD_FRAMES: usize = 256;

type ClientTx = mpsc::UnboundedSender<Message>;

#[derive(Default)]
struct Members {
    clients: HashMap<u32, ClientTx>,
    // sent while the sender was alone, oldest first
    held: VecDeque<Message>,
}

#[derive(Default)]
pub struct Room {
    members: Mutex<Members>,
}

impl Room {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a participant and hands it every frame held for it, in order.
    pub fn add(&self, id: u32, tx: ClientTx) -> Result<()> {
        let mut members = self.lock();
        if members.clients.len() >= ROOM_CAPACITY {
            return Err(Error::RoomFull);
        }
        if !members.held.is_empty() {
            debug!("Delivering {} held frames to client {}", members.held.len(), id);
        }
        for msg in members.held.drain(..) {
            let _ = tx.send(msg);
        }
        members.clients.insert(id, tx);
        Ok(())
    }

    pub fn remove(&self, id: u32) {
        let mut members = self.lock();
        members.clients.remove(&id);
        if members.clients.is_empty() && !members.held.is_empty() {
            debug!("Room empty, discarding {} held frames", members.held.len());
            members.held.clear();
        }
    }

    /// Sends `msg` to the participant that is not `from`. With nobody else in
    /// the room the frame is held for whoever joins next; returns false only
    /// when it had to be dropped.
    pub fn forward(&self, from: u32, msg: Message) -> bool {
        let mut members = self.lock();
        let other = members
            .clients
            .iter()
            .find(|(id, _)| **id != from)
            .map(|(_, tx)| tx.clone());
        match other {
            Some(tx) => {
                if tx.send(msg).is_err() {
                    debug!("Peer of client {} is going away, frame dropped", from);
                    return false;
                }
                true
            }
            None if members.held.len() >= MAX_HELD_FRAMES => {
                warn!(
                    "Client {} is alone and {} frames are already held, frame dropped",
                    from, MAX_HELD_FRAMES
                );
                false
            }
            None => {
                members.held.push_back(msg);
                debug!(
                    "No peer for client {} yet, holding frame ({} held)",
                    from,
                    members.held.len()
                );
                true
            }
        }
    }

    pub fn held(&self) -> usize {
        self.lock().held.len()
    }

    pub fn len(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Members> {
        // Map operations cannot leave it half-updated, so a poisoned lock is
        // still consistent.
        self.members
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct RelayServer {
    room: Arc<Room>,
    counter: AtomicU32,
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            room: Arc::new(Room::new()),
            counter: AtomicU32::new(0),
        }
    }

    pub fn room(&self) -> &Arc<Room> {
        &self.room
    }

    fn next_id(&self) -> u32 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Accepts connections until the listener fails.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(
            "Relay listening on {}",
            listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default()
        );
        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(|e| Error::Signaling(e.to_string()))?;
            let id = self.next_id();
            let server = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = server.handle_connection(id, stream, addr).await {
                    warn!("Client {} ({}): {}", id, addr, e);
                }
            });
        }
    }

    async fn handle_connection(&self, id: u32, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        let ws_stream = accept_async(stream).await?;
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        // Anything sent to this seat before now is queued on `tx` by the join.
        let joined = self.room.add(id, tx);

        if let Err(e) = joined {
            warn!("Refusing client {} from {}: {}", id, addr, e);
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "room full".into(),
                })))
                .await;
            return Err(e);
        }
        info!("Client {} connected from {}", id, addr);

        let forward_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = ws_tx.send(msg).await {
                    error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    self.room.forward(id, Message::Text(text));
                }
                Ok(Message::Binary(data)) => {
                    self.room.forward(id, Message::Binary(data));
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    error!("WebSocket error from client {}: {}", id, e);
                    break;
                }
            }
        }

        info!("Client {} disconnected", id);
        self.room.remove(id);
        forward_task.abort();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_holds_two_participants() {
        let room = Room::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        room.add(1, tx.clone()).unwrap();
        room.add(2, tx.clone()).unwrap();
        assert!(matches!(room.add(3, tx), Err(Error::RoomFull)));
        assert_eq!(room.len(), 2);
    }

    #[test]
    fn forward_reaches_the_other_participant() {
        let room = Room::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        room.add(1, tx1).unwrap();
        room.add(2, tx2).unwrap();

        assert!(room.forward(1, Message::Text("hi".into())));
        assert_eq!(rx2.try_recv().unwrap(), Message::Text("hi".into()));
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn frames_sent_alone_wait_for_the_next_participant() {
        let room = Room::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        room.add(1, tx1).unwrap();

        assert!(room.forward(1, Message::Text("offer".into())));
        assert!(room.forward(1, Message::Text("ice".into())));
        assert_eq!(room.held(), 2);

        let (tx2, mut rx2) = mpsc::unbounded_channel();
        room.add(2, tx2).unwrap();
        assert_eq!(room.held(), 0);
        assert_eq!(rx2.try_recv().unwrap(), Message::Text("offer".into()));
        assert_eq!(rx2.try_recv().unwrap(), Message::Text("ice".into()));
    }

    #[test]
    fn held_frames_are_bounded_and_cleared_with_the_room() {
        let room = Room::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        room.add(1, tx1).unwrap();
        for n in 0..MAX_HELD_FRAMES {
            assert!(room.forward(1, Message::Text(n.to_string())));
        }
        assert!(!room.forward(1, Message::Text("overflow".into())));
        assert_eq!(room.held(), MAX_HELD_FRAMES);

        room.remove(1);
        assert!(room.is_empty());
        assert_eq!(room.held(), 0);
    }

    #[test]
    fn ids_are_sequential() {
        let server = RelayServer::new();
        assert_eq!(server.next_id(), 1);
        assert_eq!(server.next_id(), 2);
    }
}
