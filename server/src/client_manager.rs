//! Connection bookkeeping for the tank server
//!
//! This module tracks every TCP connection that has been admitted into the game:
//! - Connection lifecycle (register, close with a reason, timeout)
//! - The player each connection controls
//! - Outbound packet queues with drop-on-full back-pressure
//! - Capacity enforcement before a player is ever created
//!
//! The main loop is the only writer. The timeout checker task only reads
//! last-seen times through the shared lock.

use log::{debug, info, warn};
use shared::{CloseReason, PlayerId, ServerPacket};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Packets dropped on a full queue are reported once per this many drops.
const DROP_REPORT_INTERVAL: u64 = 50;

/// An admitted connection and the player it drives
///
/// Each client holds:
/// - Connection metadata (ID, address, last activity)
/// - The sending side of its writer task's queue
/// - Handles to its reader and writer tasks so a close can stop both
#[derive(Debug)]
pub struct Client {
    /// Connection identifier assigned by the acceptor
    pub conn_id: u32,
    /// Remote address, for logging
    pub addr: SocketAddr,
    /// Player created for this connection
    pub player_id: PlayerId,
    /// Last time a valid packet arrived
    pub last_seen: Instant,
    /// Outbound queue drained by the writer task
    sender: mpsc::Sender<ServerPacket>,
    /// Packets lost because the queue was full
    pub dropped_packets: u64,
    pub reader: Option<JoinHandle<()>>,
    pub writer: Option<JoinHandle<()>>,
}

impl Client {
    /// Creates a client that is considered active as of now
    pub fn new(
        conn_id: u32,
        addr: SocketAddr,
        player_id: PlayerId,
        sender: mpsc::Sender<ServerPacket>,
    ) -> Self {
        Self {
            conn_id,
            addr,
            player_id,
            last_seen: Instant::now(),
            sender,
            dropped_packets: 0,
            reader: None,
            writer: None,
        }
    }

    /// Queues a packet without waiting
    ///
    /// A full queue means the remote end is not keeping up; the packet is
    /// dropped and the loss is logged. Returns false if the packet was not
    /// queued.
    pub fn send(&mut self, packet: ServerPacket) -> bool {
        match self.sender.try_send(packet) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.dropped_packets += 1;
                if self.dropped_packets % DROP_REPORT_INTERVAL == 1 {
                    warn!(
                        "Outbound queue full for client {}, {} packets dropped so far",
                        self.conn_id, self.dropped_packets
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Writer for client {} has already stopped", self.conn_id);
                false
            }
        }
    }

    /// Checks if the client has been silent for longer than `timeout`
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }

    /// Tells the remote end why it is being dropped and stops reading from it
    ///
    /// The writer task flushes what is queued, including the close notice,
    /// then exits once the last sender is gone. Its handle is returned so
    /// a caller can wait for the flush.
    pub fn close(mut self, reason: CloseReason) -> Option<JoinHandle<()>> {
        if reason != CloseReason::ClientRequested {
            self.send(ServerPacket::Disconnected { reason });
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer.take()
    }
}

/// Tracks admitted connections and enforces the connection limit
///
/// Connection ids come from the acceptor, so the manager only decides
/// whether there is room and keeps the per-connection state.
#[derive(Debug)]
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    max_clients: usize,
}

impl ClientManager {
    /// Creates a new client manager with the specified capacity
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// True when no further connection can be admitted
    pub fn is_full(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    /// Registers an admitted connection
    ///
    /// Returns false and leaves the manager unchanged if it is at capacity
    /// or the connection id is already taken. Callers check
    /// [`ClientManager::is_full`] first so a rejected client never gets a
    /// player.
    pub fn add_client(&mut self, client: Client) -> bool {
        if self.is_full() || self.clients.contains_key(&client.conn_id) {
            return false;
        }
        info!(
            "Client {} connected from {} as player {}",
            client.conn_id, client.addr, client.player_id
        );
        self.clients.insert(client.conn_id, client);
        true
    }

    /// Removes a client and hands it back so the caller can close it
    pub fn remove_client(&mut self, conn_id: u32) -> Option<Client> {
        let client = self.clients.remove(&conn_id)?;
        info!("Client {} disconnected", conn_id);
        Some(client)
    }

    pub fn get_mut(&mut self, conn_id: u32) -> Option<&mut Client> {
        self.clients.get_mut(&conn_id)
    }

    /// Marks a connection as active and returns the player it drives
    pub fn touch(&mut self, conn_id: u32) -> Option<PlayerId> {
        let client = self.clients.get_mut(&conn_id)?;
        client.last_seen = Instant::now();
        Some(client.player_id)
    }

    /// Finds the connection driving `player_id`
    pub fn connection_for_player(&self, player_id: PlayerId) -> Option<u32> {
        self.clients
            .values()
            .find(|c| c.player_id == player_id)
            .map(|c| c.conn_id)
    }

    /// Queues a packet for the connection driving `player_id`
    pub fn send_to_player(&mut self, player_id: PlayerId, packet: ServerPacket) -> bool {
        let Some(conn_id) = self.connection_for_player(player_id) else {
            return false;
        };
        self.clients
            .get_mut(&conn_id)
            .is_some_and(|client| client.send(packet))
    }

    /// Lists connections silent for longer than `timeout`
    ///
    /// Nothing is removed here; the main loop closes them so the matching
    /// players leave the game in the same step.
    pub fn timed_out(&self, timeout: Duration) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .clients
            .values()
            .filter(|c| c.is_timed_out(timeout))
            .map(|c| c.conn_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Removes every client, for shutdown
    pub fn drain(&mut self) -> Vec<Client> {
        let mut clients: Vec<Client> = self.clients.drain().map(|(_, c)| c).collect();
        clients.sort_by_key(|c| c.conn_id);
        clients
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Client manager tests
///
/// Cover capacity enforcement, lookup by player, timeouts and the
/// behaviour of the bounded outbound queue.
#[cfg(test)]
mod tests {
    use super::*;
    use shared::UpdateMessage;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn client(conn_id: u32, player_id: PlayerId) -> (Client, mpsc::Receiver<ServerPacket>) {
        let (tx, rx) = mpsc::channel(4);
        (Client::new(conn_id, test_addr(), player_id, tx), rx)
    }

    fn update(tick: u32) -> ServerPacket {
        ServerPacket::Update(UpdateMessage::new(tick))
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert!(!manager.is_full());
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (first, _rx1) = client(1, 10);
        let (second, _rx2) = client(2, 11);

        assert!(manager.add_client(first));
        assert!(manager.is_full());
        assert!(!manager.add_client(second));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_duplicate_connection_id_rejected() {
        let mut manager = ClientManager::new(4);
        let (first, _rx1) = client(1, 10);
        let (again, _rx2) = client(1, 11);
        assert!(manager.add_client(first));
        assert!(!manager.add_client(again));
        assert_eq!(manager.connection_for_player(10), Some(1));
        assert_eq!(manager.connection_for_player(11), None);
    }

    #[test]
    fn test_remove_client() {
        let mut manager = ClientManager::new(2);
        let (c, _rx) = client(7, 3);
        manager.add_client(c);

        let removed = manager.remove_client(7).unwrap();
        assert_eq!(removed.player_id, 3);
        assert!(manager.is_empty());
        assert!(manager.remove_client(7).is_none());
    }

    #[test]
    fn test_touch_returns_player() {
        let mut manager = ClientManager::new(2);
        let (mut c, _rx) = client(1, 42);
        c.last_seen = Instant::now() - Duration::from_secs(30);
        manager.add_client(c);

        assert_eq!(manager.timed_out(Duration::from_secs(10)), vec![1]);
        assert_eq!(manager.touch(1), Some(42));
        assert!(manager.timed_out(Duration::from_secs(10)).is_empty());
        assert_eq!(manager.touch(99), None);
    }

    #[test]
    fn test_client_timeout() {
        let (mut c, _rx) = client(1, 1);
        assert!(!c.is_timed_out(Duration::from_secs(1)));
        c.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(c.is_timed_out(Duration::from_secs(1)));
    }

    #[test]
    fn test_full_queue_drops_packets() {
        let (mut c, mut rx) = client(1, 1);
        for tick in 0..4 {
            assert!(c.send(update(tick)));
        }
        assert!(!c.send(update(4)));
        assert!(!c.send(update(5)));
        assert_eq!(c.dropped_packets, 2);

        assert_eq!(rx.try_recv().unwrap(), update(0));
    }

    #[test]
    fn test_close_queues_reason() {
        let (c, mut rx) = client(1, 1);
        assert!(c.close(CloseReason::Timeout).is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            ServerPacket::Disconnected {
                reason: CloseReason::Timeout
            }
        );
        // The sender went away with the client.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_send_to_player() {
        let mut manager = ClientManager::new(2);
        let (c, mut rx) = client(5, 9);
        manager.add_client(c);

        assert!(manager.send_to_player(9, update(1)));
        assert!(!manager.send_to_player(10, update(1)));
        assert_eq!(rx.try_recv().unwrap(), update(1));
    }

    #[test]
    fn test_send_to_player_picks_that_players_connection() {
        let mut manager = ClientManager::new(3);
        let (first, mut rx1) = client(1, 20);
        let (second, mut rx2) = client(2, 21);
        manager.add_client(first);
        manager.add_client(second);

        assert!(manager.send_to_player(21, update(4)));
        assert_eq!(rx2.try_recv().unwrap(), update(4));
        assert!(rx1.try_recv().is_err());

        manager.remove_client(2);
        assert!(!manager.send_to_player(21, update(5)));
    }

    #[test]
    fn test_drain_orders_by_connection() {
        let mut manager = ClientManager::new(4);
        let mut receivers = Vec::new();
        for conn_id in [3, 1, 2] {
            let (c, rx) = client(conn_id, conn_id + 10);
            receivers.push(rx);
            manager.add_client(c);
        }
        let ids: Vec<u32> = manager.drain().iter().map(|c| c.conn_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(manager.is_empty());
    }
}
