//! TCP front end and the authoritative main loop.
//!
//! The acceptor, the per-connection reader/writer tasks and the timeout
//! checker all talk to the main loop through one unbounded channel of
//! [`ServerMessage`]s. The main loop owns the [`GameState`], applies
//! queued effects, steps the simulation on a fixed interval and fans the
//! visibility-filtered updates out to the writers.
//!
//! Frames on the wire are a `u32` big-endian payload length followed by a
//! bincode payload.

use crate::client_manager::{Client, ClientManager};
use crate::config::{AllianceMode, BotPolicy, ServerConfig};
use crate::error::IngressError;
use crate::game::GameState;
use crate::ingress::{ConnectionIngress, ConnectionThrottle, Verdict};
use crate::maps::Map;
use crate::visibility::VisibilityBroadcaster;
use log::{debug, error, info, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::{decode_packet, encode_packet, ClientPacket, CloseReason, ServerPacket};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// How long shutdown waits for writers to flush their close notices.
const SHUTDOWN_FLUSH: Duration = Duration::from_secs(1);

/// Writes one length-prefixed frame.
pub async fn write_frame<W, T>(writer: &mut W, packet: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload =
        encode_packet(packet).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame too large"))?;
    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Reads one length-prefixed frame with no size limit. Used by clients,
/// which trust the server; the server's own reader goes through
/// [`ConnectionIngress`] instead.
pub async fn read_frame<R, T>(reader: &mut R) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = reader.read_u32().await? as usize;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_packet(&payload).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Messages handled by the main loop
#[derive(Debug)]
pub enum ServerMessage {
    /// A connection passed the throttle. Its reader half is handed over so
    /// the main loop starts reading only after the client is registered.
    ConnectionOpened {
        conn_id: u32,
        addr: SocketAddr,
        reader: OwnedReadHalf,
        sender: mpsc::Sender<ServerPacket>,
        writer: JoinHandle<()>,
    },
    PacketReceived {
        conn_id: u32,
        packet: ClientPacket,
    },
    ConnectionClosed {
        conn_id: u32,
        reason: CloseReason,
    },
    Shutdown,
}

/// Adds the configured startup bots. Under [`AllianceMode::SharedTeam`]
/// every bot joins the first bot's team. Returns how many were added.
pub fn spawn_startup_bots(game: &mut GameState, policy: &BotPolicy) -> usize {
    let wanted = policy.startup_bots.min(policy.bot_limit());
    let mut shared_team = None;
    let mut added = 0;
    for _ in 0..wanted {
        let Some(player_id) = game.add_bot(&policy.startup_profile, shared_team) else {
            warn!("No bot slot left after {} startup bots", added);
            break;
        };
        if policy.alliance_mode == AllianceMode::SharedTeam && shared_team.is_none() {
            shared_team = game.players.get(&player_id).map(|p| p.team);
        }
        added += 1;
    }
    if policy.startup_bots > wanted {
        warn!(
            "Requested {} startup bots, bot policy allows {}",
            policy.startup_bots, wanted
        );
    }
    added
}

/// The authoritative server
///
/// Owns the simulation and everything that mutates it. Network tasks only
/// enqueue [`ServerMessage`]s.
pub struct Server {
    config: ServerConfig,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    game: GameState,
    broadcaster: VisibilityBroadcaster,
    clients: Arc<RwLock<ClientManager>>,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl Server {
    /// Binds the listener and prepares the world, including startup bots.
    pub async fn new(config: ServerConfig, map: Map) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let mut game = GameState::new(map, config.seed);
        game.set_max_bots(config.bots.bot_limit());
        let bots = spawn_startup_bots(&mut game, &config.bots);
        if bots > 0 {
            info!(
                "Started {} '{}' bots",
                bots, config.bots.startup_profile
            );
        }

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let clients = Arc::new(RwLock::new(ClientManager::new(config.max_players)));

        Ok(Self {
            config,
            listener: Some(listener),
            local_addr,
            game,
            broadcaster: VisibilityBroadcaster::new(),
            clients,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle other tasks can use to talk to the main loop, for example
    /// to send [`ServerMessage::Shutdown`].
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn game(&self) -> &GameState {
        &self.game
    }

    /// Accepts connections until the listener fails or the main loop is gone.
    fn spawn_acceptor(&self, listener: TcpListener) {
        let server_tx = self.server_tx.clone();
        let limits = self.config.ingress.clone();
        let queue = self.config.outbound_queue;

        tokio::spawn(async move {
            let mut throttle = ConnectionThrottle::from_limits(&limits);
            let mut next_conn_id: u32 = 1;
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                };

                let now = Instant::now();
                throttle.prune(now);
                if !throttle.allow(addr.ip(), now) {
                    warn!("Too many connections from {}, rejecting", addr.ip());
                    tokio::spawn(reject_connection(stream, CloseReason::TooManyConnections));
                    continue;
                }

                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not disable Nagle for {}: {}", addr, e);
                }
                let conn_id = next_conn_id;
                next_conn_id = next_conn_id.wrapping_add(1);

                let (reader, write_half) = stream.into_split();
                let (sender, outbound) = mpsc::channel(queue);
                let writer = tokio::spawn(write_packets(conn_id, write_half, outbound));

                let opened = ServerMessage::ConnectionOpened {
                    conn_id,
                    addr,
                    reader,
                    sender,
                    writer,
                };
                if server_tx.send(opened).is_err() {
                    break;
                }
            }
        });
    }

    /// Reports silent connections once per second.
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();
        let timeout = self.config.client_timeout;

        tokio::spawn(async move {
            let mut check = interval(Duration::from_secs(1));
            loop {
                check.tick().await;
                let timed_out = clients.read().await.timed_out(timeout);
                for conn_id in timed_out {
                    let closed = ServerMessage::ConnectionClosed {
                        conn_id,
                        reason: CloseReason::Timeout,
                    };
                    if server_tx.send(closed).is_err() {
                        return;
                    }
                }
            }
        });
    }

    async fn handle_connection_opened(
        &mut self,
        conn_id: u32,
        addr: SocketAddr,
        reader: OwnedReadHalf,
        sender: mpsc::Sender<ServerPacket>,
        writer: JoinHandle<()>,
    ) {
        let mut clients = self.clients.write().await;
        if clients.is_full() || self.game.players.len() >= self.config.max_players {
            warn!("Rejecting connection {} from {}: server full", conn_id, addr);
            let full = ServerPacket::Disconnected {
                reason: CloseReason::ServerFull,
            };
            if sender.try_send(full).is_err() {
                writer.abort();
            }
            return;
        }

        let player_id = self.game.add_player();
        let mut client = Client::new(conn_id, addr, player_id, sender);
        client.writer = Some(writer);
        if let Some(welcome) = self.game.welcome_for(player_id) {
            client.send(ServerPacket::Welcome(Box::new(welcome)));
        }
        if !clients.add_client(client) {
            self.game.remove_player(player_id);
            return;
        }
        self.broadcaster.register(player_id, &self.game);

        let ingress = ConnectionIngress::new(&self.config.ingress, Instant::now());
        let task = tokio::spawn(read_packets(
            conn_id,
            reader,
            ingress,
            self.server_tx.clone(),
        ));
        if let Some(client) = clients.get_mut(conn_id) {
            client.reader = Some(task);
        }
    }

    async fn handle_packet(&mut self, conn_id: u32, packet: ClientPacket) {
        let Some(player_id) = self.clients.write().await.touch(conn_id) else {
            return;
        };
        match packet {
            ClientPacket::Input(input) => self.game.queue_input(player_id, input),
            ClientPacket::Chat {
                text,
                alliance_only,
                recipients,
            } => self
                .game
                .handle_chat(player_id, &text, alliance_only, recipients),
            ClientPacket::Alliance(action) => {
                if let Err(e) = self.game.handle_alliance(player_id, action) {
                    debug!("Alliance action from player {} refused: {}", player_id, e);
                }
            }
            ClientPacket::Disconnect => {
                self.close_connection(conn_id, CloseReason::ClientRequested)
                    .await
            }
        }
    }

    /// Closes a connection and takes its player out of the game.
    async fn close_connection(&mut self, conn_id: u32, reason: CloseReason) {
        let Some(client) = self.clients.write().await.remove_client(conn_id) else {
            return;
        };
        info!("Closing client {}: {}", conn_id, reason);
        let player_id = client.player_id;
        client.close(reason);
        self.broadcaster.unregister(player_id);
        self.game.remove_player(player_id);
    }

    /// Steps the simulation once and sends each player their update.
    async fn run_tick(&mut self) {
        let output = self.game.tick();
        let updates = self.broadcaster.build_updates(&self.game, &output);
        if updates.is_empty() {
            return;
        }
        let mut clients = self.clients.write().await;
        for (player_id, update) in updates {
            clients.send_to_player(player_id, ServerPacket::Update(update));
        }
    }

    async fn shutdown(&mut self) {
        let clients = self.clients.write().await.drain();
        let mut writers = Vec::with_capacity(clients.len());
        for client in clients {
            writers.extend(client.close(CloseReason::ServerShutdown));
        }
        let deadline = tokio::time::Instant::now() + SHUTDOWN_FLUSH;
        for writer in writers {
            if tokio::time::timeout_at(deadline, writer).await.is_err() {
                warn!("Gave up waiting for writers to flush");
                break;
            }
        }
    }

    /// Runs the main loop until Ctrl-C or [`ServerMessage::Shutdown`].
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let listener = self
            .listener
            .take()
            .ok_or("server is already running")?;
        self.spawn_acceptor(listener);
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        info!(
            "Running map '{}' at {} ms per tick",
            self.game.world.name(),
            self.config.tick_duration.as_millis()
        );

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::ConnectionOpened { conn_id, addr, reader, sender, writer }) => {
                            self.handle_connection_opened(conn_id, addr, reader, sender, writer).await;
                        }
                        Some(ServerMessage::PacketReceived { conn_id, packet }) => {
                            self.handle_packet(conn_id, packet).await;
                        }
                        Some(ServerMessage::ConnectionClosed { conn_id, reason }) => {
                            self.close_connection(conn_id, reason).await;
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.run_tick().await;
                },

                result = &mut ctrl_c => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl-C: {}", e);
                    }
                    info!("Received Ctrl-C, shutting down");
                    break;
                },
            }
        }

        self.shutdown().await;
        Ok(())
    }
}

async fn reject_connection(mut stream: TcpStream, reason: CloseReason) {
    let notice = ServerPacket::Disconnected { reason };
    if let Err(e) = write_frame(&mut stream, &notice).await {
        debug!("Could not deliver close notice: {}", e);
    }
    let _ = stream.shutdown().await;
}

/// Drains a connection's outbound queue onto the socket. Stops after a
/// close notice, on a write error, or when every sender is gone.
async fn write_packets(
    conn_id: u32,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<ServerPacket>,
) {
    while let Some(packet) = outbound.recv().await {
        let closing = matches!(packet, ServerPacket::Disconnected { .. });
        if let Err(e) = write_frame(&mut writer, &packet).await {
            debug!("Write to client {} failed: {}", conn_id, e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

/// Skips a payload the server will not decode. Returns false on EOF.
async fn discard<R: AsyncRead + Unpin>(reader: &mut R, len: usize) -> io::Result<bool> {
    let skipped = tokio::io::copy(&mut reader.take(len as u64), &mut tokio::io::sink()).await?;
    Ok(skipped == len as u64)
}

/// Reads frames, applies the ingress limits and forwards decoded packets.
/// Always ends by reporting the connection closed.
async fn read_packets(
    conn_id: u32,
    mut reader: OwnedReadHalf,
    mut ingress: ConnectionIngress,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let reason = loop {
        let len = match reader.read_u32().await {
            Ok(len) => len as usize,
            Err(_) => break CloseReason::ClientRequested,
        };

        if let Err(err) = ingress.admit(len, Instant::now()) {
            // The payload is never read, so the stream cannot be resynchronised.
            if let IngressError::Oversized(_) = err {
                warn!("Closing connection {}: {}", conn_id, err);
                break CloseReason::TooManyInvalidMessages;
            }
            match discard(&mut reader, len).await {
                Ok(true) => {}
                _ => break CloseReason::ClientRequested,
            }
            match ingress.reject(conn_id, &err) {
                Verdict::Drop => continue,
                Verdict::Disconnect => break CloseReason::TooManyInvalidMessages,
            }
        }

        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).await.is_err() {
            break CloseReason::ClientRequested;
        }
        match decode_packet::<ClientPacket>(&payload) {
            Ok(packet) => {
                ingress.accept();
                if server_tx
                    .send(ServerMessage::PacketReceived { conn_id, packet })
                    .is_err()
                {
                    return;
                }
            }
            Err(e) => {
                let err = IngressError::from(e);
                debug!("Dropping frame from client {}: {}", conn_id, err);
                if ingress.reject(conn_id, &err) == Verdict::Disconnect {
                    break CloseReason::TooManyInvalidMessages;
                }
            }
        }
    };
    let _ = server_tx.send(ServerMessage::ConnectionClosed { conn_id, reason });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::maps;
    use shared::{InputState, UpdateMessage};

    #[test]
    fn test_frame_roundtrip_in_memory() {
        let packet = ClientPacket::Input(InputState {
            sequence: 3,
            accelerate: true,
            ..Default::default()
        });
        let mut buffer = Vec::new();
        tokio_test::block_on(write_frame(&mut buffer, &packet)).unwrap();

        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, buffer.len() - 4);

        let mut slice = buffer.as_slice();
        let decoded: ClientPacket = tokio_test::block_on(read_frame(&mut slice)).unwrap();
        assert_eq!(decoded, packet);
    }

    #[test]
    fn test_truncated_frame_is_an_error() {
        let packet = ServerPacket::Update(UpdateMessage::new(9));
        let mut buffer = Vec::new();
        tokio_test::block_on(write_frame(&mut buffer, &packet)).unwrap();
        buffer.truncate(buffer.len() - 1);

        let mut slice = buffer.as_slice();
        let result: io::Result<ServerPacket> = tokio_test::block_on(read_frame(&mut slice));
        assert!(result.is_err());
    }

    #[test]
    fn test_discard_reports_short_payload() {
        let data = [0u8; 8];
        let mut slice = &data[..];
        assert!(tokio_test::block_on(discard(&mut slice, 5)).unwrap());
        assert!(!tokio_test::block_on(discard(&mut slice, 5)).unwrap());
    }

    #[tokio::test]
    async fn test_oversized_prefix_closes_without_reading_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        let (reader, _writer) = accepted.into_split();

        let limits = crate::config::IngressLimits {
            max_frame_bytes: 64,
            ..Default::default()
        };
        let ingress = ConnectionIngress::new(&limits, Instant::now());
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(read_packets(4, reader, ingress, tx));

        client.write_u32(u32::MAX).await.unwrap();
        let message = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            message,
            ServerMessage::ConnectionClosed {
                conn_id: 4,
                reason: CloseReason::TooManyInvalidMessages
            }
        ));
    }

    #[test]
    fn test_startup_bots_shared_team() {
        let mut game = GameState::new(maps::open_field(), 1);
        let policy = BotPolicy {
            startup_bots: 3,
            max_bots: 3,
            alliance_mode: AllianceMode::SharedTeam,
            startup_profile: "patrol".to_string(),
            ..Default::default()
        };
        game.set_max_bots(policy.bot_limit());

        assert_eq!(spawn_startup_bots(&mut game, &policy), 3);
        let teams: Vec<_> = game.players.values().map(|p| p.team).collect();
        assert!(teams.iter().all(|&t| t == teams[0]));
    }

    #[test]
    fn test_startup_bots_respect_policy() {
        let mut game = GameState::new(maps::open_field(), 1);
        let policy = BotPolicy {
            allow_bots: false,
            startup_bots: 2,
            ..Default::default()
        };
        game.set_max_bots(policy.bot_limit());
        assert_eq!(spawn_startup_bots(&mut game, &policy), 0);
        assert!(game.players.is_empty());

        let mut game = GameState::new(maps::open_field(), 1);
        let policy = BotPolicy {
            startup_bots: 2,
            ..Default::default()
        };
        game.set_max_bots(policy.bot_limit());
        assert_eq!(spawn_startup_bots(&mut game, &policy), 2);
        let teams: Vec<_> = game.players.values().map(|p| p.team).collect();
        assert_ne!(teams[0], teams[1]);
    }
}
