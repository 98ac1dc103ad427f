//! Server network layer handling UDP communications and game loop coordination

use crate::client_manager::ClientManager;
use crate::game::GameState;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{CharacterConfig, CharacterInput, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: u32 },
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    game_state: GameState,
    tick_duration: Duration,
    /// Wall-clock origin of the simulation clock.
    started: Instant,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: CharacterConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game_state: GameState::new(config),
            tick_duration,
            started: Instant::now(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.get_client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    fn broadcast_packet(&self, packet: Packet, exclude: Option<u32>) {
        if let Err(e) = self
            .game_tx
            .send(GameMessage::BroadcastPacket { packet, exclude })
        {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Brings the simulation clock up to wall time, closing cooldowns that
    /// ended since the last tick.
    fn sync_clock(&mut self) {
        self.game_state.advance_clock_to(self.started.elapsed());
    }

    async fn client_id_for(&self, addr: SocketAddr) -> Option<u32> {
        let clients = self.clients.read().await;
        clients.find_client_by_addr(addr)
    }

    /// Processes incoming packets and updates game state
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                if client_version != PROTOCOL_VERSION {
                    warn!(
                        "Rejecting {}: protocol {} != {}",
                        addr, client_version, PROTOCOL_VERSION
                    );
                    let response = Packet::Disconnected {
                        reason: "Protocol version mismatch".to_string(),
                    };
                    self.send_packet(response, addr);
                    return;
                }

                // Remove existing connection if present
                if let Some(existing_id) = self.client_id_for(addr).await {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&existing_id);
                    self.game_state.remove_player(&existing_id);
                }

                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                let response = match client_id {
                    Some(client_id) => {
                        self.game_state.add_player(client_id);
                        Packet::Connected {
                            client_id,
                            config: *self.game_state.config(),
                        }
                    }
                    None => Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                };
                self.send_packet(response, addr);
            }

            Packet::Input {
                sequence,
                timestamp,
                move_forward,
                move_right,
                turn_rate,
                look_up_rate,
            } => {
                if let Some(client_id) = self.client_id_for(addr).await {
                    let input = CharacterInput {
                        sequence,
                        timestamp,
                        move_forward,
                        move_right,
                        turn_rate,
                        look_up_rate,
                    };

                    let mut clients = self.clients.write().await;
                    clients.add_input(client_id, input);
                }
            }

            Packet::FireRequest => match self.client_id_for(addr).await {
                Some(client_id) => {
                    self.clients.write().await.touch(client_id);
                    self.sync_clock();
                    if let Some(projectile_id) = self.game_state.handle_fire_request(client_id) {
                        debug!("Client {} spawned projectile {}", client_id, projectile_id);
                    }
                }
                None => debug!("Fire request from unknown address {}", addr),
            },

            Packet::Disconnect => {
                if let Some(client_id) = self.client_id_for(addr).await {
                    let mut clients = self.clients.write().await;
                    clients.remove_client(&client_id);
                    self.game_state.remove_player(&client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Applies queued inputs in arrival order, then advances the world.
    /// Projectiles move by the tick's `dt`; the clock follows wall time.
    async fn process_inputs(&mut self, dt: Duration) {
        let all_inputs = {
            let clients = self.clients.read().await;
            clients.get_chronological_inputs()
        };

        if !all_inputs.is_empty() {
            let mut clients = self.clients.write().await;
            for (client_id, input) in &all_inputs {
                self.game_state.apply_input(*client_id, input);
                clients.mark_input_processed(*client_id, input.sequence);
            }
            clients.cleanup_processed_inputs();
        }

        self.sync_clock();
        self.game_state.simulate(dt);
    }

    /// Broadcasts current game state and pending effect cues
    async fn broadcast_game_state(&mut self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        let effects = self.game_state.drain_effects();
        if client_count == 0 {
            return;
        }

        let last_processed_input = {
            let clients = self.clients.read().await;
            clients.get_last_processed_inputs()
        };

        // Take timestamp as close to transmission as possible
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis();
        let timestamp_safe = (timestamp.min(u64::MAX as u128)) as u64;

        let packet = Packet::GameState {
            tick: self.game_state.tick,
            timestamp: timestamp_safe,
            last_processed_input,
            characters: self.game_state.character_snapshots(),
            projectiles: self.game_state.projectile_snapshots(),
        };
        self.broadcast_packet(packet, None);

        for cue in effects {
            self.broadcast_packet(Packet::from(cue), None);
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.game_state.remove_player(&client_id);
                        },
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick);
                    last_tick = now;

                    self.process_inputs(dt).await;
                    self.game_state.tick += 1;
                    self.broadcast_game_state().await;

                    // Periodic performance monitoring
                    if self.game_state.tick % 60 == 0 {
                        let client_count = {
                            let clients = self.clients.read().await;
                            clients.len()
                        };

                        if client_count > 0 {
                            debug!("Tick {}: {} clients, {} projectiles, {:.1}Hz",
                                   self.game_state.tick, client_count,
                                   self.game_state.projectiles.len(),
                                   1.0 / dt.as_secs_f32().max(f32::EPSILON));
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    async fn test_server() -> Server {
        Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            4,
            CharacterConfig::default(),
        )
        .await
        .unwrap()
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
    }

    fn next_outgoing(server: &mut Server) -> Packet {
        match server.game_rx.try_recv().unwrap() {
            GameMessage::SendPacket { packet, .. } => packet,
            GameMessage::BroadcastPacket { packet, .. } => packet,
        }
    }

    #[tokio::test]
    async fn test_connect_assigns_id_and_loadout() {
        let mut server = test_server().await;

        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, peer(9000))
            .await;

        match next_outgoing(&mut server) {
            Packet::Connected { client_id, config } => {
                assert_eq!(client_id, 1);
                assert_eq!(config, CharacterConfig::default());
            }
            other => panic!("Unexpected packet: {:?}", other),
        }
        assert!(server.game_state.characters.contains_key(&1));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_refused() {
        let mut server = test_server().await;

        server
            .handle_packet(Packet::Connect { client_version: 999 }, peer(9000))
            .await;

        assert!(matches!(
            next_outgoing(&mut server),
            Packet::Disconnected { .. }
        ));
        assert!(server.game_state.characters.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_character() {
        let mut server = test_server().await;
        let addr = peer(9000);

        for _ in 0..2 {
            server
                .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
                .await;
        }

        assert_eq!(server.clients.read().await.len(), 1);
        assert_eq!(server.game_state.characters.len(), 1);
        assert!(server.game_state.characters.contains_key(&2));
    }

    #[tokio::test]
    async fn test_fire_request_spawns_once_per_cooldown() {
        let mut server = test_server().await;
        let addr = peer(9000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
            .await;

        server.handle_packet(Packet::FireRequest, addr).await;
        server.handle_packet(Packet::FireRequest, addr).await;

        assert_eq!(server.game_state.projectiles.len(), 1);
    }

    #[tokio::test]
    async fn test_fire_request_between_ticks_uses_arrival_time() {
        let config = CharacterConfig {
            fire_rate_seconds: 0.05,
            ..CharacterConfig::default()
        };
        let mut server = Server::new("127.0.0.1:0", Duration::from_millis(16), 4, config)
            .await
            .unwrap();
        let addr = peer(9000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
            .await;

        server.handle_packet(Packet::FireRequest, addr).await;
        // No tick runs in between.
        tokio::time::sleep(Duration::from_millis(80)).await;
        server.handle_packet(Packet::FireRequest, addr).await;

        assert_eq!(server.game_state.projectiles.len(), 2);
    }

    #[tokio::test]
    async fn test_fire_request_from_stranger_ignored() {
        let mut server = test_server().await;

        server.handle_packet(Packet::FireRequest, peer(9001)).await;

        assert!(server.game_state.projectiles.is_empty());
    }

    #[tokio::test]
    async fn test_inputs_processed_and_acknowledged() {
        let mut server = test_server().await;
        let addr = peer(9000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
            .await;

        for sequence in 1..=3 {
            let input = CharacterInput {
                move_forward: 1.0,
                ..CharacterInput::idle(sequence, sequence as u64)
            };
            server.handle_packet(Packet::input(&input), addr).await;
        }
        server.process_inputs(Duration::from_millis(16)).await;

        let acknowledged = server.clients.read().await.get_last_processed_inputs();
        assert_eq!(acknowledged.get(&1), Some(&3));
    }

    #[tokio::test]
    async fn test_disconnect_removes_player() {
        let mut server = test_server().await;
        let addr = peer(9000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
            .await;

        server.handle_packet(Packet::Disconnect, addr).await;

        assert!(server.clients.read().await.is_empty());
        assert!(server.game_state.characters.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_includes_explosion_cues() {
        let mut server = test_server().await;
        let addr = peer(9000);
        server
            .handle_packet(Packet::Connect { client_version: PROTOCOL_VERSION }, addr)
            .await;
        let _connected = next_outgoing(&mut server);

        server.handle_packet(Packet::FireRequest, addr).await;
        // Outlive the projectile.
        for _ in 0..4 {
            server.process_inputs(Duration::from_secs(1)).await;
        }
        server.broadcast_game_state().await;

        assert!(matches!(next_outgoing(&mut server), Packet::GameState { .. }));
        assert!(matches!(
            next_outgoing(&mut server),
            Packet::ProjectileDestroyed { projectile_id: 1, .. }
        ));
    }

    #[test]
    fn test_timestamp_generation() {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        assert!(timestamp > 0);

        // Test timestamp safety conversion
        let large_timestamp = u128::MAX;
        let safe_timestamp = (large_timestamp.min(u64::MAX as u128)) as u64;
        assert_eq!(safe_timestamp, u64::MAX);
    }

    #[test]
    fn test_channel_communication() {
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

        let addr = peer(8080);
        assert!(tx
            .send(ServerMessage::PacketReceived {
                packet: Packet::FireRequest,
                addr,
            })
            .is_ok());

        match rx.try_recv().unwrap() {
            ServerMessage::PacketReceived { packet, addr: a } => {
                assert_eq!(a, addr);
                assert!(matches!(packet, Packet::FireRequest));
            }
            _ => panic!("Unexpected message type"),
        }
    }
}
