use crate::game::ClientGameState;
use crate::input::{FireEdge, InputManager};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::{CharacterInput, Packet, MAX_DATAGRAM_SIZE, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::{interval, sleep};

const FRAME: Duration = Duration::from_millis(16);

/// Scripted stand-in for a player: walks a slow circle and fires in bursts.
#[derive(Debug, Default)]
pub struct Autopilot {
    elapsed: f32,
}

impl Autopilot {
    /// Length of one walk / burst / strafe cycle in seconds.
    pub const CYCLE: f32 = 4.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn drive(&mut self, dt: f32, input: &mut InputManager) {
        self.elapsed = (self.elapsed + dt) % Self::CYCLE;

        match self.elapsed {
            t if t < 2.0 => {
                input.move_forward(1.0);
                input.move_right(0.0);
                input.turn_at_rate(0.3);
                input.fire_button_released();
            }
            t if t < 3.0 => {
                input.move_forward(0.0);
                input.turn_at_rate(0.0);
                input.fire_button_pressed();
            }
            _ => {
                input.move_right(1.0);
                input.fire_button_released();
            }
        }
    }
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    connected: bool,

    game_state: ClientGameState,
    input_manager: InputManager,
    autopilot: Option<Autopilot>,

    ping_ms: u64,
    fake_ping_ms: u64,
    drop_rate: f64,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        fake_ping_ms: u64,
        drop_rate: f64,
        autopilot: bool,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            connected: false,
            game_state: ClientGameState::new(),
            input_manager: InputManager::new(),
            autopilot: autopilot.then(Autopilot::new),
            ping_ms: 0,
            fake_ping_ms,
            drop_rate: if drop_rate.is_nan() { 0.0 } else { drop_rate.clamp(0.0, 1.0) },
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn input_manager(&mut self) -> &mut InputManager {
        &mut self.input_manager
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn ping_ms(&self) -> u64 {
        self.ping_ms
    }

    async fn connect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Connecting to server...");

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
        };
        self.send_packet(&packet).await?;

        Ok(())
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        if self.fake_ping_ms > 0 {
            sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
        }

        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    /// Simulated loss only applies to snapshots; they are superseded by the
    /// next one anyway.
    fn should_drop(&self, packet: &Packet) -> bool {
        matches!(packet, Packet::GameState { .. })
            && self.drop_rate > 0.0
            && rand::thread_rng().gen_bool(self.drop_rate)
    }

    pub fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Connected { client_id, config } => {
                info!("Connected! Client ID: {}", client_id);
                debug!("Loadout: {:?}", config);
                self.game_state.on_connected(client_id, config);
                self.connected = true;
            }

            Packet::GameState {
                tick,
                timestamp,
                last_processed_input,
                characters,
                projectiles,
            } => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or(Duration::from_secs(0))
                    .as_millis() as u64;

                if timestamp > 0 {
                    self.ping_ms = now.saturating_sub(timestamp);
                }

                self.game_state
                    .apply_server_state(tick, characters, projectiles, &last_processed_input);
            }

            Packet::ProjectileDestroyed {
                projectile_id,
                position,
            } => {
                debug!("Projectile {} exploded at {:?}", projectile_id, position);
                self.game_state.apply_explosion(projectile_id, position);
            }

            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.game_state = ClientGameState::new();
            }

            _ => {
                warn!("Unexpected packet type");
            }
        }
    }

    async fn send_input(&mut self, input: CharacterInput) -> Result<(), Box<dyn std::error::Error>> {
        if !self.connected {
            return Ok(());
        }

        self.send_packet(&Packet::input(&input)).await?;
        self.game_state.apply_prediction(&input);
        Ok(())
    }

    /// Runs one input frame: trigger edges, the local fire clock, then
    /// movement. Returns the fire requests to send.
    fn step_frame(&mut self, dt: Duration) -> u32 {
        if let Some(autopilot) = self.autopilot.as_mut() {
            autopilot.drive(dt.as_secs_f32(), &mut self.input_manager);
        }

        let mut fire_requests = 0;
        for edge in self.input_manager.take_fire_edges() {
            match edge {
                FireEdge::Pressed => {
                    if self.game_state.fire_button_pressed() {
                        fire_requests += 1;
                    }
                }
                FireEdge::Released => self.game_state.fire_button_released(),
            }
        }
        fire_requests + self.game_state.update(dt)
    }

    fn log_hud(&self) {
        for event in self.game_state.drain_hud_events() {
            if event.change.crossed_zero() {
                info!("Player {} was defeated", event.character_id);
            }
        }

        if let Some((health, max_health)) = self.game_state.hud_health() {
            info!(
                "HUD: health {:.0}/{:.0}, ping {}ms, {} players, {} projectiles",
                health,
                max_health,
                self.ping_ms,
                self.game_state.characters.len(),
                self.game_state.projectiles.len()
            );
        }
    }

    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.connect().await?;

        let mut input_interval = interval(FRAME);
        let mut connect_interval = interval(Duration::from_secs(1));
        let mut hud_interval = interval(Duration::from_secs(1));

        // The first tick fires immediately and the initial Connect is already out.
        connect_interval.tick().await;

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => {
                            if self.fake_ping_ms > 0 {
                                sleep(Duration::from_millis(self.fake_ping_ms / 2)).await;
                            }

                            match deserialize::<Packet>(&buffer[0..len]) {
                                Ok(packet) if self.should_drop(&packet) => {
                                    debug!("Simulated loss of a snapshot");
                                }
                                Ok(packet) => self.handle_packet(packet),
                                Err(e) => warn!("Failed to deserialize packet: {}", e),
                            }
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = input_interval.tick() => {
                    if self.connected {
                        let fire_requests = self.step_frame(FRAME);
                        for _ in 0..fire_requests {
                            if let Err(e) = self.send_packet(&Packet::FireRequest).await {
                                error!("Error sending fire request: {}", e);
                            }
                        }

                        let input = self.input_manager.sample();
                        if let Err(e) = self.send_input(input).await {
                            error!("Error sending input: {}", e);
                        }
                    }
                },

                _ = connect_interval.tick() => {
                    if !self.connected {
                        self.connect().await?;
                    }
                },

                _ = hud_interval.tick() => {
                    self.log_hud();
                },

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                },
            }
        }

        if self.connected {
            let _ = self.send_packet(&Packet::Disconnect).await;
        }

        Ok(())
    }
}
