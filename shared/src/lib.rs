pub mod character;
pub mod error;
pub mod fire_control;
pub mod health;
pub mod math;
pub mod projectile;
pub mod replication;
pub mod role;
pub mod scheduler;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use character::{Character, CharacterConfig, CharacterInput, CharacterSnapshot};
pub use error::{AuthorityError, ConfigError};
pub use fire_control::{FireControl, FireState};
pub use health::{DamageEvent, DamageKind, HealthChange, HealthModel};
pub use math::{Rotator, Vec3};
pub use projectile::{EffectCue, EffectSink, ImpactReport, Projectile, ProjectileKind, ProjectileSnapshot};
pub use replication::{Change, Replicated, ReplicatedValue};
pub use role::Role;
pub use scheduler::{Scheduler, SimScheduler, TimerHandle};

pub const PROTOCOL_VERSION: u32 = 1;
/// Largest UDP payload over IPv4. Receive buffers use this size because a
/// snapshot carries every live projectile.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
pub const FLOOR_Z: f32 = 0.0;
/// Simulation step represented by one client input frame.
pub const INPUT_DT: f32 = 1.0 / 60.0;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Packet {
    Connect {
        client_version: u32,
    },
    Input {
        sequence: u32,
        timestamp: u64,
        move_forward: f32,
        move_right: f32,
        turn_rate: f32,
        look_up_rate: f32,
    },
    /// Remote fire request. The sender's identity is the only payload; the
    /// server derives aim and timing on its own.
    FireRequest,
    Disconnect,

    Connected {
        client_id: u32,
        config: CharacterConfig,
    },
    GameState {
        tick: u32,
        timestamp: u64,
        last_processed_input: HashMap<u32, u32>,
        characters: Vec<CharacterSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
    },
    ProjectileDestroyed {
        projectile_id: u32,
        position: Vec3,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    pub fn input(input: &CharacterInput) -> Self {
        Packet::Input {
            sequence: input.sequence,
            timestamp: input.timestamp,
            move_forward: input.move_forward,
            move_right: input.move_right,
            turn_rate: input.turn_rate,
            look_up_rate: input.look_up_rate,
        }
    }
}

impl From<EffectCue> for Packet {
    fn from(cue: EffectCue) -> Self {
        match cue {
            EffectCue::Explosion {
                projectile_id,
                position,
            } => Packet::ProjectileDestroyed {
                projectile_id,
                position,
            },
        }
    }
}
