//! Character composition and movement.
//!
//! A [`Character`] owns exactly one [`HealthModel`] and one [`FireControl`]
//! and carries the transform the server derives aim from. Movement is the
//! same function on both sides so clients can predict their own character.

use crate::error::ConfigError;
use crate::fire_control::FireControl;
use crate::health::{DamageKind, HealthModel};
use crate::math::{Rotator, Vec3};
use crate::projectile::ProjectileKind;
use crate::replication::ReplicatedValue;
use crate::role::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CAPSULE_RADIUS: f32 = 42.0;
pub const CAPSULE_HALF_HEIGHT: f32 = 96.0;
pub const ARENA_HALF_EXTENT: f32 = 2000.0;
pub const MUZZLE_FORWARD_OFFSET: f32 = 100.0;
pub const MUZZLE_UP_OFFSET: f32 = 50.0;
pub const MAX_PITCH: f32 = 89.0;
/// Longest accepted cooldown between shots, in seconds.
pub const MAX_FIRE_RATE_SECONDS: f32 = 3600.0;

/// Loadout and movement tuning, fixed at spawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    pub max_health: f32,
    pub fire_rate_seconds: f32,
    pub damage: f32,
    pub damage_kind: DamageKind,
    pub projectile_kind: ProjectileKind,
    pub walk_speed: f32,
    /// Degrees per second at full turn input.
    pub base_turn_rate: f32,
    /// Degrees per second at full look input.
    pub base_look_up_rate: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            fire_rate_seconds: 0.25,
            damage: 10.0,
            damage_kind: DamageKind::Generic,
            projectile_kind: ProjectileKind::Sphere,
            walk_speed: 600.0,
            base_turn_rate: 45.0,
            base_look_up_rate: 45.0,
        }
    }
}

impl CharacterConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_health.is_finite() || self.max_health <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "max_health",
                value: self.max_health,
                reason: "must be positive",
            });
        }
        if !self.fire_rate_seconds.is_finite() || self.fire_rate_seconds < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "fire_rate_seconds",
                value: self.fire_rate_seconds,
                reason: "must be zero or positive",
            });
        }
        if self.fire_rate_seconds > MAX_FIRE_RATE_SECONDS {
            return Err(ConfigError::InvalidValue {
                field: "fire_rate_seconds",
                value: self.fire_rate_seconds,
                reason: "must be at most one hour",
            });
        }
        if !self.damage.is_finite() {
            return Err(ConfigError::InvalidValue {
                field: "damage",
                value: self.damage,
                reason: "must be finite",
            });
        }
        for (field, value) in [
            ("walk_speed", self.walk_speed),
            ("base_turn_rate", self.base_turn_rate),
            ("base_look_up_rate", self.base_look_up_rate),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    value,
                    reason: "must be zero or positive",
                });
            }
        }
        Ok(())
    }

    pub fn fire_rate(&self) -> Duration {
        FireControl::from_seconds(self.fire_rate_seconds).fire_rate()
    }
}

/// Movement input for one client frame. Axes are in [-1, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CharacterInput {
    pub sequence: u32,
    pub timestamp: u64,
    pub move_forward: f32,
    pub move_right: f32,
    pub turn_rate: f32,
    pub look_up_rate: f32,
}

impl CharacterInput {
    pub fn idle(sequence: u32, timestamp: u64) -> Self {
        Self {
            sequence,
            timestamp,
            move_forward: 0.0,
            move_right: 0.0,
            turn_rate: 0.0,
            look_up_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub id: u32,
    pub position: Vec3,
    pub rotation: Rotator,
    pub max_health: f32,
    pub health: ReplicatedValue<f32>,
}

fn axis(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Advances a transform by one input frame.
pub fn step_movement(
    position: &mut Vec3,
    rotation: &mut Rotator,
    input: &CharacterInput,
    config: &CharacterConfig,
    dt: f32,
) {
    rotation.yaw += axis(input.turn_rate) * config.base_turn_rate * dt;
    rotation.pitch = (rotation.pitch + axis(input.look_up_rate) * config.base_look_up_rate * dt)
        .clamp(-MAX_PITCH, MAX_PITCH);
    *rotation = rotation.normalized();

    let mut direction = rotation.planar_forward() * axis(input.move_forward)
        + rotation.planar_right() * axis(input.move_right);
    if direction.magnitude_squared() > 1.0 {
        direction = direction.normalize();
    }

    *position += direction * (config.walk_speed * dt);
    position.x = position.x.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
    position.y = position.y.clamp(-ARENA_HALF_EXTENT, ARENA_HALF_EXTENT);
}

#[derive(Debug)]
pub struct Character {
    pub id: u32,
    /// Capsule center.
    pub position: Vec3,
    pub rotation: Rotator,
    pub health: HealthModel,
    pub fire: FireControl,
    config: CharacterConfig,
}

impl Character {
    pub fn new(
        id: u32,
        role: Role,
        position: Vec3,
        rotation: Rotator,
        config: CharacterConfig,
    ) -> Self {
        Self {
            id,
            position,
            rotation,
            health: HealthModel::new(role, config.max_health),
            fire: FireControl::new(config.fire_rate()),
            config,
        }
    }

    /// Spawns standing on the floor at `x, y`.
    pub fn spawn_at(id: u32, role: Role, x: f32, y: f32, yaw: f32, config: CharacterConfig) -> Self {
        Self::new(
            id,
            role,
            Vec3::new(x, y, CAPSULE_HALF_HEIGHT),
            Rotator::new(yaw, 0.0),
            config,
        )
    }

    pub fn role(&self) -> Role {
        self.health.role()
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub fn apply_input(&mut self, input: &CharacterInput, dt: f32) {
        step_movement(
            &mut self.position,
            &mut self.rotation,
            input,
            &self.config,
            dt,
        );
    }

    /// Spawn point and aim direction for a shot, from the current transform.
    pub fn muzzle(&self) -> (Vec3, Vec3) {
        let forward = self.rotation.forward();
        let origin =
            self.position + forward * MUZZLE_FORWARD_OFFSET + Vec3::UP * MUZZLE_UP_OFFSET;
        (origin, forward)
    }

    /// Sphere vs. vertical capsule test.
    pub fn overlaps_sphere(&self, center: Vec3, radius: f32) -> bool {
        let half_segment = CAPSULE_HALF_HEIGHT - CAPSULE_RADIUS;
        let z = center
            .z
            .clamp(self.position.z - half_segment, self.position.z + half_segment);
        let closest = Vec3::new(self.position.x, self.position.y, z);
        center.distance(&closest) <= CAPSULE_RADIUS + radius
    }

    pub fn snapshot(&self) -> CharacterSnapshot {
        CharacterSnapshot {
            id: self.id,
            position: self.position,
            rotation: self.rotation,
            max_health: self.health.max_health(),
            health: self.health.replicate(),
        }
    }
}
