use crate::error::ConfigError;
use crate::health::{DamageEvent, DamageKind, HealthModel};
use crate::math::Vec3;
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Projectile class selected by a character's loadout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectileKind {
    #[default]
    Sphere,
    Heavy,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectileParams {
    pub speed: f32,
    pub radius: f32,
    /// Seconds before the projectile despawns on its own.
    pub lifespan: f32,
}

impl ProjectileKind {
    pub fn params(self) -> ProjectileParams {
        match self {
            ProjectileKind::Sphere => ProjectileParams {
                speed: 1500.0,
                radius: 37.5,
                lifespan: 3.0,
            },
            ProjectileKind::Heavy => ProjectileParams {
                speed: 900.0,
                radius: 60.0,
                lifespan: 5.0,
            },
        }
    }
}

impl fmt::Display for ProjectileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectileKind::Sphere => f.write_str("sphere"),
            ProjectileKind::Heavy => f.write_str("heavy"),
        }
    }
}

impl FromStr for ProjectileKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sphere" => Ok(ProjectileKind::Sphere),
            "heavy" => Ok(ProjectileKind::Heavy),
            _ => Err(ConfigError::UnknownProjectileKind(s.to_string())),
        }
    }
}

/// Presentation cue emitted when a projectile ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum EffectCue {
    Explosion { projectile_id: u32, position: Vec3 },
}

/// Receives presentation cues. Implemented by whatever plays effects.
pub trait EffectSink {
    fn emit(&mut self, cue: EffectCue);
}

impl EffectSink for Vec<EffectCue> {
    fn emit(&mut self, cue: EffectCue) {
        self.push(cue);
    }
}

/// Result of the first impact of a projectile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactReport {
    pub projectile_id: u32,
    pub instigator: u32,
    pub damage: f32,
    pub damage_kind: DamageKind,
    /// Health left on the target, if the target had health and accepted damage.
    pub remaining_health: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileSnapshot {
    pub id: u32,
    pub owner: u32,
    pub kind: ProjectileKind,
    pub position: Vec3,
    pub velocity: Vec3,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: u32,
    /// Character that fired this projectile. Attribution only.
    pub owner: u32,
    pub kind: ProjectileKind,
    pub position: Vec3,
    pub velocity: Vec3,
    pub radius: f32,
    pub damage: f32,
    pub damage_kind: DamageKind,
    remaining_lifespan: f32,
    has_exploded: bool,
    destroyed: bool,
}

impl Projectile {
    pub fn spawn(
        id: u32,
        owner: u32,
        origin: Vec3,
        direction: Vec3,
        kind: ProjectileKind,
        damage: f32,
        damage_kind: DamageKind,
    ) -> Self {
        let params = kind.params();
        Self {
            id,
            owner,
            kind,
            position: origin,
            velocity: direction.normalize() * params.speed,
            radius: params.radius,
            damage,
            damage_kind,
            remaining_lifespan: params.lifespan,
            has_exploded: false,
            destroyed: false,
        }
    }

    pub fn has_exploded(&self) -> bool {
        self.has_exploded
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub fn remaining_lifespan(&self) -> f32 {
        self.remaining_lifespan
    }

    /// Integrates motion. Returns false once the lifespan has run out.
    pub fn tick(&mut self, dt: f32) -> bool {
        if self.destroyed {
            return false;
        }

        self.position += self.velocity * dt;
        self.remaining_lifespan -= dt;
        self.remaining_lifespan > 0.0
    }

    /// Handles the first impact and destroys the projectile.
    ///
    /// Damages `target` when it has health. Any later call is a stale impact
    /// and returns `None` without touching anything.
    pub fn on_impact(
        &mut self,
        target: Option<&mut HealthModel>,
        effects: &mut dyn EffectSink,
    ) -> Option<ImpactReport> {
        if self.has_exploded {
            trace!("Ignoring stale impact on projectile {}", self.id);
            return None;
        }
        self.has_exploded = true;

        let remaining_health = target.and_then(|health| {
            let event = DamageEvent {
                amount: self.damage,
                kind: self.damage_kind,
                instigator: Some(self.owner),
            };
            health.take_damage(&event).ok()
        });

        self.destroy(effects);

        Some(ImpactReport {
            projectile_id: self.id,
            instigator: self.owner,
            damage: self.damage,
            damage_kind: self.damage_kind,
            remaining_health,
        })
    }

    /// Removes the projectile from play. Safe to call more than once.
    pub fn destroy(&mut self, effects: &mut dyn EffectSink) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.on_destroyed(effects);
    }

    // Every end of life is marked, impact or expiry.
    fn on_destroyed(&self, effects: &mut dyn EffectSink) {
        effects.emit(EffectCue::Explosion {
            projectile_id: self.id,
            position: self.position,
        });
    }

    pub fn snapshot(&self) -> ProjectileSnapshot {
        ProjectileSnapshot {
            id: self.id,
            owner: self.owner,
            kind: self.kind,
            position: self.position,
            velocity: self.velocity,
        }
    }
}
