//! Server-side validation and execution of fire requests.
//!
//! A client's own fire gate only exists for responsiveness. The request that
//! reaches the server carries nothing but the sender's identity; the server
//! re-runs the character's fire gate on its own clock and derives the shot
//! from the character's authoritative transform and loadout.

use log::{debug, info};
use shared::{AuthorityError, Character, Projectile, Role, Scheduler};

#[derive(Debug)]
pub enum FireOutcome {
    Spawned(Projectile),
    /// Arrived before the server-side cooldown elapsed. Dropped.
    RateLimited,
    /// The requesting character no longer exists. Dropped.
    UnknownCharacter,
}

#[derive(Debug, Clone, Copy)]
pub struct AttackAuthority {
    role: Role,
}

impl AttackAuthority {
    pub fn new(role: Role) -> Self {
        Self { role }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Validates one fire request and spawns the projectile.
    ///
    /// Each request is a single shot: the server gate is started and released
    /// immediately, so sustained fire only passes as fast as the cooldown
    /// allows. `next_projectile_id` is only consumed when a projectile spawns.
    pub fn handle_fire_request<S: Scheduler + ?Sized>(
        &self,
        requester: u32,
        character: Option<&mut Character>,
        scheduler: &mut S,
        next_projectile_id: &mut u32,
    ) -> Result<FireOutcome, AuthorityError> {
        self.role.require_authority("handle_fire_request")?;

        let Some(character) = character else {
            debug!("Dropping fire request from departed character {}", requester);
            return Ok(FireOutcome::UnknownCharacter);
        };

        if !character.fire.start(scheduler) {
            debug!(
                "Dropping fire request from {} at {:?}: cooling down",
                requester,
                scheduler.now()
            );
            return Ok(FireOutcome::RateLimited);
        }
        character.fire.stop();

        let (origin, direction) = character.muzzle();
        let loadout = character.config();
        let projectile = Projectile::spawn(
            *next_projectile_id,
            character.id,
            origin,
            direction,
            loadout.projectile_kind,
            loadout.damage,
            loadout.damage_kind,
        );
        *next_projectile_id = next_projectile_id.wrapping_add(1);

        info!(
            "Player {} fired {} projectile {}",
            character.id, loadout.projectile_kind, projectile.id
        );
        Ok(FireOutcome::Spawned(projectile))
    }
}
