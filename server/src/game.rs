use crate::authority::{AttackAuthority, FireOutcome};
use log::{debug, error, info, warn};
use rand::Rng;
use shared::character::{ARENA_HALF_EXTENT, CAPSULE_RADIUS};
use shared::{
    Character, CharacterConfig, CharacterInput, CharacterSnapshot, EffectCue, Projectile,
    ProjectileSnapshot, Role, Scheduler, SimScheduler, TimerHandle, FLOOR_Z, INPUT_DT,
};
use std::collections::HashMap;
use std::time::Duration;

/// Upper bound on projectile substeps per tick, for pathological frame times.
const MAX_SUBSTEPS: u32 = 64;

/// Authoritative world: characters, live projectiles and the server clock.
#[derive(Debug)]
pub struct GameState {
    pub tick: u32,
    pub characters: HashMap<u32, Character>,
    pub projectiles: Vec<Projectile>,
    scheduler: SimScheduler,
    authority: AttackAuthority,
    config: CharacterConfig,
    next_projectile_id: u32,
    effects: Vec<EffectCue>,
}

impl GameState {
    pub fn new(config: CharacterConfig) -> Self {
        Self {
            tick: 0,
            characters: HashMap::new(),
            projectiles: Vec::new(),
            scheduler: SimScheduler::new(),
            authority: AttackAuthority::new(Role::Server),
            config,
            next_projectile_id: 1,
            effects: Vec::new(),
        }
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &SimScheduler {
        &self.scheduler
    }

    /// Current server simulation time.
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Spawns a character at a random spot in the inner half of the arena.
    pub fn add_player(&mut self, client_id: u32) {
        let mut rng = rand::thread_rng();
        let extent = ARENA_HALF_EXTENT * 0.5;
        let x = rng.gen_range(-extent..extent);
        let y = rng.gen_range(-extent..extent);
        let yaw = rng.gen_range(0.0..360.0);
        self.add_player_at(client_id, x, y, yaw);
    }

    pub fn add_player_at(&mut self, client_id: u32, x: f32, y: f32, yaw: f32) {
        let mut character = Character::spawn_at(client_id, Role::Server, x, y, yaw, self.config);

        character.health.on_health_changed(move |change| {
            info!(
                "Player {} now has {} health remaining",
                client_id, change.current
            );
            if change.crossed_zero() {
                info!("Player {} was defeated", client_id);
            }
        });

        info!(
            "Added player {} at ({:.1}, {:.1}) facing {:.0}",
            client_id, x, y, yaw
        );
        self.characters.insert(client_id, character);
    }

    pub fn remove_player(&mut self, client_id: &u32) -> bool {
        match self.characters.remove(client_id) {
            Some(mut character) => {
                character.fire.cancel(&mut self.scheduler);
                info!("Removed player {}", client_id);
                true
            }
            None => false,
        }
    }

    /// Applies one input frame. Each frame covers a fixed slice of time so
    /// client prediction replays to the same result.
    pub fn apply_input(&mut self, client_id: u32, input: &CharacterInput) {
        if let Some(character) = self.characters.get_mut(&client_id) {
            character.apply_input(input, INPUT_DT);
        }
    }

    /// Runs a fire request through the attack authority.
    ///
    /// Returns the id of the spawned projectile, or None when the request
    /// was dropped.
    pub fn handle_fire_request(&mut self, client_id: u32) -> Option<u32> {
        let character = self.characters.get_mut(&client_id);
        let outcome = self.authority.handle_fire_request(
            client_id,
            character,
            &mut self.scheduler,
            &mut self.next_projectile_id,
        );

        match outcome {
            Ok(FireOutcome::Spawned(projectile)) => {
                let id = projectile.id;
                self.projectiles.push(projectile);
                Some(id)
            }
            Ok(FireOutcome::RateLimited) | Ok(FireOutcome::UnknownCharacter) => None,
            Err(e) => {
                error!("Fire request from {} rejected: {}", client_id, e);
                None
            }
        }
    }

    /// Advances the world by `dt`: elapsed cooldowns first, then projectiles.
    pub fn update(&mut self, dt: Duration) {
        self.advance_clock_to(self.now().saturating_add(dt));
        self.simulate(dt);
    }

    /// Moves the server clock to `time` and closes every cooldown that ended
    /// on the way. The clock never moves backwards.
    ///
    /// Fire requests are gated on arrival, so the network layer calls this
    /// with the arrival time before handing a request over.
    pub fn advance_clock_to(&mut self, time: Duration) {
        let elapsed = self.scheduler.advance_to(time);
        self.dispatch_timers(elapsed);
    }

    /// Moves projectiles by `dt` and resolves their impacts. Leaves the
    /// clock alone.
    pub fn simulate(&mut self, dt: Duration) {
        let dt = dt.as_secs_f32();
        let substeps = self.calculate_required_substeps(dt);
        let substep_dt = dt / substeps as f32;

        for _ in 0..substeps {
            self.step_projectiles(substep_dt);
        }

        self.projectiles.retain(|projectile| !projectile.is_destroyed());
    }

    fn dispatch_timers(&mut self, elapsed: Vec<TimerHandle>) {
        for handle in elapsed {
            let owner = self
                .characters
                .values_mut()
                .find(|character| character.fire.pending_timer() == Some(handle));

            match owner {
                Some(character) => {
                    // Server gates never hold the trigger, so this only closes
                    // the cooldown window.
                    character.fire.on_timer_elapsed(handle, &mut self.scheduler);
                }
                None => warn!("Timer {:?} elapsed with no owner", handle),
            }
        }
    }

    /// Substeps needed so no projectile moves more than half a capsule
    /// radius per step.
    pub fn calculate_required_substeps(&self, dt: f32) -> u32 {
        const SAFETY_FACTOR: f32 = 0.5;

        let max_speed = self
            .projectiles
            .iter()
            .map(|projectile| projectile.velocity.magnitude())
            .fold(0.0_f32, f32::max);

        let max_movement_per_step = CAPSULE_RADIUS * SAFETY_FACTOR;
        let max_movement_this_tick = max_speed * dt;

        if max_movement_this_tick > max_movement_per_step {
            ((max_movement_this_tick / max_movement_per_step).ceil() as u32).min(MAX_SUBSTEPS)
        } else {
            1
        }
    }

    fn step_projectiles(&mut self, dt: f32) {
        let Self {
            characters,
            projectiles,
            effects,
            ..
        } = self;

        for projectile in projectiles.iter_mut() {
            if projectile.is_destroyed() {
                continue;
            }

            let alive = projectile.tick(dt);

            let hit = characters.values_mut().find(|character| {
                character.id != projectile.owner
                    && character.overlaps_sphere(projectile.position, projectile.radius)
            });

            if let Some(target) = hit {
                let target_id = target.id;
                if let Some(report) = projectile.on_impact(Some(&mut target.health), effects) {
                    info!(
                        "Projectile {} from player {} hit player {} for {} {} damage",
                        report.projectile_id,
                        report.instigator,
                        target_id,
                        report.damage,
                        report.damage_kind
                    );
                }
                continue;
            }

            if projectile.position.z - projectile.radius <= FLOOR_Z {
                debug!("Projectile {} hit the floor", projectile.id);
                projectile.on_impact(None, effects);
                continue;
            }

            if !alive {
                debug!("Projectile {} expired", projectile.id);
                projectile.destroy(effects);
            }
        }
    }

    pub fn character_snapshots(&self) -> Vec<CharacterSnapshot> {
        self.characters.values().map(Character::snapshot).collect()
    }

    pub fn projectile_snapshots(&self) -> Vec<ProjectileSnapshot> {
        self.projectiles.iter().map(Projectile::snapshot).collect()
    }

    /// Takes the effect cues produced since the last call.
    pub fn drain_effects(&mut self) -> Vec<EffectCue> {
        std::mem::take(&mut self.effects)
    }
}
