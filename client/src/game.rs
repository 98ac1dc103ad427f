use log::{debug, info};
use shared::character::step_movement;
use shared::{
    Character, CharacterConfig, CharacterInput, CharacterSnapshot, EffectCue, HealthChange,
    ProjectileSnapshot, Role, Rotator, SimScheduler, Vec3, INPUT_DT,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Divergence between predicted and confirmed position that forces a replay.
pub const RECONCILE_THRESHOLD: f32 = 5.0;

/// Health change on a mirrored character, as shown on the HUD.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudEvent {
    pub character_id: u32,
    pub change: HealthChange,
}

/// Locally predicted transform of the controlled character.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedTransform {
    pub position: Vec3,
    pub rotation: Rotator,
}

/// Client view of the world.
///
/// Every character is a client-role mirror: health only moves through
/// replicated updates, and local writes are refused. The controlled
/// character additionally gets a predicted transform and a local fire gate
/// driven by its own clock so held fire feels immediate.
pub struct ClientGameState {
    pub tick: u32,
    pub client_id: Option<u32>,
    config: CharacterConfig,
    pub characters: HashMap<u32, Character>,
    pub projectiles: Vec<ProjectileSnapshot>,
    pub explosions: Vec<EffectCue>,
    pub predicted: Option<PredictedTransform>,
    pub input_history: Vec<CharacterInput>,
    scheduler: SimScheduler,
    hud_events: Arc<Mutex<Vec<HudEvent>>>,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self {
            tick: 0,
            client_id: None,
            config: CharacterConfig::default(),
            characters: HashMap::new(),
            projectiles: Vec::new(),
            explosions: Vec::new(),
            predicted: None,
            input_history: Vec::new(),
            scheduler: SimScheduler::new(),
            hud_events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Resets the view for a new session with the loadout the server sent.
    pub fn on_connected(&mut self, client_id: u32, config: CharacterConfig) {
        *self = Self {
            client_id: Some(client_id),
            config,
            ..Self::new()
        };
    }

    pub fn config(&self) -> &CharacterConfig {
        &self.config
    }

    pub fn local_character(&self) -> Option<&Character> {
        self.client_id.and_then(|id| self.characters.get(&id))
    }

    fn local_character_mut(&mut self) -> Option<&mut Character> {
        let id = self.client_id?;
        self.characters.get_mut(&id)
    }

    /// Applies an authoritative snapshot. Older ticks than the last one
    /// applied are ignored; a lost snapshot is simply superseded.
    pub fn apply_server_state(
        &mut self,
        tick: u32,
        characters: Vec<CharacterSnapshot>,
        projectiles: Vec<ProjectileSnapshot>,
        last_processed_input: &HashMap<u32, u32>,
    ) {
        if tick < self.tick {
            debug!("Ignoring out-of-order snapshot {} (have {})", tick, self.tick);
            return;
        }
        self.tick = tick;

        let present: Vec<u32> = characters.iter().map(|snapshot| snapshot.id).collect();
        self.characters.retain(|id, character| {
            let keep = present.contains(id);
            if !keep {
                character.fire.cancel(&mut self.scheduler);
            }
            keep
        });

        for snapshot in characters {
            self.apply_character(snapshot);
        }
        self.projectiles = projectiles;

        if let Some(client_id) = self.client_id {
            self.reconcile(client_id, last_processed_input);
        }
    }

    fn apply_character(&mut self, snapshot: CharacterSnapshot) {
        if !self.characters.contains_key(&snapshot.id) {
            let mirror = self.spawn_mirror(&snapshot);
            self.characters.insert(snapshot.id, mirror);
        }
        let Some(character) = self.characters.get_mut(&snapshot.id) else {
            return;
        };

        character.position = snapshot.position;
        character.rotation = snapshot.rotation;
        character.health.receive(snapshot.health);
    }

    fn spawn_mirror(&self, snapshot: &CharacterSnapshot) -> Character {
        let config = CharacterConfig {
            max_health: snapshot.max_health,
            ..self.config
        };
        let mut character = Character::new(
            snapshot.id,
            Role::Client,
            snapshot.position,
            snapshot.rotation,
            config,
        );

        let character_id = snapshot.id;
        let is_local = self.client_id == Some(character_id);
        let hud_events = Arc::clone(&self.hud_events);
        character.health.on_health_changed(move |change| {
            if is_local {
                info!("Health: {:.0}", change.current);
                if change.crossed_zero() {
                    info!("You were defeated");
                }
            } else {
                debug!("Player {} health: {:.0}", character_id, change.current);
            }
            if let Ok(mut events) = hud_events.lock() {
                events.push(HudEvent {
                    character_id,
                    change: *change,
                });
            }
        });

        character
    }

    fn reconcile(&mut self, client_id: u32, last_processed_input: &HashMap<u32, u32>) {
        if let Some(&last_processed_seq) = last_processed_input.get(&client_id) {
            self.input_history
                .retain(|input| input.sequence > last_processed_seq);
        }

        let Some(confirmed) = self.characters.get(&client_id) else {
            return;
        };
        let confirmed = PredictedTransform {
            position: confirmed.position,
            rotation: confirmed.rotation,
        };

        let Some(predicted) = self.predicted else {
            self.predicted = Some(confirmed);
            return;
        };

        // Predicted state runs ahead by the unacknowledged inputs, so compare
        // against the confirmed state with those inputs replayed.
        let mut replayed = confirmed;
        for input in &self.input_history {
            step_movement(
                &mut replayed.position,
                &mut replayed.rotation,
                input,
                &self.config,
                INPUT_DT,
            );
        }

        let distance = replayed.position.distance(&predicted.position);
        if distance > RECONCILE_THRESHOLD {
            debug!("Rollback needed! Distance: {:.2}", distance);
            self.predicted = Some(replayed);
        }
    }

    /// Records an input and applies it to the predicted transform.
    pub fn apply_prediction(&mut self, input: &CharacterInput) {
        self.input_history.push(*input);

        if let Some(predicted) = self.predicted.as_mut() {
            step_movement(
                &mut predicted.position,
                &mut predicted.rotation,
                input,
                &self.config,
                INPUT_DT,
            );
        }
    }

    /// Local trigger pressed. Returns true if a fire request should be sent.
    pub fn fire_button_pressed(&mut self) -> bool {
        let Some(client_id) = self.client_id else {
            return false;
        };
        let Some(character) = self.characters.get_mut(&client_id) else {
            return false;
        };
        character.fire.start(&mut self.scheduler)
    }

    pub fn fire_button_released(&mut self) {
        if let Some(character) = self.local_character_mut() {
            character.fire.stop();
        }
    }

    /// Advances the local fire clock. Returns how many fire requests the held
    /// trigger produced.
    pub fn update(&mut self, dt: Duration) -> u32 {
        let elapsed = self.scheduler.advance(dt);
        let Some(client_id) = self.client_id else {
            return 0;
        };
        let Some(character) = self.characters.get_mut(&client_id) else {
            return 0;
        };

        elapsed
            .into_iter()
            .filter(|&handle| character.fire.on_timer_elapsed(handle, &mut self.scheduler))
            .count() as u32
    }

    pub fn apply_explosion(&mut self, projectile_id: u32, position: Vec3) {
        self.projectiles.retain(|projectile| projectile.id != projectile_id);
        self.explosions.push(EffectCue::Explosion {
            projectile_id,
            position,
        });
    }

    /// Takes the health changes observed since the last call.
    pub fn drain_hud_events(&self) -> Vec<HudEvent> {
        match self.hud_events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => Vec::new(),
        }
    }

    /// Local health as last replicated, with max health.
    pub fn hud_health(&self) -> Option<(f32, f32)> {
        self.local_character()
            .map(|character| (character.health.current_health(), character.health.max_health()))
    }
}

impl Default for ClientGameState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{FireState, ReplicatedValue};

    fn snapshot(id: u32, x: f32, health: f32, version: u64) -> CharacterSnapshot {
        CharacterSnapshot {
            id,
            position: Vec3::new(x, 0.0, 96.0),
            rotation: Rotator::new(0.0, 0.0),
            max_health: 100.0,
            health: ReplicatedValue {
                version,
                value: health,
            },
        }
    }

    fn connected() -> ClientGameState {
        let mut game = ClientGameState::new();
        game.on_connected(1, CharacterConfig::default());
        game.apply_server_state(1, vec![snapshot(1, 0.0, 100.0, 0)], vec![], &HashMap::new());
        game
    }

    fn forward(sequence: u32) -> CharacterInput {
        CharacterInput {
            move_forward: 1.0,
            ..CharacterInput::idle(sequence, sequence as u64)
        }
    }

    #[test]
    fn test_mirrors_follow_replicated_health() {
        let mut game = connected();

        game.apply_server_state(2, vec![snapshot(1, 0.0, 75.0, 1)], vec![], &HashMap::new());
        assert_eq!(game.hud_health(), Some((75.0, 100.0)));

        let events = game.drain_hud_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].character_id, 1);
        assert_eq!(events[0].change.previous, 100.0);
        assert_eq!(events[0].change.current, 75.0);
        assert!(game.drain_hud_events().is_empty());
    }

    #[test]
    fn test_stale_health_version_ignored() {
        let mut game = connected();

        game.apply_server_state(3, vec![snapshot(1, 0.0, 50.0, 2)], vec![], &HashMap::new());
        // Same tick, older health version.
        game.apply_server_state(3, vec![snapshot(1, 0.0, 75.0, 1)], vec![], &HashMap::new());

        assert_eq!(game.hud_health(), Some((50.0, 100.0)));
        assert_eq!(game.drain_hud_events().len(), 1);
    }

    #[test]
    fn test_out_of_order_snapshot_ignored() {
        let mut game = connected();

        game.apply_server_state(5, vec![snapshot(1, 10.0, 100.0, 0)], vec![], &HashMap::new());
        game.apply_server_state(4, vec![snapshot(1, 99.0, 100.0, 0)], vec![], &HashMap::new());

        assert_eq!(game.local_character().unwrap().position.x, 10.0);
    }

    #[test]
    fn test_mirror_health_is_read_only() {
        let mut game = connected();
        let character = game.characters.get_mut(&1).unwrap();

        assert!(character.health.apply_damage(10.0).is_err());
        assert_eq!(character.health.current_health(), 100.0);
    }

    #[test]
    fn test_departed_characters_removed() {
        let mut game = connected();
        game.apply_server_state(
            2,
            vec![snapshot(1, 0.0, 100.0, 0), snapshot(2, 300.0, 100.0, 0)],
            vec![],
            &HashMap::new(),
        );
        assert_eq!(game.characters.len(), 2);

        game.apply_server_state(3, vec![snapshot(1, 0.0, 100.0, 0)], vec![], &HashMap::new());
        assert_eq!(game.characters.len(), 1);
    }

    #[test]
    fn test_prediction_moves_immediately() {
        let mut game = connected();

        game.apply_prediction(&forward(1));

        let predicted = game.predicted.unwrap();
        assert_approx_eq!(predicted.position.x, 600.0 * INPUT_DT, 1e-3);
        assert_eq!(game.input_history.len(), 1);
    }

    #[test]
    fn test_reconciliation_replays_unacknowledged_inputs() {
        let mut game = connected();
        for sequence in 1..=3 {
            game.apply_prediction(&forward(sequence));
        }

        // Server processed input 1 but saw the character pushed 50 units back.
        let step = 600.0 * INPUT_DT;
        let mut acks = HashMap::new();
        acks.insert(1, 1);
        game.apply_server_state(2, vec![snapshot(1, step - 50.0, 100.0, 0)], vec![], &acks);

        assert_eq!(game.input_history.len(), 2);
        let predicted = game.predicted.unwrap();
        assert_approx_eq!(predicted.position.x, step * 3.0 - 50.0, 1e-3);
    }

    #[test]
    fn test_small_divergence_keeps_prediction() {
        let mut game = connected();
        game.apply_prediction(&forward(1));
        let before = game.predicted.unwrap();

        let mut acks = HashMap::new();
        acks.insert(1, 1);
        let step = 600.0 * INPUT_DT;
        game.apply_server_state(2, vec![snapshot(1, step + 1.0, 100.0, 0)], vec![], &acks);

        assert_eq!(game.predicted.unwrap(), before);
        assert!(game.input_history.is_empty());
    }

    #[test]
    fn test_held_trigger_fires_at_rate() {
        let mut game = connected();

        assert!(game.fire_button_pressed());
        // Default rate is 0.25 s; one second of holding gives four more.
        let mut shots = 0;
        for _ in 0..20 {
            shots += game.update(Duration::from_millis(50));
        }
        assert_eq!(shots, 4);

        game.fire_button_released();
        assert_eq!(game.update(Duration::from_millis(250)), 0);
        assert_eq!(game.local_character().unwrap().fire.state(), FireState::Idle);
    }

    #[test]
    fn test_spam_clicks_rate_limited_locally() {
        let mut game = connected();

        assert!(game.fire_button_pressed());
        game.fire_button_released();
        game.update(Duration::from_millis(100));
        assert!(!game.fire_button_pressed());
        game.fire_button_released();

        game.update(Duration::from_millis(150));
        assert!(game.fire_button_pressed());
    }

    #[test]
    fn test_fire_ignored_before_spawn() {
        let mut game = ClientGameState::new();
        game.on_connected(1, CharacterConfig::default());

        assert!(!game.fire_button_pressed());
        assert_eq!(game.update(Duration::from_secs(1)), 0);
    }

    #[test]
    fn test_explosion_removes_projectile() {
        let mut game = connected();
        game.projectiles.push(ProjectileSnapshot {
            id: 4,
            owner: 1,
            kind: shared::ProjectileKind::Sphere,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
        });

        game.apply_explosion(4, Vec3::new(1.0, 0.0, 0.0));

        assert!(game.projectiles.is_empty());
        assert_eq!(game.explosions.len(), 1);
    }
}
