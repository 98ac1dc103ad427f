//! Character health with server authority.
//!
//! [`HealthModel`] keeps `0 <= current <= max` at all times by clamping every
//! assignment. Only a server-role instance accepts writes; client-role
//! instances are mirrors fed through [`HealthModel::receive`].

use crate::error::{AuthorityError, ConfigError};
use crate::replication::{Change, Replicated, ReplicatedValue};
use crate::role::Role;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classifies damage for scoring, logs and presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DamageKind {
    #[default]
    Generic,
    Ballistic,
    Explosive,
    Energy,
}

impl fmt::Display for DamageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DamageKind::Generic => "generic",
            DamageKind::Ballistic => "ballistic",
            DamageKind::Explosive => "explosive",
            DamageKind::Energy => "energy",
        };
        f.write_str(name)
    }
}

impl FromStr for DamageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(DamageKind::Generic),
            "ballistic" => Ok(DamageKind::Ballistic),
            "explosive" => Ok(DamageKind::Explosive),
            "energy" => Ok(DamageKind::Energy),
            _ => Err(ConfigError::UnknownDamageKind(s.to_string())),
        }
    }
}

/// One application of damage, with attribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    pub amount: f32,
    pub kind: DamageKind,
    /// Character that caused the damage, if any.
    pub instigator: Option<u32>,
}

pub type HealthChange = Change<f32>;

impl Change<f32> {
    /// True when this change took health from above zero to exactly zero.
    pub fn crossed_zero(&self) -> bool {
        self.previous > 0.0 && self.current == 0.0
    }
}

#[derive(Debug)]
pub struct HealthModel {
    max_health: f32,
    current: Replicated<f32>,
}

impl HealthModel {
    /// Creates a model at full health.
    ///
    /// A non-finite or negative maximum is treated as zero so the clamp range
    /// is always valid; loadouts are validated before they get here.
    pub fn new(role: Role, max_health: f32) -> Self {
        let max_health = if max_health.is_finite() {
            max_health.max(0.0)
        } else {
            0.0
        };

        Self {
            max_health,
            current: Replicated::new(role, max_health),
        }
    }

    pub fn role(&self) -> Role {
        self.current.role()
    }

    pub fn current_health(&self) -> f32 {
        *self.current.get()
    }

    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    pub fn is_depleted(&self) -> bool {
        self.current_health() <= 0.0
    }

    /// Registers the health-changed reaction.
    ///
    /// Runs on the server after every explicit set, and on clients once per
    /// applied replicated update.
    pub fn on_health_changed<F>(&mut self, hook: F)
    where
        F: FnMut(&HealthChange) + Send + Sync + 'static,
    {
        self.current.subscribe(hook);
    }

    /// Clamps `value` into `[0, max_health]` and assigns it. Server only.
    ///
    /// A NaN assignment keeps the current value. Returns the stored value.
    pub fn set_current_health(&mut self, value: f32) -> Result<f32, AuthorityError> {
        self.role().require_authority("set_current_health")?;

        let clamped = if value.is_nan() {
            self.current_health()
        } else {
            value.clamp(0.0, self.max_health)
        };

        self.current.set(clamped)?;
        Ok(clamped)
    }

    /// Subtracts `amount`; a negative amount heals.
    pub fn apply_damage(&mut self, amount: f32) -> Result<f32, AuthorityError> {
        self.set_current_health(self.current_health() - amount)
    }

    pub fn take_damage(&mut self, event: &DamageEvent) -> Result<f32, AuthorityError> {
        let remaining = self.apply_damage(event.amount)?;
        debug!(
            "Took {} {} damage from {:?}, {} remaining",
            event.amount, event.kind, event.instigator, remaining
        );
        Ok(remaining)
    }

    pub fn replicate(&self) -> ReplicatedValue<f32> {
        self.current.snapshot()
    }

    /// Applies a server push to a client mirror.
    pub fn receive(&mut self, mut update: ReplicatedValue<f32>) -> bool {
        if update.value.is_nan() {
            return false;
        }
        update.value = update.value.clamp(0.0, self.max_health);
        self.current.receive(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use std::sync::{Arc, Mutex};

    fn recorded(health: &mut HealthModel) -> Arc<Mutex<Vec<HealthChange>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        health.on_health_changed(move |change| sink.lock().unwrap().push(*change));
        seen
    }

    fn with_health(current: f32) -> HealthModel {
        let mut health = HealthModel::new(Role::Server, 100.0);
        health.set_current_health(current).unwrap();
        health
    }

    #[test]
    fn test_starts_at_max() {
        let health = HealthModel::new(Role::Server, 100.0);
        assert_eq!(health.current_health(), 100.0);
        assert_eq!(health.max_health(), 100.0);
        assert!(!health.is_depleted());
    }

    #[test]
    fn test_set_clamps_into_range() {
        let mut health = HealthModel::new(Role::Server, 100.0);
        for value in [-50.0, 0.0, 42.5, 100.0, 250.0, f32::INFINITY, f32::NEG_INFINITY] {
            let stored = health.set_current_health(value).unwrap();
            assert!((0.0..=100.0).contains(&stored), "{} -> {}", value, stored);
            assert_eq!(stored, health.current_health());
        }
    }

    #[test]
    fn test_nan_keeps_current_value() {
        let mut health = with_health(60.0);
        assert_eq!(health.set_current_health(f32::NAN).unwrap(), 60.0);
        assert_eq!(health.apply_damage(f32::NAN).unwrap(), 60.0);
    }

    #[test]
    fn test_damage_round_trip_away_from_bounds() {
        let mut health = with_health(95.0);
        assert_approx_eq!(health.apply_damage(20.0).unwrap(), 75.0);
        assert_approx_eq!(health.apply_damage(-20.0).unwrap(), 95.0);

        let mut full = with_health(100.0);
        assert_approx_eq!(full.apply_damage(20.0).unwrap(), 80.0);
        assert_approx_eq!(full.apply_damage(-20.0).unwrap(), 100.0);
    }

    #[test]
    fn test_damage_round_trip_is_lossy_at_zero() {
        let mut health = with_health(10.0);
        assert_eq!(health.apply_damage(20.0).unwrap(), 0.0);
        assert_eq!(health.apply_damage(-20.0).unwrap(), 20.0);
    }

    #[test]
    fn test_negative_damage_heals_up_to_max() {
        let mut health = with_health(90.0);
        assert_eq!(health.apply_damage(-50.0).unwrap(), 100.0);
    }

    #[test]
    fn test_reaction_fires_on_every_explicit_set() {
        let mut health = HealthModel::new(Role::Server, 100.0);
        let seen = recorded(&mut health);

        health.set_current_health(100.0).unwrap();
        health.set_current_health(70.0).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].previous, 100.0);
        assert_eq!(seen[1].current, 70.0);
    }

    #[test]
    fn test_zero_crossing_observed_once() {
        let mut health = with_health(15.0);
        let seen = recorded(&mut health);

        health.apply_damage(10.0).unwrap();
        health.apply_damage(10.0).unwrap();

        let seen = seen.lock().unwrap();
        let crossings: Vec<_> = seen.iter().filter(|c| c.crossed_zero()).collect();
        assert_eq!(crossings.len(), 1);
        assert_eq!(crossings[0].current, 0.0);
        assert!(health.is_depleted());
    }

    #[test]
    fn test_client_mirror_rejects_writes() {
        let mut mirror = HealthModel::new(Role::Client, 100.0);
        let seen = recorded(&mut mirror);

        assert!(mirror.set_current_health(10.0).is_err());
        assert!(mirror.apply_damage(30.0).is_err());

        assert_eq!(mirror.current_health(), 100.0);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_take_damage_returns_remaining() {
        let mut health = HealthModel::new(Role::Server, 100.0);
        let event = DamageEvent {
            amount: 35.0,
            kind: DamageKind::Ballistic,
            instigator: Some(7),
        };
        assert_eq!(health.take_damage(&event).unwrap(), 65.0);
    }

    #[test]
    fn test_mirror_receives_clamped_update() {
        let mut authority = HealthModel::new(Role::Server, 100.0);
        let mut mirror = HealthModel::new(Role::Client, 100.0);
        let seen = recorded(&mut mirror);

        authority.apply_damage(40.0).unwrap();
        assert!(mirror.receive(authority.replicate()));
        assert!(!mirror.receive(authority.replicate()));

        assert_eq!(mirror.current_health(), 60.0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_max_is_zeroed() {
        assert_eq!(HealthModel::new(Role::Server, -5.0).max_health(), 0.0);
        assert_eq!(HealthModel::new(Role::Server, f32::NAN).max_health(), 0.0);
    }

    #[test]
    fn test_damage_kind_parsing() {
        assert_eq!("Explosive".parse::<DamageKind>().unwrap(), DamageKind::Explosive);
        assert!("plasma".parse::<DamageKind>().is_err());
        assert_eq!(DamageKind::Energy.to_string(), "energy");
    }
}
