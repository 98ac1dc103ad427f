//! Loadout configuration for server-spawned characters.
//!
//! The base loadout comes from an optional TOML file whose keys mirror
//! [`CharacterConfig`]; missing keys keep their defaults. Command-line
//! overrides are layered on top and the result is validated once.
//!
//! ```toml
//! max_health = 150.0
//! fire_rate_seconds = 0.5
//! damage_kind = "explosive"
//! projectile_kind = "heavy"
//! ```

use log::info;
use shared::{CharacterConfig, ConfigError, DamageKind, ProjectileKind};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadoutError {
    #[error("failed to read loadout file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse loadout file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

/// Individual loadout fields set from the command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoadoutOverrides {
    pub max_health: Option<f32>,
    pub fire_rate_seconds: Option<f32>,
    pub damage: Option<f32>,
    pub damage_kind: Option<DamageKind>,
    pub projectile_kind: Option<ProjectileKind>,
}

impl LoadoutOverrides {
    pub fn apply(&self, mut config: CharacterConfig) -> CharacterConfig {
        if let Some(max_health) = self.max_health {
            config.max_health = max_health;
        }
        if let Some(fire_rate_seconds) = self.fire_rate_seconds {
            config.fire_rate_seconds = fire_rate_seconds;
        }
        if let Some(damage) = self.damage {
            config.damage = damage;
        }
        if let Some(damage_kind) = self.damage_kind {
            config.damage_kind = damage_kind;
        }
        if let Some(projectile_kind) = self.projectile_kind {
            config.projectile_kind = projectile_kind;
        }
        config
    }
}

pub fn parse_loadout(text: &str) -> Result<CharacterConfig, LoadoutError> {
    let config: CharacterConfig = toml::from_str(text)?;
    config.validate()?;
    Ok(config)
}

pub fn load_loadout(path: &Path) -> Result<CharacterConfig, LoadoutError> {
    let text = std::fs::read_to_string(path)?;
    let config = parse_loadout(&text)?;
    info!("Loaded loadout from {}", path.display());
    Ok(config)
}

/// Builds the final loadout: file (or defaults), then overrides, then validation.
pub fn resolve_loadout(
    path: Option<&Path>,
    overrides: &LoadoutOverrides,
) -> Result<CharacterConfig, LoadoutError> {
    let base = match path {
        Some(path) => load_loadout(path)?,
        None => CharacterConfig::default(),
    };

    let config = overrides.apply(base);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = parse_loadout(
            r#"
            fire_rate_seconds = 0.5
            damage_kind = "explosive"
            projectile_kind = "heavy"
            "#,
        )
        .unwrap();

        assert_eq!(config.fire_rate_seconds, 0.5);
        assert_eq!(config.damage_kind, DamageKind::Explosive);
        assert_eq!(config.projectile_kind, ProjectileKind::Heavy);
        assert_eq!(config.max_health, CharacterConfig::default().max_health);
        assert_eq!(config.damage, CharacterConfig::default().damage);
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(parse_loadout("").unwrap(), CharacterConfig::default());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            parse_loadout("max_health = -5.0"),
            Err(LoadoutError::Invalid(ConfigError::InvalidValue { field: "max_health", .. }))
        ));
        assert!(matches!(
            parse_loadout("fire_rate_seconds = -1.0"),
            Err(LoadoutError::Invalid(_))
        ));
    }

    #[test]
    fn test_unknown_kind_is_a_parse_error() {
        assert!(matches!(
            parse_loadout(r#"damage_kind = "psychic""#),
            Err(LoadoutError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_loadout(Path::new("/nonexistent/loadout.toml"));
        assert!(matches!(result, Err(LoadoutError::Io(_))));
    }

    #[test]
    fn test_overrides_applied_on_top() {
        let overrides = LoadoutOverrides {
            damage: Some(25.0),
            damage_kind: Some(DamageKind::Energy),
            ..LoadoutOverrides::default()
        };

        let config = resolve_loadout(None, &overrides).unwrap();
        assert_eq!(config.damage, 25.0);
        assert_eq!(config.damage_kind, DamageKind::Energy);
        assert_eq!(config.fire_rate_seconds, 0.25);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let overrides = LoadoutOverrides {
            max_health: Some(0.0),
            ..LoadoutOverrides::default()
        };
        assert!(resolve_loadout(None, &overrides).is_err());
    }

    #[test]
    fn test_endless_fire_rate_rejected_before_spawn() {
        let overrides = LoadoutOverrides {
            fire_rate_seconds: Some(1e20),
            ..LoadoutOverrides::default()
        };
        assert!(matches!(
            resolve_loadout(None, &overrides),
            Err(LoadoutError::Invalid(_))
        ));
    }
}
