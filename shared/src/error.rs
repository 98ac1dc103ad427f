//! Error types for the gameplay core.
//!
//! None of these are fatal. Authority violations come from stale or
//! malicious network traffic and are dropped after logging; configuration
//! errors are reported once at startup.

use crate::role::Role;
use thiserror::Error;

/// A privileged operation was invoked outside its authoritative context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorityError {
    #[error("authority violation: {operation} invoked on a {role} instance")]
    AuthorityViolation {
        /// Name of the rejected entry point.
        operation: &'static str,
        /// Role of the instance that received the call.
        role: Role,
    },
}

/// Invalid loadout configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid loadout value for {field}: {value} ({reason})")]
    InvalidValue {
        field: &'static str,
        value: f32,
        reason: &'static str,
    },

    #[error("unknown damage kind: {0}")]
    UnknownDamageKind(String),

    #[error("unknown projectile kind: {0}")]
    UnknownProjectileKind(String),
}
