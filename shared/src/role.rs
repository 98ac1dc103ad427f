use crate::error::AuthorityError;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which process a simulation instance belongs to.
///
/// The server holds the authoritative copy of every character; clients hold
/// mirrors. Every mutating entry point checks the role of the instance it runs
/// on instead of relying on engine-side replication rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn is_authority(self) -> bool {
        matches!(self, Role::Server)
    }

    /// Rejects `operation` unless this instance is the authority.
    ///
    /// The violation is logged here, so callers only decide whether to
    /// propagate or drop the returned error.
    pub fn require_authority(self, operation: &'static str) -> Result<(), AuthorityError> {
        if self.is_authority() {
            Ok(())
        } else {
            warn!(
                "Rejected {} on {} instance: server authority required",
                operation, self
            );
            Err(AuthorityError::AuthorityViolation {
                operation,
                role: self,
            })
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Server => write!(f, "server"),
            Role::Client => write!(f, "client"),
        }
    }
}
