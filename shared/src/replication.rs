//! Replicated values with change notification.
//!
//! A [`Replicated`] holds one scalar that the server owns and clients mirror.
//! The server writes through [`Replicated::set`]; every write carries a version
//! number so clients can apply updates that arrive late, twice, or out of
//! order without regressing. Observers registered with
//! [`Replicated::subscribe`] run on both sides: on the server right after a
//! write, on a client once per newly applied version.

use crate::error::AuthorityError;
use crate::role::Role;
use log::trace;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire form of a replicated value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedValue<T> {
    pub version: u64,
    pub value: T,
}

/// Passed to observers whenever a value is written or received.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Change<T> {
    pub previous: T,
    pub current: T,
    pub version: u64,
}

type Observer<T> = Box<dyn FnMut(&Change<T>) + Send + Sync>;

pub struct Replicated<T> {
    role: Role,
    value: T,
    version: u64,
    observers: Vec<Observer<T>>,
}

impl<T: Clone + PartialEq> Replicated<T> {
    pub fn new(role: Role, initial: T) -> Self {
        Self {
            role,
            value: initial,
            version: 0,
            observers: Vec::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Registers a reaction hook.
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: FnMut(&Change<T>) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Authoritative write.
    ///
    /// The version only advances when the value actually changes, so clients
    /// never see a new version for an unchanged value. Local observers are
    /// notified on every explicit write.
    pub fn set(&mut self, value: T) -> Result<(), AuthorityError> {
        self.role.require_authority("replicated write")?;

        let previous = std::mem::replace(&mut self.value, value);
        if previous != self.value {
            self.version += 1;
        }
        self.notify(previous);
        Ok(())
    }

    pub fn snapshot(&self) -> ReplicatedValue<T> {
        ReplicatedValue {
            version: self.version,
            value: self.value.clone(),
        }
    }

    /// Applies an update pushed by the server.
    ///
    /// Returns true if the update was newer than the local copy. Stale and
    /// duplicate deliveries are dropped without notifying observers.
    pub fn receive(&mut self, update: ReplicatedValue<T>) -> bool {
        if self.role.is_authority() {
            trace!("Ignoring replicated update on the authoritative instance");
            return false;
        }

        if update.version <= self.version {
            return false;
        }

        let previous = std::mem::replace(&mut self.value, update.value);
        self.version = update.version;
        self.notify(previous);
        true
    }

    fn notify(&mut self, previous: T) {
        let change = Change {
            previous,
            current: self.value.clone(),
            version: self.version,
        };

        for observer in &mut self.observers {
            observer(&change);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Replicated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Replicated")
            .field("role", &self.role)
            .field("value", &self.value)
            .field("version", &self.version)
            .field("observers", &self.observers.len())
            .finish()
    }
}
