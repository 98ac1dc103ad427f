//! # Game Client Library
//!
//! The non-authoritative half of the ranged-combat netcode. The client
//! mirrors every character's health from server snapshots, predicts its own
//! movement, and runs a local copy of its fire gate so a held trigger
//! produces requests at the loadout's rate without waiting on the network.
//! The server re-validates every request.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! - Client-role character mirrors fed by versioned health updates
//! - HUD events raised from each mirror's health reaction
//! - Predicted transform, input history and reconciliation
//! - Local fire gate on a client-side clock
//!
//! ### Input Module (`input`)
//! Axis and fire-button events packaged into sequenced input frames.
//!
//! ### Network Module (`network`)
//! UDP connection, simulated latency and snapshot loss, and a scripted
//! autopilot for headless runs.
//!
//! ## Usage Example
//!
//! ```rust
//! use client::game::ClientGameState;
//! use shared::CharacterConfig;
//! use std::time::Duration;
//!
//! let mut game = ClientGameState::new();
//! game.on_connected(1, CharacterConfig::default());
//!
//! // Nothing to fire until the first snapshot spawns the local mirror.
//! assert!(!game.fire_button_pressed());
//! assert_eq!(game.update(Duration::from_millis(16)), 0);
//! ```

pub mod game;
pub mod input;
pub mod network;
