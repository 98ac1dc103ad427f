//! # Game Server Library
//!
//! The authoritative half of the ranged-combat netcode. The server owns every
//! character's health and decides whether a shot happens; clients only
//! predict and mirror.
//!
//! ## Module Organization
//!
//! ### Authority Module (`authority`)
//! Validates fire requests against the requesting character's server-side
//! fire gate and spawns projectiles from the server's transform and loadout.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection tracking, input buffering in sequence order and timeouts.
//!
//! ### Config Module (`config`)
//! Loadout loading from TOML plus command-line overrides.
//!
//! ### Game Module (`game`)
//! The world: characters, projectiles, the server clock and impact
//! resolution. Health changes are logged from here through each character's
//! health reaction.
//!
//! ### Network Module (`network`)
//! UDP sockets, the tick loop and snapshot broadcasting. Fire requests are
//! handled the moment they arrive; movement input is applied on the tick.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use shared::CharacterConfig;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16),
//!         32,
//!         CharacterConfig::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod authority;
pub mod client_manager;
pub mod config;
pub mod game;
pub mod network;
