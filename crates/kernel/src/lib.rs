//! Game kernel: the authoritative, single-writer owner of live world state.
//!
//! # Invariants
//! - The entity directory, player map, item map and world clock are touched
//!   only by the game task. Everything else submits a [`Command`].
//! - Commands are applied one at a time, in the order they were enqueued.
//!   That total order is the only synchronisation; no locks are taken.
//! - Interest-radius membership is computed from current positions on every
//!   query, never cached.

pub mod command;
pub mod directory;
pub mod entity;
pub mod game;
pub mod radius;

pub use command::{Command, GameError, GameHandle, Query};
pub use directory::{DirectoryError, EntityDirectory, EntityKind};
pub use entity::{outbound_channel, Outbound, PickupItem, Player, OUTBOUND_CAPACITY};
pub use game::{spawn_timer, Game, GameConfig};
pub use radius::SpatialRadiusIndex;
