//! Persistence: world metadata, per-player records and stored chunks.
//!
//! # Invariants
//! - Loading never writes: a world directory is only read at startup.
//! - A world store is either fully started or not started at all; metadata
//!   is validated before any chunk service is spawned.
//! - The seed of a loaded world never changes for the life of the store.

mod chunk_store;
mod codec;
pub mod tag;
mod world;

pub use chunk_store::DiskChunkStore;
pub use tag::{read_tag_file, write_tag_file, Tag, TagError};
pub use world::{
    player_data_path, time_derived_seed, write_player_data, LevelInfo, LoadError, PlayerData, PlayerDataError,
    WorldStore, LEVEL_FILE,
};
