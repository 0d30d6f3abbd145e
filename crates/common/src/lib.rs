//! Shared value types for the tessera world server.
//!
//! Coordinates, identifiers and chunk payloads that cross crate boundaries
//! live here so the kernel, the chunk tiers and the wire layer agree on them.

pub mod chunk;
pub mod types;

pub use chunk::{BlockId, Chunk, CHUNK_EDGE, CHUNK_HEIGHT, CHUNK_VOLUME};
pub use types::{AbsXyz, ChunkXz, DimensionId, EntityId, ItemId, Orientation, Ticks};
