//! Chunk streaming: tiered chunk sources behind service handles.
//!
//! # Invariants
//! - Each tier runs on its own task; a slow tier never stalls another.
//! - The combinator asks tiers in priority order and stops at the first hit,
//!   so a lower tier never produces a chunk a higher tier already holds.
//! - A failing request is reported to its requester only; the tier keeps
//!   serving.

mod combinator;
mod generator;
mod service;

pub use combinator::ChunkCombinator;
pub use generator::TerrainGenerator;
pub use service::{spawn_service, ChunkServiceHandle, ChunkSource, DEFAULT_QUEUE_CAPACITY};

use tessera_common::ChunkXz;

/// Errors from chunk lookups.
#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("chunk {loc} could not be decoded: {reason}")]
    Decode { loc: ChunkXz, reason: String },
    #[error("chunk {loc} could not be encoded: {reason}")]
    Encode { loc: ChunkXz, reason: String },
    #[error("chunk {loc} failed integrity check: expected {expected}, got {actual}")]
    IntegrityMismatch {
        loc: ChunkXz,
        expected: String,
        actual: String,
    },
    #[error("chunk file for {requested} holds chunk {found}")]
    LocationMismatch { requested: ChunkXz, found: ChunkXz },
    #[error("chunk source panicked while loading {loc}")]
    SourcePanicked { loc: ChunkXz },
    #[error("chunk service has stopped")]
    ServiceStopped,
}
