use serde::{Deserialize, Serialize};

use crate::types::ChunkXz;

/// Horizontal edge length of a chunk column, in blocks.
pub const CHUNK_EDGE: usize = 16;
/// Vertical extent of a chunk column, in blocks.
pub const CHUNK_HEIGHT: usize = 128;
/// Number of blocks in one chunk column.
pub const CHUNK_VOLUME: usize = CHUNK_EDGE * CHUNK_EDGE * CHUNK_HEIGHT;

/// Block type identifier. The block catalog itself lives outside this crate.
pub type BlockId = u8;

pub const BLOCK_AIR: BlockId = 0;
pub const BLOCK_STONE: BlockId = 1;
pub const BLOCK_GRASS: BlockId = 2;
pub const BLOCK_DIRT: BlockId = 3;
pub const BLOCK_BEDROCK: BlockId = 7;

/// Terrain for one chunk column.
///
/// Blocks are laid out with Y varying fastest, then Z, then X, matching the
/// on-disk layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub loc: ChunkXz,
    blocks: Vec<BlockId>,
}

impl Chunk {
    /// An all-air chunk.
    pub fn empty(loc: ChunkXz) -> Self {
        Self {
            loc,
            blocks: vec![BLOCK_AIR; CHUNK_VOLUME],
        }
    }

    /// Build a chunk from a raw block payload. Returns `None` if the payload
    /// is not exactly one chunk column.
    pub fn from_blocks(loc: ChunkXz, blocks: Vec<BlockId>) -> Option<Self> {
        (blocks.len() == CHUNK_VOLUME).then_some(Self { loc, blocks })
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<BlockId> {
        self.blocks
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockId {
        self.blocks[index(x, y, z)]
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, block: BlockId) {
        self.blocks[index(x, y, z)] = block;
    }

    /// Y of the highest non-air block in the column, if any.
    pub fn height_at(&self, x: usize, z: usize) -> Option<usize> {
        (0..CHUNK_HEIGHT)
            .rev()
            .find(|&y| self.block(x, y, z) != BLOCK_AIR)
    }
}

fn index(x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < CHUNK_EDGE && y < CHUNK_HEIGHT && z < CHUNK_EDGE);
    y + z * CHUNK_HEIGHT + x * CHUNK_HEIGHT * CHUNK_EDGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_blocks_rejects_wrong_size() {
        assert!(Chunk::from_blocks(ChunkXz::new(0, 0), vec![0; 10]).is_none());
        assert!(Chunk::from_blocks(ChunkXz::new(0, 0), vec![0; CHUNK_VOLUME]).is_some());
    }

    #[test]
    fn set_block_and_height() {
        let mut chunk = Chunk::empty(ChunkXz::new(2, 3));
        assert_eq!(chunk.height_at(4, 5), None);
        chunk.set_block(4, 0, 5, BLOCK_BEDROCK);
        chunk.set_block(4, 70, 5, BLOCK_GRASS);
        assert_eq!(chunk.block(4, 70, 5), BLOCK_GRASS);
        assert_eq!(chunk.height_at(4, 5), Some(70));
        assert_eq!(chunk.height_at(5, 4), None);
    }
}
