use tessera_common::chunk::{BLOCK_BEDROCK, BLOCK_DIRT, BLOCK_GRASS, BLOCK_STONE};
use tessera_common::{Chunk, ChunkXz, CHUNK_EDGE};

use crate::service::ChunkSource;
use crate::ChunkError;

/// Distance in blocks between height lattice points.
const LATTICE: i64 = 8;
const BASE_HEIGHT: f64 = 60.0;
const HEIGHT_SPREAD: u64 = 9;
const DIRT_DEPTH: usize = 3;

/// Deterministic terrain: every `(seed, loc)` always yields the same chunk.
///
/// Column heights are bilinearly interpolated between pseudo-random lattice
/// heights in `60..=68`, so terrain is continuous across chunk borders.
#[derive(Debug, Clone)]
pub struct TerrainGenerator {
    seed: i64,
}

impl TerrainGenerator {
    pub fn new(seed: i64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    pub fn generate(&self, loc: ChunkXz) -> Chunk {
        let mut chunk = Chunk::empty(loc);
        // World block coordinates exceed i32 near the edge of the chunk grid.
        let edge = CHUNK_EDGE as i64;
        for x in 0..CHUNK_EDGE {
            for z in 0..CHUNK_EDGE {
                let wx = i64::from(loc.x) * edge + x as i64;
                let wz = i64::from(loc.z) * edge + z as i64;
                let height = self.column_height(wx, wz);
                chunk.set_block(x, 0, z, BLOCK_BEDROCK);
                for y in 1..height {
                    let block = if y + DIRT_DEPTH >= height { BLOCK_DIRT } else { BLOCK_STONE };
                    chunk.set_block(x, y, z, block);
                }
                chunk.set_block(x, height, z, BLOCK_GRASS);
            }
        }
        chunk
    }

    /// Surface height of the world column at `(wx, wz)`.
    pub fn column_height(&self, wx: i64, wz: i64) -> usize {
        let lx = wx.div_euclid(LATTICE);
        let lz = wz.div_euclid(LATTICE);
        let fx = wx.rem_euclid(LATTICE) as f64 / LATTICE as f64;
        let fz = wz.rem_euclid(LATTICE) as f64 / LATTICE as f64;

        let h00 = self.lattice_height(lx, lz);
        let h10 = self.lattice_height(lx + 1, lz);
        let h01 = self.lattice_height(lx, lz + 1);
        let h11 = self.lattice_height(lx + 1, lz + 1);
        let near = h00 + (h10 - h00) * fx;
        let far = h01 + (h11 - h01) * fx;
        (near + (far - near) * fz).round() as usize
    }

    fn lattice_height(&self, lx: i64, lz: i64) -> f64 {
        let key = splitmix64(lx as u64) ^ lz as u64;
        let hash = splitmix64(self.seed as u64 ^ splitmix64(key));
        BASE_HEIGHT + (hash % HEIGHT_SPREAD) as f64
    }
}

impl ChunkSource for TerrainGenerator {
    fn name(&self) -> &str {
        "generator"
    }

    fn load_chunk(&mut self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
        Ok(Some(self.generate(loc)))
    }
}

/// Splitmix64 step: a fast, well-mixed deterministic hash of one u64.
fn splitmix64(mut state: u64) -> u64 {
    state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
