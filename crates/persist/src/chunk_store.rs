use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tessera_common::{Chunk, ChunkXz, DimensionId};
use tessera_stream::{ChunkError, ChunkSource};

use crate::codec::{cbor_deserialize, cbor_serialize, sha256_hex, zstd_compress, zstd_decompress};

/// On-disk record of one chunk column.
#[derive(Debug, Serialize, Deserialize)]
struct StoredChunk {
    x: i32,
    z: i32,
    sha256: String,
    blocks: Vec<u8>,
}

/// Persistent chunk tier: one file per chunk under the dimension's
/// `region` directory.
///
/// Layout inside the world directory:
/// ```text
/// region/c.<x>.<z>.cbor.zst         - normal dimension
/// DIM-1/region/c.<x>.<z>.cbor.zst   - nether
/// ```
/// A missing file is a miss, not an error.
#[derive(Debug, Clone)]
pub struct DiskChunkStore {
    dir: PathBuf,
    label: String,
}

impl DiskChunkStore {
    pub fn new(world_path: impl AsRef<Path>, dimension: DimensionId) -> Self {
        let world_path = world_path.as_ref();
        let dir = match dimension {
            DimensionId::Normal => world_path.join("region"),
            DimensionId::Nether => world_path.join("DIM-1").join("region"),
        };
        Self {
            dir,
            label: format!("disk:{dimension:?}"),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn chunk_path(&self, loc: ChunkXz) -> PathBuf {
        self.dir.join(format!("c.{}.{}.cbor.zst", loc.x, loc.z))
    }

    /// Write `chunk` to its file, replacing any previous copy.
    ///
    /// Used by world creation tooling; the running server only reads.
    pub fn save_chunk(&self, chunk: &Chunk) -> Result<(), ChunkError> {
        std::fs::create_dir_all(&self.dir)?;
        let record = StoredChunk {
            x: chunk.loc.x,
            z: chunk.loc.z,
            sha256: sha256_hex(chunk.blocks()),
            blocks: chunk.blocks().to_vec(),
        };
        let cbor = cbor_serialize(&record).map_err(|reason| ChunkError::Encode {
            loc: chunk.loc,
            reason,
        })?;
        std::fs::write(self.chunk_path(chunk.loc), zstd_compress(&cbor)?)?;
        Ok(())
    }

    fn read_chunk(&self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
        let compressed = match std::fs::read(self.chunk_path(loc)) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let decode_err = |reason: String| ChunkError::Decode { loc, reason };

        let cbor = zstd_decompress(&compressed).map_err(|e| decode_err(e.to_string()))?;
        let record: StoredChunk = cbor_deserialize(&cbor).map_err(decode_err)?;

        let found = ChunkXz::new(record.x, record.z);
        if found != loc {
            return Err(ChunkError::LocationMismatch {
                requested: loc,
                found,
            });
        }
        let actual = sha256_hex(&record.blocks);
        if actual != record.sha256 {
            return Err(ChunkError::IntegrityMismatch {
                loc,
                expected: record.sha256,
                actual,
            });
        }
        Chunk::from_blocks(loc, record.blocks)
            .map(Some)
            .ok_or_else(|| decode_err("wrong block count".into()))
    }
}

impl ChunkSource for DiskChunkStore {
    fn name(&self) -> &str {
        &self.label
    }

    fn load_chunk(&mut self, loc: ChunkXz) -> Result<Option<Chunk>, ChunkError> {
        self.read_chunk(loc)
    }
}
