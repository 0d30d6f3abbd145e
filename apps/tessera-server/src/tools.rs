//! Offline world commands run by the CLI.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tessera_common::{AbsXyz, ChunkXz, DimensionId, CHUNK_EDGE};
use tessera_persist::{read_tag_file, time_derived_seed, DiskChunkStore, LevelInfo, WorldStore, LEVEL_FILE};
use tessera_stream::TerrainGenerator;
use tracing::info;

/// Parse `x,y,z` into a position.
pub fn parse_xyz(s: &str) -> Result<AbsXyz, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    match parts.as_slice() {
        [x, y, z] => Ok(AbsXyz(glam::DVec3::new(*x, *y, *z))),
        _ => Err(format!("expected x,y,z, got {s:?}")),
    }
}

/// Create a world directory with fresh metadata, optionally writing
/// generated chunks around the spawn point.
pub fn new_world(path: &Path, seed: Option<i64>, spawn: AbsXyz, pregen_radius: i32) -> Result<()> {
    let level_path = path.join(LEVEL_FILE);
    anyhow::ensure!(!level_path.exists(), "{} already exists", level_path.display());

    let seed = seed.unwrap_or_else(time_derived_seed);
    let level = LevelInfo {
        spawn_position: spawn,
        time: 0,
        seed: Some(seed),
        legacy_player_position: None,
    };
    level
        .write(path)
        .with_context(|| format!("write {}", level_path.display()))?;

    let generator = TerrainGenerator::new(seed);
    let store = DiskChunkStore::new(path, DimensionId::Normal);
    let center = spawn.to_chunk_xz();
    let mut written = 0usize;
    for x in center.x - pregen_radius..=center.x + pregen_radius {
        for z in center.z - pregen_radius..=center.z + pregen_radius {
            store
                .save_chunk(&generator.generate(ChunkXz::new(x, z)))
                .with_context(|| format!("write chunk ({x}, {z})"))?;
            written += 1;
        }
    }
    info!(path = %path.display(), seed, chunks = written, "world created");
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct WorldSummary {
    pub path: String,
    pub spawn: [f64; 3],
    pub time: i64,
    pub seed: Option<i64>,
    pub start: Option<[f64; 3]>,
    pub stored_chunks: usize,
    pub stored_nether_chunks: usize,
}

/// Read the metadata of a world without starting any chunk service.
pub fn summarize(path: &Path) -> Result<WorldSummary> {
    let level_path = path.join(LEVEL_FILE);
    let tag = read_tag_file(&level_path).with_context(|| format!("read {}", level_path.display()))?;
    let level = LevelInfo::from_tag(&tag)?;
    let xyz = |p: AbsXyz| [p.x(), p.y(), p.z()];
    Ok(WorldSummary {
        path: path.display().to_string(),
        spawn: xyz(level.spawn_position),
        time: level.time,
        seed: level.seed,
        start: level.legacy_player_position.map(xyz),
        stored_chunks: count_chunk_files(&DiskChunkStore::new(path, DimensionId::Normal))?,
        stored_nether_chunks: count_chunk_files(&DiskChunkStore::new(path, DimensionId::Nether))?,
    })
}

fn count_chunk_files(store: &DiskChunkStore) -> Result<usize> {
    let entries = match std::fs::read_dir(store.dir()) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err).with_context(|| format!("list {}", store.dir().display())),
    };
    let mut count = 0;
    for entry in entries {
        if entry?.file_name().to_string_lossy().ends_with(".cbor.zst") {
            count += 1;
        }
    }
    Ok(count)
}

pub fn print_summary(summary: &WorldSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }
    println!("world: {}", summary.path);
    println!("spawn: {:?}", summary.spawn);
    println!("time: {}", summary.time);
    match summary.seed {
        Some(seed) => println!("seed: {seed}"),
        None => println!("seed: (none, derived at load)"),
    }
    if let Some(start) = summary.start {
        println!("start: {start:?}");
    }
    println!("stored chunks: {} (nether: {})", summary.stored_chunks, summary.stored_nether_chunks);
    Ok(())
}

/// Resolve one chunk through the full tier stack and print its column
/// heights.
pub async fn show_chunk(path: &Path, loc: ChunkXz) -> Result<()> {
    let world = WorldStore::load(path)
        .with_context(|| format!("load world {}", path.display()))?;
    let result = world.chunk_store().load_chunk(loc).await;
    world.shutdown().await;

    let Some(chunk) = result.with_context(|| format!("load chunk {loc}"))? else {
        println!("chunk {loc}: not found");
        return Ok(());
    };
    println!("chunk {loc}");
    for z in 0..CHUNK_EDGE {
        let row: Vec<String> = (0..CHUNK_EDGE)
            .map(|x| match chunk.height_at(x, z) {
                Some(h) => format!("{h:3}"),
                None => "  -".to_string(),
            })
            .collect();
        println!("{}", row.join(" "));
    }
    Ok(())
}
