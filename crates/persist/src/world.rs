use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tessera_common::{AbsXyz, DimensionId, Ticks};
use tessera_stream::{
    spawn_service, ChunkCombinator, ChunkServiceHandle, TerrainGenerator, DEFAULT_QUEUE_CAPACITY,
};
use tracing::{info, warn};

use crate::chunk_store::DiskChunkStore;
use crate::tag::{read_tag_file, write_tag_file, Tag, TagError};

/// World metadata file inside the world directory.
pub const LEVEL_FILE: &str = "level.dat";

const SPAWN_X: &str = "/Data/SpawnX";
const SPAWN_Y: &str = "/Data/SpawnY";
const SPAWN_Z: &str = "/Data/SpawnZ";
const TIME: &str = "/Data/Time";
const RANDOM_SEED: &str = "/Data/RandomSeed";
const LEGACY_PLAYER_POS: &str = "/Data/Player/Pos";
const PLAYER_POS: &str = "/Pos";

/// Errors loading the world metadata. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("world metadata not found at {0}")]
    NotFound(PathBuf),
    #[error("world metadata could not be decoded: {0}")]
    Decode(String),
    #[error("world metadata is missing required field {0}")]
    MissingField(&'static str),
    #[error("world metadata field {0} is not a number")]
    BadType(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PlayerDataError {
    #[error("invalid player name {0:?}")]
    InvalidName(String),
    #[error("player data not found at {0}")]
    NotFound(PathBuf),
    #[error("player data could not be decoded: {0}")]
    Decode(String),
    #[error("player data has a bad type at {0}")]
    BadType(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fields this server reads from the world metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelInfo {
    pub spawn_position: AbsXyz,
    /// Elapsed world time; 0 when the file does not record one.
    pub time: Ticks,
    /// `None` when the file does not record a seed.
    pub seed: Option<i64>,
    /// Position of the single-player record, when present and well typed.
    pub legacy_player_position: Option<AbsXyz>,
}

impl LevelInfo {
    /// Extract the level fields. Spawn coordinates are required; time and
    /// seed are optional.
    pub fn from_tag(tag: &Tag) -> Result<Self, LoadError> {
        let coord = |path: &'static str| {
            tag.lookup(path)
                .ok_or(LoadError::MissingField(path))?
                .as_f64()
                .ok_or(LoadError::BadType(path))
        };
        let spawn_position = AbsXyz::new(coord(SPAWN_X)?, coord(SPAWN_Y)?, coord(SPAWN_Z)?);

        let time = match tag.lookup(TIME) {
            None => 0,
            Some(t) => t.as_i64().unwrap_or_else(|| {
                warn!(path = TIME, "ignoring non-integer world time");
                0
            }),
        };
        let seed = tag.lookup(RANDOM_SEED).and_then(Tag::as_i64);

        Ok(Self {
            spawn_position,
            time,
            seed,
            legacy_player_position: abs_xyz_from_list(tag, LEGACY_PLAYER_POS),
        })
    }

    /// Build the metadata tree for a new world. Spawn coordinates are
    /// stored as doubles so fractional positions survive a reload.
    pub fn to_tag(&self) -> Tag {
        let mut data = Tag::compound()
            .with("SpawnX", Tag::Double(self.spawn_position.x()))
            .with("SpawnY", Tag::Double(self.spawn_position.y()))
            .with("SpawnZ", Tag::Double(self.spawn_position.z()))
            .with("Time", Tag::Long(self.time));
        if let Some(seed) = self.seed {
            data = data.with("RandomSeed", Tag::Long(seed));
        }
        if let Some(pos) = self.legacy_player_position {
            data = data.with("Player", Tag::compound().with(&PLAYER_POS[1..], position_list(&pos)));
        }
        Tag::compound().with("Data", data)
    }

    /// Write this metadata as `level.dat` under `world_path`.
    pub fn write(&self, world_path: impl AsRef<Path>) -> Result<(), TagError> {
        write_tag_file(world_path.as_ref().join(LEVEL_FILE), &self.to_tag())
    }
}

/// A per-user persisted record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerData {
    pub position: AbsXyz,
    /// The full record; fields beyond the position belong to other systems.
    pub tag: Tag,
}

/// World-level state loaded once at startup, plus the composed chunk store.
#[derive(Debug)]
pub struct WorldStore {
    world_path: PathBuf,
    seed: i64,
    time: Ticks,
    spawn_position: AbsXyz,
    start_position: AbsXyz,
    chunk_store: ChunkServiceHandle,
}

impl WorldStore {
    /// Read the world metadata and start the chunk tiers: the persistent
    /// store for the normal dimension first, the seeded generator second,
    /// both behind one combinator.
    ///
    /// Metadata is fully validated before any service starts, so a bad
    /// world fails without a runtime. Starting the tiers needs one.
    pub fn load(world_path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let world_path = world_path.as_ref().to_path_buf();
        let level = LevelInfo::from_tag(&read_level(&world_path)?)?;
        Ok(Self::start(world_path, level))
    }

    fn start(world_path: PathBuf, level: LevelInfo) -> Self {
        let seed = level.seed.unwrap_or_else(|| {
            let seed = time_derived_seed();
            warn!(seed, "world has no seed; using a time-derived one");
            seed
        });

        let (persistent, _) = spawn_service(
            DiskChunkStore::new(&world_path, DimensionId::Normal),
            DEFAULT_QUEUE_CAPACITY,
        );
        let (procedural, _) = spawn_service(TerrainGenerator::new(seed), DEFAULT_QUEUE_CAPACITY);
        let (chunk_store, _) =
            ChunkCombinator::new(vec![persistent, procedural]).spawn(DEFAULT_QUEUE_CAPACITY);

        info!(
            path = %world_path.display(),
            seed,
            time = level.time,
            spawn = ?level.spawn_position,
            "world loaded"
        );

        Self {
            world_path,
            seed,
            time: level.time,
            spawn_position: level.spawn_position,
            start_position: level.legacy_player_position.unwrap_or(level.spawn_position),
            chunk_store,
        }
    }

    pub fn seed(&self) -> i64 {
        self.seed
    }

    /// World time recorded in the metadata at load.
    pub fn time(&self) -> Ticks {
        self.time
    }

    pub fn spawn_position(&self) -> AbsXyz {
        self.spawn_position
    }

    /// Where a player without a saved record starts: the single-player
    /// position when the metadata has one, else the spawn point.
    pub fn start_position(&self) -> AbsXyz {
        self.start_position
    }

    /// The composed chunk store for the normal dimension.
    pub fn chunk_store(&self) -> &ChunkServiceHandle {
        &self.chunk_store
    }

    /// Start a persistent-only chunk service for another dimension.
    pub fn chunk_store_for_dimension(&self, dimension: DimensionId) -> ChunkServiceHandle {
        let (handle, _) = spawn_service(
            DiskChunkStore::new(&self.world_path, dimension),
            DEFAULT_QUEUE_CAPACITY,
        );
        handle
    }

    /// Load the persisted record of `user`. Reads synchronously and does
    /// not touch the chunk store.
    pub fn player_data(&self, user: &str) -> Result<PlayerData, PlayerDataError> {
        let path = player_data_path(&self.world_path, user)?;
        let tag = read_tag_file(&path).map_err(|err| match err {
            TagError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PlayerDataError::NotFound(path.clone())
            }
            TagError::Io(io) => PlayerDataError::Io(io),
            TagError::Decode(reason) | TagError::Encode(reason) => PlayerDataError::Decode(reason),
        })?;
        let position = abs_xyz_from_list(&tag, PLAYER_POS).ok_or(PlayerDataError::BadType(PLAYER_POS))?;
        Ok(PlayerData { position, tag })
    }

    /// Drain and stop the chunk services.
    pub async fn shutdown(&self) {
        self.chunk_store.shutdown().await;
        info!("world chunk services stopped");
    }
}

/// Path of `user`'s record: `players/<user>.dat`.
pub fn player_data_path(world_path: &Path, user: &str) -> Result<PathBuf, PlayerDataError> {
    let valid = !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !valid {
        return Err(PlayerDataError::InvalidName(user.to_owned()));
    }
    Ok(world_path.join("players").join(format!("{user}.dat")))
}

/// Write a minimal player record holding only a position.
pub fn write_player_data(world_path: &Path, user: &str, position: &AbsXyz) -> Result<(), PlayerDataError> {
    let path = player_data_path(world_path, user)?;
    let tag = Tag::compound().with(&PLAYER_POS[1..], position_list(position));
    write_tag_file(path, &tag).map_err(|err| match err {
        TagError::Io(io) => PlayerDataError::Io(io),
        TagError::Decode(reason) | TagError::Encode(reason) => PlayerDataError::Decode(reason),
    })
}

fn read_level(world_path: &Path) -> Result<Tag, LoadError> {
    let path = world_path.join(LEVEL_FILE);
    read_tag_file(&path).map_err(|err| match err {
        TagError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => LoadError::NotFound(path.clone()),
        TagError::Io(io) => LoadError::Io(io),
        TagError::Decode(reason) | TagError::Encode(reason) => LoadError::Decode(reason),
    })
}

/// A three-element list of doubles at `path`.
fn abs_xyz_from_list(tag: &Tag, path: &str) -> Option<AbsXyz> {
    match tag.lookup(path)?.as_list()? {
        [Tag::Double(x), Tag::Double(y), Tag::Double(z)] => Some(AbsXyz::new(*x, *y, *z)),
        _ => None,
    }
}

fn position_list(pos: &AbsXyz) -> Tag {
    Tag::List(vec![Tag::Double(pos.x()), Tag::Double(pos.y()), Tag::Double(pos.z())])
}

/// A seed for worlds created without one.
pub fn time_derived_seed() -> i64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    (nanos & i64::MAX as u64) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::{Chunk, ChunkXz};
    use tessera_stream::{ChunkError, ChunkSource};

    fn level(seed: Option<i64>) -> LevelInfo {
        LevelInfo {
            spawn_position: AbsXyz::new(0.0, 64.0, 0.0),
            time: 0,
            seed,
            legacy_player_position: None,
        }
    }

    #[test]
    fn level_info_defaults_time_and_seed() {
        let tag = Tag::compound().with(
            "Data",
            Tag::compound()
                .with("SpawnX", Tag::Int(5))
                .with("SpawnY", Tag::Double(70.5))
                .with("SpawnZ", Tag::Short(-3)),
        );
        let info = LevelInfo::from_tag(&tag).unwrap();
        assert_eq!(info.spawn_position, AbsXyz::new(5.0, 70.5, -3.0));
        assert_eq!(info.time, 0);
        assert_eq!(info.seed, None);
        assert_eq!(info.legacy_player_position, None);
    }

    #[test]
    fn level_info_requires_every_spawn_coordinate() {
        let tag = Tag::compound().with(
            "Data",
            Tag::compound()
                .with("SpawnX", Tag::Int(5))
                .with("SpawnZ", Tag::Int(5)),
        );
        assert!(matches!(
            LevelInfo::from_tag(&tag),
            Err(LoadError::MissingField(SPAWN_Y))
        ));
    }

    #[test]
    fn non_numeric_spawn_is_bad_type() {
        let tag = Tag::compound().with(
            "Data",
            Tag::compound()
                .with("SpawnX", Tag::Int(0))
                .with("SpawnY", Tag::String("high".into()))
                .with("SpawnZ", Tag::Int(0)),
        );
        assert!(matches!(
            LevelInfo::from_tag(&tag),
            Err(LoadError::BadType(SPAWN_Y))
        ));
    }

    #[test]
    fn fractional_spawn_survives_write_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let mut info = level(Some(9));
        info.spawn_position = AbsXyz::new(0.5, 64.25, -7.75);
        info.write(tmp.path()).unwrap();
        let tag = read_level(tmp.path()).unwrap();
        assert_eq!(LevelInfo::from_tag(&tag).unwrap(), info);
    }

    #[test]
    fn level_info_tag_roundtrip() {
        let info = LevelInfo {
            spawn_position: AbsXyz::new(10.0, 64.0, -20.0),
            time: 24000,
            seed: Some(-7),
            legacy_player_position: Some(AbsXyz::new(10.5, 65.0, -19.5)),
        };
        assert_eq!(LevelInfo::from_tag(&info.to_tag()).unwrap(), info);
    }

    #[test]
    fn missing_level_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            WorldStore::load(tmp.path()),
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn garbage_level_file_is_decode_error() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join(LEVEL_FILE), b"nope").unwrap();
        assert!(matches!(
            WorldStore::load(tmp.path()),
            Err(LoadError::Decode(_))
        ));
    }

    // No runtime here: starting any chunk service would panic.
    #[test]
    fn level_without_spawn_fails_before_starting_services() {
        let tmp = tempfile::tempdir().unwrap();
        let tag = Tag::compound().with("Data", Tag::compound().with("Time", Tag::Long(5)));
        write_tag_file(tmp.path().join(LEVEL_FILE), &tag).unwrap();
        assert!(matches!(
            WorldStore::load(tmp.path()),
            Err(LoadError::MissingField(SPAWN_X))
        ));

        let tag = Tag::compound().with(
            "Data",
            Tag::compound()
                .with("SpawnX", Tag::Int(0))
                .with("SpawnY", Tag::Int(64))
                .with("SpawnZ", Tag::String("south".into())),
        );
        write_tag_file(tmp.path().join(LEVEL_FILE), &tag).unwrap();
        assert!(matches!(
            WorldStore::load(tmp.path()),
            Err(LoadError::BadType(SPAWN_Z))
        ));
    }

    #[test]
    fn valid_world_starts_services_on_load() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(1)).write(tmp.path()).unwrap();
        let path = tmp.path().to_path_buf();
        let outside_runtime = std::panic::catch_unwind(move || WorldStore::load(&path));
        assert!(outside_runtime.is_err());
    }

    #[tokio::test]
    async fn seed_42_generates_reproducible_origin_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(42)).write(tmp.path()).unwrap();

        let first = WorldStore::load(tmp.path()).unwrap();
        assert_eq!(first.seed(), 42);
        assert_eq!(first.time(), 0);
        assert_eq!(first.spawn_position(), AbsXyz::new(0.0, 64.0, 0.0));
        let origin = ChunkXz::new(0, 0);
        let a = first.chunk_store().load_chunk(origin).await.unwrap().unwrap();
        assert_eq!(a, TerrainGenerator::new(42).generate(origin));

        let second = WorldStore::load(tmp.path()).unwrap();
        let b = second.chunk_store().load_chunk(origin).await.unwrap().unwrap();
        assert_eq!(a.blocks(), b.blocks());
    }

    #[tokio::test]
    async fn persisted_chunk_wins_over_generation() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(42)).write(tmp.path()).unwrap();
        let loc = ChunkXz::new(2, -1);
        let mut stored = Chunk::empty(loc);
        stored.set_block(1, 1, 1, 5);
        DiskChunkStore::new(tmp.path(), DimensionId::Normal)
            .save_chunk(&stored)
            .unwrap();

        let world = WorldStore::load(tmp.path()).unwrap();
        assert_eq!(world.chunk_store().load_chunk(loc).await.unwrap(), Some(stored));
    }

    #[tokio::test]
    async fn corrupt_persisted_chunk_fails_only_that_request() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(1)).write(tmp.path()).unwrap();
        let disk = DiskChunkStore::new(tmp.path(), DimensionId::Normal);
        let bad = ChunkXz::new(0, 0);
        disk.save_chunk(&Chunk::empty(bad)).unwrap();
        std::fs::write(disk.chunk_path(bad), b"corrupt").unwrap();

        let world = WorldStore::load(tmp.path()).unwrap();
        assert!(matches!(
            world.chunk_store().load_chunk(bad).await,
            Err(ChunkError::Decode { .. })
        ));
        assert!(world.chunk_store().load_chunk(ChunkXz::new(1, 0)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unseeded_world_still_loads() {
        let tmp = tempfile::tempdir().unwrap();
        level(None).write(tmp.path()).unwrap();
        let world = WorldStore::load(tmp.path()).unwrap();
        assert!(world.seed() >= 0);
        assert!(world.chunk_store().load_chunk(ChunkXz::new(0, 0)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn start_position_prefers_legacy_player_record() {
        let tmp = tempfile::tempdir().unwrap();
        let mut info = level(Some(3));
        level(Some(3)).write(tmp.path()).unwrap();
        let plain = WorldStore::load(tmp.path()).unwrap();
        assert_eq!(plain.start_position(), AbsXyz::new(0.0, 64.0, 0.0));

        info.legacy_player_position = Some(AbsXyz::new(4.5, 66.0, 4.5));
        info.write(tmp.path()).unwrap();
        let legacy = WorldStore::load(tmp.path()).unwrap();
        assert_eq!(legacy.start_position(), AbsXyz::new(4.5, 66.0, 4.5));
        assert_eq!(legacy.spawn_position(), AbsXyz::new(0.0, 64.0, 0.0));
    }

    #[tokio::test]
    async fn player_data_loads_position() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(3)).write(tmp.path()).unwrap();
        let world = WorldStore::load(tmp.path()).unwrap();

        assert!(matches!(
            world.player_data("steve"),
            Err(PlayerDataError::NotFound(_))
        ));
        write_player_data(tmp.path(), "steve", &AbsXyz::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(
            world.player_data("steve").unwrap().position,
            AbsXyz::new(1.0, 2.0, 3.0)
        );
        assert!(matches!(
            world.player_data("../level"),
            Err(PlayerDataError::InvalidName(_))
        ));
    }

    #[tokio::test]
    async fn player_data_with_bad_position_type() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(3)).write(tmp.path()).unwrap();
        let world = WorldStore::load(tmp.path()).unwrap();
        let path = player_data_path(tmp.path(), "alex").unwrap();
        write_tag_file(&path, &Tag::compound().with("Pos", Tag::Int(1))).unwrap();
        assert!(matches!(
            world.player_data("alex"),
            Err(PlayerDataError::BadType(PLAYER_POS))
        ));
    }

    #[tokio::test]
    async fn nether_store_reads_its_own_directory() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(3)).write(tmp.path()).unwrap();
        let loc = ChunkXz::new(0, 0);
        let mut nether_disk = DiskChunkStore::new(tmp.path(), DimensionId::Nether);
        nether_disk.save_chunk(&Chunk::empty(loc)).unwrap();
        assert!(nether_disk.load_chunk(loc).unwrap().is_some());

        let world = WorldStore::load(tmp.path()).unwrap();
        let nether = world.chunk_store_for_dimension(DimensionId::Nether);
        assert_eq!(nether.load_chunk(loc).await.unwrap(), Some(Chunk::empty(loc)));
        assert!(nether.load_chunk(ChunkXz::new(9, 9)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_the_chunk_store() {
        let tmp = tempfile::tempdir().unwrap();
        level(Some(3)).write(tmp.path()).unwrap();
        let world = WorldStore::load(tmp.path()).unwrap();
        world.shutdown().await;
        assert!(matches!(
            world.chunk_store().load_chunk(ChunkXz::new(0, 0)).await,
            Err(ChunkError::ServiceStopped)
        ));
    }
}
