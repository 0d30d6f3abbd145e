use std::collections::BTreeMap;
use tessera_common::{ChunkXz, EntityId};

use crate::entity::Player;

/// Answers "which players are near this chunk" by scanning the live player
/// map at query time.
///
/// There is no persistent spatial structure: player counts are small next to
/// broadcast frequency, and a scan can never see a stale position.
#[derive(Debug, Clone, Copy)]
pub struct SpatialRadiusIndex {
    radius: i32,
}

impl SpatialRadiusIndex {
    pub fn new(radius: i32) -> Self {
        Self { radius }
    }


    /// Players whose current chunk lies within the radius of `loc` on both
    /// axes, inclusive. The iterator is lazy and borrows the player map.
    pub fn players_in_radius<'a>(
        &self,
        players: &'a BTreeMap<EntityId, Player>,
        loc: ChunkXz,
    ) -> impl Iterator<Item = &'a Player> + use<'a> {
        let radius = self.radius;
        players
            .values()
            .filter(move |p| loc.within_radius(p.position.to_chunk_xz(), radius))
    }

    /// Players within the radius of `player`'s own current chunk, including
    /// `player` itself if it is in the map.
    pub fn players_in_player_radius<'a>(
        &self,
        players: &'a BTreeMap<EntityId, Player>,
        player: &Player,
    ) -> impl Iterator<Item = &'a Player> + use<'a> {
        self.players_in_radius(players, player.position.to_chunk_xz())
    }
}
