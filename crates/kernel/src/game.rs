use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;
use std::time::Duration;
use tessera_common::{AbsXyz, ChunkXz, EntityId, Orientation, Ticks};
use tessera_protocol as proto;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::command::{Command, GameHandle, Query};
use crate::directory::{EntityDirectory, EntityKind};
use crate::entity::{PickupItem, Player};
use crate::radius::SpatialRadiusIndex;

/// Game sizing and pacing.
#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Half-width, in chunks, of a player's interest area.
    pub chunk_radius: i32,
    /// Capacity of the command queue.
    pub queue_capacity: usize,
    /// Clock advance per tick command.
    pub tick_step: Ticks,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            chunk_radius: 10,
            queue_capacity: 256,
            tick_step: 20,
        }
    }
}

/// The authoritative game state.
///
/// Owned by exactly one task once [`Game::spawn`] is called. All mutation
/// arrives through [`Command`]s, applied strictly in queue order.
#[derive(Debug)]
pub struct Game {
    config: GameConfig,
    directory: EntityDirectory,
    players: BTreeMap<EntityId, Player>,
    pickup_items: BTreeMap<EntityId, PickupItem>,
    index: SpatialRadiusIndex,
    time: Ticks,
}

impl Game {
    /// Create a game whose clock starts at `time`.
    ///
    /// A `queue_capacity` of zero is raised to one.
    pub fn new(mut config: GameConfig, time: Ticks) -> Self {
        config.queue_capacity = config.queue_capacity.max(1);
        let index = SpatialRadiusIndex::new(config.chunk_radius);
        Self {
            config,
            directory: EntityDirectory::new(),
            players: BTreeMap::new(),
            pickup_items: BTreeMap::new(),
            index,
            time,
        }
    }

    /// Move the game onto its own task and return the queue handle.
    ///
    /// The task ends once every [`GameHandle`] has been dropped.
    pub fn spawn(self) -> (GameHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let task = tokio::spawn(self.run(rx));
        (GameHandle::new(tx), task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        info!(
            chunk_radius = self.config.chunk_radius,
            time = self.time,
            "game loop started"
        );
        while let Some(command) = rx.recv().await {
            self.apply(command);
        }
        info!("game loop stopped");
    }

    /// Apply one command. Failures are logged and confined to the command.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::AllocateEntityId { reply } => {
                let id = self.directory.allocate();
                if reply.send(id).is_err() {
                    debug!(entity_id = %id, "allocation requester went away");
                }
            }
            Command::AddPlayer(player) => self.add_player(player),
            Command::RemovePlayer(entity_id) => self.remove_player(entity_id),
            Command::MovePlayer {
                entity_id,
                position,
                orientation,
            } => self.move_player(entity_id, position, orientation),
            Command::AddPickupItem(item) => self.add_pickup_item(item),
            Command::MulticastPacket { packet, except } => self.multicast_packet(&packet, except),
            Command::SendChatMessage(message) => self.send_chat_message(&message),
            Command::Tick => self.tick(),
            Command::Query(query) => self.answer(query),
        }
        self.evict_stalled();
    }

    /// Current world time.
    pub fn time(&self) -> Ticks {
        self.time
    }

    /// Registered players by entity id.
    pub fn players(&self) -> &BTreeMap<EntityId, Player> {
        &self.players
    }

    /// Registered pickup items by entity id.
    pub fn pickup_items(&self) -> &BTreeMap<EntityId, PickupItem> {
        &self.pickup_items
    }

    pub fn directory(&self) -> &EntityDirectory {
        &self.directory
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Remove every player whose connection stopped draining its queue.
    /// Removal broadcasts may stall further players, so this repeats until
    /// none are left.
    fn evict_stalled(&mut self) {
        while let Some(entity_id) = self
            .players
            .values()
            .find(|p| p.is_stalled())
            .map(|p| p.entity_id)
        {
            warn!(entity_id = %entity_id, "evicting stalled player");
            self.remove_player(entity_id);
        }
    }

    /// Register a player and exchange spawn notifications with everyone in
    /// its interest radius.
    fn add_player(&mut self, player: Player) {
        let entity_id = player.entity_id;
        if let Err(err) = self.directory.register(entity_id, EntityKind::Player) {
            warn!(%err, name = %player.name, "add_player skipped");
            return;
        }
        info!(entity_id = %entity_id, name = %player.name, "player joined");
        self.players.insert(entity_id, player);

        let Some(player) = self.players.get(&entity_id) else {
            return;
        };
        self.send_chat_message(&format!("{} has joined", player.name));

        // Spawn the new player for those already nearby.
        let mut buf = BytesMut::new();
        match proto::write_named_entity_spawn(
            &mut buf,
            entity_id,
            &player.name,
            &player.position,
            &player.orientation,
            player.current_item,
        ) {
            Ok(()) => self.multicast_radius_packet(&buf.freeze(), player),
            Err(err) => warn!(%err, entity_id = %entity_id, "cannot encode player spawn"),
        }

        // Spawn everyone nearby for the new player, in one buffer.
        let mut buf = BytesMut::new();
        for existing in self.index.players_in_player_radius(&self.players, player) {
            if existing.entity_id == entity_id {
                continue;
            }
            if let Err(err) = proto::write_named_entity_spawn(
                &mut buf,
                existing.entity_id,
                &existing.name,
                &existing.position,
                &existing.orientation,
                existing.current_item,
            ) {
                warn!(%err, entity_id = %existing.entity_id, "cannot encode existing player spawn");
            }
        }
        if !buf.is_empty() {
            player.transmit(buf.freeze());
        }
    }

    /// Despawn a player for everyone nearby and forget it.
    fn remove_player(&mut self, entity_id: EntityId) {
        let Some(player) = self.players.get(&entity_id) else {
            warn!(entity_id = %entity_id, "remove_player for unknown player");
            return;
        };
        self.multicast_radius_packet(&proto::write_destroy_entity(entity_id), player);

        if let Err(err) = self.directory.unregister(entity_id) {
            warn!(%err, "entity directory out of step with player map");
        }
        if let Some(player) = self.players.remove(&entity_id) {
            info!(entity_id = %entity_id, name = %player.name, "player left");
            self.send_chat_message(&format!("{} has left", player.name));
        }
    }

    fn move_player(
        &mut self,
        entity_id: EntityId,
        position: Option<AbsXyz>,
        orientation: Option<Orientation>,
    ) {
        let Some(player) = self.players.get_mut(&entity_id) else {
            debug!(entity_id = %entity_id, "move for unknown player");
            return;
        };
        if let Some(position) = position {
            player.position = position;
        }
        if let Some(orientation) = orientation {
            player.orientation = orientation;
        }
    }

    /// Register a dropped item and spawn it for players near its chunk.
    ///
    /// If the spawn packet cannot be built the item stays registered but
    /// unseen.
    fn add_pickup_item(&mut self, item: PickupItem) {
        let entity_id = item.entity_id;
        if let Err(err) = self.directory.register(entity_id, EntityKind::PickupItem) {
            warn!(%err, "add_pickup_item skipped");
            return;
        }
        let loc = item.position.to_chunk_xz();
        let packet = proto::write_pickup_spawn(entity_id, item.item, item.count, &item.position);
        self.pickup_items.insert(entity_id, item);

        match packet {
            Ok(packet) => self.multicast_chunk_packet(&packet, loc),
            Err(err) => warn!(%err, entity_id = %entity_id, "add_pickup_item: cannot encode spawn"),
        }
    }

    /// Deliver `packet` to every player except `except`.
    fn multicast_packet(&self, packet: &Bytes, except: Option<EntityId>) {
        for player in self.players.values() {
            if Some(player.entity_id) == except {
                continue;
            }
            player.transmit(packet.clone());
        }
    }

    fn send_chat_message(&self, message: &str) {
        match proto::write_chat_message(message) {
            Ok(packet) => self.multicast_packet(&packet, None),
            Err(err) => warn!(%err, "cannot encode chat message"),
        }
    }

    /// Deliver `packet` to every player within the radius of `loc`.
    fn multicast_chunk_packet(&self, packet: &Bytes, loc: ChunkXz) {
        for receiver in self.index.players_in_radius(&self.players, loc) {
            receiver.transmit(packet.clone());
        }
    }

    /// Deliver `packet` to every player within the radius of `sender`,
    /// other than `sender` itself.
    fn multicast_radius_packet(&self, packet: &Bytes, sender: &Player) {
        for receiver in self.index.players_in_player_radius(&self.players, sender) {
            if receiver.entity_id == sender.entity_id {
                continue;
            }
            receiver.transmit(packet.clone());
        }
    }

    fn tick(&mut self) {
        self.time += self.config.tick_step;
        self.multicast_packet(&proto::write_time_update(self.time), None);
    }

    fn answer(&self, query: Query) {
        // A dropped receiver only means the asker stopped waiting.
        let _ = match query {
            Query::PlayerCount(reply) => reply.send(self.players.len()).map_err(drop),
            Query::Time(reply) => reply.send(self.time).map_err(drop),
            Query::PlayerNames(reply) => reply
                .send(self.players.values().map(|p| p.name.clone()).collect())
                .map_err(drop),
        };
    }
}

/// Submit a [`Command::Tick`] every `period` until the game task stops.
///
/// There is no drift compensation. If the game falls behind, ticks queue up
/// and apply in order, so clock broadcasts lag real time under load.
pub fn spawn_timer(handle: GameHandle, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if handle.tick().await.is_err() {
                debug!("tick timer stopped");
                break;
            }
        }
    })
}
