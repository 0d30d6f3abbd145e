use bytes::Bytes;
use tessera_common::{AbsXyz, EntityId, Orientation, Ticks};
use tokio::sync::{mpsc, oneshot};

use crate::entity::{PickupItem, Player};

/// A unit of work applied by the game task.
///
/// Each variant carries only the data it needs. Query-style commands carry a
/// reply channel; everything else is fire-and-forget.
#[derive(Debug)]
pub enum Command {
    AllocateEntityId {
        reply: oneshot::Sender<EntityId>,
    },
    AddPlayer(Player),
    RemovePlayer(EntityId),
    MovePlayer {
        entity_id: EntityId,
        position: Option<AbsXyz>,
        orientation: Option<Orientation>,
    },
    AddPickupItem(PickupItem),
    MulticastPacket {
        packet: Bytes,
        except: Option<EntityId>,
    },
    SendChatMessage(String),
    Tick,
    Query(Query),
}

/// Read-only questions answered from inside the game task.
#[derive(Debug)]
pub enum Query {
    PlayerCount(oneshot::Sender<usize>),
    Time(oneshot::Sender<Ticks>),
    /// Player names in entity id order.
    PlayerNames(oneshot::Sender<Vec<String>>),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GameError {
    #[error("game task has stopped")]
    Stopped,
}

/// Cloneable submission side of the game's command queue.
///
/// Every call suspends while the queue is full, so a slow game task pushes
/// back on its producers instead of dropping work.
#[derive(Debug, Clone)]
pub struct GameHandle {
    tx: mpsc::Sender<Command>,
}

impl GameHandle {
    pub(crate) fn new(tx: mpsc::Sender<Command>) -> Self {
        Self { tx }
    }

    /// Submit a command, waiting for queue space. Fails once the game task
    /// has stopped.
    pub async fn enqueue(&self, command: Command) -> Result<(), GameError> {
        self.tx.send(command).await.map_err(|_| GameError::Stopped)
    }

    /// Reserve a fresh entity id in queue order.
    pub async fn allocate_entity_id(&self) -> Result<EntityId, GameError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::AllocateEntityId { reply }).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    /// Register a player. Its outbound queue starts receiving packets as
    /// soon as the command applies.
    pub async fn add_player(&self, player: Player) -> Result<(), GameError> {
        self.enqueue(Command::AddPlayer(player)).await
    }

    /// Despawn and forget a player. Unknown ids are ignored.
    pub async fn remove_player(&self, entity_id: EntityId) -> Result<(), GameError> {
        self.enqueue(Command::RemovePlayer(entity_id)).await
    }

    /// Update a player's position, orientation, or both.
    pub async fn move_player(
        &self,
        entity_id: EntityId,
        position: Option<AbsXyz>,
        orientation: Option<Orientation>,
    ) -> Result<(), GameError> {
        self.enqueue(Command::MovePlayer {
            entity_id,
            position,
            orientation,
        })
        .await
    }

    /// Register a dropped item and show it to players near its chunk.
    pub async fn add_pickup_item(&self, item: PickupItem) -> Result<(), GameError> {
        self.enqueue(Command::AddPickupItem(item)).await
    }

    /// Send `packet` to every player except `except`.
    pub async fn multicast_packet(&self, packet: Bytes, except: Option<EntityId>) -> Result<(), GameError> {
        self.enqueue(Command::MulticastPacket { packet, except }).await
    }

    /// Broadcast a chat line to every player.
    pub async fn send_chat_message(&self, message: impl Into<String>) -> Result<(), GameError> {
        self.enqueue(Command::SendChatMessage(message.into())).await
    }

    /// Advance the clock by one step and broadcast the new time.
    pub async fn tick(&self) -> Result<(), GameError> {
        self.enqueue(Command::Tick).await
    }

    /// Number of registered players.
    pub async fn player_count(&self) -> Result<usize, GameError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Query(Query::PlayerCount(reply))).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    /// Current world time.
    pub async fn time(&self) -> Result<Ticks, GameError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Query(Query::Time(reply))).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }

    /// Names of registered players in entity id order.
    pub async fn player_names(&self) -> Result<Vec<String>, GameError> {
        let (reply, rx) = oneshot::channel();
        self.enqueue(Command::Query(Query::PlayerNames(reply))).await?;
        rx.await.map_err(|_| GameError::Stopped)
    }
}
