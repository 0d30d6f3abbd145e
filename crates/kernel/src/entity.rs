use bytes::Bytes;
use std::cell::Cell;
use tessera_common::{AbsXyz, EntityId, ItemId, Orientation};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Packets a connection may have queued before it counts as stalled.
pub const OUTBOUND_CAPACITY: usize = 1024;

/// Outbound packet channel to a player's connection writer.
pub type Outbound = mpsc::Sender<Bytes>;

/// A player's outbound channel, sized [`OUTBOUND_CAPACITY`].
pub fn outbound_channel() -> (Outbound, mpsc::Receiver<Bytes>) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// A connected player.
///
/// Constructed by the player's session once login succeeds; after
/// registration it is owned and mutated only by the game task.
#[derive(Debug)]
pub struct Player {
    pub entity_id: EntityId,
    pub name: String,
    pub position: AbsXyz,
    pub orientation: Orientation,
    pub current_item: ItemId,
    outbound: Outbound,
    stalled: Cell<bool>,
}

impl Player {
    pub fn new(entity_id: EntityId, name: impl Into<String>, position: AbsXyz, outbound: Outbound) -> Self {
        Self {
            entity_id,
            name: name.into(),
            position,
            orientation: Orientation::default(),
            current_item: tessera_protocol::NO_ITEM,
            outbound,
            stalled: Cell::new(false),
        }
    }

    /// Queue a packet for this player's connection without waiting.
    ///
    /// A closed connection is not an error here; the session submits the
    /// removal on its own. A full queue drops the packet and marks the
    /// player stalled, and the game evicts stalled players.
    pub fn transmit(&self, packet: Bytes) {
        match self.outbound.try_send(packet) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                if !self.stalled.replace(true) {
                    tracing::warn!(entity_id = %self.entity_id, name = %self.name, "outbound queue full");
                }
            }
            Err(TrySendError::Closed(_)) => {
                tracing::trace!(entity_id = %self.entity_id, "dropping packet for closed connection");
            }
        }
    }

    /// Whether a packet was dropped because the connection fell behind.
    pub fn is_stalled(&self) -> bool {
        self.stalled.get()
    }
}

/// A dropped item lying in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct PickupItem {
    pub entity_id: EntityId,
    pub item: ItemId,
    pub count: i8,
    pub position: AbsXyz,
}
