use std::collections::BTreeMap;
use tessera_common::EntityId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Player,
    PickupItem,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("entity {0} is already registered")]
    AlreadyRegistered(EntityId),
    #[error("entity {0} is not registered")]
    NotRegistered(EntityId),
}

/// Allocates entity ids and tracks which ones are live.
///
/// Ids are handed out in increasing order starting at 1. After the counter
/// wraps, ids that are still live are skipped, so a live id is never reused.
#[derive(Debug)]
pub struct EntityDirectory {
    next_id: i32,
    live: BTreeMap<EntityId, EntityKind>,
}

impl Default for EntityDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityDirectory {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            live: BTreeMap::new(),
        }
    }

    /// Hand out a fresh id that is not currently registered.
    pub fn allocate(&mut self) -> EntityId {
        loop {
            let id = EntityId(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(1);
            if !self.live.contains_key(&id) {
                return id;
            }
        }
    }

    pub fn register(&mut self, id: EntityId, kind: EntityKind) -> Result<(), DirectoryError> {
        if self.live.contains_key(&id) {
            return Err(DirectoryError::AlreadyRegistered(id));
        }
        self.live.insert(id, kind);
        Ok(())
    }

    pub fn unregister(&mut self, id: EntityId) -> Result<EntityKind, DirectoryError> {
        self.live.remove(&id).ok_or(DirectoryError::NotRegistered(id))
    }

    pub fn kind(&self, id: EntityId) -> Option<EntityKind> {
        self.live.get(&id).copied()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}
