use serde::{Deserialize, Serialize};

use super::{Entity, EntityId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    Changed,
    Created,
    Deleted,
    /// Any kind this client does not understand. Rejected during merge.
    #[serde(other)]
    Unknown,
}

/// A server-side change to a single entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate<T> {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    /// The negative id this client used for the entity before the server
    /// confirmed it.
    #[serde(default)]
    pub client_assigned_id: Option<EntityId>,
    pub entity: T,
}

impl<T: Entity> EntityUpdate<T> {
    pub fn changed(entity: T) -> Self {
        Self {
            kind: UpdateKind::Changed,
            client_assigned_id: None,
            entity,
        }
    }

    pub fn created(client_assigned_id: EntityId, entity: T) -> Self {
        Self {
            kind: UpdateKind::Created,
            client_assigned_id: Some(client_assigned_id),
            entity,
        }
    }

    pub fn deleted(entity: T) -> Self {
        Self {
            kind: UpdateKind::Deleted,
            client_assigned_id: None,
            entity,
        }
    }

    /// The id under which the entity currently lives in the local store.
    pub fn target_id(&self) -> EntityId {
        self.client_assigned_id.unwrap_or_else(|| self.entity.id())
    }
}
