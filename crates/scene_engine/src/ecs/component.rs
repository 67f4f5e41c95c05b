//! Component records
//!
//! Component kinds form a closed set ([`ComponentData`]). Each record keeps
//! its owner, its own enabled flag and, once activated, the manager that
//! indexes it. A record without a manager is invisible to every pass.

use slotmap::new_key_type;

use super::components::{AudioPlayer, BehaviourSlot, MeshInstance, SpriteInstance, TransformId};
use super::EntityId;

new_key_type! {
    /// Key of a component record
    pub struct ComponentId;
}

/// Discriminant of [`ComponentData`]; an entity holds at most one of each
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentType {
    /// Spatial transform
    Transform,
    /// Drawable mesh instance
    MeshInstance,
    /// Camera-facing sprite
    SpriteInstance,
    /// Audio source
    AudioPlayer,
    /// User script
    Behaviour,
}

impl ComponentType {
    /// Every component type
    pub fn all() -> &'static [ComponentType] {
        &[
            ComponentType::Transform,
            ComponentType::MeshInstance,
            ComponentType::SpriteInstance,
            ComponentType::AudioPlayer,
            ComponentType::Behaviour,
        ]
    }

    /// Manager responsible for this type
    pub fn manager(&self) -> ManagerKind {
        match self {
            ComponentType::Transform => ManagerKind::Transforms,
            ComponentType::MeshInstance => ManagerKind::MeshInstances,
            ComponentType::SpriteInstance => ManagerKind::Sprites,
            ComponentType::AudioPlayer => ManagerKind::Audio,
            ComponentType::Behaviour => ManagerKind::Behaviours,
        }
    }
}

/// Per-type managers that maintain secondary indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    /// Keeps transform nodes' enabled flags in sync
    Transforms,
    /// Maintains the per-view-type instance lists
    MeshInstances,
    /// Maintains the active sprite set
    Sprites,
    /// Maintains the active audio player set
    Audio,
    /// Maintains the update and late-update sets
    Behaviours,
}

/// Component payload
#[derive(Debug)]
pub enum ComponentData {
    /// Handle into the scene's transform arena
    Transform(TransformId),
    /// Mesh instance data
    MeshInstance(MeshInstance),
    /// Sprite data
    SpriteInstance(SpriteInstance),
    /// Audio player data
    AudioPlayer(AudioPlayer),
    /// Behaviour script
    Behaviour(BehaviourSlot),
}

impl ComponentData {
    /// Discriminant of this payload
    pub fn component_type(&self) -> ComponentType {
        match self {
            ComponentData::Transform(_) => ComponentType::Transform,
            ComponentData::MeshInstance(_) => ComponentType::MeshInstance,
            ComponentData::SpriteInstance(_) => ComponentType::SpriteInstance,
            ComponentData::AudioPlayer(_) => ComponentType::AudioPlayer,
            ComponentData::Behaviour(_) => ComponentType::Behaviour,
        }
    }

    /// Whether the payload is complete enough for its manager to track it.
    ///
    /// Mesh instances need drawable data; everything else activates on add.
    pub fn is_activatable(&self) -> bool {
        match self {
            ComponentData::MeshInstance(instance) => instance.is_drawable(),
            _ => true,
        }
    }
}

/// Lifecycle of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Live
    Active,
    /// Removal requested; torn down at the next flush
    MarkedDestroyed,
}

/// Bookkeeping for one component
#[derive(Debug)]
pub struct ComponentRecord {
    /// Owning entity
    pub entity: EntityId,
    /// Payload
    pub data: ComponentData,
    /// Component-level enabled flag, independent of the entity's
    pub enabled: bool,
    /// Lifecycle state
    pub state: ComponentState,
    /// Manager assigned at activation
    pub manager: Option<ManagerKind>,
    /// Whether the manager currently lists this component in its index
    pub(crate) indexed: bool,
}

impl ComponentRecord {
    pub(crate) fn new(entity: EntityId, data: ComponentData) -> Self {
        Self {
            entity,
            data,
            enabled: true,
            state: ComponentState::Active,
            manager: None,
            indexed: false,
        }
    }

    /// Discriminant of the payload
    pub fn component_type(&self) -> ComponentType {
        self.data.component_type()
    }

    /// Whether a manager has been assigned
    pub fn is_activated(&self) -> bool {
        self.manager.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::MeshViewType;

    #[test]
    fn test_mesh_instance_is_not_activatable_without_drawable() {
        let data = ComponentData::MeshInstance(MeshInstance::new(MeshViewType::Static));
        assert!(!data.is_activatable());
        assert_eq!(data.component_type(), ComponentType::MeshInstance);
    }

    #[test]
    fn test_new_record_has_no_manager() {
        let record = ComponentRecord::new(
            EntityId::new(0, 0),
            ComponentData::AudioPlayer(AudioPlayer::new("wind")),
        );
        assert!(!record.is_activated());
        assert!(record.enabled);
        assert_eq!(record.component_type().manager(), ManagerKind::Audio);
    }
}
