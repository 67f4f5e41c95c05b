//! Entity implementation

use std::collections::HashMap;
use std::fmt;

use super::component::{ComponentId, ComponentType};

/// Entity identifier
///
/// The index is recycled after physical deletion; the generation tells a
/// stale identifier apart from the entity that later reuses its index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Create an entity id from its raw parts
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Slot index within the scene
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Lifecycle of an entity
///
/// `Active → MarkedDestroyed → Deleted`. `Deleted` is terminal and is never
/// stored: a deleted entity simply no longer resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Live and visible to every pass
    Active,
    /// Destroy requested; still iterable until the next flush
    MarkedDestroyed,
    /// Physically removed; its index may already be reused
    Deleted,
}

/// Per-entity bookkeeping held by the registry
#[derive(Debug, Clone)]
pub struct EntityRecord {
    /// Unique name within the scene
    pub name: String,
    /// Optional grouping tag
    pub tag: Option<String>,
    /// Entity-level enabled flag
    pub enabled: bool,
    /// Current lifecycle state (never `Deleted`)
    pub state: EntityState,
    /// At most one component per type
    pub components: HashMap<ComponentType, ComponentId>,
}

impl EntityRecord {
    pub(crate) fn new(name: String, tag: Option<String>) -> Self {
        Self {
            name,
            tag,
            enabled: true,
            state: EntityState::Active,
            components: HashMap::new(),
        }
    }

    /// Component of the given type, if attached
    pub fn component(&self, component_type: ComponentType) -> Option<ComponentId> {
        self.components.get(&component_type).copied()
    }

    /// Whether destruction has been requested
    pub fn is_marked_destroyed(&self) -> bool {
        self.state == EntityState::MarkedDestroyed
    }
}
