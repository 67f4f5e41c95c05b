//! Entity registry
//!
//! Index-recycling storage for entity records plus the name and tag lookup
//! tables. Names are unique per scene; tags group any number of entities.

use std::collections::HashMap;

use indexmap::IndexSet;

use super::entity::{EntityId, EntityRecord, EntityState};
use crate::foundation::collections::IndexAllocator;
use crate::foundation::contract;

#[derive(Debug)]
struct Slot {
    id: EntityId,
    record: EntityRecord,
}

/// Container of all entities of one scene
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: Vec<Option<Slot>>,
    allocator: IndexAllocator,
    names: HashMap<String, EntityId>,
    tags: HashMap<String, IndexSet<EntityId>>,
    generated_names: u64,
}

impl EntityRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new entity, reusing a freed index when one exists.
    ///
    /// A name already used by a live (or not yet flushed) entity is a
    /// contract violation.
    pub fn create(&mut self, name: impl Into<String>, tag: Option<String>) -> EntityId {
        let name = name.into();
        if let Some(existing) = self.names.get(&name) {
            contract::violation(format!(
                "entity name '{name}' is already used by entity {existing}"
            ));
        }

        let (index, generation) = self.allocator.allocate();
        let id = EntityId::new(index, generation);
        let slot = index as usize;
        if slot == self.slots.len() {
            self.slots.push(None);
        }
        self.slots[slot] = Some(Slot {
            id,
            record: EntityRecord::new(name.clone(), tag.clone()),
        });

        self.names.insert(name, id);
        if let Some(tag) = tag {
            self.tags.entry(tag).or_default().insert(id);
        }
        id
    }

    /// Produce a name no live entity uses
    pub fn generate_name(&mut self) -> String {
        loop {
            self.generated_names += 1;
            let candidate = format!("entity#{}", self.generated_names);
            if !self.names.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    /// Record for a live id, `None` once the entity is deleted
    pub fn get(&self, id: EntityId) -> Option<&EntityRecord> {
        match self.slots.get(id.index() as usize)? {
            Some(slot) if slot.id == id => Some(&slot.record),
            _ => None,
        }
    }

    /// Mutable record for a live id
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut EntityRecord> {
        match self.slots.get_mut(id.index() as usize)? {
            Some(slot) if slot.id == id => Some(&mut slot.record),
            _ => None,
        }
    }

    /// Record for an id the caller guarantees is not deleted
    #[track_caller]
    pub fn expect(&self, id: EntityId) -> &EntityRecord {
        match self.get(id) {
            Some(record) => record,
            None => contract::violation(format!("entity {id} was already deleted")),
        }
    }

    /// Mutable record for an id the caller guarantees is not deleted
    #[track_caller]
    pub fn expect_mut(&mut self, id: EntityId) -> &mut EntityRecord {
        match self.get_mut(id) {
            Some(record) => record,
            None => contract::violation(format!("entity {id} was already deleted")),
        }
    }

    /// Lifecycle state; stale ids report `Deleted`
    pub fn state(&self, id: EntityId) -> EntityState {
        self.get(id).map_or(EntityState::Deleted, |record| record.state)
    }

    /// Look an entity up by its unique name
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    /// Entities carrying `tag`, in creation order
    pub fn with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.tags
            .get(tag)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ids of all entities not yet physically deleted, in index order
    pub fn ids(&self) -> Vec<EntityId> {
        self.slots.iter().flatten().map(|slot| slot.id).collect()
    }

    /// Physically remove an entity and release its index
    #[track_caller]
    pub(crate) fn remove(&mut self, id: EntityId) -> EntityRecord {
        if self.get(id).is_none() {
            contract::violation(format!("entity {id} was already deleted"));
        }
        let Some(slot) = self.slots[id.index() as usize].take() else {
            contract::violation(format!("entity {id} has no slot"));
        };
        let record = slot.record;

        self.names.remove(&record.name);
        if let Some(tag) = &record.tag {
            if let Some(ids) = self.tags.get_mut(tag) {
                ids.shift_remove(&id);
                if ids.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
        self.allocator.free(id.index());
        record
    }

    /// Number of entities not yet physically deleted
    pub fn len(&self) -> usize {
        self.allocator.live_count()
    }

    /// Whether the registry holds no entity
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_lookup_by_name_and_tag() {
        let mut registry = EntityRegistry::new();
        let floor = registry.create("floor", Some("static".to_string()));
        let wall = registry.create("wall", Some("static".to_string()));
        let player = registry.create("player", None);

        assert_eq!(registry.find_by_name("floor"), Some(floor));
        assert_eq!(registry.with_tag("static"), vec![floor, wall]);
        assert!(registry.with_tag("dynamic").is_empty());
        assert_eq!(registry.ids(), vec![floor, wall, player]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_removed_index_is_recycled_and_stale_id_is_deleted() {
        let mut registry = EntityRegistry::new();
        let first = registry.create("a", Some("t".to_string()));
        registry.create("b", None);

        let record = registry.remove(first);
        assert_eq!(record.name, "a");
        assert_eq!(registry.state(first), EntityState::Deleted);
        assert!(registry.find_by_name("a").is_none());
        assert!(registry.with_tag("t").is_empty());

        let reused = registry.create("c", None);
        assert_eq!(reused.index(), first.index());
        assert_ne!(reused, first);
        assert!(registry.get(first).is_none());
        assert_eq!(registry.expect(reused).name, "c");
    }

    #[test]
    fn test_name_is_free_again_after_removal() {
        let mut registry = EntityRegistry::new();
        let id = registry.create("floor", None);
        registry.remove(id);
        let again = registry.create("floor", None);
        assert_eq!(registry.find_by_name("floor"), Some(again));
    }

    #[test]
    #[should_panic(expected = "already used")]
    fn test_duplicate_name_is_a_contract_violation() {
        let mut registry = EntityRegistry::new();
        registry.create("floor", None);
        registry.create("floor", None);
    }

    #[test]
    #[should_panic(expected = "already deleted")]
    fn test_expect_on_deleted_entity_is_a_contract_violation() {
        let mut registry = EntityRegistry::new();
        let id = registry.create("floor", None);
        registry.remove(id);
        registry.expect(id);
    }

    #[test]
    fn test_generated_names_skip_taken_ones() {
        let mut registry = EntityRegistry::new();
        registry.create("entity#1", None);
        let name = registry.generate_name();
        assert_eq!(name, "entity#2");
    }
}
