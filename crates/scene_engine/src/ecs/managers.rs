//! Per-type component managers
//!
//! Each component type has a manager that owns the secondary index passes
//! iterate. [`ComponentManagers::sync`] is the single place deciding whether
//! a component belongs in its index: it must be activated, alive, enabled
//! and owned by an enabled entity.

use std::collections::BTreeMap;

use indexmap::IndexSet;

use super::component::{ComponentData, ComponentId, ComponentRecord, ComponentState};
use super::components::{Capabilities, MeshViewType, TransformArena};
use crate::render::instance_list::InstanceList;

/// Secondary indices of every component manager
#[derive(Debug)]
pub struct ComponentManagers {
    instance_lists: BTreeMap<MeshViewType, InstanceList>,
    sprites: IndexSet<ComponentId>,
    audio_players: IndexSet<ComponentId>,
    update_set: IndexSet<ComponentId>,
    late_update_set: IndexSet<ComponentId>,
}

impl Default for ComponentManagers {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentManagers {
    /// Create managers with one empty instance list per view type
    pub fn new() -> Self {
        Self {
            instance_lists: MeshViewType::all()
                .iter()
                .map(|&view_type| (view_type, InstanceList::new(view_type)))
                .collect(),
            sprites: IndexSet::new(),
            audio_players: IndexSet::new(),
            update_set: IndexSet::new(),
            late_update_set: IndexSet::new(),
        }
    }

    /// Activate the record if its data allows, then bring its index
    /// membership in line with its current state.
    pub fn sync(
        &mut self,
        id: ComponentId,
        record: &mut ComponentRecord,
        entity_enabled: bool,
        transforms: &mut TransformArena,
    ) {
        if record.manager.is_none() && record.data.is_activatable() {
            record.manager = Some(record.component_type().manager());
            log::trace!("Activated {:?} component {:?}", record.component_type(), id);
        }

        let should_index = record.manager.is_some()
            && record.state == ComponentState::Active
            && record.enabled
            && entity_enabled;

        if let ComponentData::Transform(transform) = &record.data {
            if transforms.get(*transform).is_some() {
                transforms.set_enabled(*transform, should_index);
            }
        }

        if should_index != record.indexed {
            if should_index {
                self.index(id, &record.data);
            } else {
                self.unindex(id, &record.data);
            }
            record.indexed = should_index;
        }
    }

    /// Remove a record from every index during teardown
    pub fn release(&mut self, id: ComponentId, record: &mut ComponentRecord) {
        if record.indexed {
            self.unindex(id, &record.data);
            record.indexed = false;
        }
        record.manager = None;
    }

    fn index(&mut self, id: ComponentId, data: &ComponentData) {
        match data {
            ComponentData::Transform(_) => {}
            ComponentData::MeshInstance(instance) => {
                self.list_mut(instance.view_type).insert(id);
            }
            ComponentData::SpriteInstance(_) => {
                self.sprites.insert(id);
            }
            ComponentData::AudioPlayer(_) => {
                self.audio_players.insert(id);
            }
            ComponentData::Behaviour(slot) => {
                if slot.capabilities().contains(Capabilities::UPDATE) {
                    self.update_set.insert(id);
                }
                if slot.capabilities().contains(Capabilities::LATE_UPDATE) {
                    self.late_update_set.insert(id);
                }
            }
        }
    }

    fn unindex(&mut self, id: ComponentId, data: &ComponentData) {
        match data {
            ComponentData::Transform(_) => {}
            ComponentData::MeshInstance(instance) => {
                self.list_mut(instance.view_type).remove(id);
            }
            ComponentData::SpriteInstance(_) => {
                self.sprites.shift_remove(&id);
            }
            ComponentData::AudioPlayer(_) => {
                self.audio_players.shift_remove(&id);
            }
            ComponentData::Behaviour(_) => {
                self.update_set.shift_remove(&id);
                self.late_update_set.shift_remove(&id);
            }
        }
    }

    fn list_mut(&mut self, view_type: MeshViewType) -> &mut InstanceList {
        self.instance_lists
            .entry(view_type)
            .or_insert_with(|| InstanceList::new(view_type))
    }

    /// Instance list of a view type
    pub fn instance_list(&self, view_type: MeshViewType) -> Option<&InstanceList> {
        self.instance_lists.get(&view_type)
    }

    /// All instance lists, ordered by view type
    pub fn instance_lists(&self) -> impl Iterator<Item = &InstanceList> {
        self.instance_lists.values()
    }

    /// Active sprites
    pub fn sprites(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.sprites.iter().copied()
    }

    /// Active audio players
    pub fn audio_players(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.audio_players.iter().copied()
    }

    /// Behaviours registered for the update pass
    pub fn update_set(&self) -> Vec<ComponentId> {
        self.update_set.iter().copied().collect()
    }

    /// Behaviours registered for the late-update pass
    pub fn late_update_set(&self) -> Vec<ComponentId> {
        self.late_update_set.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::components::{Behaviour, BehaviourSlot, MeshInstance, SpriteInstance};
    use crate::ecs::EntityId;
    use slotmap::SlotMap;

    struct Both;

    impl Behaviour for Both {
        fn capabilities(&self) -> Capabilities {
            Capabilities::UPDATE | Capabilities::LATE_UPDATE
        }
    }

    fn key() -> ComponentId {
        let mut keys: SlotMap<ComponentId, ()> = SlotMap::with_key();
        keys.insert(())
    }

    #[test]
    fn test_inert_mesh_instance_gets_no_manager() {
        let mut managers = ComponentManagers::new();
        let mut transforms = TransformArena::new();
        let id = key();
        let mut record = ComponentRecord::new(
            EntityId::new(0, 0),
            ComponentData::MeshInstance(MeshInstance::new(MeshViewType::Static)),
        );

        managers.sync(id, &mut record, true, &mut transforms);
        assert!(!record.is_activated());
        assert!(managers.instance_list(MeshViewType::Static).unwrap().is_empty());
    }

    #[test]
    fn test_behaviour_lands_in_sets_from_capabilities() {
        let mut managers = ComponentManagers::new();
        let mut transforms = TransformArena::new();
        let id = key();
        let mut record = ComponentRecord::new(
            EntityId::new(0, 0),
            ComponentData::Behaviour(BehaviourSlot::new(Box::new(Both))),
        );

        managers.sync(id, &mut record, true, &mut transforms);
        assert_eq!(managers.update_set(), vec![id]);
        assert_eq!(managers.late_update_set(), vec![id]);

        managers.sync(id, &mut record, false, &mut transforms);
        assert!(managers.update_set().is_empty());
        assert!(managers.late_update_set().is_empty());
        assert!(record.is_activated());
    }

    #[test]
    fn test_release_clears_index_and_manager() {
        let mut managers = ComponentManagers::new();
        let mut transforms = TransformArena::new();
        let id = key();
        let mut record = ComponentRecord::new(
            EntityId::new(0, 0),
            ComponentData::SpriteInstance(SpriteInstance::new(3)),
        );
        managers.sync(id, &mut record, true, &mut transforms);
        assert_eq!(managers.sprites().count(), 1);

        managers.release(id, &mut record);
        assert_eq!(managers.sprites().count(), 0);
        assert!(!record.is_activated());
    }
}
