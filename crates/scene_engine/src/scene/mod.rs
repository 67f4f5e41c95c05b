//! # Scene
//!
//! The scene is the explicit context object owning every entity, component,
//! transform and index of one world. Nothing is reachable through globals:
//! renderers and behaviours receive the scene they work on.
//!
//! ## Lifecycle
//!
//! Structural changes requested while passes iterate (destroying entities or
//! components, toggling enabled flags) are queued as [`SceneCommand`]s and
//! applied at [`Scene::flush`]. [`Scene::step`] runs the frame order:
//! update, flush, late update, flush, transform recompute.

pub mod fields;

use slotmap::SlotMap;
use thiserror::Error;

use crate::config::{ChildPolicy, SceneConfig};
use crate::ecs::components::{
    Behaviour, BehaviourSlot, Capabilities, Drawable, MeshInstance, TransformArena, TransformId, TransformNode,
};
use crate::ecs::{
    CommandQueue, ComponentData, ComponentId, ComponentManagers, ComponentRecord, ComponentState, ComponentType,
    EntityId, EntityRecord, EntityRegistry, EntityState, SceneCommand,
};
use crate::foundation::contract;
use crate::foundation::math::{Quat, Vec3};

pub use fields::{describe_fields, FieldDescriptor, FieldType, FieldValue};

/// Recoverable scene errors
#[derive(Debug, Error, PartialEq)]
pub enum SceneError {
    /// Operation needs a different component kind
    #[error("component {component:?} is a {actual:?}, expected {expected:?}")]
    WrongComponentKind {
        /// Component addressed
        component: ComponentId,
        /// Kind the operation needs
        expected: ComponentType,
        /// Kind it actually is
        actual: ComponentType,
    },

    /// Component id does not resolve
    #[error("component {0:?} does not exist")]
    UnknownComponent(ComponentId),

    /// Field has no setter
    #[error("field '{field}' is read-only")]
    ReadOnlyField {
        /// Field name
        field: &'static str,
    },

    /// Value of the wrong type for a field
    #[error("field '{field}' expects a {expected:?} value")]
    FieldType {
        /// Field name
        field: &'static str,
        /// Type the field holds
        expected: FieldType,
    },
}

/// Work done by one [`Scene::step`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Behaviours run in the update pass
    pub updated: usize,
    /// Behaviours run in the late-update pass
    pub late_updated: usize,
    /// Commands applied across both flushes
    pub flushed: usize,
    /// Transforms whose matrices were recomputed
    pub recomputed: usize,
}

/// One world of entities and components
#[derive(Debug)]
pub struct Scene {
    config: SceneConfig,
    registry: EntityRegistry,
    components: SlotMap<ComponentId, ComponentRecord>,
    transforms: TransformArena,
    managers: ComponentManagers,
    commands: CommandQueue,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(&SceneConfig::default())
    }
}

impl Scene {
    /// Create an empty scene
    pub fn new(config: &SceneConfig) -> Self {
        Self {
            config: config.clone(),
            registry: EntityRegistry::new(),
            components: SlotMap::with_key(),
            transforms: TransformArena::new(),
            managers: ComponentManagers::new(),
            commands: CommandQueue::new(),
        }
    }

    /// Settings the scene was created with
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    // ---- entities -------------------------------------------------------

    /// Create an entity with a unique name
    pub fn create_entity(&mut self, name: impl Into<String>) -> EntityId {
        let id = self.registry.create(name, None);
        log::debug!("Created entity {}", id);
        id
    }

    /// Create an entity with a unique name and a grouping tag
    pub fn create_entity_with_tag(&mut self, name: impl Into<String>, tag: impl Into<String>) -> EntityId {
        let id = self.registry.create(name, Some(tag.into()));
        log::debug!("Created tagged entity {}", id);
        id
    }

    /// Create an entity with a generated name
    pub fn spawn(&mut self) -> EntityId {
        let name = self.registry.generate_name();
        self.create_entity(name)
    }

    /// Request destruction. The entity is marked immediately and torn down
    /// at the next flush. Repeated calls before the flush do nothing.
    #[track_caller]
    pub fn destroy(&mut self, id: EntityId) {
        let record = self.registry.expect_mut(id);
        if record.state == EntityState::MarkedDestroyed {
            return;
        }
        record.state = EntityState::MarkedDestroyed;
        self.commands.push(SceneCommand::DestroyEntity(id));
        log::debug!("Marked entity {} for destruction", id);
    }

    /// Destroy and tear down immediately. Only for callers that are not
    /// iterating scene collections.
    #[track_caller]
    pub fn destroy_now(&mut self, id: EntityId) {
        self.registry.expect_mut(id).state = EntityState::MarkedDestroyed;
        self.teardown_entity(id, true);
    }

    /// Queue an entity enable/disable
    #[track_caller]
    pub fn set_entity_enabled(&mut self, id: EntityId, enabled: bool) {
        self.registry.expect(id);
        self.commands.push(SceneCommand::SetEntityEnabled(id, enabled));
    }

    /// Entity record, `None` once deleted
    pub fn entity(&self, id: EntityId) -> Option<&EntityRecord> {
        self.registry.get(id)
    }

    /// Lifecycle state; stale ids report `Deleted`
    pub fn entity_state(&self, id: EntityId) -> EntityState {
        self.registry.state(id)
    }

    /// Whether the entity has not been deleted yet
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.entity_state(id) != EntityState::Deleted
    }

    /// All entities not yet deleted, including those marked for destruction
    pub fn entities(&self) -> Vec<EntityId> {
        self.registry.ids()
    }

    /// Entity by unique name
    pub fn find_by_name(&self, name: &str) -> Option<EntityId> {
        self.registry.find_by_name(name)
    }

    /// Entities carrying `tag`
    pub fn entities_with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.registry.with_tag(tag)
    }

    /// Number of entities not yet deleted
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    // ---- components -----------------------------------------------------

    /// Attach a component. Transforms are created through
    /// [`Scene::transform`]; a second component of the same type is a
    /// contract violation.
    #[track_caller]
    pub fn add_component(&mut self, entity: EntityId, data: ComponentData) -> ComponentId {
        if let ComponentData::Transform(_) = data {
            contract::violation("transforms are created through Scene::transform");
        }
        self.attach(entity, data)
    }

    /// Attach an inert mesh instance
    #[track_caller]
    pub fn add_mesh_instance(&mut self, entity: EntityId, instance: MeshInstance) -> ComponentId {
        self.attach(entity, ComponentData::MeshInstance(instance))
    }

    /// Attach a behaviour; its capabilities are resolved now
    #[track_caller]
    pub fn add_behaviour(&mut self, entity: EntityId, behaviour: Box<dyn Behaviour>) -> ComponentId {
        self.attach(entity, ComponentData::Behaviour(BehaviourSlot::new(behaviour)))
    }

    /// Supply a mesh instance's drawable, activating it
    #[track_caller]
    pub fn set_mesh_drawable(&mut self, component: ComponentId, drawable: Drawable) -> Result<(), SceneError> {
        match &mut self.expect_component_mut(component).data {
            ComponentData::MeshInstance(instance) => instance.drawable = Some(drawable),
            other => {
                return Err(SceneError::WrongComponentKind {
                    component,
                    expected: ComponentType::MeshInstance,
                    actual: other.component_type(),
                })
            }
        }
        self.sync_component(component);
        Ok(())
    }

    /// Queue a component enable/disable
    #[track_caller]
    pub fn set_component_enabled(&mut self, component: ComponentId, enabled: bool) {
        self.expect_component(component);
        self.commands.push(SceneCommand::SetComponentEnabled(component, enabled));
    }

    /// Request removal of a component at the next flush
    #[track_caller]
    pub fn remove_component(&mut self, component: ComponentId) {
        let record = self.expect_component_mut(component);
        if record.state == ComponentState::MarkedDestroyed {
            return;
        }
        record.state = ComponentState::MarkedDestroyed;
        self.commands.push(SceneCommand::DestroyComponent(component));
    }

    /// Component record
    pub fn component(&self, id: ComponentId) -> Option<&ComponentRecord> {
        self.components.get(id)
    }

    /// Component of `component_type` attached to `entity`
    pub fn component_of(&self, entity: EntityId, component_type: ComponentType) -> Option<ComponentId> {
        self.registry.get(entity)?.component(component_type)
    }

    pub(crate) fn component_data_mut(&mut self, id: ComponentId) -> Option<&mut ComponentData> {
        self.components.get_mut(id).map(|record| &mut record.data)
    }

    /// Per-type secondary indices
    pub fn managers(&self) -> &ComponentManagers {
        &self.managers
    }

    // ---- deferred commands ----------------------------------------------

    /// Apply queued commands until none remain; returns how many ran
    pub fn flush(&mut self) -> usize {
        let mut applied = 0;
        while let Some(command) = self.commands.pop() {
            self.apply(command);
            applied += 1;
        }
        if applied > 0 {
            log::trace!("Flushed {} scene commands", applied);
        }
        applied
    }

    /// Commands waiting for the next flush
    pub fn pending_commands(&self) -> &CommandQueue {
        &self.commands
    }

    fn apply(&mut self, command: SceneCommand) {
        match command {
            SceneCommand::DestroyEntity(id) => self.teardown_entity(id, false),
            SceneCommand::SetEntityEnabled(id, enabled) => {
                let Some(record) = self.registry.get_mut(id) else {
                    return;
                };
                if record.enabled == enabled {
                    return;
                }
                record.enabled = enabled;
                let components: Vec<ComponentId> = record.components.values().copied().collect();
                for component in components {
                    self.sync_component(component);
                }
            }
            SceneCommand::SetComponentEnabled(id, enabled) => {
                let Some(record) = self.components.get_mut(id) else {
                    return;
                };
                if record.enabled != enabled {
                    record.enabled = enabled;
                    self.sync_component(id);
                }
            }
            SceneCommand::DestroyComponent(id) => self.teardown_component(id),
        }
    }

    // ---- behaviours -----------------------------------------------------

    /// Run every update-capable behaviour
    pub fn update(&mut self, delta_time: f32) -> usize {
        let ids = self.managers.update_set();
        self.run_behaviours(&ids, Capabilities::UPDATE, delta_time)
    }

    /// Run every late-update-capable behaviour
    pub fn late_update(&mut self, delta_time: f32) -> usize {
        let ids = self.managers.late_update_set();
        self.run_behaviours(&ids, Capabilities::LATE_UPDATE, delta_time)
    }

    fn run_behaviours(&mut self, ids: &[ComponentId], pass: Capabilities, delta_time: f32) -> usize {
        let mut ran = 0;
        for &id in ids {
            let Some(record) = self.components.get_mut(id) else {
                continue;
            };
            let entity = record.entity;
            if !record.indexed || self.registry.state(entity) != EntityState::Active {
                continue;
            }
            let ComponentData::Behaviour(slot) = &mut record.data else {
                continue;
            };
            let Some(mut script) = slot.take() else {
                continue;
            };

            if pass == Capabilities::UPDATE {
                script.update(self, entity, delta_time);
            } else {
                script.late_update(self, entity, delta_time);
            }
            ran += 1;

            match self.components.get_mut(id).map(|record| &mut record.data) {
                Some(ComponentData::Behaviour(slot)) => slot.restore(script),
                _ => script.on_destroy(entity),
            }
        }
        ran
    }

    /// Advance one frame: update, flush, late update, flush, recompute
    pub fn step(&mut self, delta_time: f32) -> StepStats {
        let updated = self.update(delta_time);
        let mut flushed = self.flush();
        let late_updated = self.late_update(delta_time);
        flushed += self.flush();
        let recomputed = self.recompute_transforms();
        StepStats {
            updated,
            late_updated,
            flushed,
            recomputed,
        }
    }

    // ---- transforms -----------------------------------------------------

    /// Transform of `entity`, created on first access
    #[track_caller]
    pub fn transform(&mut self, entity: EntityId) -> TransformId {
        if let Some(id) = self.transform_id(entity) {
            return id;
        }
        self.registry.expect(entity);
        let id = self.transforms.insert(entity);
        self.attach(entity, ComponentData::Transform(id));
        id
    }

    /// Transform node of `entity` without creating one
    pub fn transform_node(&self, entity: EntityId) -> Option<&TransformNode> {
        self.transforms.get(self.transform_id(entity)?)
    }

    /// All transforms
    pub fn transforms(&self) -> &TransformArena {
        &self.transforms
    }

    /// Move to a world position; false if the transform is disabled
    #[track_caller]
    pub fn set_position(&mut self, entity: EntityId, position: Vec3) -> bool {
        let id = self.transform(entity);
        self.transforms.set_position(id, position)
    }

    /// Move by `delta`; false if the transform is disabled
    #[track_caller]
    pub fn translate(&mut self, entity: EntityId, delta: Vec3) -> bool {
        let id = self.transform(entity);
        self.transforms.translate(id, delta)
    }

    /// Set the world scale; false if the transform is disabled
    #[track_caller]
    pub fn set_scale(&mut self, entity: EntityId, scale: Vec3) -> bool {
        let id = self.transform(entity);
        self.transforms.set_scale(id, scale)
    }

    /// Rotate by `angle` radians about `axis`; false if the transform is disabled
    #[track_caller]
    pub fn rotate(&mut self, entity: EntityId, axis: &Vec3, angle: f32) -> bool {
        let id = self.transform(entity);
        let delta = Quat::from_axis_angle(&nalgebra::Unit::new_normalize(*axis), angle);
        self.transforms.rotate(id, delta)
    }

    /// Replace the world rotation; false if the transform is disabled
    #[track_caller]
    pub fn set_rotation(&mut self, entity: EntityId, rotation: Quat) -> bool {
        let id = self.transform(entity);
        self.transforms.set_rotation(id, rotation)
    }

    /// Parent `child` under `parent`, or make it a root
    #[track_caller]
    pub fn set_parent(&mut self, child: EntityId, parent: Option<EntityId>) {
        let child_id = self.transform(child);
        let parent_id = parent.map(|parent| self.transform(parent));
        self.transforms.set_parent(child_id, parent_id);
    }

    /// Entities whose transforms are direct children of `entity`'s
    pub fn children(&self, entity: EntityId) -> Vec<EntityId> {
        self.transform_node(entity)
            .map(|node| {
                node.children()
                    .iter()
                    .filter_map(|&child| self.transforms.get(child).map(TransformNode::entity))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Entity owning the parent transform
    pub fn parent(&self, entity: EntityId) -> Option<EntityId> {
        let parent = self.transform_node(entity)?.parent()?;
        self.transforms.get(parent).map(TransformNode::entity)
    }

    /// Recompute matrices of modified transforms
    pub fn recompute_transforms(&mut self) -> usize {
        self.transforms
            .recompute_matrices(self.config.parallel_transform_threshold)
    }

    // ---- internals ------------------------------------------------------

    fn transform_id(&self, entity: EntityId) -> Option<TransformId> {
        let component = self.component_of(entity, ComponentType::Transform)?;
        match self.components.get(component).map(|record| &record.data) {
            Some(ComponentData::Transform(id)) => Some(*id),
            _ => None,
        }
    }

    #[track_caller]
    fn attach(&mut self, entity: EntityId, data: ComponentData) -> ComponentId {
        let component_type = data.component_type();
        if let Some(existing) = self.registry.expect(entity).component(component_type) {
            contract::violation(format!(
                "entity {entity} already has a {component_type:?} component ({existing:?})"
            ));
        }
        let id = self.components.insert(ComponentRecord::new(entity, data));
        self.registry
            .expect_mut(entity)
            .components
            .insert(component_type, id);
        self.sync_component(id);
        log::trace!("Attached {:?} component {:?} to entity {}", component_type, id, entity);
        id
    }

    #[track_caller]
    fn expect_component(&self, id: ComponentId) -> &ComponentRecord {
        match self.components.get(id) {
            Some(record) => record,
            None => contract::violation(format!("component {id:?} was already deleted")),
        }
    }

    #[track_caller]
    fn expect_component_mut(&mut self, id: ComponentId) -> &mut ComponentRecord {
        match self.components.get_mut(id) {
            Some(record) => record,
            None => contract::violation(format!("component {id:?} was already deleted")),
        }
    }

    fn sync_component(&mut self, id: ComponentId) {
        let Scene {
            registry,
            components,
            transforms,
            managers,
            ..
        } = self;
        let Some(record) = components.get_mut(id) else {
            return;
        };
        let entity_live = registry
            .get(record.entity)
            .is_some_and(|entity| entity.enabled && entity.state == EntityState::Active);
        managers.sync(id, record, entity_live, transforms);
    }

    fn teardown_component(&mut self, id: ComponentId) {
        let Some(mut record) = self.components.remove(id) else {
            return;
        };
        self.managers.release(id, &mut record);
        let component_type = record.component_type();
        if let Some(entity) = self.registry.get_mut(record.entity) {
            if entity.component(component_type) == Some(id) {
                entity.components.remove(&component_type);
            }
        }
        match &mut record.data {
            ComponentData::Transform(transform) => {
                if self.transforms.get(*transform).is_some() {
                    self.transforms.remove(*transform);
                }
            }
            ComponentData::Behaviour(slot) => {
                if let Some(mut script) = slot.take() {
                    script.on_destroy(record.entity);
                }
            }
            _ => {}
        }
    }

    fn teardown_entity(&mut self, id: EntityId, immediate: bool) {
        let Some(record) = self.registry.get(id) else {
            return;
        };
        let components: Vec<ComponentId> = record.components.values().copied().collect();

        if self.config.child_policy == ChildPolicy::Cascade {
            for child in self.children(id) {
                if immediate {
                    if self.is_alive(child) {
                        self.destroy_now(child);
                    }
                } else {
                    self.destroy(child);
                }
            }
        }

        for component in components {
            self.teardown_component(component);
        }
        let record = self.registry.remove(id);
        log::debug!("Deleted entity {} ('{}')", id, record.name);
    }
}
