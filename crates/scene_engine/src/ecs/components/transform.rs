//! Transform component storage
//!
//! Transforms live in an arena keyed by [`TransformId`]; parent and child
//! links are ids, never references. Every node stores its *world-space*
//! position, rotation and scale. A mutation on a parent is propagated as a
//! delta into the fields of its enabled descendants, so a node's model matrix
//! only ever depends on its own fields and the recompute pass can run over
//! modified nodes in any order and in parallel.

use slotmap::{new_key_type, SlotMap};

use crate::ecs::EntityId;
use crate::foundation::contract;
use crate::foundation::math::{normal_matrix, trs_matrix, Mat4, Quat, Vec3};

new_key_type! {
    /// Arena key of a transform node
    pub struct TransformId;
}

/// A single node of the transform hierarchy
#[derive(Debug, Clone)]
pub struct TransformNode {
    entity: EntityId,
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    model: Mat4,
    normal: Mat4,
    parent: Option<TransformId>,
    children: Vec<TransformId>,
    enabled: bool,
    modified: bool,
}

impl TransformNode {
    fn new(entity: EntityId) -> Self {
        Self {
            entity,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            model: Mat4::identity(),
            normal: Mat4::identity(),
            parent: None,
            children: Vec::new(),
            enabled: true,
            modified: true,
        }
    }

    /// Owning entity
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// World-space position
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// World-space rotation
    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    /// World-space scale
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Model matrix as of the last recompute
    pub fn model_matrix(&self) -> &Mat4 {
        &self.model
    }

    /// Normal matrix as of the last recompute
    pub fn normal_matrix(&self) -> &Mat4 {
        &self.normal
    }

    /// Parent node, if any
    pub fn parent(&self) -> Option<TransformId> {
        self.parent
    }

    /// Children in attach order
    pub fn children(&self) -> &[TransformId] {
        &self.children
    }

    /// Whether mutations and recomputes apply to this node
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a local property changed since the last recompute
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    fn recompute(&mut self) {
        self.model = trs_matrix(&self.position, &self.rotation, &self.scale);
        self.normal = normal_matrix(&self.model);
        self.modified = false;
    }
}

/// Arena of all transforms of one scene
#[derive(Debug, Default)]
pub struct TransformArena {
    nodes: SlotMap<TransformId, TransformNode>,
}

impl TransformArena {
    /// Create an empty arena
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an identity root transform for `entity`
    pub fn insert(&mut self, entity: EntityId) -> TransformId {
        self.nodes.insert(TransformNode::new(entity))
    }

    /// Node by id
    pub fn get(&self, id: TransformId) -> Option<&TransformNode> {
        self.nodes.get(id)
    }

    #[track_caller]
    fn node(&self, id: TransformId) -> &TransformNode {
        match self.nodes.get(id) {
            Some(node) => node,
            None => contract::violation(format!("transform {id:?} was already deleted")),
        }
    }

    #[track_caller]
    fn node_mut(&mut self, id: TransformId) -> &mut TransformNode {
        match self.nodes.get_mut(id) {
            Some(node) => node,
            None => contract::violation(format!("transform {id:?} was already deleted")),
        }
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of nodes still waiting for a matrix recompute
    pub fn modified(&self) -> Vec<TransformId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.modified)
            .map(|(id, _)| id)
            .collect()
    }

    /// Enable or disable a node. Re-enabled nodes keep any pending recompute.
    pub fn set_enabled(&mut self, id: TransformId, enabled: bool) {
        self.node_mut(id).enabled = enabled;
    }

    /// Enabled descendants in depth-first order; a disabled node hides its subtree.
    fn enabled_descendants(&self, id: TransformId) -> Vec<TransformId> {
        let mut result = Vec::new();
        let mut stack: Vec<TransformId> = self.node(id).children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            let node = self.node(current);
            if !node.enabled {
                continue;
            }
            result.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        result
    }

    /// Set the world-space position, moving enabled descendants by the same delta.
    ///
    /// Returns false (and changes nothing) when the node is disabled.
    pub fn set_position(&mut self, id: TransformId, position: Vec3) -> bool {
        let delta = position - self.node(id).position;
        self.translate(id, delta)
    }

    /// Move the node and its enabled descendants by `delta`
    pub fn translate(&mut self, id: TransformId, delta: Vec3) -> bool {
        if !self.node(id).enabled {
            return false;
        }
        for child in self.enabled_descendants(id) {
            let node = self.node_mut(child);
            node.position += delta;
            node.modified = true;
        }
        let node = self.node_mut(id);
        node.position += delta;
        node.modified = true;
        true
    }

    /// Rotate the node by `delta` (world frame) about its own position.
    ///
    /// Enabled descendants orbit the node's position and receive the same
    /// rotation.
    pub fn rotate(&mut self, id: TransformId, delta: Quat) -> bool {
        if !self.node(id).enabled {
            return false;
        }
        let pivot = self.node(id).position;
        for child in self.enabled_descendants(id) {
            let node = self.node_mut(child);
            node.position = pivot + delta * (node.position - pivot);
            node.rotation = delta * node.rotation;
            node.modified = true;
        }
        let node = self.node_mut(id);
        node.rotation = delta * node.rotation;
        node.modified = true;
        true
    }

    /// Replace the node's rotation, propagating the difference to descendants
    pub fn set_rotation(&mut self, id: TransformId, rotation: Quat) -> bool {
        let delta = rotation * self.node(id).rotation.inverse();
        self.rotate(id, delta)
    }

    /// Replace the node's scale.
    ///
    /// Descendants have their offset from this node scaled in this node's
    /// local frame and their own scale multiplied by the same per-axis ratio.
    /// An axis whose previous scale was zero contributes a ratio of one.
    pub fn set_scale(&mut self, id: TransformId, scale: Vec3) -> bool {
        let (pivot, frame, old_scale) = {
            let node = self.node(id);
            if !node.enabled {
                return false;
            }
            (node.position, node.rotation, node.scale)
        };
        let ratio = Vec3::from_fn(|axis, _| {
            if old_scale[axis] == 0.0 {
                1.0
            } else {
                scale[axis] / old_scale[axis]
            }
        });

        for child in self.enabled_descendants(id) {
            let node = self.node_mut(child);
            let local_offset = frame.inverse() * (node.position - pivot);
            node.position = pivot + frame * local_offset.component_mul(&ratio);
            node.scale = node.scale.component_mul(&ratio);
            node.modified = true;
        }
        let node = self.node_mut(id);
        node.scale = scale;
        node.modified = true;
        true
    }

    /// Attach `child` under `parent`, or make it a root with `None`.
    ///
    /// World-space fields are untouched. Parenting a node under itself or
    /// one of its descendants is a contract violation.
    pub fn set_parent(&mut self, child: TransformId, parent: Option<TransformId>) {
        if let Some(parent) = parent {
            let mut cursor = Some(parent);
            while let Some(current) = cursor {
                if current == child {
                    contract::violation(format!(
                        "parenting transform {child:?} under {parent:?} would create a cycle"
                    ));
                }
                cursor = self.node(current).parent;
            }
        }

        self.detach(child);
        if let Some(parent) = parent {
            self.node_mut(parent).children.push(child);
            self.node_mut(child).parent = Some(parent);
        }
    }

    /// Detach a node from its parent, leaving it a root
    pub fn detach(&mut self, id: TransformId) {
        if let Some(parent) = self.node_mut(id).parent.take() {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.retain(|&c| c != id);
            }
        }
    }

    /// Remove a node; it is detached from its parent and its children become roots.
    pub fn remove(&mut self, id: TransformId) -> TransformNode {
        self.detach(id);
        let node = match self.nodes.remove(id) {
            Some(node) => node,
            None => contract::violation(format!("transform {id:?} was already deleted")),
        };
        for &child in &node.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
        }
        node
    }

    /// Recompute model and normal matrices of every enabled, modified node.
    ///
    /// Runs on scoped worker threads once at least `parallel_threshold`
    /// nodes are dirty. Returns the number of nodes recomputed.
    pub fn recompute_matrices(&mut self, parallel_threshold: usize) -> usize {
        let mut dirty: Vec<&mut TransformNode> = self
            .nodes
            .values_mut()
            .filter(|node| node.enabled && node.modified)
            .collect();
        let count = dirty.len();

        if count < parallel_threshold.max(2) {
            dirty.iter_mut().for_each(|node| node.recompute());
            return count;
        }

        let threads = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(4);
        let chunk_size = count.div_ceil(threads);
        let result = crossbeam::scope(|scope| {
            for chunk in dirty.chunks_mut(chunk_size) {
                scope.spawn(move |_| chunk.iter_mut().for_each(|node| node.recompute()));
            }
        });
        if let Err(panic) = result {
            std::panic::resume_unwind(panic);
        }
        log::trace!("Recomputed {} transforms on {} threads", count, threads);
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{constants::HALF_PI, transform_point};
    use approx::assert_relative_eq;

    fn entity(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    fn family(arena: &mut TransformArena) -> (TransformId, TransformId, TransformId) {
        let parent = arena.insert(entity(0));
        let c1 = arena.insert(entity(1));
        let c2 = arena.insert(entity(2));
        arena.set_parent(c1, Some(parent));
        arena.set_parent(c2, Some(parent));
        arena.recompute_matrices(usize::MAX);
        (parent, c1, c2)
    }

    #[test]
    fn test_translation_propagates_to_enabled_children() {
        let mut arena = TransformArena::new();
        let (parent, c1, c2) = family(&mut arena);
        arena.set_position(c1, Vec3::new(1.0, 0.0, 0.0));
        arena.recompute_matrices(usize::MAX);

        let delta = Vec3::new(0.0, 2.0, -5.0);
        assert!(arena.translate(parent, delta));

        assert_relative_eq!(arena.get(parent).unwrap().position(), delta);
        assert_relative_eq!(arena.get(c1).unwrap().position(), Vec3::new(1.0, 2.0, -5.0));
        assert_relative_eq!(arena.get(c2).unwrap().position(), delta);
        for id in [parent, c1, c2] {
            assert!(arena.get(id).unwrap().is_modified());
        }
    }

    #[test]
    fn test_disabled_child_and_its_subtree_are_skipped() {
        let mut arena = TransformArena::new();
        let (parent, c1, _) = family(&mut arena);
        let grandchild = arena.insert(entity(3));
        arena.set_parent(grandchild, Some(c1));
        arena.recompute_matrices(usize::MAX);
        arena.set_enabled(c1, false);

        arena.translate(parent, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(arena.get(c1).unwrap().position(), Vec3::zeros());
        assert_eq!(arena.get(grandchild).unwrap().position(), Vec3::zeros());
        assert!(!arena.get(grandchild).unwrap().is_modified());
    }

    #[test]
    fn test_mutating_disabled_transform_is_a_silent_no_op() {
        let mut arena = TransformArena::new();
        let (parent, c1, _) = family(&mut arena);
        arena.set_enabled(parent, false);

        assert!(!arena.set_position(parent, Vec3::new(5.0, 0.0, 0.0)));
        assert!(!arena.set_scale(parent, Vec3::new(2.0, 2.0, 2.0)));
        assert!(!arena.rotate(parent, Quat::from_axis_angle(&Vec3::y_axis(), 1.0)));
        assert_eq!(arena.get(parent).unwrap().position(), Vec3::zeros());
        assert!(!arena.get(c1).unwrap().is_modified());
    }

    #[test]
    fn test_rotation_orbits_children_around_parent() {
        let mut arena = TransformArena::new();
        let (parent, c1, _) = family(&mut arena);
        arena.set_position(parent, Vec3::new(1.0, 0.0, 0.0));
        arena.set_position(c1, Vec3::new(2.0, 0.0, 0.0));

        arena.rotate(parent, Quat::from_axis_angle(&Vec3::y_axis(), HALF_PI));
        assert_relative_eq!(arena.get(c1).unwrap().position(), Vec3::new(1.0, 0.0, -1.0), epsilon = 1e-5);
        assert_relative_eq!(
            arena.get(c1).unwrap().rotation(),
            arena.get(parent).unwrap().rotation(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_scale_scales_child_offset_and_scale() {
        let mut arena = TransformArena::new();
        let (parent, c1, _) = family(&mut arena);
        arena.set_position(c1, Vec3::new(0.0, 1.0, 0.0));

        arena.set_scale(parent, Vec3::new(1.0, 3.0, 1.0));
        assert_relative_eq!(arena.get(c1).unwrap().position(), Vec3::new(0.0, 3.0, 0.0), epsilon = 1e-6);
        assert_relative_eq!(arena.get(c1).unwrap().scale(), Vec3::new(1.0, 3.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_recompute_clears_flag_and_builds_trs() {
        let mut arena = TransformArena::new();
        let id = arena.insert(entity(0));
        arena.set_position(id, Vec3::new(0.0, -3.0, -10.0));
        arena.set_scale(id, Vec3::new(10.0, 0.01, 10.0));

        assert_eq!(arena.recompute_matrices(usize::MAX), 1);
        let node = arena.get(id).unwrap();
        assert!(!node.is_modified());
        let corner = transform_point(node.model_matrix(), &Vec3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(corner, Vec3::new(10.0, -2.99, 0.0), epsilon = 1e-5);
        assert_eq!(arena.recompute_matrices(usize::MAX), 0);
    }

    #[test]
    fn test_parallel_recompute_matches_sequential() {
        let mut parallel = TransformArena::new();
        let mut sequential = TransformArena::new();
        let mut ids = Vec::new();
        for i in 0..300u32 {
            let position = Vec3::new(i as f32, (i % 7) as f32, -(i as f32));
            let a = parallel.insert(entity(i));
            let b = sequential.insert(entity(i));
            parallel.set_position(a, position);
            sequential.set_position(b, position);
            ids.push((a, b));
        }

        assert_eq!(parallel.recompute_matrices(2), 300);
        assert_eq!(sequential.recompute_matrices(usize::MAX), 300);
        for (a, b) in ids {
            assert_eq!(
                parallel.get(a).unwrap().model_matrix(),
                sequential.get(b).unwrap().model_matrix()
            );
        }
    }

    #[test]
    fn test_parent_child_links_stay_consistent() {
        let mut arena = TransformArena::new();
        let (parent, c1, c2) = family(&mut arena);
        let other = arena.insert(entity(3));

        arena.set_parent(c1, Some(other));
        assert_eq!(arena.get(parent).unwrap().children(), &[c2]);
        assert_eq!(arena.get(other).unwrap().children(), &[c1]);
        assert_eq!(arena.get(c1).unwrap().parent(), Some(other));

        let removed = arena.remove(other);
        assert_eq!(removed.children(), &[c1]);
        assert_eq!(arena.get(c1).unwrap().parent(), None);
    }

    #[test]
    #[should_panic(expected = "cycle")]
    fn test_parenting_under_descendant_is_a_contract_violation() {
        let mut arena = TransformArena::new();
        let (parent, c1, _) = family(&mut arena);
        arena.set_parent(parent, Some(c1));
    }
}
