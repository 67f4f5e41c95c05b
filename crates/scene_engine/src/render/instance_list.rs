//! Instance lists
//!
//! One list per [`MeshViewType`]: the set of active mesh instances the culler
//! iterates. Insertion is O(1); removal keeps the remaining order so the
//! single-threaded culling path stays deterministic.

use indexmap::IndexSet;

use crate::ecs::components::MeshViewType;
use crate::ecs::ComponentId;

/// Active mesh instances of one view type
#[derive(Debug, Clone)]
pub struct InstanceList {
    view_type: MeshViewType,
    members: IndexSet<ComponentId>,
}

impl InstanceList {
    /// Create an empty list for `view_type`
    pub fn new(view_type: MeshViewType) -> Self {
        Self {
            view_type,
            members: IndexSet::new(),
        }
    }

    /// View type this list serves
    pub fn view_type(&self) -> MeshViewType {
        self.view_type
    }

    /// Add an instance; returns false if it was already present
    pub fn insert(&mut self, id: ComponentId) -> bool {
        self.members.insert(id)
    }

    /// Remove an instance; returns false if it was absent
    pub fn remove(&mut self, id: ComponentId) -> bool {
        self.members.shift_remove(&id)
    }

    /// Whether `id` is listed
    pub fn contains(&self, id: ComponentId) -> bool {
        self.members.contains(&id)
    }

    /// Instances in insertion order
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.members.iter().copied()
    }

    /// Number of instances
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn test_insert_remove_keeps_order() {
        let mut keys: SlotMap<ComponentId, ()> = SlotMap::with_key();
        let (a, b, c) = (keys.insert(()), keys.insert(()), keys.insert(()));

        let mut list = InstanceList::new(MeshViewType::Static);
        assert!(list.insert(a));
        assert!(list.insert(b));
        assert!(list.insert(c));
        assert!(!list.insert(b));

        assert!(list.remove(b));
        assert!(!list.remove(b));
        assert_eq!(list.iter().collect::<Vec<_>>(), vec![a, c]);
        assert_eq!(list.view_type(), MeshViewType::Static);
    }
}
