//! Deferred command queue
//!
//! Structural mutations requested while collections are being iterated are
//! recorded as typed commands and applied at the next flush point.

use std::collections::VecDeque;

use super::{ComponentId, EntityId};

/// A deferred scene mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    /// Physically remove an entity already marked destroyed
    DestroyEntity(EntityId),
    /// Change an entity's enabled flag
    SetEntityEnabled(EntityId, bool),
    /// Change a component's enabled flag
    SetComponentEnabled(ComponentId, bool),
    /// Physically remove a component already marked destroyed
    DestroyComponent(ComponentId),
}

/// FIFO of pending scene commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<SceneCommand>,
}

impl CommandQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule a command for the next flush
    pub fn push(&mut self, command: SceneCommand) {
        self.pending.push_back(command);
    }

    /// Next command to apply
    pub fn pop(&mut self) -> Option<SceneCommand> {
        self.pending.pop_front()
    }

    /// Pending commands in application order
    pub fn iter(&self) -> impl Iterator<Item = &SceneCommand> {
        self.pending.iter()
    }

    /// Number of pending commands
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_apply_in_fifo_order() {
        let mut queue = CommandQueue::new();
        let entity = EntityId::new(1, 0);
        queue.push(SceneCommand::SetEntityEnabled(entity, false));
        queue.push(SceneCommand::DestroyEntity(entity));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.iter().count(), 2);
        assert_eq!(queue.pop(), Some(SceneCommand::SetEntityEnabled(entity, false)));
        assert_eq!(queue.pop(), Some(SceneCommand::DestroyEntity(entity)));
        assert!(queue.is_empty());
    }
}
