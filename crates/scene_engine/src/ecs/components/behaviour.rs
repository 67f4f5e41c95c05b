//! Behaviour component
//!
//! User scripts implement [`Behaviour`]. What a script takes part in
//! (update, late update) is read once from [`Behaviour::capabilities`] when
//! the component is registered; the behaviour manager keeps one set per
//! capability instead of dispatching every hook on every script.

use bitflags::bitflags;

use crate::ecs::EntityId;
use crate::scene::Scene;

bitflags! {
    /// Frame hooks a behaviour participates in
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Called during the update pass
        const UPDATE = 0b01;
        /// Called during the late-update pass
        const LATE_UPDATE = 0b10;
    }
}

/// User-defined per-entity logic
///
/// Hooks receive the whole scene. Structural changes requested from a hook
/// (destroy, enable/disable) are deferred to the next flush point, so the
/// pass that is running never sees a half-removed entity.
pub trait Behaviour: Send {
    /// Hooks this behaviour wants; read once at registration
    fn capabilities(&self) -> Capabilities {
        Capabilities::UPDATE
    }

    /// Per-frame update
    fn update(&mut self, _scene: &mut Scene, _entity: EntityId, _delta_time: f32) {}

    /// Per-frame late update, after the first flush point
    fn late_update(&mut self, _scene: &mut Scene, _entity: EntityId, _delta_time: f32) {}

    /// Called once when the component is torn down
    fn on_destroy(&mut self, _entity: EntityId) {}
}

/// Storage for a behaviour script plus its resolved capabilities
pub struct BehaviourSlot {
    script: Option<Box<dyn Behaviour>>,
    capabilities: Capabilities,
}

impl BehaviourSlot {
    /// Wrap a script, resolving its capabilities
    pub fn new(script: Box<dyn Behaviour>) -> Self {
        let capabilities = script.capabilities();
        Self {
            script: Some(script),
            capabilities,
        }
    }

    /// Capabilities captured at registration
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Take the script out for a hook call; `None` while it is running
    pub(crate) fn take(&mut self) -> Option<Box<dyn Behaviour>> {
        self.script.take()
    }

    /// Put a script back after a hook call
    pub(crate) fn restore(&mut self, script: Box<dyn Behaviour>) {
        self.script = Some(script);
    }
}

impl std::fmt::Debug for BehaviourSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviourSlot")
            .field("capabilities", &self.capabilities)
            .field("running", &self.script.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LateOnly;

    impl Behaviour for LateOnly {
        fn capabilities(&self) -> Capabilities {
            Capabilities::LATE_UPDATE
        }
    }

    #[test]
    fn test_capabilities_resolved_at_construction() {
        let slot = BehaviourSlot::new(Box::new(LateOnly));
        assert_eq!(slot.capabilities(), Capabilities::LATE_UPDATE);
        assert!(!slot.capabilities().contains(Capabilities::UPDATE));
    }

    #[test]
    fn test_take_and_restore() {
        let mut slot = BehaviourSlot::new(Box::new(LateOnly));
        let script = slot.take().unwrap();
        assert!(slot.take().is_none());
        slot.restore(script);
        assert!(slot.take().is_some());
    }
}
