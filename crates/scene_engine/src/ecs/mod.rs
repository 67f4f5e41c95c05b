//! Entity-Component implementation
//!
//! Entities, their typed components, the per-type managers that index active
//! components, and the deferred command queue.

pub mod commands;
pub mod component;
pub mod components;
pub mod entity;
pub mod managers;
pub mod registry;

pub use commands::{CommandQueue, SceneCommand};
pub use component::{ComponentData, ComponentId, ComponentRecord, ComponentState, ComponentType, ManagerKind};
pub use entity::{EntityId, EntityRecord, EntityState};
pub use managers::ComponentManagers;
pub use registry::EntityRegistry;
