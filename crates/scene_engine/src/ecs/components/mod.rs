//! Component kinds attached to entities

pub mod audio_player;
pub mod behaviour;
pub mod mesh_instance;
pub mod sprite;
pub mod transform;

pub use audio_player::AudioPlayer;
pub use behaviour::{Behaviour, BehaviourSlot, Capabilities};
pub use mesh_instance::{Drawable, MeshInstance, MeshViewType, ShadingModel};
pub use sprite::SpriteInstance;
pub use transform::{TransformArena, TransformId, TransformNode};
